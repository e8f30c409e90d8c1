//! Confirmation polling for ledger writes.
//!
//! Ledger writes land after some confirmation latency, so a caller that needs
//! to observe its own write polls with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::LedgerError;

#[derive(Clone, Debug)]
pub struct Backoff {
    pub attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: 8,
            initial: Duration::from_millis(500),
            max: Duration::from_secs(15),
        }
    }
}

/// Poll `check` until it reports true or the attempts run out.
pub async fn poll_until<F, Fut>(what: &str, backoff: &Backoff, mut check: F) -> Result<(), LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, LedgerError>>,
{
    let mut delay = backoff.initial;
    for attempt in 1..=backoff.attempts {
        match check().await {
            Ok(true) => {
                debug!("Confirmed {what} after {attempt} attempt(s)");
                return Ok(());
            }
            Ok(false) => debug!("{what} not yet visible (attempt {attempt})"),
            Err(e) => warn!("Polling {what} failed: {e}"),
        }

        if attempt < backoff.attempts {
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(backoff.max);
        }
    }

    Err(LedgerError::ConfirmationTimeout(what.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn quick() -> Backoff {
        Backoff {
            attempts: 4,
            initial: Duration::from_millis(1),
            max: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_poll_until_succeeds_after_lag() {
        let calls = AtomicU32::new(0);
        let result = poll_until("deposit", &quick(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(n >= 2) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_gives_up() {
        let calls = AtomicU32::new(0);
        let result = poll_until("deposit", &quick(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LedgerError::Transport("down".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(LedgerError::ConfirmationTimeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
