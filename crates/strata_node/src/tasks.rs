//! Supervised background tasks.
//!
//! Work spawned from inside a monitoring cycle (repair uploads, offline
//! vote follow-ups) goes through a [`TaskGroup`] instead of a bare
//! `tokio::spawn`, so it can be awaited, aborted, and its failures counted.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub succeeded: usize,
    pub failed: usize,
    pub panicked: usize,
    pub cancelled: usize,
}

#[derive(Default)]
struct Counters {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    panicked: AtomicUsize,
    cancelled: AtomicUsize,
}

impl Counters {
    fn record(&self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                error!("Background task panicked: {e}");
                self.panicked.fetch_add(1, Ordering::SeqCst);
            } else {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct TaskGroup {
    set: Arc<Mutex<JoinSet<()>>>,
    counters: Arc<Counters>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.set.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the set after dropping tasks that already finished.
    fn reaped(&self) -> MutexGuard<'_, JoinSet<()>> {
        let mut set = self.set();
        while let Some(joined) = set.try_join_next() {
            self.counters.record(joined);
        }
        set
    }

    /// Spawn a named task. Errors it returns are logged and counted.
    pub fn spawn<F, E>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let name = name.into();
        let counters = self.counters.clone();
        debug!("Spawning task {name}");
        self.reaped().spawn(async move {
            match task.await {
                Ok(()) => {
                    counters.succeeded.fetch_add(1, Ordering::SeqCst);
                    debug!("Task {name} finished");
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    error!("Task {name} failed: {e}");
                }
            }
        });
    }

    /// Tasks still running.
    pub fn len(&self) -> usize {
        self.reaped().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reaped().is_empty()
    }

    pub fn abort_all(&self) {
        self.set().abort_all();
    }

    /// Wait until every task spawned so far, and any they spawn in turn, has
    /// finished. Returns totals over the lifetime of the group.
    pub async fn wait(&self) -> TaskReport {
        loop {
            let mut batch = std::mem::take(&mut *self.set());
            if batch.is_empty() {
                break;
            }
            while let Some(joined) = batch.join_next().await {
                self.counters.record(joined);
            }
        }

        TaskReport {
            succeeded: self.counters.succeeded.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            panicked: self.counters.panicked.load(Ordering::SeqCst),
            cancelled: self.counters.cancelled.load(Ordering::SeqCst),
        }
    }
}
