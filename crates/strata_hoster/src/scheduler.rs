//! Staggered monitoring schedule.
//!
//! Every held blob gets one daily trigger per rebuild. Holders of the same
//! blob spread their cycles across the monitoring window by their slot in the
//! holder list, so audits of one blob do not all land at once. The schedule
//! is rebuilt periodically, which also re-rolls the jitter. The weekly
//! payment sweep runs beside it.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Timelike, Utc};
use rand::Rng;
use strata_core::models::HostedBlob;
use strata_core::BlobHash;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info};

use crate::hoster::Hoster;
use crate::{monitor, payments, HosterError};

/// Wall-clock time of day a trigger fires at, in UTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DailyTrigger {
    pub hour: u32,
    pub minute: u32,
}

impl DailyTrigger {
    /// The time of day `offset_minutes` after the start of the current hour.
    pub fn from_offset(now: DateTime<Utc>, offset_minutes: u32) -> Self {
        Self {
            hour: (now.hour() + offset_minutes / 60) % 24,
            minute: offset_minutes % 60,
        }
    }

    /// First firing strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now
            .date_naive()
            .and_hms_opt(self.hour, self.minute, 0)
            .map(|naive| Utc.from_utc_datetime(&naive));
        match today {
            Some(fire) if fire > now => fire,
            Some(fire) => fire + chrono::Duration::days(1),
            None => now + chrono::Duration::days(1),
        }
    }
}

/// Minutes into the window at which the holder in `slot` audits a blob.
pub fn monitoring_offset<R: Rng + ?Sized>(
    rng: &mut R,
    slot: u32,
    window_minutes: u32,
    replication_factor: usize,
) -> u32 {
    let step = window_minutes / replication_factor.max(1) as u32;
    slot * step + rng.gen_range(0..=step)
}

pub struct MonitoringScheduler {
    hoster: Arc<Hoster>,
    triggers: Mutex<Vec<JoinHandle<()>>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

async fn fire_daily(hoster: Arc<Hoster>, hash: BlobHash, trigger: DailyTrigger) {
    loop {
        let now = Utc::now();
        let wait = (trigger.next_after(now) - now)
            .to_std()
            .unwrap_or(Duration::from_secs(60));
        time::sleep(wait).await;
        monitor::spawn_cycle(&hoster, hash);
    }
}

impl MonitoringScheduler {
    pub fn new(hoster: Arc<Hoster>) -> Arc<Self> {
        Arc::new(Self {
            hoster,
            triggers: Mutex::new(Vec::new()),
            loops: Mutex::new(Vec::new()),
        })
    }

    /// Build the schedule and start the rebuild and payment loops.
    pub async fn start(self: &Arc<Self>) -> Result<usize, HosterError> {
        let scheduled = self.reload().await?;

        let rebuild_every = Duration::from_secs(self.hoster.config.schedule_rebuild_hours * 3600);
        let scheduler: Weak<Self> = Arc::downgrade(self);
        let rebuild = tokio::spawn(async move {
            let mut interval = time::interval(rebuild_every);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                info!("Rebuilding the monitoring schedule");
                if let Err(e) = scheduler.reload().await {
                    error!("Failed to rebuild the monitoring schedule: {e}");
                }
            }
        });

        let sweep_every = Duration::from_secs(self.hoster.config.payment_sweep_hours * 3600);
        let hoster = self.hoster.clone();
        let sweep = tokio::spawn(async move {
            let mut interval = time::interval(sweep_every);
            interval.tick().await;
            loop {
                interval.tick().await;
                info!("Requesting payments for held blobs");
                match payments::sweep(&hoster).await {
                    Ok(report) => info!("Payment sweep finished: {report:?}"),
                    Err(e) => error!("Payment sweep failed: {e}"),
                }
            }
        });

        guard(&self.loops).extend([rebuild, sweep]);
        Ok(scheduled)
    }

    /// Rebuild the schedule from the blobs currently held.
    pub async fn reload(&self) -> Result<usize, HosterError> {
        let blobs = self.hoster.node.blobs.list().await?;
        Ok(self.rebuild(&blobs))
    }

    /// Replace every pending trigger with one per blob in `blobs`. Cycles
    /// already running are left to finish.
    pub fn rebuild(&self, blobs: &[HostedBlob]) -> usize {
        let config = &self.hoster.config;
        let mut triggers = guard(&self.triggers);
        for trigger in triggers.drain(..) {
            trigger.abort();
        }

        let now = Utc::now();
        let mut rng = rand::thread_rng();
        for blob in blobs {
            let slot = blob.my_monitoring_slot.unwrap_or(0);
            let offset = monitoring_offset(
                &mut rng,
                slot,
                config.monitoring_window_minutes,
                config.replication_factor,
            );
            let trigger = DailyTrigger::from_offset(now, offset);
            debug!(
                "Monitoring {} daily at {:02}:{:02} (slot {slot})",
                blob.hash, trigger.hour, trigger.minute
            );
            triggers.push(tokio::spawn(fire_daily(
                self.hoster.clone(),
                blob.hash,
                trigger,
            )));
        }

        info!("Scheduled monitoring for {} blob(s)", triggers.len());
        triggers.len()
    }

    /// Number of blobs with a pending trigger.
    pub fn scheduled(&self) -> usize {
        guard(&self.triggers).len()
    }

    /// Abort every trigger and loop. Running cycles are left to finish.
    pub fn stop(&self) {
        for handle in guard(&self.triggers).drain(..) {
            handle.abort();
        }
        for handle in guard(&self.loops).drain(..) {
            handle.abort();
        }
        info!("Monitoring scheduler stopped");
    }
}
