/// Number of hosters a renter aims to place every file on.
pub const HOSTERS_PER_FILE: usize = 10;

/// Replication factor the offline vote quorum is computed against.
pub const REPLICATION_FACTOR: usize = 10;

/// Consecutive failed proofs tolerated before a replica link goes offline.
/// The link turns `OFFLINE` once its strikes exceed this value.
pub const OFFLINE_STRIKE_LIMIT: u32 = 6;

/// Monitoring cycles without a deposit tolerated before a blob is deleted.
/// With three cycles a day this is one week.
pub const NO_DEPOSIT_STRIKE_LIMIT: u32 = 21;

/// Length of the window monitoring cycles are staggered across, in minutes.
pub const MONITORING_WINDOW_MINUTES: u32 = 8 * 60;

/// Upper bound of the random jitter added to a monitoring offset, in minutes.
pub const MONITORING_JITTER_MINUTES: u32 = MONITORING_WINDOW_MINUTES / HOSTERS_PER_FILE as u32;

/// How often the monitoring schedule is rebuilt, in hours.
pub const SCHEDULE_REBUILD_HOURS: u64 = 8;

/// How often the payment request sweep runs, in hours.
pub const PAYMENT_SWEEP_HOURS: u64 = 7 * 24;

/// Timeout for a single peer upload request, in seconds.
pub const UPLOAD_TIMEOUT_SECS: u64 = 10;

/// Timeout for proof and status requests, in seconds.
pub const PROOF_TIMEOUT_SECS: u64 = 10;

/// Bytes in a GiB, for the hosting quota.
pub const GIB: u64 = 1024 * 1024 * 1024;
