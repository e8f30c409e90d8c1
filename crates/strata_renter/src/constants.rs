/// Deposit units charged per byte and hour of hosting on one hoster.
pub const DEPOSIT_PER_BYTE_HOUR: u128 = 1;

/// Hosting period the suggested deposit covers, in hours.
pub const SUGGESTED_DEPOSIT_HOURS: u128 = 14 * 24;

/// Capacity of the control channels.
pub const CONTROL_CHANNEL_SIZE: usize = 32;
