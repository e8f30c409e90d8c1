/// Largest body accepted by `PUT /files/{hash}`.
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024 * 1024; // 10 GiB

/// Candidates tried before a repair upload gives up.
pub const REPAIR_ATTEMPTS: usize = 3;
