pub const NAME: &str = "Strata";
pub const BIN_NAME: &str = "strata";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Peer-operated replicated file storage";

/// Environment variable read for the account password when no password
/// file is given.
pub const PASSWORD_ENV: &str = "STRATA_PASSWORD";
