//! Settings for Strata, defined in the settings.toml file.

use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Hoster {
    pub port: u16,
    /// `host:port` announced to the ledger. Empty to discover the public IP.
    #[serde(default)]
    pub public_endpoint: String,
    pub store_dir: String,
    /// GiB offered for hosting.
    pub disk_space_for_hosting: f64,

    pub replication_factor: usize,
    pub offline_strike_limit: u32,
    pub no_deposit_strike_limit: u32,
    pub monitoring_window_minutes: u32,
    pub schedule_rebuild_hours: u64,
    pub payment_sweep_hours: u64,

    /// Seconds
    pub proof_timeout: u64,
    /// Seconds
    pub upload_timeout: u64,
}

#[derive(Debug, Deserialize)]
pub struct Renter {
    pub port: u16,
    pub hosters_per_file: usize,
    /// Seconds
    pub upload_timeout: u64,
    pub download_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub log_level: String,

    pub mock: bool,
    /// Ledger identity of this node. Empty to use the account address.
    #[serde(default)]
    pub address: String,

    pub db_file: String,
    pub secrets_file: String,
    pub ledger_url: String,

    #[serde(default)]
    pub otel_api_key: String,
    #[serde(default)]
    pub otel_endpoint: String,
    #[serde(default)]
    pub otel_service_name: String,

    pub hoster: Hoster,
    pub renter: Renter,
}

impl Settings {
    /// Load settings and create a new `Settings` instance.
    pub(crate) fn new(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let file = config_file.unwrap_or("settings.toml");

        Config::builder()
            .add_source(File::with_name(file))
            .build()?
            .try_deserialize()
    }
}

/// Macro to get a value from CLI args if present, otherwise use the settings value.
///
/// # Example
///
/// ```ignore
/// get_config_value!(args, "store_dir", String, settings.hoster.store_dir);
/// ```
#[macro_export]
macro_rules! get_config_value {
    ($args:expr, $arg_name:expr, $arg_type:ty, $settings:expr) => {
        match $args.try_get_one::<$arg_type>($arg_name) {
            Ok(Some(value)) => value,
            Ok(None) => &$settings,
            Err(err) => {
                tracing::warn!("Failed to load CLI config, loading default settings. Error: {err}");
                &$settings
            }
        }
    };
}
