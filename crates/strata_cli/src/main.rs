use anyhow::Result;
use clap::Command;
use constants::{ABOUT, BIN_NAME, NAME, VERSION};
use expanduser::expanduser;
use tracing::info;

mod cli;
mod config;
mod constants;
mod log;

pub fn main() -> Result<()> {
    let about_text = format!("{} {}\n{}", NAME, VERSION, ABOUT);
    let usage_text = format!("{} <command> [options]", BIN_NAME);
    let after_help_text = format!(
        "See '{} help <command>' for more information on a command",
        BIN_NAME
    );

    let strata = Command::new("strata")
        .bin_name(BIN_NAME)
        .name(NAME)
        .version(VERSION)
        .about(about_text)
        .override_usage(usage_text)
        .after_help(after_help_text)
        .args(cli::args::common_args())
        .arg_required_else_help(true)
        .subcommands(cli::builtin())
        .subcommand_required(true);

    let matches = strata.get_matches();

    let config_file_raw = match matches.try_get_one::<String>("config") {
        Ok(config_path) => config_path.map(|s| s.as_str()),
        Err(error) => fatal!("Error while parsing config file flag: {error}"),
    };

    let expanded_path = match expanduser(config_file_raw.unwrap_or("settings.toml")) {
        Ok(path) => path,
        Err(error) => fatal!("Error while expanding config file path: {error}"),
    };
    let Some(config_file) = expanded_path.to_str() else {
        fatal!(
            "Config path is not valid UTF-8: {}",
            expanded_path.display()
        );
    };

    // CLI values take precedence over settings.toml
    let settings = match config::Settings::new(Some(config_file)) {
        Ok(s) => s,
        Err(error) => fatal!("Failed to parse settings file: {error:?}"),
    };

    let log_level = get_config_value!(matches, "log_level", String, settings.log_level);
    let otel_api_key = get_config_value!(matches, "otel_api_key", String, settings.otel_api_key);
    let otel_endpoint =
        get_config_value!(matches, "otel_endpoint", String, settings.otel_endpoint);
    let otel_service_name = get_config_value!(
        matches,
        "otel_service_name",
        String,
        settings.otel_service_name
    );

    let otel_layer = log::otel_layer(otel_api_key, otel_endpoint, otel_service_name);
    let _guards = log::new(log_level.as_str(), otel_layer);
    info!("Initialised logger with log level {log_level}");
    if otel_api_key.trim().is_empty() {
        info!("No OTEL API key provided; skipping telemetry");
    }

    match matches.subcommand() {
        Some(("hoster", cmd)) => cli::hoster::exec(cmd, &settings)?,
        Some(("renter", cmd)) => cli::renter::exec(cmd, &settings)?,
        Some(("serve", cmd)) => cli::serve::exec(cmd, &settings)?,
        Some(("account", cmd)) => cli::account::exec(cmd, &settings)?,
        _ => unreachable!(),
    }

    Ok(())
}
