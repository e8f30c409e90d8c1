use std::time::Duration;

use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use expanduser::expanduser;
use strata_core::Endpoint;
use strata_hoster::HosterConfig;
use strata_node::DiskQuota;

use super::args::open_node;
use crate::config::Settings;
use crate::get_config_value;

pub fn args() -> Vec<Arg> {
    vec![
        Arg::new("hoster.port")
            .long("hoster.port")
            .value_name("port")
            .help("Port of the hoster HTTP server")
            .value_parser(value_parser!(u16))
            .action(ArgAction::Set),
        Arg::new("hoster.public_endpoint")
            .long("hoster.public-endpoint")
            .value_name("host:port")
            .help("Endpoint announced to the ledger instead of the discovered IP")
            .action(ArgAction::Set),
        Arg::new("hoster.store_dir")
            .long("hoster.store-dir")
            .value_name("directory")
            .help("Directory held blobs are stored in")
            .action(ArgAction::Set),
        Arg::new("hoster.disk_space")
            .long("hoster.disk-space")
            .value_name("GiB")
            .help("Disk space offered for hosting")
            .value_parser(value_parser!(f64))
            .action(ArgAction::Set),
    ]
}

pub fn cli() -> Command {
    Command::new("hoster")
        .about("Run a Strata hoster")
        .args(args())
}

/// Hoster configuration with CLI overrides, sharing `quota` with its caller.
pub fn hoster_config(args: &ArgMatches, settings: &Settings, quota: DiskQuota) -> Result<HosterConfig> {
    let hoster = &settings.hoster;
    let public_endpoint = get_config_value!(
        args,
        "hoster.public_endpoint",
        String,
        hoster.public_endpoint
    );

    Ok(HosterConfig {
        api_port: *get_config_value!(args, "hoster.port", u16, hoster.port),
        public_endpoint: (!public_endpoint.trim().is_empty())
            .then(|| Endpoint::new(public_endpoint.trim())),
        store_dir: expanduser(get_config_value!(
            args,
            "hoster.store_dir",
            String,
            hoster.store_dir
        ))?,
        quota,
        replication_factor: hoster.replication_factor,
        offline_strike_limit: hoster.offline_strike_limit,
        no_deposit_strike_limit: hoster.no_deposit_strike_limit,
        monitoring_window_minutes: hoster.monitoring_window_minutes,
        schedule_rebuild_hours: hoster.schedule_rebuild_hours,
        payment_sweep_hours: hoster.payment_sweep_hours,
        proof_timeout: Duration::from_secs(hoster.proof_timeout),
        upload_timeout: Duration::from_secs(hoster.upload_timeout),
    })
}

pub fn disk_quota(args: &ArgMatches, settings: &Settings) -> DiskQuota {
    DiskQuota::from_gib(*get_config_value!(
        args,
        "hoster.disk_space",
        f64,
        settings.hoster.disk_space_for_hosting
    ))
}

pub fn exec(args: &ArgMatches, settings: &Settings) -> Result<()> {
    let config = hoster_config(args, settings, disk_quota(args, settings))?;
    let node = open_node(args, settings, true)?;
    strata_hoster::run(config, node)
}
