use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgMatches, Command};
use strata_node::Node;
use strata_renter::{serve_api, ApiState};
use tracing::info;

use super::args::open_node;
use super::hoster::{disk_quota, hoster_config};
use super::renter::{build_renter, renter_config};
use crate::config::Settings;

pub fn cli() -> Command {
    Command::new("serve")
        .about("Run the hoster and the local renter API in one process")
        .args(super::hoster::args())
        .args(super::renter::args())
}

async fn main(args: &ArgMatches, settings: &Settings, node: Arc<Node>) -> Result<()> {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("One of the threads panicked {}", info);
        std::process::abort();
    }));

    // The local API changes the limit the hoster enforces
    let quota = disk_quota(args, settings);
    let hoster = hoster_config(args, settings, quota.clone())?;
    let renter = build_renter(renter_config(args, settings)?, node.clone())?;
    let port = renter.config.api_port;

    info!("Serving {} as hoster and renter", node.address());
    tokio::try_join!(
        strata_hoster::run_hoster(hoster, node),
        serve_api(ApiState { renter, quota }, port),
    )?;
    Ok(())
}

pub fn exec(args: &ArgMatches, settings: &Settings) -> Result<()> {
    let node = open_node(args, settings, true)?;
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build the tokio runtime")?
        .block_on(main(args, settings, node))
}
