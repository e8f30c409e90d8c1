use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use expanduser::expanduser;
use strata_core::constants::PROOF_TIMEOUT_SECS;
use strata_core::BlobHash;
use strata_node::Node;
use strata_protocol::{HttpPeerClient, PeerClient};
use strata_renter::{
    list_files, serve_api, spawn_control, ApiState, ControlEvent, ControlOutcome, ControlRequest,
    PromptRequest, Renter, RenterConfig,
};
use tracing::info;

use super::args::open_node;
use super::hoster::disk_quota;
use crate::config::Settings;
use crate::get_config_value;

pub fn args() -> Vec<Arg> {
    vec![
        Arg::new("renter.port")
            .long("renter.port")
            .value_name("port")
            .help("Port of the local renter API")
            .value_parser(value_parser!(u16))
            .action(ArgAction::Set),
        Arg::new("renter.hosters_per_file")
            .long("renter.hosters-per-file")
            .value_name("count")
            .help("Hosters each uploaded file is placed on")
            .value_parser(value_parser!(usize))
            .action(ArgAction::Set),
    ]
}

pub fn cli() -> Command {
    Command::new("renter")
        .about("Upload and download files")
        .args(args())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommands([
            Command::new("serve").about("Run the local renter API"),
            Command::new("upload").about("Upload a file").arg(
                Arg::new("path")
                    .value_name("path")
                    .help("File to upload")
                    .required(true)
                    .action(ArgAction::Set),
            ),
            Command::new("download")
                .about("Download a file")
                .args([
                    Arg::new("hash")
                        .value_name("hash")
                        .help("Hash of the file")
                        .required(true)
                        .action(ArgAction::Set),
                    Arg::new("destination")
                        .value_name("path")
                        .help("File or directory to write to")
                        .action(ArgAction::Set),
                ]),
            Command::new("files").about("List uploaded files"),
        ])
}

pub fn renter_config(args: &ArgMatches, settings: &Settings) -> Result<RenterConfig> {
    let renter = &settings.renter;
    Ok(RenterConfig {
        api_port: *get_config_value!(args, "renter.port", u16, renter.port),
        hosters_per_file: *get_config_value!(
            args,
            "renter.hosters_per_file",
            usize,
            renter.hosters_per_file
        ),
        upload_timeout: Duration::from_secs(renter.upload_timeout),
        download_dir: expanduser(&renter.download_dir)?,
        ..Default::default()
    })
}

pub fn build_renter(config: RenterConfig, node: Arc<Node>) -> Result<Arc<Renter>> {
    let client: Arc<dyn PeerClient> = Arc::new(
        HttpPeerClient::new(
            config.upload_timeout,
            Duration::from_secs(PROOF_TIMEOUT_SECS),
        )
        .context("Failed to build the peer client")?,
    );
    Ok(Arc::new(Renter::new(config, node, client)))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build the tokio runtime")
}

/// Ask on the terminal how much to deposit. Empty input takes the
/// suggestion, `n` declines.
fn ask_deposit(hash: BlobHash, balance: u128, suggested: u128) -> Option<u128> {
    loop {
        print!("Deposit for {hash} (balance {balance}) [{suggested}, n to cancel]: ");
        io::stdout().flush().ok()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).ok()? == 0 {
            return None;
        }
        match line.trim() {
            "" => return Some(suggested),
            "n" | "N" => return None,
            amount => match amount.parse() {
                Ok(amount) => return Some(amount),
                Err(_) => println!("Not a whole number: {amount}"),
            },
        }
    }
}

/// Send one request over the control channel and answer its prompts from
/// the terminal until it finishes.
async fn drive(renter: Arc<Renter>, request: ControlRequest) -> Result<ControlOutcome> {
    let (mut channel, task) = spawn_control(renter);
    channel
        .requests
        .send(request)
        .await
        .map_err(|_| anyhow!("The control channel closed"))?;

    let outcome = loop {
        match channel.events.recv().await {
            Some(ControlEvent::Progress(message)) => println!("{message}"),
            Some(ControlEvent::Prompt(
                PromptRequest::DepositAmount {
                    hash,
                    balance,
                    suggested,
                },
                handle,
            )) => {
                let answer =
                    tokio::task::spawn_blocking(move || ask_deposit(hash, balance, suggested))
                        .await
                        .context("Deposit prompt failed")?;
                handle.respond(answer);
            }
            Some(ControlEvent::Finished(result)) => break result.map_err(|e| anyhow!(e)),
            None => bail!("The control channel closed before the request finished"),
        }
    };

    drop(channel);
    task.await.context("Control task failed")?;
    outcome
}

async fn serve(renter: Arc<Renter>, args: &ArgMatches, settings: &Settings) -> Result<()> {
    let port = renter.config.api_port;
    let state = ApiState {
        renter,
        quota: disk_quota(args, settings),
    };
    serve_api(state, port).await
}

pub fn exec(args: &ArgMatches, settings: &Settings) -> Result<()> {
    let config = renter_config(args, settings)?;

    match args.subcommand() {
        Some(("serve", _)) => {
            let renter = build_renter(config, open_node(args, settings, false)?)?;
            runtime()?.block_on(serve(renter, args, settings))
        }
        Some(("upload", cmd)) => {
            let path = expanduser(cmd.get_one::<String>("path").context("Missing path")?)?;
            let renter = build_renter(config, open_node(args, settings, true)?)?;
            match runtime()?.block_on(drive(renter, ControlRequest::Upload { path }))? {
                ControlOutcome::Uploaded(blob) => {
                    println!("Uploaded {} as {}", blob.name, blob.hash);
                    Ok(())
                }
                other => bail!("Unexpected outcome {other:?}"),
            }
        }
        Some(("download", cmd)) => {
            let hash: BlobHash = cmd
                .get_one::<String>("hash")
                .context("Missing hash")?
                .parse()
                .context("Invalid hash")?;
            let destination = match cmd.get_one::<String>("destination") {
                Some(path) => expanduser(path)?,
                None => {
                    std::fs::create_dir_all(&config.download_dir).with_context(|| {
                        format!("Failed to create {}", config.download_dir.display())
                    })?;
                    config.download_dir.clone()
                }
            };
            let renter = build_renter(config, open_node(args, settings, true)?)?;
            let request = ControlRequest::Download { hash, destination };
            match runtime()?.block_on(drive(renter, request))? {
                ControlOutcome::Downloaded(path) => {
                    println!("Downloaded {hash} to {}", path.display());
                    Ok(())
                }
                other => bail!("Unexpected outcome {other:?}"),
            }
        }
        Some(("files", _)) => {
            let renter = build_renter(config, open_node(args, settings, true)?)?;
            let files = runtime()?.block_on(list_files(&renter))?;
            info!("Listed {} file(s)", files.len());
            for file in files {
                println!(
                    "{}  {:>12}  {:<9}  {}",
                    file.hash,
                    file.size,
                    file.status.as_str(),
                    file.name
                );
            }
            Ok(())
        }
        _ => unreachable!(),
    }
}
