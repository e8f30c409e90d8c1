use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches};
use expanduser::expanduser;
use strata_core::Address;
use strata_node::secrets::SecretStore;
use strata_node::{Node, NodeConfig};
use tracing::{info, warn};

use crate::config::Settings;
use crate::constants::PASSWORD_ENV;
use crate::get_config_value;

pub fn common_args() -> Vec<Arg> {
    vec![
        Arg::new("config")
            .long("config")
            .value_name("file")
            .help("Path to the settings file")
            .global(true)
            .action(ArgAction::Set),
        Arg::new("log_level")
            .long("log-level")
            .value_name("level")
            .help("Set the log level (TRACE, DEBUG, INFO, WARN, ERROR)")
            .global(true)
            .action(ArgAction::Set),
        Arg::new("otel_api_key")
            .long("otel-api-key")
            .value_name("key")
            .help("API key for the OTEL log endpoint")
            .global(true)
            .action(ArgAction::Set),
        Arg::new("otel_endpoint")
            .long("otel-endpoint")
            .value_name("url")
            .help("OTEL collector endpoint")
            .global(true)
            .action(ArgAction::Set),
        Arg::new("otel_service_name")
            .long("otel-service-name")
            .value_name("name")
            .help("Service name reported to the OTEL collector")
            .global(true)
            .action(ArgAction::Set),
        Arg::new("mock")
            .long("mock")
            .help("Run against an in-process ledger")
            .global(true)
            .action(ArgAction::SetTrue),
        Arg::new("address")
            .long("address")
            .value_name("address")
            .help("Ledger identity of this node")
            .global(true)
            .action(ArgAction::Set),
        Arg::new("db_file")
            .long("db-file")
            .value_name("path")
            .help("Path to the node database")
            .global(true)
            .action(ArgAction::Set),
        Arg::new("secrets_file")
            .long("secrets-file")
            .value_name("path")
            .help("Path to the encrypted account secrets")
            .global(true)
            .action(ArgAction::Set),
        Arg::new("ledger_url")
            .long("ledger-url")
            .value_name("url")
            .help("Ledger gateway URL")
            .global(true)
            .action(ArgAction::Set),
        Arg::new("password_file")
            .long("password-file")
            .value_name("path")
            .help("File holding the account password")
            .global(true)
            .action(ArgAction::Set),
    ]
}

pub fn secrets_file(args: &ArgMatches, settings: &Settings) -> Result<PathBuf> {
    Ok(expanduser(get_config_value!(
        args,
        "secrets_file",
        String,
        settings.secrets_file
    ))?)
}

/// The account password, read from `--password-file`, the environment or
/// the terminal, in that order.
pub fn read_password(args: &ArgMatches, prompt: &str) -> Result<Option<String>> {
    if let Some(path) = args.get_one::<String>("password_file") {
        let path = expanduser(path)?;
        let password = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?
            .trim()
            .to_string();
        if password.is_empty() {
            bail!("Password file {} is empty", path.display());
        }
        return Ok(Some(password));
    }
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        warn!("Reading the account password from {PASSWORD_ENV}");
        return Ok(Some(password));
    }
    if prompt.is_empty() {
        return Ok(None);
    }
    let password = rpassword::prompt_password(prompt).context("Failed to read the password")?;
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(Some(password))
}

/// Open the node. With `require_unlock` the account is unlocked from the
/// terminal if needed, otherwise only when a password is supplied up front.
pub fn open_node(args: &ArgMatches, settings: &Settings, require_unlock: bool) -> Result<Arc<Node>> {
    let secrets_file = secrets_file(args, settings)?;
    let store = SecretStore::new(&secrets_file);
    if !store.exists() {
        bail!(
            "No account at {}, create one with `account create`",
            secrets_file.display()
        );
    }

    let prompt = if require_unlock { "Account password: " } else { "" };
    let account = match read_password(args, prompt)? {
        Some(password) => Some(
            store
                .unlock(&password)
                .context("Failed to unlock the account")?,
        ),
        None => None,
    };

    let configured = get_config_value!(args, "address", String, settings.address);
    let address = match (configured.trim(), &account) {
        ("", Some(account)) => account.clone(),
        ("", None) => bail!("The account is locked and no node address is configured"),
        (configured, _) => Address::new(configured),
    };

    let mock = args.get_flag("mock") || settings.mock;
    let config = NodeConfig {
        address,
        db_file: expanduser(get_config_value!(args, "db_file", String, settings.db_file))?,
        secrets_file,
        ledger_url: get_config_value!(args, "ledger_url", String, settings.ledger_url).clone(),
        mock,
    };
    if let Some(parent) = config.db_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut node = Node::from_config(config).context("Failed to open the node")?;
    node.secrets = Arc::new(store);
    info!(
        "Opened node {} ({})",
        node.address(),
        if node.secrets.is_locked() { "locked" } else { "unlocked" }
    );
    Ok(Arc::new(node))
}
