use anyhow::{bail, Context, Result};
use clap::{ArgMatches, Command};
use strata_node::secrets::SecretStore;

use super::args::{read_password, secrets_file};
use crate::config::Settings;

pub fn cli() -> Command {
    Command::new("account")
        .about("Manage the account keys")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommands([
            Command::new("create").about("Generate and encrypt a new account"),
            Command::new("unlock-check").about("Check that the password unlocks the account"),
        ])
}

fn create(args: &ArgMatches, settings: &Settings) -> Result<()> {
    let path = secrets_file(args, settings)?;
    let store = SecretStore::new(&path);
    if store.exists() {
        bail!("An account already exists at {}", path.display());
    }

    let Some(password) = read_password(args, "New password: ")? else {
        bail!("No password given");
    };
    if args.get_one::<String>("password_file").is_none() {
        let confirmation = rpassword::prompt_password("Repeat password: ")
            .context("Failed to read the password")?;
        if confirmation != password {
            bail!("Passwords do not match");
        }
    }

    let address = store
        .create(&password)
        .context("Failed to create the account")?;
    println!("Created account {address}");
    println!("Secrets written to {}", path.display());
    Ok(())
}

fn unlock_check(args: &ArgMatches, settings: &Settings) -> Result<()> {
    let path = secrets_file(args, settings)?;
    let store = SecretStore::new(&path);
    let Some(password) = read_password(args, "Account password: ")? else {
        bail!("No password given");
    };
    let address = store
        .unlock(&password)
        .context("Failed to unlock the account")?;
    println!("Unlocked account {address}");
    Ok(())
}

pub fn exec(args: &ArgMatches, settings: &Settings) -> Result<()> {
    match args.subcommand() {
        Some(("create", _)) => create(args, settings),
        Some(("unlock-check", _)) => unlock_check(args, settings),
        _ => unreachable!(),
    }
}
