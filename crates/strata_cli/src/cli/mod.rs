use clap::Command;

pub mod account;
pub mod args;
pub mod hoster;
pub mod renter;
pub mod serve;

pub fn builtin() -> Vec<Command> {
    vec![hoster::cli(), renter::cli(), serve::cli(), account::cli()]
}
