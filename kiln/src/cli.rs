// kiln/src/cli.rs
//! Defines the command-line argument structure using clap.
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use kiln_common::error::Result;
use kiln_common::Config;

pub mod fetch;
pub mod info;
pub mod install;
pub mod test;
pub mod uninstall;

use crate::cli::fetch::Fetch;
use crate::cli::info::Info;
use crate::cli::install::InstallArgs;
use crate::cli::test::Test;
use crate::cli::uninstall::Uninstall;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "kiln", bin_name = "kiln")]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Increase log verbosity (-v debug, -vv trace) and write a log file
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a formula from source, install it and smoke-test it
    Install(InstallArgs),
    /// Smoke-test an installed formula
    Test(Test),
    /// Download and verify the source archive only
    Fetch(Fetch),
    /// Show a validated formula descriptor
    Info(Info),
    /// Remove the files an install wrote
    Uninstall(Uninstall),
}

impl Command {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Install(command) => command.run(config).await,
            Self::Test(command) => command.run(config).await,
            Self::Fetch(command) => command.run(config).await,
            Self::Info(command) => command.run(config).await,
            Self::Uninstall(command) => command.run(config).await,
        }
    }
}

/// `==> message` progress header on stdout.
pub(crate) fn ohai(message: &str) {
    println!("{}{}", "==> ".bold().blue(), message.bold());
}
