//! Status subcommand - checkpoint and output summary, no network

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use super::{HttpOverrides, harvest_args};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output directory to inspect
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// List repositories whose last attempt failed
    #[arg(long)]
    pub failures: bool,
}

pub fn run(args: StatusArgs, config: &Config) -> Result<ExitCode> {
    let harvest = harvest_args(config, HttpOverrides::default(), args.output);
    let config = relharvest_github::Config::try_from(harvest)?;
    let report = relharvest_github::status(&config)?;

    eprintln!("{}", report.format_table());
    if args.failures {
        for (key, reason) in &report.pending_failures {
            println!("{key}\t{reason}");
        }
    }
    Ok(ExitCode::SUCCESS)
}
