//! Discover subcommand - population snapshot only

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use relharvest_core::SharedProgress;

use super::{HttpOverrides, harvest_args};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of top repositories
    #[arg(short, long)]
    pub target: Option<usize>,

    /// Search query selecting the population
    #[arg(short, long)]
    pub query: Option<String>,
}

pub fn run(
    args: DiscoverArgs,
    config: &Config,
    http: HttpOverrides,
    progress: &SharedProgress,
) -> Result<ExitCode> {
    let mut harvest = harvest_args(config, http, args.output);
    if let Some(target) = args.target {
        harvest.target = target;
    }
    if let Some(query) = args.query {
        harvest.query = query;
    }

    let config = relharvest_github::Config::try_from(harvest)?;
    let api = config.build_api()?;
    let found = relharvest_github::run_discovery(&config, &api, progress)?;

    log::info!(
        "Wrote {} repositories to {}",
        found.repositories.len(),
        config
            .output_dir
            .join(relharvest_github::store::REPOSITORIES_FILE)
            .display()
    );
    if found.partial {
        log::warn!("Population is partial; a search page failed");
    }
    Ok(ExitCode::SUCCESS)
}
