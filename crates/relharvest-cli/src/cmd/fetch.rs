//! Fetch subcommand - full harvest with resume

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use relharvest_core::{SharedProgress, shutdown_flag};

use super::{HttpOverrides, harvest_args};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of top repositories to harvest
    #[arg(short, long)]
    pub target: Option<usize>,

    /// Search query selecting the population
    #[arg(short, long)]
    pub query: Option<String>,

    /// Maximum number of pending repositories to process this run
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Milliseconds to pause between repositories
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Items per page (1-100)
    #[arg(long)]
    pub per_page: Option<usize>,
}

pub fn run(
    args: FetchArgs,
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
    if let Some(per_page) = args.per_page {
        harvest.per_page = per_page;
    }
    if let Some(ms) = args.delay_ms {
        harvest.entity_delay = std::time::Duration::from_millis(ms);
    }
    harvest.limit = args.limit;

    let config = relharvest_github::Config::try_from(harvest)?;
    let api = config.build_api()?;
    let summary = relharvest_github::run(&config, &api, progress, shutdown_flag())?;

    if progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }

    if summary.interrupted {
        log::warn!("Interrupted; {} repositories left for the next run", summary.remaining);
        return Ok(ExitCode::from(130));
    }
    if summary.failed > 0 {
        log::error!(
            "{} repositories failed; see {}",
            summary.failed,
            config.output_dir.join(relharvest_github::store::FAILURES_FILE).display()
        );
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}
