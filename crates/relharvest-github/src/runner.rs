//! Harvest orchestration: discover once, then resolve repositories one at a time

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Context;
use relharvest_core::progress::truncate_label;
use relharvest_core::{
    CheckpointStore, CompletionCounts, FailureLog, SharedProgress, cleanup_tmp_files,
};

use crate::api::GithubApi;
use crate::config::Config;
use crate::discovery::{self, Discovery};
use crate::resolver::{self, Outcome};
use crate::stats::{RunSummary, StatusReport};
use crate::store::{self, Layout, ReleaseStore};

/// Discover the population and persist the snapshot
pub fn run_discovery(
    config: &Config,
    api: &GithubApi,
    progress: &SharedProgress,
) -> anyhow::Result<Discovery> {
    let layout = Layout::new(&config.output_dir);
    std::fs::create_dir_all(layout.root()).context("Cannot create output directory")?;

    let line = progress.stage_line("discover");
    line.set_message(format!("top {} by `{}`", config.target, config.query));
    let found = discovery::discover(api, &config.query, config.target)
        .context("Population discovery failed")?;
    line.finish_and_clear();

    anyhow::ensure!(
        !found.repositories.is_empty(),
        "Search `{}` returned no repositories",
        config.query
    );
    if found.repositories.len() < config.target {
        log::warn!(
            "Population smaller than target: {} of {}",
            found.repositories.len(),
            config.target
        );
    }
    store::write_repositories(&layout.repositories(), &found.repositories)
        .context("Failed to write repositories snapshot")?;
    Ok(found)
}

/// Full harvest. Returns the summary; a fatal API error (bad credentials)
/// aborts with an error whose chain holds the `RequestError`.
pub fn run(
    config: &Config,
    api: &GithubApi,
    progress: &SharedProgress,
    stop: &AtomicBool,
) -> anyhow::Result<RunSummary> {
    let started = Instant::now();
    let layout = Layout::new(&config.output_dir);
    std::fs::create_dir_all(layout.root()).context("Cannot create output directory")?;

    log::info!(
        "relharvest starting: target={}, query=`{}`, output={}",
        config.target,
        config.query,
        layout.root().display()
    );

    let removed = cleanup_tmp_files(layout.root()).context("Failed to clean stale tmp files")?;
    if removed > 0 {
        log::info!("Removed {removed} stale tmp files");
    }

    let mut checkpoint = CheckpointStore::load(layout.checkpoint())
        .context("Failed to load checkpoint")?;
    if checkpoint.completed_len() > 0 {
        log::info!("Resuming: {} repositories already completed", checkpoint.completed_len());
    }

    let population = run_discovery(config, api, progress)?.repositories;
    let release_store = ReleaseStore::open(&layout).context("Cannot open release store")?;
    let mut failure_log =
        FailureLog::open(layout.failures()).context("Cannot open failure log")?;

    let mut summary = RunSummary {
        total: population.len(),
        ..Default::default()
    };
    let pending: Vec<_> = population
        .iter()
        .filter(|r| !checkpoint.is_completed(&r.key.full_name()))
        .collect();
    summary.skipped = population.len() - pending.len();
    let batch_len = config.limit.map_or(pending.len(), |l| l.min(pending.len()));
    log::info!(
        "{} pending, {} already completed, processing {batch_len}",
        pending.len(),
        summary.skipped
    );

    let clock = api.client().clock();
    let bar = progress.entity_bar(batch_len);
    for (i, repo) in pending.iter().take(batch_len).enumerate() {
        if stop.load(Ordering::Relaxed) {
            log::warn!("Shutdown requested, stopping before {}", repo.key);
            summary.interrupted = true;
            break;
        }
        if i > 0 && !config.entity_delay.is_zero() {
            clock.sleep(config.entity_delay);
        }

        let key = repo.key.full_name();
        bar.set_prefix(truncate_label(&key, 32));

        let res = resolver::resolve(api, &repo.key)
            .with_context(|| format!("Aborting harvest at {key}"))?;

        match &res.outcome {
            Outcome::Failed(failure) => {
                log::warn!("{key}: failed: {}", failure.message);
                // A pending repository must not keep records from an earlier attempt
                if release_store
                    .remove(&repo.key)
                    .with_context(|| format!("Failed to remove stale records for {key}"))?
                {
                    log::warn!("{key}: removed partition left by an earlier attempt");
                }
                checkpoint
                    .mark_failed(&key, &failure.message)
                    .context("Failed to write checkpoint")?;
                failure_log
                    .append(&key, &failure.reason())
                    .context("Failed to write failure log")?;
            }
            outcome => {
                // Records are durable before the repository counts as completed
                release_store
                    .commit(&repo.key, &res.records)
                    .with_context(|| format!("Failed to commit records for {key}"))?;
                checkpoint
                    .mark_completed(
                        &key,
                        CompletionCounts {
                            records: res.records.len() as u64,
                        },
                    )
                    .context("Failed to write checkpoint")?;
                if let Outcome::None(reason) = outcome {
                    failure_log
                        .append(&key, reason.code())
                        .context("Failed to write failure log")?;
                }
                if !progress.is_tty() {
                    log::info!(
                        "[{}/{batch_len}] {key}: {outcome}, {} records",
                        i + 1,
                        res.records.len()
                    );
                }
            }
        }
        summary.record(&res);
        bar.set_message(res.outcome.to_string());
        bar.inc(1);
    }
    bar.finish_and_clear();

    let (requests, waits) = api.client().governor().stats();
    summary.requests = requests;
    summary.rate_waits = waits;
    summary.remaining = pending.len() - summary.processed;
    summary.elapsed = started.elapsed();
    Ok(summary)
}

/// Offline view of the output directory
pub fn status(config: &Config) -> anyhow::Result<StatusReport> {
    let layout = Layout::new(&config.output_dir);
    let checkpoint = CheckpointStore::load(layout.checkpoint())
        .context("Failed to load checkpoint")?;
    let partitions = if layout.releases_dir().exists() {
        ReleaseStore::open(&layout)?.committed()?.len()
    } else {
        0
    };
    Ok(StatusReport {
        output_dir: layout.root().to_path_buf(),
        counters: checkpoint.counters(),
        completed: checkpoint.completed_len(),
        pending_failures: checkpoint
            .failures()
            .map(|(k, r)| (k.to_string(), r.to_string()))
            .collect(),
        partitions,
        has_snapshot: layout.repositories().exists(),
        last_updated: checkpoint.last_updated(),
    })
}
