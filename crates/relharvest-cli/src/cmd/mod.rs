pub mod discover;
pub mod fetch;
pub mod status;

use std::path::PathBuf;
use std::time::Duration;

use relharvest_core::{HttpConfig, RateConfig, RetryPolicy};
use relharvest_github::HarvestArgs;

use crate::config::Config;

/// Global flags that override the config file
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpOverrides {
    pub read_timeout: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Harvest arguments from the config file, with the given overrides applied
pub fn harvest_args(config: &Config, http: HttpOverrides, output: Option<PathBuf>) -> HarvestArgs {
    HarvestArgs {
        output_dir: output.unwrap_or_else(|| config.output.dir.clone()),
        api_url: config.github.api_url.clone(),
        token: config.github.token.clone(),
        target: config.harvest.target,
        per_page: config.harvest.per_page,
        query: config.harvest.query.clone(),
        entity_delay: Duration::from_millis(config.harvest.delay_ms),
        page_delay: Duration::from_millis(config.harvest.page_delay_ms),
        search_delay: Duration::from_millis(config.harvest.search_delay_ms),
        limit: None,
        http: HttpConfig {
            read_timeout: Duration::from_secs(
                http.read_timeout.unwrap_or(config.http.read_timeout),
            ),
        },
        retry: RetryPolicy {
            max_retries: http.max_retries.unwrap_or(config.http.max_retries),
            ..Default::default()
        },
        rate: RateConfig {
            buffer: config.rate.buffer,
            reset_margin: Duration::from_secs(config.rate.reset_margin),
            ..Default::default()
        },
    }
}
