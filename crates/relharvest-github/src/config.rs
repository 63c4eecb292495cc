//! Harvest configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use relharvest_core::{
    ApiClient, Clock, HttpConfig, HttpTransport, RateConfig, RateGovernor, RetryPolicy,
    SystemClock,
};

use url::Url;

use crate::api::{self, GithubApi, MAX_PER_PAGE};

/// CLI-facing arguments for the harvest (plain struct, no clap derive).
#[derive(Debug, Clone)]
pub struct HarvestArgs {
    pub output_dir: PathBuf,
    pub api_url: String,
    pub token: Option<String>,
    pub target: usize,
    pub per_page: usize,
    pub query: String,
    pub entity_delay: Duration,
    pub page_delay: Duration,
    pub search_delay: Duration,
    pub limit: Option<usize>,
    pub http: HttpConfig,
    pub retry: RetryPolicy,
    pub rate: RateConfig,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub output_dir: PathBuf,
    pub api_url: Url,
    pub token: Option<String>,
    /// Population size
    pub target: usize,
    pub per_page: usize,
    pub query: String,
    /// Pause between repositories
    pub entity_delay: Duration,
    /// Pause between pages of releases/tags
    pub page_delay: Duration,
    /// Pause between search pages
    pub search_delay: Duration,
    /// Cap on pending repositories processed in one run
    pub limit: Option<usize>,
    pub http: HttpConfig,
    pub retry: RetryPolicy,
    pub rate: RateConfig,
}

impl TryFrom<HarvestArgs> for Config {
    type Error = anyhow::Error;

    fn try_from(args: HarvestArgs) -> Result<Self, Self::Error> {
        anyhow::ensure!(args.target > 0, "target must be at least 1");
        anyhow::ensure!(
            (1..=MAX_PER_PAGE).contains(&args.per_page),
            "per_page must be between 1 and {MAX_PER_PAGE}, got {}",
            args.per_page
        );
        anyhow::ensure!(!args.query.trim().is_empty(), "search query is empty");
        let api_url = Url::parse(&args.api_url)
            .with_context(|| format!("api_url is not a valid URL: {}", args.api_url))?;
        anyhow::ensure!(
            matches!(api_url.scheme(), "http" | "https") && !api_url.cannot_be_a_base(),
            "api_url must be an http(s) URL: {api_url}"
        );
        if args.limit == Some(0) {
            anyhow::bail!("limit must be at least 1");
        }
        let token = args.token.filter(|t| !t.trim().is_empty());
        if token.is_none() {
            log::warn!("No GitHub token configured; unauthenticated quota is 60 requests/hour");
        }

        Ok(Self {
            output_dir: args.output_dir,
            api_url,
            token,
            target: args.target,
            per_page: args.per_page,
            query: args.query,
            entity_delay: args.entity_delay,
            page_delay: args.page_delay,
            search_delay: args.search_delay,
            limit: args.limit,
            http: args.http,
            retry: args.retry,
            rate: args.rate,
        })
    }
}

impl Config {
    /// Live API over HTTPS with the wall clock
    pub fn build_api(&self) -> anyhow::Result<GithubApi> {
        let headers = api::default_headers(self.token.as_deref());
        let transport = HttpTransport::new(&self.http, &headers)
            .context("Failed to build HTTP client")?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Ok(self.build_api_with(Arc::new(transport), clock))
    }

    /// API over any transport and clock (tests, dry runs)
    pub fn build_api_with(
        &self,
        transport: Arc<dyn relharvest_core::Transport>,
        clock: Arc<dyn Clock>,
    ) -> GithubApi {
        let governor = Arc::new(RateGovernor::new(self.rate, clock));
        GithubApi::new(
            ApiClient::new(transport, governor, self.retry),
            self.api_url.clone(),
            self.per_page,
        )
        .with_page_delays(self.page_delay, self.search_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> HarvestArgs {
        HarvestArgs {
            output_dir: PathBuf::from("data"),
            api_url: api::DEFAULT_API_URL.into(),
            token: Some("t0ken".into()),
            target: 1000,
            per_page: 100,
            query: "stars:>1".into(),
            entity_delay: Duration::from_millis(500),
            page_delay: Duration::from_millis(200),
            search_delay: Duration::from_secs(1),
            limit: None,
            http: HttpConfig::default(),
            retry: RetryPolicy::default(),
            rate: RateConfig::default(),
        }
    }

    #[test]
    fn valid_args() {
        let config = Config::try_from(args()).unwrap();
        assert_eq!(config.target, 1000);
        assert_eq!(config.token.as_deref(), Some("t0ken"));
    }

    #[test]
    fn blank_token_is_none() {
        let config = Config::try_from(HarvestArgs {
            token: Some("  ".into()),
            ..args()
        })
        .unwrap();
        assert!(config.token.is_none());
    }

    #[test]
    fn rejects_bad_values() {
        for bad in [
            HarvestArgs { per_page: 0, ..args() },
            HarvestArgs { per_page: 101, ..args() },
            HarvestArgs { target: 0, ..args() },
            HarvestArgs { query: " ".into(), ..args() },
            HarvestArgs { api_url: "ftp://x".into(), ..args() },
            HarvestArgs { api_url: "not a url".into(), ..args() },
            HarvestArgs { api_url: "mailto:ops@example.com".into(), ..args() },
            HarvestArgs { limit: Some(0), ..args() },
        ] {
            assert!(Config::try_from(bad).is_err());
        }
    }
}
