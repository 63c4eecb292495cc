//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for relharvest
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub github: GithubConfig,
    pub http: HttpSection,
    pub rate: RateSection,
    pub harvest: HarvestSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: relharvest_github::api::DEFAULT_API_URL.to_string(),
            token: std::env::var("GITHUB_TOKEN").ok(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Seconds
    pub read_timeout: u64,
    pub max_retries: u32,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            read_timeout: 10,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RateSection {
    /// Requests kept in reserve before waiting for the reset
    pub buffer: u32,
    /// Seconds added past the advertised reset
    pub reset_margin: u64,
}

impl Default for RateSection {
    fn default() -> Self {
        Self {
            buffer: 100,
            reset_margin: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestSection {
    pub target: usize,
    pub per_page: usize,
    pub query: String,
    /// Pause between repositories
    pub delay_ms: u64,
    /// Pause between pages of one repository's releases/tags
    pub page_delay_ms: u64,
    /// Pause between search pages (the search quota is 30/min)
    pub search_delay_ms: u64,
}

impl Default for HarvestSection {
    fn default() -> Self {
        Self {
            target: 1000,
            per_page: 100,
            query: "stars:>1".to_string(),
            delay_ms: 500,
            page_delay_ms: 200,
            search_delay_ms: 1000,
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./relharvest.toml (current directory)
    /// 2. ~/.config/relharvest/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("relharvest.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "relharvest") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
