//! relharvest GitHub - release history of the most-starred repositories
//!
//! Discovers the top repositories by stars, then walks each one through a
//! fallback chain (releases, then tags dated by commit lookup) and commits
//! the records to one Parquet partition per repository.

pub mod api;
pub mod config;
pub mod discovery;
pub mod resolver;
pub mod runner;
pub mod schema;
pub mod state;
pub mod stats;
pub mod store;

// Re-exports
pub use api::GithubApi;
pub use config::{Config, HarvestArgs};
pub use resolver::{Failure, NoneReason, Outcome, Resolution, resolve};
pub use runner::{run, run_discovery, status};
pub use state::{HistoryRecord, Provenance, RepoKey, Repository};
pub use stats::{RunSummary, StatusReport};
