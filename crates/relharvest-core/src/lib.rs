//! relharvest core - rate-limited harvesting machinery
//!
//! Source-agnostic building blocks for pulling paginated history from a
//! quota-limited HTTP API and persisting it crash-safely: rate governor,
//! retrying client, paginator, checkpoint store and partitioned Parquet sink.

pub mod checkpoint;
pub mod client;
pub mod clock;
pub mod error;
pub mod failure_log;
pub mod fake;
pub mod http;
pub mod logging;
pub mod paginate;
pub mod progress;
pub mod rate;
pub mod retry;
pub mod shutdown;
pub mod sink;

// Re-exports for convenience
pub use checkpoint::{CheckpointStore, CompletionCounts, Counters};
pub use client::ApiClient;
pub use clock::{Clock, SimulatedClock, SystemClock};
pub use error::RequestError;
pub use failure_log::FailureLog;
pub use fake::ScriptedTransport;
pub use http::{ApiResponse, HttpConfig, HttpTransport, SHARED_RUNTIME, Transport};
pub use logging::{IndicatifLogger, init_logging};
pub use paginate::{Page, PageShape, Paginator};
pub use progress::{ProgressContext, SharedProgress};
pub use rate::{Quota, RateConfig, RateGovernor};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use shutdown::{request_shutdown, shutdown_flag};
pub use sink::{ParquetSink, PartitionedSink, cleanup_tmp_files};
