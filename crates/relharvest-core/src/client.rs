//! API client: transport + rate governor + retry policy

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::RequestError;
use crate::http::{ApiResponse, Transport};
use crate::rate::RateGovernor;
use crate::retry::{RetryPolicy, retry_with_backoff};

/// Single chokepoint for network calls.
///
/// Every attempt is admitted by the shared [`RateGovernor`], every response
/// is observed by it, and failures are retried per [`RetryPolicy`].
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    governor: Arc<RateGovernor>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("governor", &self.governor)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        governor: Arc<RateGovernor>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            governor,
            policy,
        }
    }

    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    pub fn clock(&self) -> &dyn Clock {
        self.governor.clock().as_ref()
    }

    /// GET with admission, classification and retries.
    ///
    /// Returns the successful response, or the classified error once retries
    /// are exhausted or the error is not retryable.
    pub fn get(&self, url: &str) -> Result<ApiResponse, RequestError> {
        retry_with_backoff(url, &self.policy, self.clock(), || self.get_once(url))
    }

    fn get_once(&self, url: &str) -> Result<ApiResponse, RequestError> {
        self.governor.admit();
        let response = self.transport.get(url)?;
        self.governor.process(&response)?;
        Ok(response)
    }
}
