//! Request error taxonomy shared by every network-calling path

use std::time::Duration;

/// Failure of a single logical API request.
///
/// The variants map onto the retry policy: transient errors are retried with
/// backoff, rate-limit errors are retried after the governor's wait, not-found
/// is terminal for one item, and forbidden ends the whole run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// No response within the per-call timeout
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Connection refused/reset, TLS failure, truncated body
    #[error("network error: {0}")]
    Network(String),
    /// 5xx from the server
    #[error("HTTP {status}: {message}")]
    Server { status: u16, message: String },
    /// Secondary rate limit with a directed wait
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),
    /// Primary quota drained before the window reset
    #[error("rate limit quota exhausted")]
    QuotaExhausted,
    /// Entity renamed/deleted, or item vanished between list and lookup
    #[error("not found")]
    NotFound,
    /// Credential rejected or access denied for reasons other than quota
    #[error("access denied (HTTP {status}): {message}")]
    Forbidden { status: u16, message: String },
    /// Any other 4xx
    #[error("HTTP {status}: {message}")]
    Client { status: u16, message: String },
}

impl RequestError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::Network(_)
                | Self::Server { .. }
                | Self::RateLimited(_)
                | Self::QuotaExhausted
        )
    }

    /// Fatal to the whole run: every later call would fail the same way
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Delay the retry loop should use instead of exponential backoff.
    ///
    /// Rate-limit waits are performed by the governor inside `admit()`, so the
    /// retry loop itself does not sleep for them.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(_) | Self::QuotaExhausted => Some(Duration::ZERO),
            _ => None,
        }
    }

    /// Short machine-friendly code for logs and the failure file
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
            Self::Server { .. } => "server_error",
            Self::RateLimited(_) => "rate_limited",
            Self::QuotaExhausted => "quota_exhausted",
            Self::NotFound => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::Client { .. } => "client_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(status: u16) -> RequestError {
        RequestError::Server {
            status,
            message: "test".to_string(),
        }
    }

    #[test]
    fn transient_errors_retryable() {
        assert!(RequestError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(RequestError::Network("reset".into()).is_retryable());
        assert!(server(502).is_retryable());
        assert!(RequestError::RateLimited(Duration::from_secs(60)).is_retryable());
        assert!(RequestError::QuotaExhausted.is_retryable());
    }

    #[test]
    fn terminal_errors_not_retryable() {
        assert!(!RequestError::NotFound.is_retryable());
        let forbidden = RequestError::Forbidden {
            status: 401,
            message: "Bad credentials".into(),
        };
        assert!(!forbidden.is_retryable());
        assert!(forbidden.is_fatal());
        let client = RequestError::Client {
            status: 422,
            message: "Validation Failed".into(),
        };
        assert!(!client.is_retryable());
        assert!(!client.is_fatal());
    }

    #[test]
    fn rate_limits_skip_backoff() {
        assert_eq!(
            RequestError::RateLimited(Duration::from_secs(30)).retry_delay(),
            Some(Duration::ZERO)
        );
        assert_eq!(server(500).retry_delay(), None);
    }

    #[test]
    fn display_includes_status() {
        assert_eq!(format!("{}", server(503)), "HTTP 503: test");
        assert_eq!(format!("{}", RequestError::NotFound), "not found");
    }
}
