//! Rate governor: one shared view of the remaining request quota.
//!
//! Every request passes through [`RateGovernor::admit`] before it is sent and
//! every response (including errors) is fed back through
//! [`RateGovernor::observe`]. Header values always override the local
//! prediction.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::{self, Clock};
use crate::error::RequestError;
use crate::http::ApiResponse;

/// Default hold when a secondary rate limit arrives without `Retry-After`
const DEFAULT_SECONDARY_HOLD: Duration = Duration::from_secs(60);

/// Longest message body kept in error values
const MAX_ERROR_MESSAGE: usize = 200;

/// Quota signals carried by one response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quota {
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl Quota {
    /// Read `X-RateLimit-Remaining` / `X-RateLimit-Reset` (epoch seconds)
    pub fn from_response(response: &ApiResponse) -> Self {
        let remaining = response
            .header("x-ratelimit-remaining")
            .and_then(|v| v.trim().parse().ok());
        let reset_at = response
            .header("x-ratelimit-reset")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        Self {
            remaining,
            reset_at,
        }
    }
}

/// Governor tuning
#[derive(Debug, Clone, Copy)]
pub struct RateConfig {
    /// Requests kept in reserve; below this `admit()` waits for the reset
    pub buffer: u32,
    /// Extra wait past the advertised reset time
    pub reset_margin: Duration,
    /// Quota bucket tracked (`X-RateLimit-Resource`); responses naming another
    /// bucket do not update the shared view. `None` tracks every response.
    pub resource: Option<&'static str>,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            buffer: 100,
            reset_margin: Duration::from_secs(1),
            resource: Some("core"),
        }
    }
}

#[derive(Debug, Default)]
struct GovernorState {
    remaining: Option<u32>,
    reset_at: Option<DateTime<Utc>>,
    /// Set by a secondary rate limit; no request may start before it
    hold_until: Option<DateTime<Utc>>,
    admitted: u64,
    waits: u64,
}

/// Shared, process-lifetime quota tracker.
///
/// The whole check-and-wait in `admit()` runs under one lock so concurrent
/// callers serialise their read-modify-write of `remaining`/`reset_at`.
pub struct RateGovernor {
    state: Mutex<GovernorState>,
    config: RateConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGovernor")
            .field("config", &self.config)
            .field("quota", &self.quota())
            .finish_non_exhaustive()
    }
}

impl RateGovernor {
    pub fn new(config: RateConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(GovernorState::default()),
            config,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Block until one request may be sent, then count it against the quota.
    pub fn admit(&self) {
        let mut state = self.lock();

        if let Some(until) = state.hold_until.take() {
            let wait = clock::until(self.clock.now(), until);
            if !wait.is_zero() {
                log::info!("Secondary rate limit, holding for {}s", wait.as_secs());
                state.waits += 1;
                self.clock.sleep(wait);
            }
        }

        if let (Some(remaining), Some(reset_at)) = (state.remaining, state.reset_at) {
            if remaining < self.config.buffer {
                let resume = reset_at
                    + chrono::Duration::from_std(self.config.reset_margin)
                        .unwrap_or(chrono::Duration::zero());
                let wait = clock::until(self.clock.now(), resume);
                if !wait.is_zero() {
                    log::info!(
                        "Rate limit low ({remaining} remaining), waiting {}s for reset",
                        wait.as_secs()
                    );
                    state.waits += 1;
                    self.clock.sleep(wait);
                }
                // Window refreshed; unknown until the next response reports it
                state.remaining = None;
                state.reset_at = None;
            }
        }

        if let Some(remaining) = state.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        state.admitted += 1;
    }

    /// Fold one response's quota headers into the shared state
    pub fn observe(&self, quota: Quota) {
        let mut state = self.lock();
        if quota.remaining.is_some() {
            state.remaining = quota.remaining;
        }
        if quota.reset_at.is_some() {
            state.reset_at = quota.reset_at;
        }
    }

    /// Block all requests for `duration` from now (secondary rate limit)
    pub fn hold_for(&self, duration: Duration) {
        let until = self.clock.now()
            + chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        let mut state = self.lock();
        state.hold_until = Some(state.hold_until.map_or(until, |h| h.max(until)));
    }

    /// Observe headers, then classify the response.
    ///
    /// Rate-limit classifications also arm the governor so the next `admit()`
    /// performs the wait.
    pub fn process(&self, response: &ApiResponse) -> Result<(), RequestError> {
        let quota = Quota::from_response(response);
        if self.tracks(response) {
            self.observe(quota);
        }
        let result = classify(response, quota);
        match &result {
            Err(RequestError::RateLimited(hold)) => self.hold_for(*hold),
            Err(RequestError::QuotaExhausted) => {
                // Also covers buckets the shared view does not track
                if let Some(reset_at) = quota.reset_at {
                    let wait = clock::until(self.clock.now(), reset_at);
                    self.hold_for(wait + self.config.reset_margin);
                }
            }
            _ => {}
        }
        result
    }

    fn tracks(&self, response: &ApiResponse) -> bool {
        match (self.config.resource, response.header("x-ratelimit-resource")) {
            (Some(wanted), Some(resource)) => resource.trim() == wanted,
            _ => true,
        }
    }

    /// Current local view of the quota
    pub fn quota(&self) -> Quota {
        let state = self.lock();
        Quota {
            remaining: state.remaining,
            reset_at: state.reset_at,
        }
    }

    /// (requests admitted, waits performed)
    pub fn stats(&self) -> (u64, u64) {
        let state = self.lock();
        (state.admitted, state.waits)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GovernorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Map a response onto success or a [`RequestError`] classification.
pub fn classify(response: &ApiResponse, quota: Quota) -> Result<(), RequestError> {
    let status = response.status;
    if response.is_success() {
        return Ok(());
    }
    let message = error_message(&response.body);

    match status {
        403 | 429 => {
            if let Some(secs) = response
                .header("retry-after")
                .and_then(|v| v.trim().parse::<u64>().ok())
            {
                return Err(RequestError::RateLimited(Duration::from_secs(secs)));
            }
            if quota.remaining == Some(0) {
                return Err(RequestError::QuotaExhausted);
            }
            if status == 429 || message.to_ascii_lowercase().contains("rate limit") {
                return Err(RequestError::RateLimited(DEFAULT_SECONDARY_HOLD));
            }
            Err(RequestError::Forbidden { status, message })
        }
        401 => Err(RequestError::Forbidden { status, message }),
        404 | 410 | 451 => Err(RequestError::NotFound),
        500..=599 => Err(RequestError::Server { status, message }),
        _ => Err(RequestError::Client { status, message }),
    }
}

/// Pull `message` out of a JSON error body, else a truncated raw body
fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    match message.char_indices().nth(MAX_ERROR_MESSAGE) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;

    fn governor(clock: Arc<SimulatedClock>, buffer: u32) -> RateGovernor {
        RateGovernor::new(
            RateConfig {
                buffer,
                reset_margin: Duration::ZERO,
                ..Default::default()
            },
            clock,
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn admit_blocks_until_reset_when_below_buffer() {
        let clock = Arc::new(SimulatedClock::new(at(1_000)));
        let gov = governor(clock.clone(), 50);
        gov.observe(Quota {
            remaining: Some(40),
            reset_at: Some(at(1_600)),
        });

        gov.admit();

        assert!(clock.now() >= at(1_600));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(600)]);
        // Quota is unknown until the next response reports it
        assert_eq!(gov.quota().remaining, None);
    }

    #[test]
    fn admit_immediate_with_plenty_of_quota() {
        let clock = Arc::new(SimulatedClock::new(at(1_000)));
        let gov = governor(clock.clone(), 50);
        gov.observe(Quota {
            remaining: Some(500),
            reset_at: Some(at(1_600)),
        });

        gov.admit();

        assert!(clock.sleeps().is_empty());
        assert_eq!(gov.quota().remaining, Some(499));
    }

    #[test]
    fn admit_without_quota_info_is_immediate() {
        let clock = Arc::new(SimulatedClock::default());
        let gov = governor(clock.clone(), 100);
        gov.admit();
        gov.admit();
        assert!(clock.sleeps().is_empty());
        assert_eq!(gov.stats(), (2, 0));
    }

    #[test]
    fn reset_margin_added() {
        let clock = Arc::new(SimulatedClock::new(at(0)));
        let gov = RateGovernor::new(
            RateConfig {
                buffer: 100,
                reset_margin: Duration::from_secs(1),
                ..Default::default()
            },
            clock.clone(),
        );
        gov.observe(Quota {
            remaining: Some(3),
            reset_at: Some(at(10)),
        });
        gov.admit();
        assert_eq!(clock.total_slept(), Duration::from_secs(11));
    }

    #[test]
    fn reset_in_past_does_not_sleep() {
        let clock = Arc::new(SimulatedClock::new(at(2_000)));
        let gov = governor(clock.clone(), 50);
        gov.observe(Quota {
            remaining: Some(0),
            reset_at: Some(at(1_000)),
        });
        gov.admit();
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn headers_override_prediction() {
        let clock = Arc::new(SimulatedClock::default());
        let gov = governor(clock, 10);
        gov.observe(Quota {
            remaining: Some(100),
            reset_at: None,
        });
        gov.admit();
        gov.admit();
        assert_eq!(gov.quota().remaining, Some(98));
        gov.observe(Quota {
            remaining: Some(4_000),
            reset_at: None,
        });
        assert_eq!(gov.quota().remaining, Some(4_000));
    }

    #[test]
    fn retry_after_holds_regardless_of_quota() {
        let clock = Arc::new(SimulatedClock::new(at(0)));
        let gov = governor(clock.clone(), 50);
        let response = ApiResponse::new(403, r#"{"message":"secondary rate limit"}"#)
            .with_header("retry-after", "30")
            .with_header("x-ratelimit-remaining", "4000");

        let result = gov.process(&response);
        assert_eq!(result, Err(RequestError::RateLimited(Duration::from_secs(30))));

        gov.admit();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(30)]);
    }

    #[test]
    fn quota_headers_read_on_error_responses() {
        let clock = Arc::new(SimulatedClock::new(at(0)));
        let gov = governor(clock, 50);
        let response = ApiResponse::new(500, "oops")
            .with_header("x-ratelimit-remaining", "12")
            .with_header("x-ratelimit-reset", "3600");
        assert!(gov.process(&response).is_err());
        assert_eq!(
            gov.quota(),
            Quota {
                remaining: Some(12),
                reset_at: Some(at(3600)),
            }
        );
    }

    #[test]
    fn other_bucket_does_not_move_core_quota() {
        let clock = Arc::new(SimulatedClock::new(at(0)));
        let gov = governor(clock.clone(), 100);
        let search = ApiResponse::new(200, "{}")
            .with_header("x-ratelimit-resource", "search")
            .with_header("x-ratelimit-remaining", "29")
            .with_header("x-ratelimit-reset", "60");
        assert!(gov.process(&search).is_ok());
        assert_eq!(gov.quota().remaining, None);

        gov.admit();
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn exhausted_other_bucket_holds_until_its_reset() {
        let clock = Arc::new(SimulatedClock::new(at(0)));
        let gov = governor(clock.clone(), 100);
        let search = ApiResponse::new(403, r#"{"message":"API rate limit exceeded"}"#)
            .with_header("x-ratelimit-resource", "search")
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-reset", "45");
        assert_eq!(gov.process(&search), Err(RequestError::QuotaExhausted));

        gov.admit();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(45)]);
    }

    #[test]
    fn classify_statuses() {
        let q = Quota::default();
        assert_eq!(classify(&ApiResponse::new(200, "[]"), q), Ok(()));
        assert_eq!(
            classify(&ApiResponse::new(404, ""), q),
            Err(RequestError::NotFound)
        );
        assert_eq!(
            classify(&ApiResponse::new(451, ""), q),
            Err(RequestError::NotFound)
        );
        assert!(matches!(
            classify(&ApiResponse::new(502, "bad gateway"), q),
            Err(RequestError::Server { status: 502, .. })
        ));
        assert!(matches!(
            classify(&ApiResponse::new(401, r#"{"message":"Bad credentials"}"#), q),
            Err(RequestError::Forbidden { status: 401, ref message }) if message == "Bad credentials"
        ));
        assert!(matches!(
            classify(&ApiResponse::new(422, "{}"), q),
            Err(RequestError::Client { status: 422, .. })
        ));
    }

    #[test]
    fn classify_quota_exhausted_vs_forbidden() {
        let exhausted = Quota {
            remaining: Some(0),
            reset_at: None,
        };
        assert_eq!(
            classify(&ApiResponse::new(403, "{}"), exhausted),
            Err(RequestError::QuotaExhausted)
        );
        let plenty = Quota {
            remaining: Some(10),
            reset_at: None,
        };
        assert!(matches!(
            classify(&ApiResponse::new(403, r#"{"message":"Resource not accessible"}"#), plenty),
            Err(RequestError::Forbidden { status: 403, .. })
        ));
        assert_eq!(
            classify(
                &ApiResponse::new(
                    403,
                    r#"{"message":"You have exceeded a secondary rate limit."}"#
                ),
                plenty
            ),
            Err(RequestError::RateLimited(DEFAULT_SECONDARY_HOLD))
        );
        assert_eq!(
            classify(&ApiResponse::new(429, ""), plenty),
            Err(RequestError::RateLimited(DEFAULT_SECONDARY_HOLD))
        );
    }

    #[test]
    fn quota_parse_missing_headers() {
        let q = Quota::from_response(&ApiResponse::new(200, ""));
        assert_eq!(q, Quota::default());
    }

    #[test]
    fn error_message_truncated() {
        let long = "x".repeat(1000);
        assert_eq!(error_message(&long).len(), MAX_ERROR_MESSAGE);
    }
}
