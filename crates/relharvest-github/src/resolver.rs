//! Fallback chain for one repository: releases, then tags dated by commit lookup

use std::fmt;

use chrono::{DateTime, Utc};
use relharvest_core::RequestError;
use relharvest_core::paginate::Paginator;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;

use crate::api::{GithubApi, ReleaseItem, TagItem};
use crate::state::{HistoryRecord, RepoKey};

/// Why a repository produced no history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoneReason {
    /// Neither releases nor tags
    NoHistory,
    /// Repository is gone or hidden
    NotFound,
}

impl NoneReason {
    /// Reason code written to the failure log
    pub fn code(self) -> &'static str {
        match self {
            Self::NoHistory => "no_releases_no_tags",
            Self::NotFound => "not_found",
        }
    }
}

/// Which link of the chain produced the result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Releases endpoint returned well-formed items (possibly none usable)
    Primary,
    /// Releases were empty; records come from tags
    Secondary,
    /// Checked, nothing to report
    None(NoneReason),
    /// Transport or API failure; nothing from this attempt is usable
    Failed(Failure),
}

/// Why an attempt failed: the error's reason code plus the full message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// [`RequestError::code`], e.g. `server_error`
    pub code: &'static str,
    pub message: String,
}

impl Failure {
    fn new(context: impl fmt::Display, error: &RequestError) -> Self {
        Self {
            code: error.code(),
            message: format!("{context}: {error}"),
        }
    }

    /// Entry for the failure log
    pub fn reason(&self) -> String {
        format!("failed:{}", self.code)
    }
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Secondary => f.write_str("secondary"),
            Self::None(reason) => write!(f, "none ({})", reason.code()),
            Self::Failed(failure) => write!(f, "failed: {}", failure.message),
        }
    }
}

/// Records plus bookkeeping for one repository
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcome: Outcome,
    pub records: Vec<HistoryRecord>,
    /// Tags dropped because their commit could not be dated
    pub dropped: usize,
    /// Items (or pages) that did not parse
    pub parse_failures: usize,
    /// Releases without a publication date (drafts)
    pub unpublished: usize,
    /// Commit detail requests issued
    pub lookups: usize,
}

impl Resolution {
    fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            records: Vec::new(),
            dropped: 0,
            parse_failures: 0,
            unpublished: 0,
            lookups: 0,
        }
    }
}

enum Fetched<T> {
    Items(Vec<T>),
    NotFound,
    Failed(RequestError),
}

/// Drain a paginator, decoding each item. Any non-fatal error discards the whole
/// sequence; a fatal error is returned.
fn fetch_all<T: DeserializeOwned>(
    mut pages: Paginator<'_>,
    parse_failures: &mut usize,
) -> Result<Fetched<T>, RequestError> {
    let mut items = Vec::new();
    for page in pages.by_ref() {
        let page = match page {
            Ok(page) => page,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) if e.is_not_found() => return Ok(Fetched::NotFound),
            Err(e) => return Ok(Fetched::Failed(e)),
        };
        for value in page.items {
            match serde_json::from_value::<T>(value) {
                Ok(item) => items.push(item),
                Err(e) => {
                    log::debug!("Unparseable item on page {}: {e}", page.number);
                    *parse_failures += 1;
                }
            }
        }
    }
    *parse_failures += pages.malformed_pages();
    Ok(Fetched::Items(items))
}

/// Resolve the history of one repository.
///
/// Only fatal errors (bad credentials, forbidden) come back as `Err`; every
/// other failure is folded into [`Outcome::Failed`].
pub fn resolve(api: &GithubApi, repo: &RepoKey) -> Result<Resolution, RequestError> {
    let fetched_at = api.client().clock().now();
    let mut parse_failures = 0;

    // 1. releases
    let releases_not_found = match fetch_all::<ReleaseItem>(api.releases(repo), &mut parse_failures)? {
        Fetched::Failed(e) => {
            let mut res = Resolution::new(Outcome::Failed(Failure::new("releases", &e)));
            res.parse_failures = parse_failures;
            return Ok(res);
        }
        Fetched::Items(items) if !items.is_empty() => {
            let mut res = Resolution::new(Outcome::Primary);
            res.parse_failures = parse_failures;
            for item in items {
                match item.into_record(repo, fetched_at) {
                    Some(record) => res.records.push(record),
                    None => res.unpublished += 1,
                }
            }
            return Ok(res);
        }
        Fetched::Items(_) => false,
        Fetched::NotFound => true,
    };

    // 2. tags
    let tags = match fetch_all::<TagItem>(api.tags(repo), &mut parse_failures)? {
        Fetched::Items(tags) if !tags.is_empty() => tags,
        Fetched::Items(_) => {
            let reason = if releases_not_found {
                NoneReason::NotFound
            } else {
                NoneReason::NoHistory
            };
            let mut res = Resolution::new(Outcome::None(reason));
            res.parse_failures = parse_failures;
            return Ok(res);
        }
        Fetched::NotFound => {
            let mut res = Resolution::new(Outcome::None(NoneReason::NotFound));
            res.parse_failures = parse_failures;
            return Ok(res);
        }
        Fetched::Failed(e) => {
            let mut res = Resolution::new(Outcome::Failed(Failure::new("tags", &e)));
            res.parse_failures = parse_failures;
            return Ok(res);
        }
    };

    // 3. one detail lookup per distinct commit
    let mut res = Resolution::new(Outcome::Secondary);
    res.parse_failures = parse_failures;
    let mut dates: FxHashMap<String, Option<DateTime<Utc>>> = FxHashMap::default();

    for tag in tags {
        let sha = tag.commit.sha.clone();
        let date = match dates.get(&sha) {
            Some(date) => *date,
            None => {
                res.lookups += 1;
                let date = match api.commit_date(repo, &sha) {
                    Ok(date) => date,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => {
                        return Ok(Resolution {
                            outcome: Outcome::Failed(Failure::new(format!("commit {sha}"), &e)),
                            records: Vec::new(),
                            ..res
                        });
                    }
                };
                dates.insert(sha, date);
                date
            }
        };
        match date {
            Some(date) => res.records.push(tag.into_record(repo, date, fetched_at)),
            None => {
                log::warn!("{repo}: dropping tag {} (commit {} not dated)", tag.name, tag.commit.sha);
                res.dropped += 1;
            }
        }
    }

    if res.dropped > 0 {
        log::info!("{repo}: dropped {} of {} tags", res.dropped, res.dropped + res.records.len());
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use relharvest_core::paginate::page_url;
    use relharvest_core::{
        ApiClient, ApiResponse, RateConfig, RateGovernor, RetryPolicy, ScriptedTransport,
        SimulatedClock,
    };

    use url::Url;

    use super::*;
    use crate::api::DEFAULT_API_URL;

    const RELEASES: &str = "https://api.github.com/repos/acme/widget/releases";
    const TAGS: &str = "https://api.github.com/repos/acme/widget/tags";

    fn api(transport: Arc<ScriptedTransport>) -> GithubApi {
        let clock = Arc::new(SimulatedClock::default());
        let governor = Arc::new(RateGovernor::new(RateConfig::default(), clock));
        let policy = RetryPolicy {
            max_retries: 2,
            max_jitter: Duration::ZERO,
            ..Default::default()
        };
        let base = Url::parse(DEFAULT_API_URL).unwrap();
        GithubApi::new(ApiClient::new(transport, governor, policy), base, 100)
    }

    fn page(endpoint: &str, n: u32) -> String {
        page_url(&Url::parse(endpoint).unwrap(), 100, n)
    }

    fn key() -> RepoKey {
        RepoKey::new("acme", "widget")
    }

    fn commit(sha: &str) -> String {
        format!("https://api.github.com/repos/acme/widget/commits/{sha}")
    }

    fn dated(date: &str) -> ApiResponse {
        ApiResponse::new(200, format!(r#"{{"commit": {{"author": {{"date": "{date}"}}}}}}"#))
    }

    #[test]
    fn releases_win() {
        let t = Arc::new(ScriptedTransport::new());
        t.push(
            &page(RELEASES, 1),
            ApiResponse::new(
                200,
                r#"[{"id": 1, "tag_name": "v1", "published_at": "2020-01-01T00:00:00Z"},
                    {"id": 2, "tag_name": "v2", "draft": true, "published_at": null}]"#,
            ),
        );
        let res = resolve(&api(t.clone()), &key()).unwrap();
        assert_eq!(res.outcome, Outcome::Primary);
        assert_eq!(res.records.len(), 1);
        assert_eq!(res.unpublished, 1);
        assert_eq!(t.requests_matching("/tags"), 0);
    }

    #[test]
    fn all_drafts_is_still_primary() {
        let t = Arc::new(ScriptedTransport::new());
        t.push(
            &page(RELEASES, 1),
            ApiResponse::new(200, r#"[{"id": 2, "tag_name": "v2", "draft": true}]"#),
        );
        let res = resolve(&api(t.clone()), &key()).unwrap();
        assert_eq!(res.outcome, Outcome::Primary);
        assert!(res.records.is_empty());
        assert_eq!(t.requests_matching("/tags"), 0);
    }

    #[test]
    fn tags_share_commit_lookup() {
        let t = Arc::new(ScriptedTransport::new());
        t.push(&page(RELEASES, 1), ApiResponse::new(200, "[]"));
        t.push(
            &page(TAGS, 1),
            ApiResponse::new(
                200,
                r#"[{"name": "v1", "commit": {"sha": "aaa"}},
                    {"name": "v1-final", "commit": {"sha": "aaa"}},
                    {"name": "v0", "commit": {"sha": "bbb"}}]"#,
            ),
        );
        t.push(&commit("aaa"), dated("2021-01-01T00:00:00Z"));
        t.push(&commit("bbb"), ApiResponse::new(404, r#"{"message": "Not Found"}"#));

        let res = resolve(&api(t.clone()), &key()).unwrap();
        assert_eq!(res.outcome, Outcome::Secondary);
        assert_eq!(res.records.len(), 2);
        assert_eq!(res.dropped, 1);
        assert_eq!(res.lookups, 2);
        assert_eq!(t.request_count(&commit("aaa")), 1);
    }

    #[test]
    fn nothing_anywhere() {
        let t = Arc::new(ScriptedTransport::new());
        t.push(&page(RELEASES, 1), ApiResponse::new(200, "[]"));
        t.push(&page(TAGS, 1), ApiResponse::new(200, "[]"));
        let res = resolve(&api(t), &key()).unwrap();
        assert_eq!(res.outcome, Outcome::None(NoneReason::NoHistory));
    }

    #[test]
    fn repository_gone() {
        let t = Arc::new(ScriptedTransport::new());
        let res = resolve(&api(t), &key()).unwrap();
        assert_eq!(res.outcome, Outcome::None(NoneReason::NotFound));
    }

    #[test]
    fn partial_primary_is_failed() {
        let t = Arc::new(ScriptedTransport::new());
        let full: Vec<_> = (0..100)
            .map(|i| serde_json::json!({"id": i, "tag_name": format!("v{i}"), "published_at": "2020-01-01T00:00:00Z"}))
            .collect();
        t.push(
            &page(RELEASES, 1),
            ApiResponse::new(200, serde_json::to_string(&full).unwrap()),
        );
        t.push(&page(RELEASES, 2), ApiResponse::new(503, "unavailable"));

        let res = resolve(&api(t), &key()).unwrap();
        assert!(res.outcome.is_failed());
        assert!(res.records.is_empty());
    }

    #[test]
    fn transient_commit_failure_fails_entity() {
        let t = Arc::new(ScriptedTransport::new());
        t.push(&page(RELEASES, 1), ApiResponse::new(200, "[]"));
        t.push(
            &page(TAGS, 1),
            ApiResponse::new(200, r#"[{"name": "v1", "commit": {"sha": "aaa"}}]"#),
        );
        t.push(&commit("aaa"), ApiResponse::new(500, "oops"));
        let res = resolve(&api(t), &key()).unwrap();
        match res.outcome {
            Outcome::Failed(ref failure) => {
                assert_eq!(failure.code, "server_error");
                assert!(failure.message.starts_with("commit aaa: HTTP 500"));
                assert_eq!(failure.reason(), "failed:server_error");
            }
            ref other => panic!("expected failure, got {other}"),
        }
        assert!(res.records.is_empty());
    }

    #[test]
    fn bad_credentials_abort() {
        let t = Arc::new(ScriptedTransport::new());
        t.push(
            &page(RELEASES, 1),
            ApiResponse::new(401, r#"{"message": "Bad credentials"}"#),
        );
        let err = resolve(&api(t), &key()).unwrap_err();
        assert!(err.is_fatal());
    }
}
