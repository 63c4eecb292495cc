//! GitHub REST v3 endpoints and wire types

use std::time::Duration;

use chrono::{DateTime, Utc};
use relharvest_core::paginate::{PageShape, Paginator};
use relharvest_core::{ApiClient, RequestError};
use serde::Deserialize;
use url::Url;

use crate::state::{HistoryRecord, Provenance, RepoKey, Repository};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub caps `per_page` at 100
pub const MAX_PER_PAGE: usize = 100;

/// Release item from `/repos/{owner}/{name}/releases`
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseItem {
    pub id: i64,
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub body: Option<String>,
}

impl ReleaseItem {
    /// `None` for unpublished releases (drafts carry no `published_at`)
    pub fn into_record(self, repo: &RepoKey, fetched_at: DateTime<Utc>) -> Option<HistoryRecord> {
        let published_at = self.published_at?;
        Some(HistoryRecord {
            repo: repo.clone(),
            release_id: Some(self.id),
            tag_name: self.tag_name,
            release_name: self.name.filter(|n| !n.is_empty()),
            published_at,
            is_draft: self.draft,
            is_prerelease: self.prerelease,
            provenance: Provenance::Release,
            fetched_at,
        })
    }
}

/// Tag item from `/repos/{owner}/{name}/tags`; carries no timestamp
#[derive(Debug, Clone, Deserialize)]
pub struct TagItem {
    pub name: String,
    pub commit: CommitRef,
}

impl TagItem {
    pub fn into_record(self, repo: &RepoKey, committed_at: DateTime<Utc>, fetched_at: DateTime<Utc>) -> HistoryRecord {
        HistoryRecord {
            repo: repo.clone(),
            release_id: None,
            tag_name: self.name,
            release_name: None,
            published_at: committed_at,
            is_draft: false,
            is_prerelease: false,
            provenance: Provenance::Tag,
            fetched_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

/// Commit detail from `/repos/{owner}/{name}/commits/{sha}`
#[derive(Debug, Deserialize)]
pub struct CommitDetail {
    pub commit: CommitInfo,
}

#[derive(Debug, Deserialize)]
pub struct CommitInfo {
    #[serde(default)]
    pub author: Option<Signature>,
    #[serde(default)]
    pub committer: Option<Signature>,
}

#[derive(Debug, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl CommitDetail {
    /// Authorship date, falling back to commit date
    pub fn date(&self) -> Option<DateTime<Utc>> {
        let author = self.commit.author.as_ref().and_then(|s| s.date);
        author.or_else(|| self.commit.committer.as_ref().and_then(|s| s.date))
    }
}

/// Repository item from `/search/repositories`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRepo {
    pub id: i64,
    pub name: String,
    pub owner: Owner,
    pub stargazers_count: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub login: String,
}

impl SearchRepo {
    pub fn into_repository(self) -> Repository {
        Repository {
            github_id: self.id,
            key: RepoKey::new(self.owner.login, self.name),
            stars: self.stargazers_count,
            created_at: self.created_at,
            language: self.language.filter(|l| !l.is_empty()),
            topics: self.topics,
        }
    }
}

/// Default request headers; the token is sent as `Authorization: token ...`
pub fn default_headers(token: Option<&str>) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        ("accept", "application/vnd.github.v3+json".to_string()),
        (
            "user-agent",
            concat!("relharvest/", env!("CARGO_PKG_VERSION")).to_string(),
        ),
    ];
    if let Some(token) = token {
        headers.push(("authorization", format!("token {token}")));
    }
    headers
}

/// Endpoint builder over the shared [`ApiClient`]
#[derive(Debug, Clone)]
pub struct GithubApi {
    client: ApiClient,
    base_url: Url,
    per_page: usize,
    page_delay: Duration,
    search_delay: Duration,
}

impl GithubApi {
    pub fn new(client: ApiClient, base_url: Url, per_page: usize) -> Self {
        Self {
            client,
            base_url,
            per_page: per_page.clamp(1, MAX_PER_PAGE),
            page_delay: Duration::ZERO,
            search_delay: Duration::ZERO,
        }
    }

    /// Pauses between consecutive pages of one listing; search has a
    /// separate, smaller quota bucket and its own pause
    pub fn with_page_delays(mut self, page: Duration, search: Duration) -> Self {
        self.page_delay = page;
        self.search_delay = search;
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// `base_url` with `segments` appended to its path
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn releases_url(&self, repo: &RepoKey) -> Url {
        self.endpoint(&["repos", repo.owner.as_str(), repo.name.as_str(), "releases"])
    }

    pub fn tags_url(&self, repo: &RepoKey) -> Url {
        self.endpoint(&["repos", repo.owner.as_str(), repo.name.as_str(), "tags"])
    }

    pub fn commit_url(&self, repo: &RepoKey, sha: &str) -> Url {
        self.endpoint(&["repos", repo.owner.as_str(), repo.name.as_str(), "commits", sha])
    }

    pub fn search_url(&self, query: &str) -> Url {
        let mut url = self.endpoint(&["search", "repositories"]);
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("sort", "stars")
            .append_pair("order", "desc");
        url
    }

    /// Primary source pages
    pub fn releases(&self, repo: &RepoKey) -> Paginator<'_> {
        Paginator::new(&self.client, self.releases_url(repo), self.per_page, PageShape::Array)
            .with_page_delay(self.page_delay)
    }

    /// Secondary source pages
    pub fn tags(&self, repo: &RepoKey) -> Paginator<'_> {
        Paginator::new(&self.client, self.tags_url(repo), self.per_page, PageShape::Array)
            .with_page_delay(self.page_delay)
    }

    /// Ranked search pages, most stars first
    pub fn search(&self, query: &str) -> Paginator<'_> {
        Paginator::new(
            &self.client,
            self.search_url(query),
            self.per_page,
            PageShape::Field("items"),
        )
        .with_page_delay(self.search_delay)
    }

    /// Detail lookup for one commit.
    ///
    /// `Ok(None)` when the payload is malformed or carries no date.
    pub fn commit_date(&self, repo: &RepoKey, sha: &str) -> Result<Option<DateTime<Utc>>, RequestError> {
        let url = self.commit_url(repo, sha);
        let response = self.client.get(url.as_str())?;
        match serde_json::from_str::<CommitDetail>(&response.body) {
            Ok(detail) => Ok(detail.date()),
            Err(e) => {
                log::debug!("{url}: malformed commit payload: {e}");
                Ok(None)
            }
        }
    }
}
