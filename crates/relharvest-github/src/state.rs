//! Harvest domain types: repositories (entities) and their history records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable composite key of a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoKey {
    pub owner: String,
    pub name: String,
}

impl RepoKey {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name`
    pub fn parse(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }

    /// `owner/name`, also used as checkpoint key and sink partition
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// One harvest target, materialised once by discovery
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    pub github_id: i64,
    pub key: RepoKey,
    pub stars: i64,
    pub created_at: DateTime<Utc>,
    pub language: Option<String>,
    pub topics: Vec<String>,
}

/// Which source produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Primary source: a published release
    Release,
    /// Secondary source: a tag dated by its commit
    Tag,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Tag => "tag",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "release" => Some(Self::Release),
            "tag" => Some(Self::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One version event of one repository. Never emitted without a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub repo: RepoKey,
    /// Source-assigned release id (releases only)
    pub release_id: Option<i64>,
    pub tag_name: String,
    pub release_name: Option<String>,
    pub published_at: DateTime<Utc>,
    pub is_draft: bool,
    pub is_prerelease: bool,
    pub provenance: Provenance,
    pub fetched_at: DateTime<Utc>,
}
