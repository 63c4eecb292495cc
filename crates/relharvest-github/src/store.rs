//! Output directory layout and per-repository release partitions

use std::io;
use std::path::{Path, PathBuf};

use relharvest_core::{ParquetSink, PartitionedSink};

use crate::schema;
use crate::state::{HistoryRecord, RepoKey, Repository};

pub const RELEASES_DIR: &str = "releases";
pub const REPOSITORIES_FILE: &str = "repositories.parquet";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const FAILURES_FILE: &str = "failures.log";

const ZSTD_LEVEL: i32 = 3;

/// Paths under the output directory
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.root.join(RELEASES_DIR)
    }

    pub fn repositories(&self) -> PathBuf {
        self.root.join(REPOSITORIES_FILE)
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.root.join(CHECKPOINT_FILE)
    }

    pub fn failures(&self) -> PathBuf {
        self.root.join(FAILURES_FILE)
    }
}

/// History records, one Parquet partition per repository
#[derive(Debug, Clone)]
pub struct ReleaseStore {
    sink: PartitionedSink,
}

impl ReleaseStore {
    pub fn open(layout: &Layout) -> io::Result<Self> {
        Ok(Self {
            sink: PartitionedSink::new(layout.releases_dir(), ZSTD_LEVEL)?,
        })
    }

    /// Atomically replace the partition of `repo`; no records removes it
    pub fn commit(&self, repo: &RepoKey, records: &[HistoryRecord]) -> io::Result<usize> {
        let batch = schema::releases_batch(records).map_err(io::Error::other)?;
        self.sink.commit(&repo.full_name(), schema::releases(), &batch)
    }

    /// Drop the partition of `repo`; `false` if there was none
    pub fn remove(&self, repo: &RepoKey) -> io::Result<bool> {
        self.sink.remove(&repo.full_name())
    }

    pub fn read_records(&self, repo: &RepoKey) -> io::Result<Vec<HistoryRecord>> {
        let mut records = Vec::new();
        for batch in self.sink.read(&repo.full_name())? {
            records.extend(schema::read_records(&batch).map_err(io::Error::other)?);
        }
        Ok(records)
    }

    /// `owner/name` of every committed partition
    pub fn committed(&self) -> io::Result<Vec<String>> {
        self.sink.partitions()
    }
}

/// Write the population snapshot atomically
pub fn write_repositories(path: &Path, repos: &[Repository]) -> io::Result<usize> {
    let batch =
        schema::repositories_batch(repos, chrono::Utc::now()).map_err(io::Error::other)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut sink = ParquetSink::create(path, schema::repositories(), ZSTD_LEVEL)?;
    sink.write_batch(&batch)?;
    sink.finalize()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    use super::*;
    use crate::state::Provenance;

    fn record(tag: &str) -> HistoryRecord {
        HistoryRecord {
            repo: RepoKey::new("acme", "widget"),
            release_id: None,
            tag_name: tag.into(),
            release_name: None,
            published_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            is_draft: false,
            is_prerelease: false,
            provenance: Provenance::Tag,
            fetched_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn commit_replaces_partition() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let store = ReleaseStore::open(&layout).unwrap();
        let key = RepoKey::new("acme", "widget");

        store.commit(&key, &[record("v1"), record("v2")]).unwrap();
        store.commit(&key, &[record("v1"), record("v2")]).unwrap();

        let back = store.read_records(&key).unwrap();
        assert_eq!(back, vec![record("v1"), record("v2")]);
        assert_eq!(store.committed().unwrap(), vec!["acme/widget"]);
        assert!(layout.releases_dir().join("acme/widget.parquet").exists());
    }

    #[test]
    fn remove_drops_partition() {
        let dir = TempDir::new().unwrap();
        let store = ReleaseStore::open(&Layout::new(dir.path())).unwrap();
        let key = RepoKey::new("acme", "widget");

        store.commit(&key, &[record("v1")]).unwrap();
        assert!(store.remove(&key).unwrap());
        assert!(store.read_records(&key).unwrap().is_empty());
        assert!(!store.remove(&key).unwrap());
    }

    #[test]
    fn empty_commit_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = ReleaseStore::open(&Layout::new(dir.path())).unwrap();
        let key = RepoKey::new("acme", "widget");
        store.commit(&key, &[record("v1")]).unwrap();
        assert_eq!(store.commit(&key, &[]).unwrap(), 0);
        assert!(store.read_records(&key).unwrap().is_empty());
        assert!(store.committed().unwrap().is_empty());
    }

    #[test]
    fn repositories_snapshot() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let repos = vec![Repository {
            github_id: 9,
            key: RepoKey::new("acme", "widget"),
            stars: 3,
            created_at: Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap(),
            language: None,
            topics: vec![],
        }];
        assert_eq!(write_repositories(&layout.repositories(), &repos).unwrap(), 1);
        assert!(layout.repositories().exists());
    }
}
