//! Checkpoint store: durable record of fully processed entities.
//!
//! Every mutation is persisted synchronously (tmp → fsync → rename) before the
//! call returns, so the next entity never starts on an unsaved checkpoint.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    /// Entities marked completed (with or without records)
    pub completed: u64,
    /// Completed entities that had no records
    pub empty: u64,
    /// Failure events recorded
    pub failed: u64,
    /// Records committed by completed entities
    pub records: u64,
}

/// Per-entity completion details
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionCounts {
    pub records: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct CheckpointState {
    completed: BTreeSet<String>,
    /// Last failure reason for entities not (yet) completed
    failed: BTreeMap<String, String>,
    counters: Counters,
    started_at: Option<DateTime<Utc>>,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: CheckpointState,
}

impl CheckpointStore {
    /// Restore prior state from `path`; empty if the file does not exist.
    ///
    /// A present but unreadable file is an error rather than a silent reset.
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("corrupt checkpoint {}: {e}", path.display()),
                )
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => CheckpointState {
                started_at: Some(Utc::now()),
                ..Default::default()
            },
            Err(e) => return Err(e),
        };
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.state.completed.contains(key)
    }

    /// Record completion and persist. Call only after the entity's sink commit is durable.
    pub fn mark_completed(&mut self, key: &str, counts: CompletionCounts) -> io::Result<()> {
        if self.state.completed.insert(key.to_string()) {
            self.state.counters.completed += 1;
            self.state.counters.records += counts.records;
            if counts.records == 0 {
                self.state.counters.empty += 1;
            }
        }
        self.state.failed.remove(key);
        self.snapshot()
    }

    /// Record a failure and persist. The entity stays pending for the next run.
    pub fn mark_failed(&mut self, key: &str, reason: &str) -> io::Result<()> {
        self.state.counters.failed += 1;
        self.state
            .failed
            .insert(key.to_string(), reason.to_string());
        self.snapshot()
    }

    /// Durable write of the current state
    pub fn snapshot(&mut self) -> io::Result<()> {
        self.state.last_updated = Some(Utc::now());
        let json = serde_json::to_vec_pretty(&self.state).map_err(io::Error::other)?;
        write_atomic(&self.path, &json)
    }

    pub fn counters(&self) -> Counters {
        self.state.counters
    }

    pub fn completed_len(&self) -> usize {
        self.state.completed.len()
    }

    /// Entities whose latest attempt failed, with reasons
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.state
            .failed
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.last_updated
    }
}

/// Write `bytes` to `path` via tmp file, fsync, rename
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = tmp_path(path);
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    sync_parent(path);
    Ok(())
}

/// `<path>.tmp`
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Best-effort directory fsync so the rename itself is durable
pub(crate) fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::load(dir.path().join("checkpoint.json")).unwrap();
        assert_eq!(store.completed_len(), 0);
        assert_eq!(store.counters(), Counters::default());
    }

    #[test]
    fn completion_survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");
        let mut store = CheckpointStore::load(&path).unwrap();
        store
            .mark_completed("acme/widget", CompletionCounts { records: 3 })
            .unwrap();
        store
            .mark_completed("acme/empty", CompletionCounts { records: 0 })
            .unwrap();

        let reloaded = CheckpointStore::load(&path).unwrap();
        assert!(reloaded.is_completed("acme/widget"));
        assert!(reloaded.is_completed("acme/empty"));
        assert!(!reloaded.is_completed("acme/other"));
        let c = reloaded.counters();
        assert_eq!((c.completed, c.empty, c.records), (2, 1, 3));
        assert!(reloaded.last_updated().is_some());
    }

    #[test]
    fn failed_then_completed_clears_reason() {
        let dir = TempDir::new().unwrap();
        let mut store = CheckpointStore::load(dir.path().join("cp.json")).unwrap();
        store.mark_failed("acme/flaky", "timeout").unwrap();
        assert!(!store.is_completed("acme/flaky"));
        assert_eq!(store.failures().count(), 1);

        store
            .mark_completed("acme/flaky", CompletionCounts { records: 1 })
            .unwrap();
        assert_eq!(store.failures().count(), 0);
        // Failure counter is monotonic
        assert_eq!(store.counters().failed, 1);
    }

    #[test]
    fn double_completion_not_double_counted() {
        let dir = TempDir::new().unwrap();
        let mut store = CheckpointStore::load(dir.path().join("cp.json")).unwrap();
        store.mark_completed("a/b", CompletionCounts { records: 2 }).unwrap();
        store.mark_completed("a/b", CompletionCounts { records: 2 }).unwrap();
        assert_eq!(store.counters().completed, 1);
        assert_eq!(store.counters().records, 2);
    }

    #[test]
    fn corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cp.json");
        fs::write(&path, b"{not json").unwrap();
        let err = CheckpointStore::load(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn snapshot_leaves_no_tmp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cp.json");
        let mut store = CheckpointStore::load(&path).unwrap();
        store.snapshot().unwrap();
        assert!(path.exists());
        assert!(!tmp_path(&path).exists());
    }
}
