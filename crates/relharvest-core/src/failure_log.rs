//! Append-only log of entities that produced no data or failed

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Writer, WriterBuilder};

const HEADER: [&str; 2] = ["owner/repo-name", "reason"];

/// CSV `key,reason` rows, flushed and synced per entry
#[derive(Debug)]
pub struct FailureLog {
    path: PathBuf,
    writer: Writer<File>,
}

impl FailureLog {
    /// Open for append, writing the header if the file is new or empty
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let is_new = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(HEADER)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, key: &str, reason: &str) -> io::Result<()> {
        // One physical line per entry
        let reason = reason.replace(['\n', '\r'], " ");
        self.writer.write_record([key, reason.as_str()])?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}

/// Read back `(key, reason)` entries, skipping the header
pub fn read_entries(path: &Path) -> io::Result<Vec<(String, String)>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let (Some(key), Some(reason)) = (record.get(0), record.get(1)) {
            entries.push((key.to_string(), reason.to_string()));
        }
    }
    Ok(entries)
}
