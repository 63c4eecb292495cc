//! Output sinks: atomic Parquet file writer and per-entity partitioned store

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::checkpoint::{sync_parent, tmp_path};

/// Buffered parquet writer with atomic tmp→fsync→rename
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for ParquetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl ParquetSink {
    /// Create a new sink writing to `<final_path>.tmp`
    pub fn create(final_path: &Path, schema: &SchemaRef, zstd_level: i32) -> io::Result<Self> {
        let final_path = final_path.to_path_buf();
        let tmp_path = tmp_path(&final_path);

        // Clean up stale tmp file
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        let level = ZstdLevel::try_new(zstd_level)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .build();

        let writer =
            ArrowWriter::try_new(file, schema.clone(), Some(props)).map_err(io::Error::other)?;

        Ok(Self {
            writer,
            tmp_path,
            final_path,
            row_count: 0,
        })
    }

    /// Write a record batch
    pub fn write_batch(&mut self, batch: &RecordBatch) -> io::Result<()> {
        self.row_count += batch.num_rows();
        self.writer.write(batch).map_err(io::Error::other)
    }

    /// Finalize: write footer, fsync, atomically rename tmp → final
    pub fn finalize(self) -> io::Result<usize> {
        let row_count = self.row_count;
        let file = self.writer.into_inner().map_err(io::Error::other)?;
        file.sync_all()?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        sync_parent(&self.final_path);
        Ok(row_count)
    }
}

/// One Parquet file per partition (`<root>/<partition>.parquet`).
///
/// A commit replaces the whole partition atomically: a reader sees either the
/// previous file or the new one, never a mix, and re-committing a partition
/// overwrites rather than appends.
#[derive(Debug, Clone)]
pub struct PartitionedSink {
    root: PathBuf,
    zstd_level: i32,
}

impl PartitionedSink {
    pub fn new(root: impl Into<PathBuf>, zstd_level: i32) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, zstd_level })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for a partition name such as `owner/name`
    pub fn partition_path(&self, partition: &str) -> io::Result<PathBuf> {
        let rel = Path::new(partition);
        let valid = !partition.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid partition name: {partition:?}"),
            ));
        }
        Ok(self.root.join(format!("{partition}.parquet")))
    }

    /// Replace a partition with `batch`. An empty batch removes the partition.
    pub fn commit(&self, partition: &str, schema: &SchemaRef, batch: &RecordBatch) -> io::Result<usize> {
        if batch.num_rows() == 0 {
            self.remove(partition)?;
            return Ok(0);
        }
        let path = self.partition_path(partition)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut sink = ParquetSink::create(&path, schema, self.zstd_level)?;
        sink.write_batch(batch)?;
        sink.finalize()
    }

    /// Delete a partition; `Ok(false)` if it did not exist
    pub fn remove(&self, partition: &str) -> io::Result<bool> {
        let path = self.partition_path(partition)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                sync_parent(&path);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read all batches of a partition; empty if it does not exist
    pub fn read(&self, partition: &str) -> io::Result<Vec<RecordBatch>> {
        let path = self.partition_path(partition)?;
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(io::Error::other)?
            .build()
            .map_err(io::Error::other)?;
        reader
            .collect::<Result<Vec<_>, _>>()
            .map_err(io::Error::other)
    }

    /// Names of all committed partitions, sorted
    pub fn partitions(&self) -> io::Result<Vec<String>> {
        let pattern = self.root.join("**").join("*.parquet");
        let mut names: Vec<String> = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
            .filter_map(|e| e.ok())
            .filter_map(|p| {
                let rel = p.strip_prefix(&self.root).ok()?.with_extension("");
                Some(
                    rel.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/"),
                )
            })
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Remove stale .tmp files anywhere under `dir`
pub fn cleanup_tmp_files(dir: &Path) -> io::Result<usize> {
    let pattern = dir.join("**").join("*.tmp");
    let mut removed = 0;
    for path in glob::glob(&pattern.to_string_lossy())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
        .filter_map(|e| e.ok())
    {
        log::warn!("Removing stale tmp file: {}", path.display());
        fs::remove_file(&path)?;
        removed += 1;
    }
    Ok(removed)
}
