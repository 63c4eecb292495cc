//! Arrow schemas and batch conversion for the output tables

use std::sync::{Arc, LazyLock};

use arrow::array::{
    Array, ArrayRef, BooleanArray, Int64Array, ListBuilder, RecordBatch, StringArray,
    StringBuilder, TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::error::ArrowError;
use chrono::{DateTime, Utc};

use crate::state::{HistoryRecord, Provenance, RepoKey, Repository};

fn timestamp() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))
}

/// releases/{owner}/{name}.parquet: one row per history record
pub fn releases() -> &'static SchemaRef {
    static SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
        Arc::new(Schema::new(vec![
            Field::new("repo_full_name", DataType::Utf8, false),
            Field::new("release_id", DataType::Int64, true),
            Field::new("tag_name", DataType::Utf8, false),
            Field::new("release_name", DataType::Utf8, true),
            Field::new("published_at", timestamp(), false),
            Field::new("is_prerelease", DataType::Boolean, false),
            Field::new("is_draft", DataType::Boolean, false),
            // "release" or "tag"
            Field::new("source", DataType::Utf8, false),
            Field::new("fetched_at", timestamp(), false),
        ]))
    });
    &SCHEMA
}

/// repositories.parquet: population snapshot
pub fn repositories() -> &'static SchemaRef {
    static SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
        Arc::new(Schema::new(vec![
            Field::new("github_id", DataType::Int64, false),
            Field::new("owner", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("full_name", DataType::Utf8, false),
            Field::new("stars", DataType::Int64, false),
            Field::new("created_at", timestamp(), false),
            Field::new("language", DataType::Utf8, true),
            Field::new(
                "topics",
                DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
                false,
            ),
            Field::new("fetched_at", timestamp(), false),
        ]))
    });
    &SCHEMA
}

fn millis(values: impl Iterator<Item = DateTime<Utc>>) -> ArrayRef {
    let ms: Vec<i64> = values.map(|t| t.timestamp_millis()).collect();
    Arc::new(TimestampMillisecondArray::from(ms).with_timezone("UTC"))
}

/// Build a releases batch; empty input yields an empty batch
pub fn releases_batch(records: &[HistoryRecord]) -> Result<RecordBatch, ArrowError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.repo.full_name()),
        )),
        Arc::new(Int64Array::from_iter(records.iter().map(|r| r.release_id))),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.tag_name.as_str()),
        )),
        Arc::new(StringArray::from_iter(
            records.iter().map(|r| r.release_name.as_deref()),
        )),
        millis(records.iter().map(|r| r.published_at)),
        Arc::new(BooleanArray::from_iter(
            records.iter().map(|r| Some(r.is_prerelease)),
        )),
        Arc::new(BooleanArray::from_iter(records.iter().map(|r| Some(r.is_draft)))),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.provenance.as_str()),
        )),
        millis(records.iter().map(|r| r.fetched_at)),
    ];
    RecordBatch::try_new(releases().clone(), columns)
}

/// Build the population snapshot batch
pub fn repositories_batch(
    repos: &[Repository],
    fetched_at: DateTime<Utc>,
) -> Result<RecordBatch, ArrowError> {
    let mut topics = ListBuilder::new(StringBuilder::new());
    for repo in repos {
        for topic in &repo.topics {
            topics.values().append_value(topic);
        }
        topics.append(true);
    }
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(repos.iter().map(|r| r.github_id))),
        Arc::new(StringArray::from_iter_values(
            repos.iter().map(|r| r.key.owner.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            repos.iter().map(|r| r.key.name.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            repos.iter().map(|r| r.key.full_name()),
        )),
        Arc::new(Int64Array::from_iter_values(repos.iter().map(|r| r.stars))),
        millis(repos.iter().map(|r| r.created_at)),
        Arc::new(StringArray::from_iter(
            repos.iter().map(|r| r.language.as_deref()),
        )),
        Arc::new(topics.finish()),
        millis(repos.iter().map(|_| fetched_at)),
    ];
    RecordBatch::try_new(repositories().clone(), columns)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, ArrowError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| ArrowError::SchemaError(format!("missing or mistyped column {name}")))
}

fn to_datetime(ms: i64) -> Result<DateTime<Utc>, ArrowError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ArrowError::ComputeError(format!("timestamp out of range: {ms}")))
}

fn opt_str(array: &StringArray, i: usize) -> Option<String> {
    (!array.is_null(i)).then(|| array.value(i).to_string())
}

/// Decode a committed releases batch back into records
pub fn read_records(batch: &RecordBatch) -> Result<Vec<HistoryRecord>, ArrowError> {
    let repo = column::<StringArray>(batch, "repo_full_name")?;
    let release_id = column::<Int64Array>(batch, "release_id")?;
    let tag_name = column::<StringArray>(batch, "tag_name")?;
    let release_name = column::<StringArray>(batch, "release_name")?;
    let published_at = column::<TimestampMillisecondArray>(batch, "published_at")?;
    let is_prerelease = column::<BooleanArray>(batch, "is_prerelease")?;
    let is_draft = column::<BooleanArray>(batch, "is_draft")?;
    let source = column::<StringArray>(batch, "source")?;
    let fetched_at = column::<TimestampMillisecondArray>(batch, "fetched_at")?;

    (0..batch.num_rows())
        .map(|i| {
            let key = RepoKey::parse(repo.value(i)).ok_or_else(|| {
                ArrowError::ParseError(format!("bad repo name: {}", repo.value(i)))
            })?;
            let provenance = Provenance::from_name(source.value(i)).ok_or_else(|| {
                ArrowError::ParseError(format!("bad source: {}", source.value(i)))
            })?;
            Ok(HistoryRecord {
                repo: key,
                release_id: (!release_id.is_null(i)).then(|| release_id.value(i)),
                tag_name: tag_name.value(i).to_string(),
                release_name: opt_str(release_name, i),
                published_at: to_datetime(published_at.value(i))?,
                is_draft: is_draft.value(i),
                is_prerelease: is_prerelease.value(i),
                provenance,
                fetched_at: to_datetime(fetched_at.value(i))?,
            })
        })
        .collect()
}
