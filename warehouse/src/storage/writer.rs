use super::StorageLocation;
use crate::models::{StarTable, TableRow};
use crate::utils::arrow::partition_value;
use crate::utils::paths::{PathBuilder, part_file_name};
use arrow::array::UInt32Array;
use arrow::compute::take_record_batch;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Error, Result};
use futures::{StreamExt, TryStreamExt};
use object_store::ObjectStore;
use object_store::path::Path;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::{debug, info};

pub const SUCCESS_MARKER: &str = "_SUCCESS";
pub const TABLE_METADATA_KEY: &str = "sparkify.table";
pub const PARTITION_METADATA_KEY: &str = "sparkify.partition_columns";

/// Contents of the `_SUCCESS` marker left in a table directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteSummary {
    pub table: String,
    pub row_count: usize,
    /// Part files relative to the table directory, in write order.
    pub files: Vec<String>,
    pub partition_columns: Vec<String>,
    pub written_at: DateTime<Utc>,
}

/// Persists one table under a storage root, replacing whatever was there.
#[async_trait]
pub trait TableWriter: Send + Sync {
    async fn write(
        &self,
        table: StarTable,
        batch: RecordBatch,
        location: &StorageLocation,
    ) -> Result<WriteSummary>;
}

/// Writes Hive-style `col=value/` directories of Parquet part files.
/// Partition columns live only in the directory names.
pub struct PartitionedWriter {
    max_rows_per_file: usize,
}

impl PartitionedWriter {
    pub fn new(max_rows_per_file: usize) -> Self {
        Self {
            max_rows_per_file: max_rows_per_file.max(1),
        }
    }

    pub async fn write_rows<T: TableRow>(
        &self,
        rows: &[T],
        location: &StorageLocation,
    ) -> Result<WriteSummary> {
        let batch = T::to_record_batch(rows)?;
        self.write(T::TABLE, batch, location).await
    }

    async fn clear(&self, table: StarTable, store: &dyn ObjectStore, table_path: &Path) -> Result<usize> {
        let existing = store
            .list(Some(table_path))
            .map_ok(|meta| meta.location)
            .boxed();
        let deleted: Vec<Path> = store
            .delete_stream(existing)
            .try_collect()
            .await
            .map_err(|e| write_failure(table, table_path, e))?;
        Ok(deleted.len())
    }
}

#[async_trait]
impl TableWriter for PartitionedWriter {
    async fn write(
        &self,
        table: StarTable,
        batch: RecordBatch,
        location: &StorageLocation,
    ) -> Result<WriteSummary> {
        let store = location.store().as_ref();
        let table_path = location.child_path(table.as_str())?;
        let partition_columns = table.partition_columns();

        let deleted = self.clear(table, store, &table_path).await?;
        if deleted > 0 {
            debug!(table = table.as_str(), deleted, "Removed previous table contents");
        }

        let groups = group_by_partition(&batch, partition_columns)?;
        let data = project_out(&batch, partition_columns)?;
        let properties = writer_properties(table);

        let mut files = Vec::new();
        for (values, rows) in groups {
            let group = take_record_batch(&data, &UInt32Array::from(rows))?;

            let mut dir = PathBuilder::new("");
            for (column, value) in partition_columns.iter().zip(&values) {
                dir = dir.with_partition(column, value.as_deref());
            }

            for (index, chunk) in chunks(&group, self.max_rows_per_file).into_iter().enumerate() {
                let relative = dir.build_file_path(&part_file_name(index));
                let path = Path::parse(format!("{}/{}", table_path, relative))?;

                let bytes = encode_parquet(&chunk, properties.clone())?;
                store
                    .put(&path, bytes.into())
                    .await
                    .map_err(|e| write_failure(table, &path, e))?;
                files.push(relative);
            }
        }

        let summary = WriteSummary {
            table: table.as_str().to_string(),
            row_count: batch.num_rows(),
            files,
            partition_columns: partition_columns.iter().map(|c| c.to_string()).collect(),
            written_at: Utc::now(),
        };

        let marker = Path::parse(format!("{}/{}", table_path, SUCCESS_MARKER))?;
        store
            .put(&marker, serde_json::to_vec_pretty(&summary)?.into())
            .await
            .map_err(|e| write_failure(table, &marker, e))?;

        info!(
            table = table.as_str(),
            rows = summary.row_count,
            files = summary.files.len(),
            path = %table_path,
            "Table written"
        );
        Ok(summary)
    }
}

fn write_failure(table: StarTable, path: &Path, reason: impl Display) -> Error {
    Error::WriteFailure {
        table: table.as_str().to_string(),
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Row indices per distinct tuple of partition values, ordered by the tuple.
/// An unpartitioned table is one group, even when empty.
fn group_by_partition(
    batch: &RecordBatch,
    partition_columns: &[&str],
) -> Result<BTreeMap<Vec<Option<String>>, Vec<u32>>> {
    let mut groups: BTreeMap<Vec<Option<String>>, Vec<u32>> = BTreeMap::new();
    if partition_columns.is_empty() {
        groups.insert(Vec::new(), (0..batch.num_rows() as u32).collect());
        return Ok(groups);
    }

    let arrays = partition_columns
        .iter()
        .map(|name| {
            batch.column_by_name(name).ok_or_else(|| {
                Error::SchemaMismatch(format!("Partition column '{}' missing from table", name))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    for row in 0..batch.num_rows() {
        let key = arrays
            .iter()
            .map(|array| partition_value(array.as_ref(), row))
            .collect::<Result<Vec<_>>>()?;
        groups.entry(key).or_default().push(row as u32);
    }
    Ok(groups)
}

fn project_out(batch: &RecordBatch, partition_columns: &[&str]) -> Result<RecordBatch> {
    let keep: Vec<usize> = batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| !partition_columns.contains(&field.name().as_str()))
        .map(|(idx, _)| idx)
        .collect();
    Ok(batch.project(&keep)?)
}

fn chunks(batch: &RecordBatch, max_rows: usize) -> Vec<RecordBatch> {
    if batch.num_rows() == 0 {
        return vec![batch.clone()];
    }
    (0..batch.num_rows())
        .step_by(max_rows)
        .map(|offset| batch.slice(offset, max_rows.min(batch.num_rows() - offset)))
        .collect()
}

fn writer_properties(table: StarTable) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_dictionary_enabled(true)
        .set_key_value_metadata(Some(vec![
            KeyValue::new(TABLE_METADATA_KEY.to_string(), table.as_str().to_string()),
            KeyValue::new(
                PARTITION_METADATA_KEY.to_string(),
                table.partition_columns().join(","),
            ),
        ]))
        .build()
}

fn encode_parquet(batch: &RecordBatch, properties: WriterProperties) -> Result<Vec<u8>> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(properties))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Artist, Song};
    use bytes::Bytes;
    use object_store::memory::InMemory;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::sync::Arc;

    fn location() -> StorageLocation {
        StorageLocation::new(Arc::new(InMemory::new()), "memory:///out").unwrap()
    }

    async fn listing(location: &StorageLocation) -> Vec<String> {
        let mut paths: Vec<String> = location
            .store()
            .list(None)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .unwrap();
        paths.sort();
        paths
    }

    fn song(song_id: &str, artist_id: Option<&str>, year: Option<i32>) -> Song {
        Song {
            song_id: Some(song_id.to_string()),
            title: Some(format!("title of {}", song_id)),
            artist_id: artist_id.map(str::to_string),
            year,
            duration: Some(100.0),
        }
    }

    #[tokio::test]
    async fn test_partition_layout() {
        let location = location();
        let rows = vec![
            song("SO1", Some("AR1"), Some(2000)),
            song("SO2", Some("AR1"), Some(2000)),
            song("SO3", Some("AR/2"), None),
        ];

        let summary = PartitionedWriter::new(100)
            .write_rows(&rows, &location)
            .await
            .unwrap();

        assert_eq!(summary.row_count, 3);
        assert_eq!(summary.partition_columns, vec!["year", "artist_id"]);
        assert_eq!(
            listing(&location).await,
            vec![
                "out/songs/_SUCCESS",
                "out/songs/year=2000/artist_id=AR1/part-00000.parquet",
                "out/songs/year=__HIVE_DEFAULT_PARTITION__/artist_id=AR%2F2/part-00000.parquet",
            ]
        );
    }

    #[tokio::test]
    async fn test_part_files_omit_partition_columns() {
        let location = location();
        let rows = vec![song("SO1", Some("AR1"), Some(2000))];
        PartitionedWriter::new(100).write_rows(&rows, &location).await.unwrap();

        let path = Path::parse("out/songs/year=2000/artist_id=AR1/part-00000.parquet").unwrap();
        let bytes: Bytes = location.store().get(&path).await.unwrap().bytes().await.unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes).unwrap();

        let names: Vec<_> = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec!["song_id", "title", "duration"]);

        let metadata = builder.metadata().file_metadata().key_value_metadata().unwrap();
        assert!(metadata
            .iter()
            .any(|kv| kv.key == TABLE_METADATA_KEY && kv.value.as_deref() == Some("songs")));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_previous_contents() {
        let location = location();
        let writer = PartitionedWriter::new(100);

        writer
            .write_rows(&[song("SO1", Some("AR1"), Some(1999))], &location)
            .await
            .unwrap();
        writer
            .write_rows(&[song("SO2", Some("AR2"), Some(2001))], &location)
            .await
            .unwrap();

        let paths = listing(&location).await;
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| !p.contains("year=1999")));
    }

    #[tokio::test]
    async fn test_empty_unpartitioned_table_gets_one_file() {
        let location = location();
        let summary = PartitionedWriter::new(100)
            .write_rows::<Artist>(&[], &location)
            .await
            .unwrap();

        assert_eq!(summary.row_count, 0);
        assert_eq!(summary.files, vec!["part-00000.parquet"]);
    }

    #[tokio::test]
    async fn test_large_partitions_are_split() {
        let location = location();
        let rows: Vec<Song> = (0..5)
            .map(|i| song(&format!("SO{}", i), Some("AR1"), Some(2000)))
            .collect();

        let summary = PartitionedWriter::new(2).write_rows(&rows, &location).await.unwrap();
        assert_eq!(
            summary.files,
            vec![
                "year=2000/artist_id=AR1/part-00000.parquet",
                "year=2000/artist_id=AR1/part-00001.parquet",
                "year=2000/artist_id=AR1/part-00002.parquet",
            ]
        );

        let marker = Path::parse("out/songs/_SUCCESS").unwrap();
        let bytes = location.store().get(&marker).await.unwrap().bytes().await.unwrap();
        let stored: WriteSummary = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stored, summary);
    }
}
