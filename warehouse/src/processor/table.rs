use crate::models::{StarTable, TableRow};
use crate::storage::StorageLocation;
use crate::utils::arrow::conform_batch;
use crate::utils::paths::{DEFAULT_PARTITION, unescape_path_name};
use arrow::array::{Array, ArrayRef, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use common::Result;
use datafusion::datasource::file_format::options::ParquetReadOptions;
use datafusion::prelude::SessionContext;
use std::sync::Arc;
use tracing::debug;

/// Exposes written tables to DataFusion so they can be read back.
#[async_trait]
pub trait TableRegistry: Send + Sync + 'static {
    async fn register_table(&self, table: StarTable) -> Result<()>;

    async fn deregister_table(&self, table: StarTable) -> Result<()>;

    /// All rows of a registered table, with partition columns restored to
    /// their declared types and positions.
    async fn read_batches(&self, table: StarTable) -> Result<Vec<RecordBatch>>;
}

pub struct ParquetTableRegistry {
    ctx: SessionContext,
    location: StorageLocation,
}

impl ParquetTableRegistry {
    pub fn new(location: StorageLocation) -> Result<Self> {
        let ctx = SessionContext::new();
        ctx.register_object_store(&location.object_store_url()?, location.store().clone());
        Ok(Self { ctx, location })
    }

    /// Registers, reads and converts a whole table into its row type.
    pub async fn read_rows<T: TableRow>(&self) -> Result<Vec<T>> {
        self.register_table(T::TABLE).await?;
        let batches = self.read_batches(T::TABLE).await;
        self.deregister_table(T::TABLE).await?;

        let mut rows = Vec::new();
        for batch in batches? {
            rows.extend(T::from_record_batch(&batch)?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl TableRegistry for ParquetTableRegistry {
    async fn register_table(&self, table: StarTable) -> Result<()> {
        let table_url = self.location.child_url(table.as_str())?;
        let file_schema = file_schema(table);
        let partition_cols = table
            .partition_columns()
            .iter()
            .map(|c| (c.to_string(), DataType::Utf8))
            .collect();

        let options = ParquetReadOptions::default()
            .schema(&file_schema)
            .table_partition_cols(partition_cols);

        // Clean up existing registration if present
        let _ = self.ctx.deregister_table(table.as_str());

        self.ctx
            .register_parquet(table.as_str(), table_url.as_str(), options)
            .await
            .map_err(|e| {
                common::Error::Other(format!(
                    "Failed to register {} at {}: {}",
                    table.as_str(),
                    table_url,
                    e
                ))
            })?;
        debug!(table = table.as_str(), url = %table_url, "Registered table");
        Ok(())
    }

    async fn deregister_table(&self, table: StarTable) -> Result<()> {
        self.ctx.deregister_table(table.as_str())?;
        Ok(())
    }

    async fn read_batches(&self, table: StarTable) -> Result<Vec<RecordBatch>> {
        let batches = self.ctx.table(table.as_str()).await?.collect().await?;
        let schema = table.schema();

        batches
            .iter()
            .map(|batch| conform_batch(&decode_partitions(batch, table.partition_columns())?, &schema))
            .collect()
    }
}

/// The columns actually stored in the part files.
fn file_schema(table: StarTable) -> Schema {
    let schema = table.schema();
    let partition_columns = table.partition_columns();
    Schema::new(
        schema
            .fields()
            .iter()
            .filter(|f| !partition_columns.contains(&f.name().as_str()))
            .cloned()
            .collect::<Vec<_>>(),
    )
}

/// Turns directory-name partition values back into plain strings: the
/// default-partition marker becomes null and escapes are undone.
fn decode_partitions(batch: &RecordBatch, partition_columns: &[&str]) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        if !partition_columns.contains(&field.name().as_str()) {
            fields.push(field.as_ref().clone());
            columns.push(column.clone());
            continue;
        }

        let text = cast(column, &DataType::Utf8)?;
        let text = text
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                common::Error::SchemaMismatch(format!(
                    "Partition column '{}' could not be read as text",
                    field.name()
                ))
            })?;
        let decoded: StringArray = text
            .iter()
            .map(|value| match value {
                Some(DEFAULT_PARTITION) | None => None,
                Some(v) => Some(unescape_path_name(v)),
            })
            .collect();

        fields.push(field.as_ref().clone().with_data_type(DataType::Utf8).with_nullable(true));
        columns.push(Arc::new(decoded));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_schema_drops_partition_columns() {
        let names = |table: StarTable| -> Vec<String> {
            file_schema(table)
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .collect()
        };

        assert_eq!(names(StarTable::Songs), vec!["song_id", "title", "duration"]);
        assert_eq!(names(StarTable::Artists).len(), 5);
        assert!(!names(StarTable::Time).contains(&"year".to_string()));
        assert!(!names(StarTable::Songplays).contains(&"month".to_string()));
    }

    #[test]
    fn test_decode_partitions() {
        let schema = Arc::new(Schema::new(vec![
            arrow::datatypes::Field::new("song_id", DataType::Utf8, true),
            arrow::datatypes::Field::new("artist_id", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["SO1", "SO2"])),
                Arc::new(StringArray::from(vec!["AR%2F2", DEFAULT_PARTITION])),
            ],
        )
        .unwrap();

        let decoded = decode_partitions(&batch, &["artist_id"]).unwrap();
        let artist_ids = decoded
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(artist_ids.value(0), "AR/2");
        assert!(artist_ids.is_null(1));
        assert_eq!(decoded.column(0).len(), 2);
    }
}
