use arrow::array::{
    Array, ArrayRef, ArrowPrimitiveType, Int32Array, Int64Array, PrimitiveArray, StringArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use common::{Error, Result};

/// Looks up a column by name and downcasts it to the expected array type.
pub fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    let array = batch.column_by_name(name).ok_or_else(|| {
        Error::SchemaMismatch(format!("Column '{}' missing from record batch", name))
    })?;

    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::SchemaMismatch(format!(
            "Column '{}' has type {}, which does not match the table schema",
            name,
            array.data_type()
        ))
    })
}

pub fn string_value(array: &StringArray, row: usize) -> Option<String> {
    array.is_valid(row).then(|| array.value(row).to_string())
}

pub fn primitive_value<T: ArrowPrimitiveType>(
    array: &PrimitiveArray<T>,
    row: usize,
) -> Option<T::Native> {
    array.is_valid(row).then(|| array.value(row))
}

pub fn timestamp_from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        Error::Conversion(format!("{} ms is outside the supported timestamp range", millis))
    })
}

/// Reorders and casts the columns of `batch` to exactly match `schema`.
///
/// Tables read back through DataFusion carry partition columns at the end and
/// as strings; this puts them back where the table schema declares them.
pub fn conform_batch(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    let columns = schema
        .fields()
        .iter()
        .map(|field| {
            let array = batch.column_by_name(field.name()).ok_or_else(|| {
                Error::SchemaMismatch(format!("Column '{}' missing from table", field.name()))
            })?;
            if array.data_type() == field.data_type() {
                Ok(array.clone())
            } else {
                Ok(cast(array, field.data_type())?)
            }
        })
        .collect::<Result<Vec<ArrayRef>>>()?;

    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

/// Renders one cell of a partition column as the text used in its directory
/// name. `None` means the cell is null.
pub fn partition_value(array: &dyn Array, row: usize) -> Result<Option<String>> {
    if array.is_null(row) {
        return Ok(None);
    }

    let value = match array.data_type() {
        DataType::Utf8 => array
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|a| a.value(row).to_string()),
        DataType::Int32 => array
            .as_any()
            .downcast_ref::<Int32Array>()
            .map(|a| a.value(row).to_string()),
        DataType::Int64 => array
            .as_any()
            .downcast_ref::<Int64Array>()
            .map(|a| a.value(row).to_string()),
        other => {
            return Err(Error::InvalidInput(format!(
                "Cannot partition by a column of type {}",
                other
            )));
        }
    };

    value.map(Some).ok_or_else(|| {
        Error::SchemaMismatch(format!(
            "Partition column declared as {} could not be read",
            array.data_type()
        ))
    })
}
