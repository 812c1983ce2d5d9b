use arrow::array::{
    Array, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, LargeStringArray,
    StringArray, UInt32Array, UInt64Array,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use dv_core::{Row, Value};

use crate::DataError;

macro_rules! push_numeric {
    ($column:expr, $array:ty, $rows:expr, $name:expr) => {{
        let array = $column
            .as_any()
            .downcast_ref::<$array>()
            .ok_or_else(|| DataError::UnsupportedType($name.to_string()))?;
        for (i, row) in $rows.iter_mut().enumerate() {
            let value = if array.is_null(i) {
                Value::Null
            } else {
                Value::Number(array.value(i) as f64)
            };
            row.insert($name.to_string(), value);
        }
    }};
}

/// Convert a record batch into rows, one per batch row, columns in schema order
pub fn rows_from_record_batch(batch: &RecordBatch) -> Result<Vec<Row>, DataError> {
    let mut rows = vec![Row::new(); batch.num_rows()];
    let schema = batch.schema();

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let name = field.name();
        match column.data_type() {
            DataType::Float64 => push_numeric!(column, Float64Array, rows, name),
            DataType::Float32 => push_numeric!(column, Float32Array, rows, name),
            DataType::Int64 => push_numeric!(column, Int64Array, rows, name),
            DataType::Int32 => push_numeric!(column, Int32Array, rows, name),
            DataType::UInt64 => push_numeric!(column, UInt64Array, rows, name),
            DataType::UInt32 => push_numeric!(column, UInt32Array, rows, name),
            DataType::Boolean => {
                let array = column
                    .as_any()
                    .downcast_ref::<BooleanArray>()
                    .ok_or_else(|| DataError::UnsupportedType(name.to_string()))?;
                for (i, row) in rows.iter_mut().enumerate() {
                    let value = if array.is_null(i) { Value::Null } else { Value::Bool(array.value(i)) };
                    row.insert(name.to_string(), value);
                }
            }
            DataType::Utf8 => {
                let array = column
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| DataError::UnsupportedType(name.to_string()))?;
                for (i, row) in rows.iter_mut().enumerate() {
                    let value = if array.is_null(i) { Value::Null } else { Value::from(array.value(i)) };
                    row.insert(name.to_string(), value);
                }
            }
            DataType::LargeUtf8 => {
                let array = column
                    .as_any()
                    .downcast_ref::<LargeStringArray>()
                    .ok_or_else(|| DataError::UnsupportedType(name.to_string()))?;
                for (i, row) in rows.iter_mut().enumerate() {
                    let value = if array.is_null(i) { Value::Null } else { Value::from(array.value(i)) };
                    row.insert(name.to_string(), value);
                }
            }
            other => {
                return Err(DataError::UnsupportedType(format!("{name}: {other:?}")));
            }
        }
    }

    Ok(rows)
}
