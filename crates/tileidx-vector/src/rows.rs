//! Conversions between JSON rows (the wire/API shape) and Arrow
//! `RecordBatch`es (the LanceDB storage shape).

use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float16Array, Float32Array, Float64Array, Int32Array, Int64Array,
    RecordBatch, StringArray,
};
use arrow_schema::{DataType, Schema};
use serde_json::{Map, Value};
use tileidx_core::{Result, TileidxError};

use crate::schema::VectorDType;

pub type Row = Map<String, Value>;

fn embedding_values(row: &Row, vector_col: &str) -> Result<Vec<f64>> {
    let v = row
        .get(vector_col)
        .ok_or_else(|| TileidxError::poison(format!("row missing '{vector_col}' field")))?;
    v.as_array()
        .ok_or_else(|| TileidxError::poison(format!("'{vector_col}' must be an array")))?
        .iter()
        .map(|x| x.as_f64().ok_or_else(|| TileidxError::poison(format!("'{vector_col}' must contain numbers"))))
        .collect()
}

/// Build a `RecordBatch` from caller rows, dropping any keys outside the
/// schema (spec §4.3: "row columns outside the schema are dropped silently").
pub fn rows_to_record_batch(
    schema: &Schema,
    rows: &[Row],
    vector_col: &str,
    dim: i32,
    dtype: VectorDType,
) -> Result<RecordBatch> {
    let mut ordered: Vec<Arc<dyn Array>> = Vec::with_capacity(schema.fields().len());

    for field in schema.fields() {
        if field.name() == vector_col {
            ordered.push(build_embedding_column(rows, vector_col, dim, dtype)?);
            continue;
        }
        let col: Arc<dyn Array> = match field.data_type() {
            DataType::Utf8 => Arc::new(StringArray::from(
                rows.iter().map(|r| r.get(field.name()).and_then(Value::as_str).map(str::to_string)).collect::<Vec<_>>(),
            )),
            DataType::Int32 => Arc::new(Int32Array::from(
                rows.iter().map(|r| r.get(field.name()).and_then(Value::as_i64).map(|v| v as i32)).collect::<Vec<_>>(),
            )),
            DataType::Int64 => Arc::new(Int64Array::from(
                rows.iter().map(|r| r.get(field.name()).and_then(Value::as_i64)).collect::<Vec<_>>(),
            )),
            DataType::Float64 => Arc::new(Float64Array::from(
                rows.iter().map(|r| r.get(field.name()).and_then(Value::as_f64)).collect::<Vec<_>>(),
            )),
            other => {
                return Err(TileidxError::Internal(format!("unsupported catalog column type {other:?}")))
            }
        };
        ordered.push(col);
    }

    RecordBatch::try_new(Arc::new(schema.clone()), ordered)
        .map_err(|e| TileidxError::Internal(format!("record batch build failed: {e}")))
}

fn build_embedding_column(rows: &[Row], vector_col: &str, dim: i32, dtype: VectorDType) -> Result<Arc<dyn Array>> {
    let mut flat = Vec::with_capacity(rows.len() * dim as usize);
    for row in rows {
        let values = embedding_values(row, vector_col)?;
        if values.len() != dim as usize {
            return Err(TileidxError::DimMismatch { expected: dim as usize, got: values.len() });
        }
        flat.extend(values);
    }

    match dtype {
        VectorDType::Float32 => {
            let values = Float32Array::from(flat.iter().map(|v| *v as f32).collect::<Vec<_>>());
            let list = FixedSizeListArray::try_new_from_values(values, dim)
                .map_err(|e| TileidxError::Internal(format!("fixed size list build failed: {e}")))?;
            Ok(Arc::new(list))
        }
        VectorDType::Float16 => {
            let values = Float16Array::from(flat.iter().map(|v| half::f16::from_f64(*v)).collect::<Vec<_>>());
            let list = FixedSizeListArray::try_new_from_values(values, dim)
                .map_err(|e| TileidxError::Internal(format!("fixed size list build failed: {e}")))?;
            Ok(Arc::new(list))
        }
    }
}

/// Flatten a `RecordBatch` back into JSON rows (search results, sampling,
/// export). The distance column (`_distance`), if present, is preserved.
pub fn record_batch_to_rows(batch: &RecordBatch) -> Vec<Row> {
    let mut rows = vec![Map::new(); batch.num_rows()];
    for field in batch.schema().fields() {
        let array = batch.column_by_name(field.name()).unwrap();
        for (i, row) in rows.iter_mut().enumerate() {
            let value = array_value_at(array.as_ref(), i);
            row.insert(field.name().clone(), value);
        }
    }
    rows
}

fn array_value_at(array: &dyn Array, i: usize) -> Value {
    use arrow_array::cast::AsArray;
    if array.is_null(i) {
        return Value::Null;
    }
    if let Some(a) = array.as_any().downcast_ref::<StringArray>() {
        return Value::String(a.value(i).to_string());
    }
    if let Some(a) = array.as_any().downcast_ref::<Int32Array>() {
        return Value::from(a.value(i));
    }
    if let Some(a) = array.as_any().downcast_ref::<Int64Array>() {
        return Value::from(a.value(i));
    }
    if let Some(a) = array.as_any().downcast_ref::<Float32Array>() {
        return serde_json::Number::from_f64(a.value(i) as f64).map(Value::Number).unwrap_or(Value::Null);
    }
    if let Some(a) = array.as_any().downcast_ref::<Float64Array>() {
        return serde_json::Number::from_f64(a.value(i)).map(Value::Number).unwrap_or(Value::Null);
    }
    if let Some(a) = array.as_fixed_size_list_opt() {
        let inner = a.value(i);
        let nums: Vec<Value> = (0..inner.len())
            .map(|j| array_value_at(inner.as_ref(), j))
            .collect();
        return Value::Array(nums);
    }
    Value::Null
}
