//! Row materialization
//!
//! Reduces a driver cursor into column-keyed row images. The cursor is
//! consumed by value, so it is closed on every exit path.

use futures::TryStreamExt;

use super::types::RowImage;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::{RowStream, ScannedRow, Value};

/// Converts a scanned value into its JSON form
///
/// Byte values holding valid JSON are decoded; any other bytes are kept as
/// text.
pub fn value_to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(b),
        Value::Int(i) => serde_json::Value::from(i),
        Value::Float(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s),
        Value::Bytes(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }),
        Value::Json(j) => j,
        Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(value_to_json).collect())
        }
    }
}

/// Pairs column names with values
pub fn row_image(row: ScannedRow) -> RowImage {
    row.columns
        .into_iter()
        .zip(row.values)
        .map(|(column, value)| (column, value_to_json(value)))
        .collect()
}

/// Returns the first row, failing with `NoRows` on an empty cursor
pub async fn materialize_one(mut rows: RowStream<'_>) -> EngineResult<RowImage> {
    match rows.try_next().await? {
        Some(row) => Ok(row_image(row)),
        None => Err(EngineError::NoRows),
    }
}

/// Returns every row in cursor order, failing with `NoRows` on an empty cursor
pub async fn materialize_all(rows: RowStream<'_>) -> EngineResult<Vec<RowImage>> {
    let images = collect_rows(rows).await?;
    if images.is_empty() {
        return Err(EngineError::NoRows);
    }
    Ok(images)
}

/// Same as [`materialize_all`] but an empty cursor is a valid result
pub(crate) async fn collect_rows(rows: RowStream<'_>) -> EngineResult<Vec<RowImage>> {
    rows.map_ok(row_image).try_collect().await
}
