// SPDX-License-Identifier: Apache-2.0

//! Universal data types for the history engine
//!
//! These types sit between the database driver and the capture layer:
//! bound parameters, scanned rows, and execution results.

use futures::stream::BoxStream;

use crate::engine::error::{EngineError, EngineResult};

/// Universal value representation
///
/// Used both for positional statement parameters and for values scanned
/// out of result rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A single row as handed back by a driver cursor
///
/// Columnar layout: `columns[i]` names `values[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedRow {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl ScannedRow {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }
}

/// An open result cursor. Dropping the stream closes it.
pub type RowStream<'a> = BoxStream<'a, EngineResult<ScannedRow>>;

/// Outcome of a statement executed through a tracked transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    rows_affected: u64,
    captured: bool,
}

impl ExecResult {
    /// Result of a statement passed straight to the driver
    pub fn passthrough(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            captured: false,
        }
    }

    /// Result of a statement re-issued as a row-returning query
    pub fn captured(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            captured: true,
        }
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Whether row images were captured for this statement
    pub fn is_captured(&self) -> bool {
        self.captured
    }

    /// Generated keys are never available.
    pub fn last_insert_id(&self) -> EngineResult<i64> {
        if self.captured {
            Err(EngineError::not_supported(
                "last insert id is unavailable for captured statements",
            ))
        } else {
            Err(EngineError::not_supported(
                "last insert id is not reported by PostgreSQL; use RETURNING",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_values_map_to_null() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }

    #[test]
    fn captured_result_refuses_generated_keys() {
        let result = ExecResult::captured(3);
        assert_eq!(result.rows_affected(), 3);
        assert!(result.is_captured());
        let err = result.last_insert_id().unwrap_err();
        assert!(matches!(err, EngineError::NotSupported { .. }));
    }
}
