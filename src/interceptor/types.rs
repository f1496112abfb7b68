//! Interceptor Types
//!
//! Type definitions for the history capture system.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::Value;
use crate::observability::Sensitive;

/// Snapshot of one row: column name to value
pub type RowImage = serde_json::Map<String, serde_json::Value>;

/// Data-mutating statement kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DmlOperation {
    Insert,
    Update,
    Delete,
}

impl DmlOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Returns true if captured rows describe the state before the change
    pub fn captures_before(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl fmt::Display for DmlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational context for audit trails
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMeta {
    pub operator: Option<String>,
    pub trace_id: Option<String>,
    pub reason: Option<String>,
}

impl fmt::Debug for AuditMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditMeta")
            .field("operator", &self.operator.as_ref().map(Sensitive::new))
            .field("trace_id", &self.trace_id)
            .field("reason", &self.reason)
            .finish()
    }
}

/// A captured change for a single row or statement
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureEntry {
    /// Table as written in the statement (possibly schema-qualified or quoted)
    pub table: String,
    pub operation: DmlOperation,
    /// Raw statement, kept only when no row image was captured
    pub sql: Option<String>,
    pub params: Vec<Value>,
    pub before: Option<RowImage>,
    pub after: Option<RowImage>,
    pub meta: AuditMeta,
}

impl CaptureEntry {
    /// Statement-level record without a row image
    pub fn statement(
        table: impl Into<String>,
        operation: DmlOperation,
        sql: impl Into<String>,
        params: Vec<Value>,
        meta: AuditMeta,
    ) -> Self {
        Self {
            table: table.into(),
            operation,
            sql: Some(sql.into()),
            params,
            before: None,
            after: None,
            meta,
        }
    }

    /// Row-level record; DELETE images land in `before`, others in `after`
    pub fn row(
        table: impl Into<String>,
        operation: DmlOperation,
        image: RowImage,
        meta: AuditMeta,
    ) -> Self {
        let (before, after) = if operation.captures_before() {
            (Some(image), None)
        } else {
            (None, Some(image))
        };
        Self {
            table: table.into(),
            operation,
            sql: None,
            params: Vec::new(),
            before,
            after,
            meta,
        }
    }

    pub fn has_image(&self) -> bool {
        self.before.is_some() || self.after.is_some()
    }
}

pub const DEFAULT_HISTORY_SUFFIX: &str = "_history";

fn default_history_suffix() -> String {
    DEFAULT_HISTORY_SUFFIX.to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

/// Configuration for history capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Suffix appended to the base table name, e.g. "_history"
    #[serde(default = "default_history_suffix")]
    pub history_suffix: String,
    /// Skip the history insert when the history table does not exist
    #[serde(default)]
    pub skip_if_missing: bool,
    /// Rewrite DML without RETURNING so row images are captured anyway
    #[serde(default)]
    pub capture_without_returning: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            history_suffix: default_history_suffix(),
            skip_if_missing: false,
            capture_without_returning: false,
        }
    }
}

impl HistoryConfig {
    /// Load configuration from a JSON file; a missing file yields defaults
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No history config file found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config(format!("Failed to read config: {}", e)))?;
        let config: HistoryConfig = serde_json::from_str(&content)
            .map_err(|e| EngineError::config(format!("Failed to parse config: {}", e)))?;

        Ok(config.normalized())
    }

    /// Replaces an empty suffix with the default one
    pub fn normalized(mut self) -> Self {
        if self.history_suffix.is_empty() {
            self.history_suffix = default_history_suffix();
        }
        self
    }
}

/// Configuration for history table creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default = "default_history_suffix")]
    pub history_suffix: String,
    /// Create an index on the history table's id column
    #[serde(default)]
    pub create_id_index: bool,
    /// Schema assumed for unqualified table names
    #[serde(default = "default_schema")]
    pub default_schema: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            history_suffix: default_history_suffix(),
            create_id_index: false,
            default_schema: default_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn image(v: serde_json::Value) -> RowImage {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn delete_rows_fill_before() {
        let entry = CaptureEntry::row(
            "orders",
            DmlOperation::Delete,
            image(json!({"id": 1})),
            AuditMeta::default(),
        );
        assert!(entry.before.is_some());
        assert!(entry.after.is_none());
        assert!(entry.sql.is_none());
    }

    #[test]
    fn insert_and_update_rows_fill_after() {
        for op in [DmlOperation::Insert, DmlOperation::Update] {
            let entry = CaptureEntry::row("orders", op, image(json!({"id": 1})), AuditMeta::default());
            assert!(entry.before.is_none());
            assert!(entry.after.is_some());
        }
    }

    #[test]
    fn statement_entries_keep_sql_and_params() {
        let entry = CaptureEntry::statement(
            "orders",
            DmlOperation::Update,
            "UPDATE orders SET x = $1",
            vec![Value::Int(1)],
            AuditMeta::default(),
        );
        assert!(!entry.has_image());
        assert_eq!(entry.sql.as_deref(), Some("UPDATE orders SET x = $1"));
        assert_eq!(entry.params, vec![Value::Int(1)]);
    }

    #[test]
    fn operator_is_redacted_in_debug_output() {
        let meta = AuditMeta {
            operator: Some("alice@example.com".to_string()),
            trace_id: Some("t-1".to_string()),
            reason: None,
        };
        let rendered = format!("{:?}", meta);
        assert!(!rendered.contains("alice"));
        assert!(rendered.contains("t-1"));
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: HistoryConfig = serde_json::from_str(r#"{"skip_if_missing": true}"#).unwrap();
        assert_eq!(config.history_suffix, "_history");
        assert!(config.skip_if_missing);
        assert!(!config.capture_without_returning);
    }

    #[test]
    fn config_loads_from_file_and_normalizes_suffix() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"history_suffix": "", "skip_if_missing": true}}"#).unwrap();

        let config = HistoryConfig::load(file.path()).unwrap();
        assert_eq!(config.history_suffix, "_history");
        assert!(config.skip_if_missing);
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HistoryConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(config.history_suffix, "_history");
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = HistoryConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }
}
