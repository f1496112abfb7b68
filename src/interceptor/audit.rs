// SPDX-License-Identifier: Apache-2.0

//! History Writer
//!
//! Turns buffered capture entries into rows of the matching history tables.
//! Runs inside the caller's transaction right before commit, one INSERT per
//! entry, in buffer order. The first failure stops the flush.

use std::collections::HashMap;

use tracing::{debug, instrument, trace};

use super::ident::{base_table_name, history_parts, quote_qualified, regclass_literal};
use super::inflect::singular;
use super::materialize::materialize_one;
use super::redact::RedactMap;
use super::types::{CaptureEntry, HistoryConfig, RowImage};
use crate::engine::context::CallContext;
use crate::engine::error::{EngineError, EngineResult, ImageDirection};
use crate::engine::traits::Transaction;
use crate::engine::types::Value;

/// Chooses the id copied into the history row
///
/// Looks for `id` in the before then the after image, then for
/// `<singular table>_id` in the same order. Absent everywhere yields null.
pub fn pick_id(table: &str, before: Option<&RowImage>, after: Option<&RowImage>) -> serde_json::Value {
    let lookup = |key: &str| {
        before
            .and_then(|image| image.get(key))
            .or_else(|| after.and_then(|image| image.get(key)))
            .cloned()
    };

    if let Some(id) = lookup("id") {
        return id;
    }
    let singular_id = format!("{}_id", singular(&base_table_name(table)));
    lookup(&singular_id).unwrap_or(serde_json::Value::Null)
}

/// INSERT for one history row
///
/// The id arrives as JSON and is converted through the history table's row
/// type, so it lands in whatever type the `id` column has.
pub(crate) fn insert_statement(history_ident: &str) -> String {
    format!(
        "INSERT INTO {ident} (id, operation, operated_at, operated_by, trace_id, reason, before, after)\n\
         SELECT r.id, $2, now(), $3, $4, $5, $6::jsonb, $7::jsonb\n\
         FROM jsonb_populate_record(NULL::{ident}, jsonb_build_object('id', $1::jsonb)) AS r",
        ident = history_ident
    )
}

/// Existence probe used when missing history tables are skipped
pub(crate) fn existence_query(history_parts: &[String]) -> String {
    format!(
        "SELECT to_regclass({}) IS NOT NULL AS present",
        regclass_literal(history_parts)
    )
}

/// A capture entry resolved to its history table and bound parameters
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HistoryRow {
    pub history_parts: Vec<String>,
    pub history_ident: String,
    pub params: Vec<Value>,
}

fn encode(image: &Option<RowImage>, direction: ImageDirection) -> EngineResult<String> {
    serde_json::to_string(image).map_err(|e| EngineError::encoding(direction, e.to_string()))
}

fn optional_text(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

/// Redacts, picks the id, encodes images and resolves the history table
pub(crate) fn prepare(
    entry: &CaptureEntry,
    suffix: &str,
    redact: &RedactMap,
) -> EngineResult<HistoryRow> {
    let before = entry.before.as_ref().map(|image| redact.apply(image));
    let after = entry.after.as_ref().map(|image| redact.apply(image));

    let id = pick_id(&entry.table, before.as_ref(), after.as_ref());
    let before_json = encode(&before, ImageDirection::Before)?;
    let after_json = encode(&after, ImageDirection::After)?;

    let parts = history_parts(&entry.table, suffix);
    let history_ident = quote_qualified(&parts);
    if history_ident.is_empty() {
        return Err(EngineError::validation(format!(
            "Invalid history table identifier for {:?}",
            entry.table
        )));
    }

    Ok(HistoryRow {
        history_parts: parts,
        history_ident,
        params: vec![
            Value::Json(id),
            Value::Text(entry.operation.as_str().to_string()),
            optional_text(&entry.meta.operator),
            optional_text(&entry.meta.trace_id),
            optional_text(&entry.meta.reason),
            Value::Text(before_json),
            Value::Text(after_json),
        ],
    })
}

async fn history_table_exists<T: Transaction>(
    tx: &mut T,
    ctx: &CallContext,
    parts: &[String],
) -> EngineResult<bool> {
    let sql = existence_query(parts);
    let image = ctx.run(materialize_one(tx.fetch(&sql, &[]))).await?;
    Ok(image
        .get("present")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false))
}

/// Writes every entry to its history table; returns the number of rows written
#[instrument(skip_all, fields(entries = entries.len(), skip_if_missing = config.skip_if_missing))]
pub(crate) async fn flush<T: Transaction>(
    tx: &mut T,
    ctx: &CallContext,
    entries: Vec<CaptureEntry>,
    config: &HistoryConfig,
    redact: &RedactMap,
) -> EngineResult<usize> {
    if entries.is_empty() {
        return Ok(0);
    }

    let mut present: HashMap<String, bool> = HashMap::new();
    let mut written = 0;

    for entry in &entries {
        let row = prepare(entry, &config.history_suffix, redact)?;

        if config.skip_if_missing {
            let exists = match present.get(&row.history_ident) {
                Some(exists) => *exists,
                None => {
                    let exists = history_table_exists(tx, ctx, &row.history_parts).await?;
                    present.insert(row.history_ident.clone(), exists);
                    exists
                }
            };
            if !exists {
                trace!(table = %row.history_ident, "History table missing, entry skipped");
                continue;
            }
        }

        let sql = insert_statement(&row.history_ident);
        ctx.run(tx.execute(&sql, &row.params))
            .await
            .map_err(|e| match e {
                EngineError::Cancelled | EngineError::DeadlineExceeded => e,
                other => EngineError::history_write(&row.history_ident, other.to_string()),
            })?;
        written += 1;
    }

    debug!("Flushed {} of {} history entries", written, entries.len());
    Ok(written)
}
