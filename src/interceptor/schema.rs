// SPDX-License-Identifier: Apache-2.0

//! History table migration
//!
//! Creates `<table><suffix>` companions for base tables, typing the copied
//! `id` column after the base table's own `id` when the catalog has one.

use tracing::{debug, info, instrument};

use super::ident::{history_parts, quote, quote_qualified, split_qualified};
use super::inflect::{plural, to_snake_case};
use super::materialize::collect_rows;
use super::types::SchemaConfig;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{Database, Transaction};
use crate::engine::types::Value;

/// Id column type used when the base table has no `id` column
pub const FALLBACK_ID_TYPE: &str = "UUID";

/// Supplies the table name for a model
pub trait TableNamer {
    fn table_name(&self) -> String;
}

/// Something a table name can be resolved from
pub enum TableTarget<'a> {
    /// Explicit, possibly schema-qualified name
    Name(String),
    /// Value that knows its own table name
    Named(&'a dyn TableNamer),
    /// Type name, mapped to a plural snake_case table name
    Type(&'static str),
}

impl<'a> TableTarget<'a> {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Targets the conventional table of `T`, e.g. `OrderItem` -> `order_items`
    pub fn of<T: ?Sized>() -> Self {
        Self::Type(std::any::type_name::<T>())
    }

    pub fn resolve(&self) -> EngineResult<String> {
        match self {
            Self::Name(name) => non_empty(name, "Empty table name"),
            Self::Named(namer) => non_empty(&namer.table_name(), "TableNamer returned an empty name"),
            Self::Type(type_name) => {
                let base = type_name
                    .split('<')
                    .next()
                    .and_then(|path| path.rsplit("::").next())
                    .unwrap_or_default()
                    .trim();
                if base.is_empty() {
                    return Err(EngineError::validation(format!(
                        "Cannot derive a table name from type {}",
                        type_name
                    )));
                }
                Ok(plural(&to_snake_case(base)))
            }
        }
    }
}

impl<'a> From<&str> for TableTarget<'a> {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl<'a> From<String> for TableTarget<'a> {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

fn non_empty(name: &str, message: &str) -> EngineResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::validation(message));
    }
    Ok(name.to_string())
}

/// Base table as found in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseTable {
    pub schema: String,
    pub table: String,
    /// `format_type` of the `id` column, if any
    pub id_type: Option<String>,
}

impl BaseTable {
    pub fn ident(&self) -> String {
        quote_qualified(&[self.schema.as_str(), self.table.as_str()])
    }
}

const BASE_TABLE_QUERY: &str = "\
SELECT n.nspname AS schema_name,
       r.relname AS table_name,
       pg_catalog.format_type(a.atttypid, a.atttypmod) AS id_type
FROM pg_catalog.pg_class r
JOIN pg_catalog.pg_namespace n ON n.oid = r.relnamespace
LEFT JOIN (
    SELECT attrelid, atttypid, atttypmod
    FROM pg_catalog.pg_attribute
    WHERE attname = 'id' AND attnum > 0 AND NOT attisdropped
) AS a ON a.attrelid = r.oid
WHERE n.nspname = $1 AND r.relname = $2";

/// Splits a resolved name into (schema, table)
fn schema_and_table(name: &str, default_schema: &str) -> EngineResult<(String, String)> {
    let mut parts = split_qualified(name);
    match parts.len() {
        1 => Ok((default_schema.to_string(), parts.remove(0))),
        2 => {
            let table = parts.remove(1);
            Ok((parts.remove(0), table))
        }
        0 => Err(EngineError::validation(format!(
            "Invalid table identifier {:?}",
            name
        ))),
        _ => Err(EngineError::validation(format!(
            "Unsupported table identifier {:?}",
            name
        ))),
    }
}

async fn find_base_table<T: Transaction>(
    tx: &mut T,
    schema: &str,
    table: &str,
) -> EngineResult<BaseTable> {
    let params = [Value::from(schema), Value::from(table)];
    let rows = collect_rows(tx.fetch(BASE_TABLE_QUERY, &params)).await?;
    let Some(row) = rows.into_iter().next() else {
        return Err(EngineError::validation(format!(
            "Table {}.{} not found",
            schema, table
        )));
    };

    let text = |key: &str| row.get(key).and_then(|v| v.as_str()).map(str::to_string);
    Ok(BaseTable {
        schema: text("schema_name").unwrap_or_else(|| schema.to_string()),
        table: text("table_name").unwrap_or_else(|| table.to_string()),
        id_type: text("id_type").filter(|t| !t.is_empty()),
    })
}

/// DDL for the history table of `base`: CREATE TABLE, then the optional index
pub fn history_table_ddl(base: &BaseTable, config: &SchemaConfig) -> EngineResult<Vec<String>> {
    let suffix = if config.history_suffix.is_empty() {
        super::types::DEFAULT_HISTORY_SUFFIX
    } else {
        config.history_suffix.as_str()
    };
    let parts = history_parts(&base.ident(), suffix);
    let history_ident = quote_qualified(&parts);
    let Some(history_table) = parts.last() else {
        return Err(EngineError::validation(format!(
            "Invalid history identifier for {}",
            base.ident()
        )));
    };

    let id_type = base.id_type.as_deref().unwrap_or(FALLBACK_ID_TYPE);
    let columns = [
        "history_id BIGSERIAL PRIMARY KEY".to_string(),
        format!("id {}", id_type),
        "operation TEXT NOT NULL".to_string(),
        "operated_at TIMESTAMPTZ NOT NULL".to_string(),
        "operated_by TEXT".to_string(),
        "trace_id TEXT".to_string(),
        "reason TEXT".to_string(),
        "before JSONB".to_string(),
        "after JSONB".to_string(),
    ];

    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        history_ident,
        columns.join(",\n    ")
    )];
    if config.create_id_index {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (id)",
            quote(&format!("idx_{}_id", history_table)),
            history_ident
        ));
    }
    Ok(statements)
}

/// Creates history tables for every target, all in one transaction
///
/// Returns the base tables that were migrated.
#[instrument(skip_all, fields(targets = targets.len()))]
pub async fn migrate<D: Database>(
    db: &D,
    config: &SchemaConfig,
    targets: &[TableTarget<'_>],
) -> EngineResult<Vec<BaseTable>> {
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let names = targets
        .iter()
        .map(TableTarget::resolve)
        .collect::<EngineResult<Vec<_>>>()?;

    let mut tx = db.begin().await?;
    match migrate_in(&mut tx, config, &names).await {
        Ok(tables) => {
            tx.commit().await?;
            info!("Created history tables for {} base tables", tables.len());
            Ok(tables)
        }
        Err(e) => {
            tx.rollback().await?;
            Err(e)
        }
    }
}

async fn migrate_in<T: Transaction>(
    tx: &mut T,
    config: &SchemaConfig,
    names: &[String],
) -> EngineResult<Vec<BaseTable>> {
    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let (schema, table) = schema_and_table(name, &config.default_schema)?;
        let base = find_base_table(tx, &schema, &table).await?;
        for statement in history_table_ddl(&base, config)? {
            debug!(table = %base.ident(), "Running history DDL");
            tx.execute(&statement, &[]).await?;
        }
        tables.push(base);
    }
    Ok(tables)
}
