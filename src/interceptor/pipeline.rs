// SPDX-License-Identifier: Apache-2.0

//! Capture Pipeline
//!
//! Wraps a database and its transactions so that data-changing statements
//! leave a trail in per-table history tables:
//! 1. Execution: classify the statement, run it, buffer what it changed
//! 2. Commit: flush the buffer into history tables, then commit
//! 3. Rollback: discard the buffer, then roll back

use std::borrow::Cow;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument, trace, warn};

use super::audit;
use super::buffer::CaptureBuffer;
use super::dml::{append_returning_all, parse_dml, DmlStatement};
use super::ident::history_parts;
use super::materialize::{collect_rows, materialize_all};
use super::redact::RedactMap;
use super::types::{CaptureEntry, HistoryConfig, RowImage};
use crate::engine::context::CallContext;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{Database, Transaction};
use crate::engine::types::{ExecResult, Value};

/// Shared capture settings and redaction rules
#[derive(Debug, Default)]
pub struct HistoryHandler {
    config: HistoryConfig,
    redact: RedactMap,
}

impl HistoryHandler {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config: config.normalized(),
            redact: RedactMap::new(),
        }
    }

    pub fn with_redact_map(mut self, redact: RedactMap) -> Self {
        self.redact = redact;
        self
    }

    /// Builder form of [`HistoryHandler::register_redactor`]
    pub fn with_redactor<F>(mut self, key: impl Into<String>, func: F) -> EngineResult<Self>
    where
        F: Fn(&str, &serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
    {
        self.register_redactor(key, func)?;
        Ok(self)
    }

    pub fn register_redactor<F>(&mut self, key: impl Into<String>, func: F) -> EngineResult<()>
    where
        F: Fn(&str, &serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
    {
        self.redact.register(key, func)
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn redact_map(&self) -> &RedactMap {
        &self.redact
    }

    /// Unquoted history table name for `base`, e.g. `public.orders_history`
    pub fn history_table_name(&self, base: &str) -> String {
        history_parts(base, &self.config.history_suffix).join(".")
    }

    /// Attaches history capture to a database
    pub fn wrap<D: Database>(self, db: D) -> TrackedDb<D> {
        TrackedDb::new(db, Arc::new(self))
    }
}

/// A database whose transactions capture history
pub struct TrackedDb<D> {
    db: D,
    handler: Arc<HistoryHandler>,
}

impl<D: Database> TrackedDb<D> {
    pub fn new(db: D, handler: Arc<HistoryHandler>) -> Self {
        Self { db, handler }
    }

    /// Starts a tracked transaction; `ctx` stays attached and governs the flush
    #[instrument(skip(self, ctx), fields(driver = self.db.driver_id()))]
    pub async fn begin(&self, ctx: CallContext) -> EngineResult<TrackedTransaction<D::Tx>> {
        let tx = ctx.run(self.db.begin()).await?;
        debug!("Tracked transaction started");
        Ok(TrackedTransaction::new(tx, Arc::clone(&self.handler), ctx))
    }

    pub fn inner(&self) -> &D {
        &self.db
    }

    pub fn handler(&self) -> &HistoryHandler {
        &self.handler
    }
}

struct TxSlot<T> {
    tx: Option<T>,
    flush_failed: bool,
}

impl<T> TxSlot<T> {
    fn active(&mut self) -> EngineResult<&mut T> {
        if self.flush_failed {
            return Err(EngineError::transaction_error(
                "History flush failed; the transaction can only be rolled back",
            ));
        }
        self.tx
            .as_mut()
            .ok_or_else(|| EngineError::transaction_error("No active transaction"))
    }
}

/// A transaction that buffers row changes and flushes them on commit
///
/// Methods take `&self`, so one instance can be shared between tasks. The
/// underlying transaction only ever runs one call at a time.
pub struct TrackedTransaction<T> {
    slot: Mutex<TxSlot<T>>,
    buffer: CaptureBuffer<CaptureEntry>,
    handler: Arc<HistoryHandler>,
    ctx: CallContext,
}

impl<T: Transaction> TrackedTransaction<T> {
    pub fn new(tx: T, handler: Arc<HistoryHandler>, ctx: CallContext) -> Self {
        Self {
            slot: Mutex::new(TxSlot {
                tx: Some(tx),
                flush_failed: false,
            }),
            buffer: CaptureBuffer::new(),
            handler,
            ctx,
        }
    }

    /// Number of entries waiting for the flush
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Executes a statement, capturing the rows it changes
    pub async fn execute(
        &self,
        ctx: &CallContext,
        sql: &str,
        params: &[Value],
    ) -> EngineResult<ExecResult> {
        let Some(dml) = parse_dml(sql) else {
            trace!("Statement is not DML, passing through");
            let mut slot = self.slot.lock().await;
            let tx = slot.active()?;
            let affected = ctx.run(tx.execute(sql, params)).await?;
            return Ok(ExecResult::passthrough(affected));
        };

        if dml.has_returning {
            return self.capture_rows(ctx, &dml, Cow::Borrowed(sql), params, true).await;
        }

        if self.handler.config.capture_without_returning {
            let rewritten = append_returning_all(sql)
                .ok_or_else(|| EngineError::validation("Empty statement"))?;
            return self
                .capture_rows(ctx, &dml, Cow::Owned(rewritten), params, false)
                .await;
        }

        // Buffer before releasing the slot so a racing commit sees the entry
        let mut slot = self.slot.lock().await;
        let tx = slot.active()?;
        let affected = ctx.run(tx.execute(sql, params)).await?;
        self.buffer.add(CaptureEntry::statement(
            dml.table.as_str(),
            dml.operation,
            sql,
            params.to_vec(),
            ctx.meta().clone(),
        ));
        drop(slot);
        debug!(table = %dml.table, op = %dml.operation, "Recorded statement without row image");

        Ok(ExecResult::passthrough(affected))
    }

    /// Runs the statement as a row-returning query and buffers one entry per row
    ///
    /// With `require_rows`, an empty result is a `NoRows` failure.
    async fn capture_rows(
        &self,
        ctx: &CallContext,
        dml: &DmlStatement,
        sql: Cow<'_, str>,
        params: &[Value],
        require_rows: bool,
    ) -> EngineResult<ExecResult> {
        let mut slot = self.slot.lock().await;
        let tx = slot.active()?;
        let rows = tx.fetch(&sql, params);
        let images = if require_rows {
            ctx.run(materialize_all(rows)).await?
        } else {
            ctx.run(collect_rows(rows)).await?
        };

        let captured = images.len();
        for image in images {
            self.buffer.add(CaptureEntry::row(
                dml.table.as_str(),
                dml.operation,
                image,
                ctx.meta().clone(),
            ));
        }
        drop(slot);
        debug!(table = %dml.table, op = %dml.operation, rows = captured, "Captured row images");

        Ok(ExecResult::captured(captured as u64))
    }

    /// Runs a read-only query without capture; an empty result is allowed
    pub async fn query(
        &self,
        ctx: &CallContext,
        sql: &str,
        params: &[Value],
    ) -> EngineResult<Vec<RowImage>> {
        let mut slot = self.slot.lock().await;
        let tx = slot.active()?;
        ctx.run(collect_rows(tx.fetch(sql, params))).await
    }

    /// Flushes buffered entries into history tables, then commits
    ///
    /// If the flush fails the transaction stays open and only
    /// [`rollback`](Self::rollback) is accepted afterwards.
    #[instrument(skip(self), fields(buffered = self.buffer.len()))]
    pub async fn commit(&self) -> EngineResult<()> {
        let mut slot = self.slot.lock().await;
        slot.active()?;
        let Some(mut tx) = slot.tx.take() else {
            return Err(EngineError::transaction_error("No active transaction"));
        };

        let entries = self.buffer.drain();
        let flushed = audit::flush(
            &mut tx,
            &self.ctx,
            entries,
            &self.handler.config,
            &self.handler.redact,
        )
        .await;

        if let Err(e) = flushed {
            warn!("History flush failed, transaction must be rolled back");
            slot.tx = Some(tx);
            slot.flush_failed = true;
            return Err(e);
        }

        self.ctx.run(tx.commit()).await?;
        debug!("Tracked transaction committed");
        Ok(())
    }

    /// Discards buffered entries and rolls back
    ///
    /// Runs outside the transaction's [`CallContext`]: a cancelled or expired
    /// context must still be able to discard the transaction.
    #[instrument(skip(self), fields(buffered = self.buffer.len()))]
    pub async fn rollback(&self) -> EngineResult<()> {
        let mut slot = self.slot.lock().await;
        self.buffer.reset();
        slot.flush_failed = false;
        let tx = slot
            .tx
            .take()
            .ok_or_else(|| EngineError::transaction_error("No active transaction"))?;

        tx.rollback().await?;
        debug!("Tracked transaction rolled back");
        Ok(())
    }
}
