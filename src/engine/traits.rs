//! Database and Transaction trait definitions
//!
//! These are the seams between the capture layer and a concrete driver.
//! The capture layer only ever talks to a database through them, which
//! keeps the orchestration testable against in-memory fakes.

use async_trait::async_trait;

use crate::engine::error::EngineResult;
use crate::engine::types::{RowStream, Value};

/// A source of transactions
#[async_trait]
pub trait Database: Send + Sync {
    type Tx: Transaction;

    /// Returns the unique identifier for this driver (e.g., "postgres")
    fn driver_id(&self) -> &'static str;

    /// Starts a new transaction on a dedicated connection
    async fn begin(&self) -> EngineResult<Self::Tx>;
}

/// An open transaction
///
/// Not meant for concurrent use; callers serialize access to it.
#[async_trait]
pub trait Transaction: Send {
    /// Executes a statement that returns no rows and reports the affected row count
    async fn execute(&mut self, sql: &str, params: &[Value]) -> EngineResult<u64>;

    /// Executes a statement and opens a cursor over the rows it returns
    fn fetch<'a>(&'a mut self, sql: &'a str, params: &'a [Value]) -> RowStream<'a>;

    async fn commit(self) -> EngineResult<()>;

    async fn rollback(self) -> EngineResult<()>;
}
