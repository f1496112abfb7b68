// QoreDB History - transaction-scoped row history for PostgreSQL
// Core library

pub mod engine;
pub mod interceptor;
pub mod observability;

pub use engine::drivers::postgres::{PgDatabase, PgTransaction, PoolConfig};
pub use engine::{CallContext, Database, EngineError, EngineResult, ExecResult, Transaction, Value};
pub use interceptor::{
    migrate, AuditMeta, DmlOperation, HistoryConfig, HistoryHandler, RedactMap, RowImage,
    SchemaConfig, TableNamer, TableTarget, TrackedDb, TrackedTransaction,
};
pub use observability::{init_tracing, LogTarget, Sensitive};
