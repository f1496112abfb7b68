//! History Capture Interceptor
//!
//! Sits between application code and a database transaction:
//! - **Classification**: recognizes INSERT/UPDATE/DELETE and their target table
//! - **Capture**: buffers row images returned by data-changing statements
//! - **Flush**: writes buffered changes to `<table>_history` right before commit
//!
//! Supporting pieces: identifier quoting, redaction, inflection for id
//! picking, and a migration helper that creates the history tables.

pub mod audit;
pub mod buffer;
pub mod dml;
pub mod ident;
pub mod inflect;
pub mod materialize;
pub mod pipeline;
pub mod redact;
pub mod schema;
pub mod types;

pub use audit::pick_id;
pub use buffer::CaptureBuffer;
pub use dml::{append_returning_all, parse_dml, DmlStatement};
pub use materialize::{materialize_all, materialize_one};
pub use pipeline::{HistoryHandler, TrackedDb, TrackedTransaction};
pub use redact::{mask, RedactFn, RedactMap};
pub use schema::{migrate, BaseTable, TableNamer, TableTarget};
pub use types::*;
