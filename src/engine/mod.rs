// Data Engine Module
// Thin database abstraction the capture layer runs on

pub mod context;
pub mod drivers;
pub mod error;
pub mod traits;
pub mod types;

pub use context::CallContext;
pub use error::{EngineError, EngineResult, ImageDirection};
pub use traits::{Database, Transaction};
pub use types::*;
