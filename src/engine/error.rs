// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the history engine
//!
//! All driver-specific errors are mapped to these unified error types so
//! that callers of the capture layer see one error surface, whichever
//! stage (statement, materialization, flush) failed.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which row image a failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDirection {
    Before,
    After,
}

impl fmt::Display for ImageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => f.write_str("before"),
            Self::After => f.write_str("after"),
        }
    }
}

/// Unified error type for all engine and capture operations
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum EngineError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Query syntax error: {message}")]
    SyntaxError { message: String },

    #[error("Query execution error: {message}")]
    ExecutionError { message: String },

    #[error("Statement returned no rows")]
    NoRows,

    #[error("Failed to encode {direction} image: {message}")]
    Encoding {
        direction: ImageDirection,
        message: String,
    },

    #[error("Failed to insert into history table {table}: {message}")]
    HistoryWrite { table: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Feature not supported: {message}")]
    NotSupported { message: String },

    #[error("Transaction error: {message}")]
    TransactionError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl EngineError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn syntax_error(msg: impl Into<String>) -> Self {
        Self::SyntaxError { message: msg.into() }
    }

    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError { message: msg.into() }
    }

    pub fn encoding(direction: ImageDirection, msg: impl Into<String>) -> Self {
        Self::Encoding {
            direction,
            message: msg.into(),
        }
    }

    pub fn history_write(table: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::HistoryWrite {
            table: table.into(),
            message: msg.into(),
        }
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported { message: msg.into() }
    }

    pub fn transaction_error(msg: impl Into<String>) -> Self {
        Self::TransactionError { message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError { message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config { message: msg.into() }
    }

    /// Maps a driver error, keeping syntax errors distinguishable
    pub fn from_driver(err: impl fmt::Display) -> Self {
        let msg = err.to_string();
        if msg.contains("syntax") {
            Self::syntax_error(msg)
        } else {
            Self::execution_error(msg)
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
