// SPDX-License-Identifier: Apache-2.0

//! Column redaction
//!
//! Maps column names to value transforms applied to row images before they
//! are written to a history table. Columns without a registered transform
//! pass through unchanged.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::types::RowImage;
use crate::engine::error::{EngineError, EngineResult};

/// Transform applied to a single column value; receives the column name
pub type RedactFn = Arc<dyn Fn(&str, &serde_json::Value) -> serde_json::Value + Send + Sync>;

/// Replacement used by [`mask`]
pub const MASK: &str = "***";

/// Replaces any non-null value with a fixed mask
pub fn mask(_key: &str, value: &serde_json::Value) -> serde_json::Value {
    if value.is_null() {
        serde_json::Value::Null
    } else {
        serde_json::Value::String(MASK.to_string())
    }
}

#[derive(Clone, Default)]
pub struct RedactMap {
    funcs: HashMap<String, RedactFn>,
}

impl RedactMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transform for `key`
    ///
    /// Keys must be non-empty, carry no surrounding whitespace, and be
    /// registered at most once.
    pub fn register<F>(&mut self, key: impl Into<String>, func: F) -> EngineResult<()>
    where
        F: Fn(&str, &serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
    {
        let key = key.into();
        if key.is_empty() {
            return Err(EngineError::validation("Redaction key must not be empty"));
        }
        if key.trim() != key {
            return Err(EngineError::validation(format!(
                "Redaction key {:?} has surrounding whitespace",
                key
            )));
        }
        if self.funcs.contains_key(&key) {
            return Err(EngineError::validation(format!(
                "Redaction key {:?} is already registered",
                key
            )));
        }

        self.funcs.insert(key, Arc::new(func));
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.funcs.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Returns a redacted copy of `image`
    pub fn apply(&self, image: &RowImage) -> RowImage {
        if self.funcs.is_empty() {
            return image.clone();
        }
        image
            .iter()
            .map(|(key, value)| {
                let value = match self.funcs.get(key) {
                    Some(func) => func(key, value),
                    None => value.clone(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

impl fmt::Debug for RedactMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.funcs.keys().collect();
        keys.sort();
        f.debug_struct("RedactMap").field("keys", &keys).finish()
    }
}
