// SPDX-License-Identifier: Apache-2.0

//! Call context
//!
//! Carries the audit metadata attached to a unit of work together with the
//! cancellation signal and optional deadline that every database call made
//! on its behalf must honor.

use std::future::Future;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::engine::error::{EngineError, EngineResult};
use crate::interceptor::types::AuditMeta;

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    meta: AuditMeta,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.meta.operator = Some(operator.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.meta.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.meta.reason = Some(reason.into());
        self
    }

    pub fn with_meta(mut self, meta: AuditMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Ties the context to an externally owned token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn meta(&self) -> &AuditMeta {
        &self.meta
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drives `fut` to completion unless the context is cancelled or its
    /// deadline passes first, in which case `fut` is dropped mid-flight.
    pub async fn run<F, T>(&self, fut: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let guarded = async {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
                result = fut => result,
            }
        };

        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, guarded)
                .await
                .unwrap_or(Err(EngineError::DeadlineExceeded)),
            None => guarded.await,
        }
    }
}
