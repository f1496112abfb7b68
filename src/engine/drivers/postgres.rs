// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL Driver
//!
//! Implements the Database and Transaction traits for PostgreSQL using SQLx.
//!
//! ## Transaction Handling
//!
//! `begin()` acquires a dedicated connection from the pool and issues BEGIN
//! on it. Every statement of the transaction runs on that connection until
//! `commit()` or `rollback()` releases it. Dropping an unfinished
//! transaction rolls it back.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use tracing::instrument;

use crate::engine::drivers::postgres_utils::{bind_param, scan_row};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{Database, Transaction};
use crate::engine::types::{RowStream, Value};
use crate::observability::Sensitive;

/// Pool settings for a PostgreSQL connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub url: Sensitive<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

impl PoolConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Sensitive::new(url.into()),
            max_connections: default_max_connections(),
            min_connections: 0,
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

/// PostgreSQL database handle
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool and verifies it with a round trip
    #[instrument(skip(config), fields(url = %config.url, max = config.max_connections))]
    pub async fn connect(config: &PoolConfig) -> EngineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(config.url.expose())
            .await
            .map_err(|e| EngineError::connection_failed(e.to_string()))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| EngineError::connection_failed(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Database for PgDatabase {
    type Tx = PgTransaction;

    fn driver_id(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> EngineResult<PgTransaction> {
        let tx = self.pool.begin().await.map_err(|e| {
            EngineError::transaction_error(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(PgTransaction { tx })
    }
}

/// An open PostgreSQL transaction on a dedicated pooled connection
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> EngineResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }

        let result = query
            .execute(&mut *self.tx)
            .await
            .map_err(EngineError::from_driver)?;

        Ok(result.rows_affected())
    }

    fn fetch<'a>(&'a mut self, sql: &'a str, params: &'a [Value]) -> RowStream<'a> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }

        query
            .fetch(&mut *self.tx)
            .map_ok(|row| scan_row(&row))
            .map_err(EngineError::from_driver)
            .boxed()
    }

    async fn commit(self) -> EngineResult<()> {
        self.tx.commit().await.map_err(|e| {
            EngineError::transaction_error(format!("Failed to commit transaction: {}", e))
        })
    }

    async fn rollback(self) -> EngineResult<()> {
        self.tx.rollback().await.map_err(|e| {
            EngineError::transaction_error(format!("Failed to rollback transaction: {}", e))
        })
    }
}
