//! Connection pool per logical database, default size 5, with a
//! cheap health check before connections are handed to the pipeline.

use crate::error::DbError;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(10 * 60)),
        }
    }
}

/// One pool per logical source database named in the configuration.
pub struct DatabasePool {
    pub name: String,
    pub pool: PgPool,
}

impl DatabasePool {
    pub async fn connect(name: &str, options: PgConnectOptions, config: &PoolConfig) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect_with(options)
            .await?;
        Ok(Self {
            name: name.to_string(),
            pool,
        })
    }

    /// Runs a trivial round-trip query; called before a database is handed
    /// to the Table Orchestrator so a dead pool fails fast with a clear
    /// cause instead of surfacing mid-batch.
    pub async fn health_check(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
