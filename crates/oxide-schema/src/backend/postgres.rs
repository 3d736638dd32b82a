//! PostgreSQL database handle.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use super::{BackendError, Database, SqlTransaction, StatementExecutor};
use crate::dialect::PostgresDialect;

/// A PostgreSQL database reached through an `sqlx` pool.
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to a database URL such as `postgres://localhost/app`.
    pub async fn connect(url: &str) -> Result<Self, BackendError> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// One open PostgreSQL transaction.
pub struct PostgresExecutor {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StatementExecutor for PostgresExecutor {
    async fn execute(&mut self, sql: &str) -> Result<(), BackendError> {
        sqlx::query(sql).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), BackendError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), BackendError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    type Transaction = SqlTransaction<PostgresExecutor, PostgresDialect>;

    async fn begin(&self) -> Result<Self::Transaction, BackendError> {
        let tx = self.pool.begin().await?;
        Ok(SqlTransaction::new(
            PostgresExecutor { tx },
            PostgresDialect::new(),
        ))
    }
}
