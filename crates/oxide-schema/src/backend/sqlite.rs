//! SQLite database handle.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use super::{BackendError, Database, SqlTransaction, StatementExecutor};
use crate::dialect::SqliteDialect;

/// A SQLite database reached through an `sqlx` pool.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to a database URL such as `sqlite:db.sqlite3`.
    pub async fn connect(url: &str) -> Result<Self, BackendError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// One open SQLite transaction.
pub struct SqliteExecutor {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StatementExecutor for SqliteExecutor {
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
impl Database for SqliteDatabase {
    type Transaction = SqlTransaction<SqliteExecutor, SqliteDialect>;

    async fn begin(&self) -> Result<Self::Transaction, BackendError> {
        let tx = self.pool.begin().await?;
        Ok(SqlTransaction::new(SqliteExecutor { tx }, SqliteDialect::new()))
    }
}
