//! Live database handles.
//!
//! The executor only talks to a [`Database`] and the [`SchemaTransaction`]s
//! it hands out. [`SqlTransaction`] implements the transaction side for any
//! SQL database by rendering operations through a [`SqlDialect`] and running
//! them on a [`StatementExecutor`].

mod sqlite;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresDatabase, PostgresExecutor};
pub use sqlite::{SqliteDatabase, SqliteExecutor};

use async_trait::async_trait;
use tracing::debug;

pub use crate::builder::AlterTableOp;
use crate::builder::CreateTablePlan;
use crate::dialect::SqlDialect;
use crate::schema::Index;

/// Errors raised by a live database handle.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Error reported by the database driver.
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    /// The database cannot express the requested operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,
}

/// A database that hands out transactions for structural changes.
#[async_trait]
pub trait Database: Send + Sync {
    /// The transaction type.
    type Transaction: SchemaTransaction;

    /// Opens a transaction.
    async fn begin(&self) -> Result<Self::Transaction, BackendError>;
}

/// One open transaction accepting structural operations.
///
/// Dropping a transaction without committing it must discard its changes.
#[async_trait]
pub trait SchemaTransaction: Send {
    /// Creates a table.
    async fn create_table(&mut self, plan: &CreateTablePlan) -> Result<(), BackendError>;

    /// Drops a table.
    async fn drop_table(&mut self, name: &str) -> Result<(), BackendError>;

    /// Runs one alter-table operation.
    async fn alter_table(&mut self, table: &str, op: &AlterTableOp) -> Result<(), BackendError>;

    /// Creates an index.
    async fn create_index(&mut self, name: &str, index: &Index) -> Result<(), BackendError>;

    /// Drops an index.
    async fn drop_index(&mut self, name: &str) -> Result<(), BackendError>;

    /// Commits the transaction.
    async fn commit(self) -> Result<(), BackendError>;

    /// Rolls the transaction back.
    async fn rollback(self) -> Result<(), BackendError>;
}

/// Executes raw statements inside one driver transaction.
#[async_trait]
pub trait StatementExecutor: Send {
    /// Executes one statement.
    async fn execute(&mut self, sql: &str) -> Result<(), BackendError>;

    /// Commits the driver transaction.
    async fn commit(self) -> Result<(), BackendError>;

    /// Rolls the driver transaction back.
    async fn rollback(self) -> Result<(), BackendError>;
}

/// A [`SchemaTransaction`] that renders operations with a dialect and runs
/// the resulting statements.
#[derive(Debug)]
pub struct SqlTransaction<E, D> {
    executor: E,
    dialect: D,
}

impl<E: StatementExecutor, D: SqlDialect> SqlTransaction<E, D> {
    /// Wraps a driver transaction.
    pub const fn new(executor: E, dialect: D) -> Self {
        Self { executor, dialect }
    }

    async fn run(&mut self, statements: Vec<String>) -> Result<(), BackendError> {
        for sql in statements {
            debug!(%sql, "Executing");
            self.executor.execute(&sql).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<E: StatementExecutor, D: SqlDialect> SchemaTransaction for SqlTransaction<E, D> {
    async fn create_table(&mut self, plan: &CreateTablePlan) -> Result<(), BackendError> {
        let statements = self.dialect.create_table_statements(plan);
        self.run(statements).await
    }

    async fn drop_table(&mut self, name: &str) -> Result<(), BackendError> {
        let sql = self.dialect.drop_table_sql(name);
        self.run(vec![sql]).await
    }

    async fn alter_table(&mut self, table: &str, op: &AlterTableOp) -> Result<(), BackendError> {
        let statements = self.dialect.alter_table_sql(table, op).ok_or_else(|| {
            BackendError::Unsupported(format!(
                "{} cannot {op} on table '{table}'",
                self.dialect.name()
            ))
        })?;
        self.run(statements).await
    }

    async fn create_index(&mut self, name: &str, index: &Index) -> Result<(), BackendError> {
        let sql = self.dialect.create_index_sql(name, index);
        self.run(vec![sql]).await
    }

    async fn drop_index(&mut self, name: &str) -> Result<(), BackendError> {
        let sql = self.dialect.drop_index_sql(name);
        self.run(vec![sql]).await
    }

    async fn commit(self) -> Result<(), BackendError> {
        self.executor.commit().await
    }

    async fn rollback(self) -> Result<(), BackendError> {
        self.executor.rollback().await
    }
}
