//! Applied-version tracking.
//!
//! This module manages the `oxide_schema_versions` table that records, per
//! schema owner, which version of its schema file is applied to the database.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqlitePool;

use crate::error::{Result, SchemaError};

/// SQL to create the version history table (SQLite).
pub const CREATE_VERSIONS_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS oxide_schema_versions (
    owner TEXT PRIMARY KEY NOT NULL,
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// The applied version of one schema owner.
#[derive(Debug, Clone)]
pub struct AppliedVersion {
    /// Schema owner.
    pub owner: String,
    /// Applied version index.
    pub version: usize,
    /// When the version was recorded.
    pub applied_at: DateTime<Utc>,
}

/// Manages the applied-version table.
#[derive(Debug, Clone)]
pub struct VersionHistory {
    pool: SqlitePool,
}

impl VersionHistory {
    /// Creates a new history manager.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ensures the history table exists.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(CREATE_VERSIONS_TABLE_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records `version` as the applied version of `owner`.
    pub async fn record(&self, owner: &str, version: usize) -> Result<()> {
        let version = i64::try_from(version)
            .map_err(|_| SchemaError::InvalidFile(format!("version {version} is out of range")))?;
        sqlx::query(
            "INSERT INTO oxide_schema_versions (owner, version) VALUES (?, ?) \
             ON CONFLICT(owner) DO UPDATE SET version = excluded.version, \
             applied_at = datetime('now')",
        )
        .bind(owner)
        .bind(version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the applied version of one owner, if any.
    pub async fn applied_version(&self, owner: &str) -> Result<Option<usize>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM oxide_schema_versions WHERE owner = ?")
                .bind(owner)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(version,)| to_index(version)).transpose()
    }

    /// Returns the applied version of every recorded owner.
    pub async fn applied_versions(&self) -> Result<BTreeMap<String, usize>> {
        self.get_applied()
            .await
            .map(|rows| rows.into_iter().map(|r| (r.owner, r.version)).collect())
    }

    /// Gets every recorded owner, ordered by name.
    pub async fn get_applied(&self) -> Result<Vec<AppliedVersion>> {
        let rows: Vec<(String, i64, String)> = sqlx::query_as(
            "SELECT owner, version, applied_at FROM oxide_schema_versions ORDER BY owner",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(owner, version, applied_at)| {
                Ok(AppliedVersion {
                    owner,
                    version: to_index(version)?,
                    applied_at: parse_timestamp(&applied_at),
                })
            })
            .collect()
    }
}

fn to_index(version: i64) -> Result<usize> {
    usize::try_from(version).map_err(|_| {
        SchemaError::InvalidFile(format!("recorded version {version} is not a version index"))
    })
}

fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite datetime format
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}
