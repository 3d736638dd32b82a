#![allow(dead_code)]

use serde_json::{json, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use oxide_schema::prelude::*;

/// Deserializes a JSON fixture, panicking with the fixture on failure.
pub fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> T {
    serde_json::from_value(value.clone())
        .unwrap_or_else(|e| panic!("Failed to deserialize fixture: {value}\nError: {e}"))
}

pub fn users_table() -> Table {
    from_json(json!({
        "columns": {
            "id": {"type": "uuid", "primary": true, "required": true},
            "email": {"type": "varchar(255)", "required": true, "unique": true},
            "created_at": {"type": "timestamptz", "required": true, "default": "CURRENT_TIMESTAMP"}
        }
    }))
}

pub fn posts_table() -> Table {
    from_json(json!({
        "columns": {
            "id": {"type": "bigint", "primary": true, "required": true},
            "author": {"type": "uuid", "required": true, "references": "users.id", "on_delete": "cascade"},
            "title": {"type": "text", "required": true},
            "tags": {"type": "text[]"}
        },
        "constraints": {
            "title_not_blank": {"type": "check", "expr": "length(title) > 0"}
        }
    }))
}

/// A two-table schema with a foreign key and an index.
pub fn blog_schema() -> SchemaDecl {
    SchemaDecl::new()
        .table("users", users_table())
        .table("posts", posts_table())
        .index("posts_author", Index::new("posts", &["author"]))
}

/// Creates an in-memory SQLite database on a single connection.
pub async fn memory_db() -> SqliteDatabase {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");
    SqliteDatabase::new(pool)
}

pub async fn table_names(pool: &SqlitePool) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .expect("Failed to list tables")
}

pub async fn index_names(pool: &SqlitePool) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .expect("Failed to list indexes")
}

pub async fn column_names(pool: &SqlitePool, table: &str) -> Vec<String> {
    sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY name")
        .bind(table)
        .fetch_all(pool)
        .await
        .expect("Failed to list columns")
}
