//! Declarative, versioned relational schemas for Rust.
//!
//! `oxide-schema` lets independent modules ("schema owners") declare their
//! tables and indexes as data, keep an append-only history of versions, and
//! bring a live database from the applied version to the latest one:
//! - Each owner's history is replayed into a snapshot, so the declared state
//!   is always a plain value that can be compared and rendered
//! - Snapshots are diffed into structural deltas that are validated,
//!   collapsed and previewed before anything touches a database
//! - A delta is applied inside one transaction, so a failure leaves no
//!   partial DDL behind
//!
//! # Architecture
//!
//! - **Types / Schema** - Column type vocabulary and the snapshot model
//!   (`SchemaDecl`, `Table`, `Column`, `Constraint`, `Index`)
//! - **Delta** - Structural changes between snapshots (`Version`)
//! - **State / Diff / Validate / Collapse / Display** - Pure operations on
//!   snapshots and deltas
//! - **File** - Schema files, version resolution and cross-owner merging
//! - **Builder / Dialect** - Declarative builder operations and their SQL
//!   rendering for SQLite and PostgreSQL
//! - **Backend / Executor** - Live database handles and transactional apply
//! - **History** - Applied version per owner, kept in the database
//! - **Export** - SQL scripts and Graphviz graphs of a snapshot
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_schema::prelude::*;
//!
//! let owners = load_schema_dir("schemas")?;
//! let (declared, versions) = merge_all(&owners)?;
//!
//! let delta = diff(&SchemaDecl::new(), &declared);
//! for line in display(&delta) {
//!     println!("{line}");
//! }
//!
//! let db = SqliteDatabase::connect("sqlite:db.sqlite3").await?;
//! apply(&delta, &db, false).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Show which owners are behind their latest version
//! oxide-schema status
//!
//! # Preview the pending changes
//! oxide-schema diff
//!
//! # Apply them (or verify with --dry-run)
//! oxide-schema migrate --yes
//!
//! # Export the declared schema
//! oxide-schema sql --dialect postgres
//! oxide-schema graph | dot -Tsvg > schema.svg
//! ```

pub mod backend;
pub mod builder;
pub mod collapse;
pub mod delta;
pub mod dialect;
pub mod diff;
pub mod display;
pub mod error;
pub mod executor;
pub mod export;
pub mod file;
pub mod history;
pub mod schema;
pub mod state;
pub mod types;
pub mod validate;

pub use collapse::collapse;
pub use delta::is_empty;
pub use diff::{diff, diff_with_warnings};
pub use display::display;
pub use error::{Result, SchemaError};
pub use executor::apply;
pub use export::{to_graph, to_sql};
pub use file::{merge_all, resolve};
pub use state::apply_delta_to_schema;
pub use validate::validate;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::{
        AlterTableOp, BackendError, Database, SchemaTransaction, SqliteDatabase,
    };
    pub use crate::builder::{build_column, plan_table, BuilderOp};
    pub use crate::collapse::collapse;
    pub use crate::delta::{is_empty, ColumnAlteration, ColumnOp, TableDelta, Version};
    pub use crate::dialect::{PostgresDialect, SqlDialect, SqliteDialect};
    pub use crate::diff::{diff, diff_with_warnings, DiffWarning, SchemaDiff};
    pub use crate::display::{display, DisplayLine, Marker};
    pub use crate::error::{Result, SchemaError};
    pub use crate::executor::{apply, DeltaExecutor};
    pub use crate::export::{to_graph, to_sql};
    pub use crate::file::{
        load_schema_dir, merge_all, merge_snapshots, resolve, SchemaFile, VersionEntry,
    };
    pub use crate::history::VersionHistory;
    pub use crate::schema::{
        Column, ColumnRef, Constraint, DefaultValue, Index, ReferentialAction, SchemaDecl, Table,
    };
    pub use crate::state::apply_delta_to_schema;
    pub use crate::types::{parse_column_type, ColumnType, RangeKind, ScalarType};
    pub use crate::validate::validate;

    #[cfg(feature = "postgres")]
    pub use crate::backend::PostgresDatabase;
}
