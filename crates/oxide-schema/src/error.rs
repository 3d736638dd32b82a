//! Error types for schema resolution, diffing and application.

use std::fmt;
use std::path::PathBuf;

use crate::backend::BackendError;
use crate::diff::DiffWarning;

/// Kind of schema object an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A table.
    Table,
    /// A column of a table.
    Column,
    /// A named table constraint.
    Constraint,
    /// An index.
    Index,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Table => "table",
            Self::Column => "column",
            Self::Constraint => "constraint",
            Self::Index => "index",
        })
    }
}

/// Errors produced by the schema engine.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A column type spelling is not part of the supported vocabulary.
    #[error("Invalid column type '{spelling}': {reason}")]
    InvalidType {
        /// The rejected spelling.
        spelling: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A schema file is structurally unusable.
    #[error("Invalid schema file: {0}")]
    InvalidFile(String),

    /// A version index outside of a file's history was requested.
    #[error("Version {version} does not exist (file has {available} versions)")]
    InvalidVersion {
        /// Requested version index.
        version: usize,
        /// Number of versions in the file.
        available: usize,
    },

    /// A delta in a file's history does not apply to its predecessor.
    #[error("Version {version} cannot be applied to its predecessor: {source}")]
    BrokenChain {
        /// Index of the offending version.
        version: usize,
        /// What went wrong while applying it.
        #[source]
        source: Box<SchemaError>,
    },

    /// A table name is declared or added twice.
    #[error("Duplicate table '{name}'{}", owners_suffix(.owners))]
    DuplicateTable {
        /// Table name.
        name: String,
        /// The two owners declaring it, when the collision comes from a merge.
        owners: Option<(String, String)>,
    },

    /// An index name is declared or added twice.
    #[error("Duplicate index '{name}'{}", owners_suffix(.owners))]
    DuplicateIndex {
        /// Index name.
        name: String,
        /// The two owners declaring it, when the collision comes from a merge.
        owners: Option<(String, String)>,
    },

    /// A column name is added twice or appears in conflicting delta sets.
    #[error("Duplicate column '{column}' in table '{table}'")]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A constraint name is added twice or appears in conflicting delta sets.
    #[error("Duplicate constraint '{constraint}' in table '{table}'")]
    DuplicateConstraint {
        /// Table name.
        table: String,
        /// Constraint name.
        constraint: String,
    },

    /// A drop or alter references something that does not exist.
    #[error("can't {action} {kind} '{name}' because it does not exist")]
    MissingTarget {
        /// The attempted action ("drop", "alter", ...).
        action: &'static str,
        /// What kind of object was targeted.
        kind: ObjectKind,
        /// Qualified name of the target.
        name: String,
    },

    /// A column alteration combines operations that exclude each other.
    #[error("Conflicting operations on column '{table}.{column}': {detail}")]
    ConflictingColumnOp {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Description of the conflict.
        detail: String,
    },

    /// A schema violates a structural invariant (dangling reference, ...).
    #[error("Invalid schema in table '{table}': {message}")]
    InvalidSchema {
        /// Table (or index) the problem was found in.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// Two snapshots differ in ways that no delta can express.
    #[error("Changes cannot be expressed as a delta:\n{}", .0.iter().map(|w| format!("  - {w}")).collect::<Vec<_>>().join("\n"))]
    Inexpressible(Vec<DiffWarning>),

    /// A step failed while applying a delta to a live database.
    #[error("Apply failed while trying to {step}: {source}")]
    ApplyFailed {
        /// Human readable description of the failed step.
        step: String,
        /// The database error.
        #[source]
        source: BackendError,
    },

    /// The transaction could not be rolled back after a failure.
    #[error("{error}; additionally the rollback failed, database state is unknown: {rollback}")]
    RollbackFailed {
        /// The error that triggered the rollback.
        error: Box<SchemaError>,
        /// The rollback error.
        rollback: BackendError,
    },

    /// Database error outside of a delta application (history table, connect).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error while reading schema files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a schema file.
    #[error("Failed to parse schema file '{path}': {source}")]
    Parse {
        /// Path to the schema file.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Multiple errors occurred.
    #[error("Multiple errors occurred:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<SchemaError>),
}

impl SchemaError {
    /// Folds a list of errors into `Ok`, the single error, or `Multiple`.
    pub(crate) fn from_list(mut errors: Vec<Self>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }

    pub(crate) fn missing(action: &'static str, kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::MissingTarget {
            action,
            kind,
            name: name.into(),
        }
    }
}

fn owners_suffix(owners: &Option<(String, String)>) -> String {
    match owners {
        Some((first, second)) => format!(" (declared by both '{first}' and '{second}')"),
        None => String::new(),
    }
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
