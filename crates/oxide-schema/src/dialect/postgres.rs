//! PostgreSQL dialect.
//!
//! PostgreSQL expresses the whole vocabulary natively, including arrays,
//! ranges and every `ALTER COLUMN` form.

use crate::builder::AlterTableOp;
use crate::types::{ColumnType, ScalarType};

use super::SqlDialect;

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn scalar_name(scalar: ScalarType) -> String {
        match scalar {
            ScalarType::SmallInt => "SMALLINT".to_string(),
            ScalarType::Integer => "INTEGER".to_string(),
            ScalarType::BigInt => "BIGINT".to_string(),
            ScalarType::Real => "REAL".to_string(),
            ScalarType::DoublePrecision => "DOUBLE PRECISION".to_string(),
            ScalarType::Numeric(None) => "NUMERIC".to_string(),
            ScalarType::Numeric(Some((p, None))) => format!("NUMERIC({p})"),
            ScalarType::Numeric(Some((p, Some(s)))) => format!("NUMERIC({p}, {s})"),
            ScalarType::Boolean => "BOOLEAN".to_string(),
            ScalarType::Text => "TEXT".to_string(),
            ScalarType::Varchar(None) => "VARCHAR".to_string(),
            ScalarType::Varchar(Some(n)) => format!("VARCHAR({n})"),
            ScalarType::Char(None) => "CHAR".to_string(),
            ScalarType::Char(Some(n)) => format!("CHAR({n})"),
            ScalarType::Timestamp => "TIMESTAMP".to_string(),
            ScalarType::TimestampTz => "TIMESTAMPTZ".to_string(),
            ScalarType::Date => "DATE".to_string(),
            ScalarType::Time => "TIME".to_string(),
            ScalarType::TimeTz => "TIMETZ".to_string(),
            ScalarType::Interval => "INTERVAL".to_string(),
            ScalarType::Bytea => "BYTEA".to_string(),
            ScalarType::Uuid => "UUID".to_string(),
            ScalarType::Json => "JSON".to_string(),
            ScalarType::Jsonb => "JSONB".to_string(),
            ScalarType::Range(kind) => format!("{}RANGE", kind.prefix().to_uppercase()),
            ScalarType::Multirange(kind) => {
                format!("{}MULTIRANGE", kind.prefix().to_uppercase())
            }
        }
    }

    fn alter_column(&self, table: &str, column: &str, action: &str) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} {action}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )]
    }
}

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn type_name(&self, column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::Scalar(scalar) => Self::scalar_name(*scalar),
            ColumnType::Array { base, len: None } => format!("{}[]", Self::scalar_name(*base)),
            ColumnType::Array {
                base,
                len: Some(n),
            } => format!("{}[{n}]", Self::scalar_name(*base)),
        }
    }

    fn alter_table_sql(&self, table: &str, op: &AlterTableOp) -> Option<Vec<String>> {
        let quoted = self.quote_identifier(table);
        Some(match op {
            AlterTableOp::AddColumn(plan) => vec![format!(
                "ALTER TABLE {quoted} ADD COLUMN {}",
                self.column_definition(plan)
            )],
            AlterTableOp::DropColumn(column) => vec![format!(
                "ALTER TABLE {quoted} DROP COLUMN {}",
                self.quote_identifier(column)
            )],
            AlterTableOp::SetDefault { column, default } => {
                self.alter_column(table, column, &format!("SET DEFAULT {default}"))
            }
            AlterTableOp::DropDefault { column } => {
                self.alter_column(table, column, "DROP DEFAULT")
            }
            AlterTableOp::SetNotNull { column } => self.alter_column(table, column, "SET NOT NULL"),
            AlterTableOp::DropNotNull { column } => {
                self.alter_column(table, column, "DROP NOT NULL")
            }
            AlterTableOp::SetType {
                column,
                column_type,
            } => {
                let type_name = self.type_name(column_type);
                self.alter_column(
                    table,
                    column,
                    &format!(
                        "TYPE {type_name} USING {}::{type_name}",
                        self.quote_identifier(column)
                    ),
                )
            }
            AlterTableOp::AddConstraint { name, constraint } => vec![format!(
                "ALTER TABLE {quoted} ADD {}",
                self.constraint_sql(name, constraint)
            )],
            AlterTableOp::DropConstraint { name, .. } => vec![format!(
                "ALTER TABLE {quoted} DROP CONSTRAINT {}",
                self.quote_identifier(name)
            )],
        })
    }
}
