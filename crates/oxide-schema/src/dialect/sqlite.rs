//! SQLite dialect.
//!
//! SQLite has limited ALTER TABLE support: columns can be added and dropped,
//! but not altered. Unique constraints, whether declared at creation or
//! added later, live in named unique indexes; they are the only constraints
//! that can be added or dropped after creation.

use crate::builder::{AlterTableOp, BuilderOp, ColumnPlan, CreateTablePlan};
use crate::schema::Constraint;
use crate::types::{ColumnType, ScalarType};

use super::{standard_op, SqlDialect};

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn create_unique_index_sql(&self, name: &str, table: &str, columns: &[String]) -> String {
        format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            self.quote_identifier(name),
            self.quote_identifier(table),
            self.quote_list(columns)
        )
    }

    /// Removes the inline `UNIQUE` from a column, returning whether it was set.
    fn strip_unique(plan: &ColumnPlan) -> (ColumnPlan, bool) {
        let unique = plan.ops.contains(&BuilderOp::Unique);
        let stripped = ColumnPlan {
            ops: plan
                .ops
                .iter()
                .filter(|op| **op != BuilderOp::Unique)
                .cloned()
                .collect(),
            ..plan.clone()
        };
        (stripped, unique)
    }

    fn column_unique_index_sql(&self, table: &str, column: &str) -> String {
        self.create_unique_index_sql(
            &column_unique_index_name(table, column),
            table,
            &[column.to_string()],
        )
    }

    /// SQLite refuses `ADD COLUMN ... UNIQUE`; the uniqueness is moved to an
    /// index named `<table>_<column>_key`.
    fn add_column_sql(&self, table: &str, plan: &ColumnPlan) -> Option<Vec<String>> {
        if plan.ops.contains(&BuilderOp::PrimaryKey) {
            return None;
        }

        let (stripped, unique) = Self::strip_unique(plan);
        let mut statements = vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(&stripped)
        )];
        if unique {
            statements.push(self.column_unique_index_sql(table, &plan.name));
        }
        Some(statements)
    }
}

/// Name of the index that carries a unique column's constraint.
fn column_unique_index_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_key")
}

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn type_name(&self, column_type: &ColumnType) -> String {
        // Arrays are stored as JSON text.
        let ColumnType::Scalar(scalar) = column_type else {
            return "TEXT".to_string();
        };
        match scalar {
            ScalarType::SmallInt
            | ScalarType::Integer
            | ScalarType::BigInt
            | ScalarType::Boolean => "INTEGER".to_string(),
            ScalarType::Real | ScalarType::DoublePrecision => "REAL".to_string(),
            ScalarType::Numeric(_) => "NUMERIC".to_string(),
            ScalarType::Bytea => "BLOB".to_string(),
            ScalarType::Text
            | ScalarType::Varchar(_)
            | ScalarType::Char(_)
            | ScalarType::Timestamp
            | ScalarType::TimestampTz
            | ScalarType::Date
            | ScalarType::Time
            | ScalarType::TimeTz
            | ScalarType::Interval
            | ScalarType::Uuid
            | ScalarType::Json
            | ScalarType::Jsonb
            | ScalarType::Range(_)
            | ScalarType::Multirange(_) => "TEXT".to_string(),
        }
    }

    fn render_op(&self, op: &BuilderOp) -> Option<String> {
        match op {
            BuilderOp::NullsNotDistinct => None,
            // Expression defaults must be parenthesized.
            BuilderOp::Default(expr) => Some(format!("DEFAULT ({expr})")),
            other => Some(standard_op(self, other)),
        }
    }

    /// Unique constraints are created as named indexes so that they can be
    /// dropped again later.
    fn create_table_statements(&self, plan: &CreateTablePlan) -> Vec<String> {
        let mut indexes = Vec::new();
        let columns = plan
            .columns
            .iter()
            .map(|column| {
                let (stripped, unique) = Self::strip_unique(column);
                if unique {
                    indexes.push(self.column_unique_index_sql(&plan.name, &column.name));
                }
                stripped
            })
            .collect();
        let constraints = plan
            .constraints
            .iter()
            .filter(|(name, constraint)| match constraint {
                Constraint::Unique { on, .. } => {
                    indexes.push(self.create_unique_index_sql(name, &plan.name, on));
                    false
                }
                _ => true,
            })
            .cloned()
            .collect();

        let table = CreateTablePlan {
            name: plan.name.clone(),
            columns,
            constraints,
        };
        let mut statements = vec![self.create_table_sql(&table)];
        statements.extend(indexes);
        statements
    }

    fn alter_table_sql(&self, table: &str, op: &AlterTableOp) -> Option<Vec<String>> {
        match op {
            AlterTableOp::AddColumn(plan) => self.add_column_sql(table, plan),
            // An indexed column cannot be dropped.
            AlterTableOp::DropColumn(column) => Some(vec![
                format!(
                    "DROP INDEX IF EXISTS {}",
                    self.quote_identifier(&column_unique_index_name(table, column))
                ),
                format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    self.quote_identifier(table),
                    self.quote_identifier(column)
                ),
            ]),
            AlterTableOp::AddConstraint {
                name,
                constraint: Constraint::Unique { on, .. },
            } => Some(vec![self.create_unique_index_sql(name, table, on)]),
            AlterTableOp::DropConstraint {
                name,
                constraint: Some(Constraint::Unique { .. }),
            } => Some(vec![self.drop_index_sql(name)]),
            AlterTableOp::AddConstraint { .. }
            | AlterTableOp::DropConstraint { .. }
            | AlterTableOp::SetDefault { .. }
            | AlterTableOp::DropDefault { .. }
            | AlterTableOp::SetNotNull { .. }
            | AlterTableOp::DropNotNull { .. }
            | AlterTableOp::SetType { .. } => None,
        }
    }
}
