//! SQL dialects.
//!
//! A dialect interprets the declarative builder operations and alter-table
//! operations as SQL text for one database system.

mod postgres;
mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::builder::{AlterTableOp, BuilderOp, ColumnPlan, CreateTablePlan};
use crate::schema::{Constraint, Index};
use crate::types::ColumnType;

/// Trait for database-specific SQL generation.
pub trait SqlDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the SQL type name for the given column type.
    fn type_name(&self, column_type: &ColumnType) -> String;

    /// Generates the statements for one alter-table operation, or `None` when
    /// the database cannot express it.
    fn alter_table_sql(&self, table: &str, op: &AlterTableOp) -> Option<Vec<String>>;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quotes and joins a list of identifiers.
    fn quote_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.quote_identifier(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders one builder operation as a column-definition fragment.
    /// Operations the dialect ignores return `None`.
    fn render_op(&self, op: &BuilderOp) -> Option<String> {
        Some(standard_op(self, op))
    }

    /// Generates column definition SQL.
    fn column_definition(&self, column: &ColumnPlan) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.column_type),
        ];
        parts.extend(column.ops.iter().filter_map(|op| self.render_op(op)));
        parts.join(" ")
    }

    /// Generates a named table constraint clause.
    fn constraint_sql(&self, name: &str, constraint: &Constraint) -> String {
        let body = match constraint {
            Constraint::PrimaryKey { on } => format!("PRIMARY KEY ({})", self.quote_list(on)),
            Constraint::ForeignKey {
                on,
                target,
                references,
                on_delete,
            } => {
                let mut sql = format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({})",
                    self.quote_list(on),
                    self.quote_identifier(target),
                    self.quote_list(references)
                );
                if let Some(action) = on_delete {
                    sql.push_str(" ON DELETE ");
                    sql.push_str(action.as_sql());
                }
                sql
            }
            Constraint::Unique {
                on,
                nulls_not_distinct,
            } => {
                let mut sql = String::from("UNIQUE ");
                if *nulls_not_distinct {
                    if let Some(fragment) = self.render_op(&BuilderOp::NullsNotDistinct) {
                        sql.push_str(&fragment);
                        sql.push(' ');
                    }
                }
                sql.push_str(&format!("({})", self.quote_list(on)));
                sql
            }
            Constraint::Check { expr } => format!("CHECK ({expr})"),
        };
        format!("CONSTRAINT {} {body}", self.quote_identifier(name))
    }

    /// Generates SQL for creating a table.
    fn create_table_sql(&self, plan: &CreateTablePlan) -> String {
        let definitions: Vec<String> = plan
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .chain(
                plan.constraints
                    .iter()
                    .map(|(name, constraint)| self.constraint_sql(name, constraint)),
            )
            .collect();

        format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(&plan.name),
            definitions.join(",\n  ")
        )
    }

    /// Generates every statement needed to create a table. Most databases
    /// need only the `CREATE TABLE` itself.
    fn create_table_statements(&self, plan: &CreateTablePlan) -> Vec<String> {
        vec![self.create_table_sql(plan)]
    }

    /// Generates SQL for dropping a table.
    fn drop_table_sql(&self, name: &str) -> String {
        format!("DROP TABLE {}", self.quote_identifier(name))
    }

    /// Generates SQL for creating an index.
    fn create_index_sql(&self, name: &str, index: &Index) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.quote_identifier(name),
            self.quote_identifier(&index.on),
            self.quote_list(&index.columns)
        )
    }

    /// Generates SQL for dropping an index.
    fn drop_index_sql(&self, name: &str) -> String {
        format!("DROP INDEX {}", self.quote_identifier(name))
    }
}

/// The standard SQL rendering of a builder operation.
fn standard_op<D: SqlDialect + ?Sized>(dialect: &D, op: &BuilderOp) -> String {
    match op {
        BuilderOp::PrimaryKey => "PRIMARY KEY".to_string(),
        BuilderOp::Unique => "UNIQUE".to_string(),
        BuilderOp::NotNull => "NOT NULL".to_string(),
        BuilderOp::NullsNotDistinct => "NULLS NOT DISTINCT".to_string(),
        BuilderOp::References(target) => format!(
            "REFERENCES {} ({})",
            dialect.quote_identifier(&target.table),
            dialect.quote_identifier(&target.column)
        ),
        BuilderOp::OnDelete(action) => format!("ON DELETE {}", action.as_sql()),
        BuilderOp::Default(expr) => format!("DEFAULT {expr}"),
        BuilderOp::Check(expr) => format!("CHECK ({expr})"),
    }
}
