//! Declarative builder operations.
//!
//! A column declaration is turned into an ordered list of [`BuilderOp`]s that
//! the live-database layer (a [`SqlDialect`](crate::dialect::SqlDialect))
//! interprets. Nothing here touches a connection, which is what lets export
//! and application share the same description.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::schema::{Column, ColumnRef, Constraint, ReferentialAction, Table};
use crate::types::ColumnType;

/// One step of building a column on top of a generic "add column" interface.
#[derive(Debug, Clone, PartialEq)]
pub enum BuilderOp {
    /// Declare the column as the (single-column) primary key.
    PrimaryKey,
    /// Declare the column unique.
    Unique,
    /// Declare the column NOT NULL.
    NotNull,
    /// Unique nullable column where NULLs compare equal.
    NullsNotDistinct,
    /// Foreign key reference.
    References(ColumnRef),
    /// Delete action of the preceding reference.
    OnDelete(ReferentialAction),
    /// Default value, as verbatim SQL text.
    Default(String),
    /// Check expression.
    Check(String),
}

/// Describes the builder operations for a column.
///
/// When `allow_primary_key_inline` is false the primary-key operation is
/// omitted and the caller is expected to add a table-level primary key
/// constraint instead.
#[must_use]
pub fn build_column(column: &Column, allow_primary_key_inline: bool) -> Vec<BuilderOp> {
    let mut ops = Vec::new();

    if column.primary && allow_primary_key_inline {
        ops.push(BuilderOp::PrimaryKey);
    }
    if column.unique {
        ops.push(BuilderOp::Unique);
    }
    if column.required {
        ops.push(BuilderOp::NotNull);
    } else if column.unique {
        ops.push(BuilderOp::NullsNotDistinct);
    }
    if let Some(target) = &column.references {
        ops.push(BuilderOp::References(target.clone()));
        if let Some(action) = column.on_delete {
            ops.push(BuilderOp::OnDelete(action));
        }
    }
    if let Some(default) = &column.default {
        ops.push(BuilderOp::Default(default.to_sql()));
    }
    if let Some(check) = &column.check {
        ops.push(BuilderOp::Check(check.clone()));
    }

    ops
}

/// A column ready to be created: name, type and builder operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    /// Column name.
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
    /// Builder operations, in order.
    pub ops: Vec<BuilderOp>,
}

impl ColumnPlan {
    /// Plans a column.
    #[must_use]
    pub fn new(name: &str, column: &Column, allow_primary_key_inline: bool) -> Self {
        Self {
            name: name.to_string(),
            column_type: column.column_type,
            ops: build_column(column, allow_primary_key_inline),
        }
    }
}

/// Everything needed to issue a CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTablePlan {
    /// Table name.
    pub name: String,
    /// Columns in name order.
    pub columns: Vec<ColumnPlan>,
    /// Table-level constraints, including a synthesized `PK_<table>` when the
    /// primary key cannot be declared inline.
    pub constraints: Vec<(String, Constraint)>,
}

/// Returns the name of the synthesized composite primary key constraint.
#[must_use]
pub fn primary_key_constraint_name(table: &str) -> String {
    format!("PK_{table}")
}

/// Plans the creation of a table.
#[must_use]
pub fn plan_table(name: &str, table: &Table) -> CreateTablePlan {
    let inline = table.inline_primary_key();

    let columns = table
        .columns
        .iter()
        .map(|(column_name, column)| ColumnPlan::new(column_name, column, inline))
        .collect();

    let mut constraints = Vec::new();
    let primaries = table.primary_columns();
    if !inline && !primaries.is_empty() {
        constraints.push((
            primary_key_constraint_name(name),
            Constraint::PrimaryKey {
                on: primaries.iter().map(ToString::to_string).collect(),
            },
        ));
    }
    constraints.extend(
        table
            .constraints
            .iter()
            .map(|(n, c)| (n.clone(), c.clone())),
    );

    CreateTablePlan {
        name: name.to_string(),
        columns,
        constraints,
    }
}

/// Orders tables so that referenced tables come before the tables that
/// reference them. References to tables outside `tables` are ignored; ties
/// and cycles fall back to name order.
#[must_use]
pub fn creation_order(tables: &BTreeMap<String, Table>) -> Vec<&str> {
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = tables
        .iter()
        .map(|(name, table)| {
            let deps = table
                .referenced_tables(name)
                .filter(|t| tables.contains_key(*t))
                .collect();
            (name.as_str(), deps)
        })
        .collect();

    let mut order = Vec::with_capacity(tables.len());
    while !pending.is_empty() {
        let ready = pending
            .iter()
            .find(|(_, deps)| deps.is_empty())
            .map(|(name, _)| *name)
            // A cycle: break it at the first remaining name.
            .or_else(|| pending.keys().next().copied());
        let Some(next) = ready else { break };

        pending.remove(next);
        for deps in pending.values_mut() {
            deps.remove(next);
        }
        order.push(next);
    }
    order
}

/// One sub-operation of an ALTER TABLE against a live database.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterTableOp {
    /// Add a column.
    AddColumn(ColumnPlan),
    /// Drop a column.
    DropColumn(String),
    /// Set a column's default to verbatim SQL text.
    SetDefault {
        /// Column name.
        column: String,
        /// Default expression.
        default: String,
    },
    /// Remove a column's default.
    DropDefault {
        /// Column name.
        column: String,
    },
    /// Make a column NOT NULL.
    SetNotNull {
        /// Column name.
        column: String,
    },
    /// Make a column nullable.
    DropNotNull {
        /// Column name.
        column: String,
    },
    /// Change a column's type.
    SetType {
        /// Column name.
        column: String,
        /// New type.
        column_type: ColumnType,
    },
    /// Add a named constraint.
    AddConstraint {
        /// Constraint name.
        name: String,
        /// The constraint.
        constraint: Constraint,
    },
    /// Drop a named constraint.
    DropConstraint {
        /// Constraint name.
        name: String,
        /// Definition of the dropped constraint, when the schema it is
        /// dropped from is known.
        constraint: Option<Constraint>,
    },
}

impl fmt::Display for AlterTableOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddColumn(plan) => write!(f, "add column '{}'", plan.name),
            Self::DropColumn(column) => write!(f, "drop column '{column}'"),
            Self::SetDefault { column, .. } => write!(f, "set default of column '{column}'"),
            Self::DropDefault { column } => write!(f, "drop default of column '{column}'"),
            Self::SetNotNull { column } => write!(f, "set column '{column}' NOT NULL"),
            Self::DropNotNull { column } => write!(f, "drop NOT NULL of column '{column}'"),
            Self::SetType {
                column,
                column_type,
            } => write!(f, "change type of column '{column}' to {column_type}"),
            Self::AddConstraint { name, constraint } => {
                write!(f, "add {} constraint '{name}'", constraint.kind())
            }
            Self::DropConstraint { name, .. } => write!(f, "drop constraint '{name}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DefaultValue;
    use crate::types::ScalarType;

    #[test]
    fn test_build_column_full_order() {
        let column = Column::new(ScalarType::Uuid)
            .primary()
            .required()
            .unique()
            .references("users", "id")
            .on_delete(ReferentialAction::Cascade)
            .default(DefaultValue::Expression("gen_random_uuid()".into()))
            .check("id IS NOT NULL");

        assert_eq!(
            build_column(&column, true),
            vec![
                BuilderOp::PrimaryKey,
                BuilderOp::Unique,
                BuilderOp::NotNull,
                BuilderOp::References(ColumnRef::new("users", "id")),
                BuilderOp::OnDelete(ReferentialAction::Cascade),
                BuilderOp::Default("gen_random_uuid()".into()),
                BuilderOp::Check("id IS NOT NULL".into()),
            ]
        );
    }

    #[test]
    fn test_build_column_omits_primary_key_when_not_inline() {
        let column = Column::new(ScalarType::Integer).primary().required();
        assert_eq!(build_column(&column, false), vec![BuilderOp::NotNull]);
    }

    #[test]
    fn test_unique_nullable_is_nulls_not_distinct() {
        let column = Column::new(ScalarType::Text).unique();
        assert_eq!(
            build_column(&column, true),
            vec![BuilderOp::Unique, BuilderOp::NullsNotDistinct]
        );
    }

    #[test]
    fn test_on_delete_without_reference_is_dropped() {
        let column = Column::new(ScalarType::Uuid).on_delete(ReferentialAction::SetNull);
        assert!(build_column(&column, true).is_empty());
    }

    #[test]
    fn test_plan_table_synthesizes_composite_key() {
        let table = Table::new()
            .column("a", Column::new(ScalarType::Integer).primary().required())
            .column("b", Column::new(ScalarType::Integer).primary().required());

        let plan = plan_table("pairs", &table);
        assert!(plan
            .columns
            .iter()
            .all(|c| !c.ops.contains(&BuilderOp::PrimaryKey)));
        assert_eq!(
            plan.constraints,
            vec![(
                "PK_pairs".to_string(),
                Constraint::PrimaryKey {
                    on: vec!["a".into(), "b".into()]
                }
            )]
        );
    }

    #[test]
    fn test_plan_table_nullable_primary_key() {
        let table = Table::new().column("id", Column::new(ScalarType::Uuid).primary());
        let plan = plan_table("things", &table);
        assert_eq!(plan.constraints.len(), 1);
        assert_eq!(plan.constraints[0].0, "PK_things");
    }

    #[test]
    fn test_plan_table_inline_key() {
        let table = Table::new().column("id", Column::new(ScalarType::Uuid).primary().required());
        let plan = plan_table("users", &table);
        assert!(plan.constraints.is_empty());
        assert_eq!(plan.columns[0].ops[0], BuilderOp::PrimaryKey);
    }

    #[test]
    fn test_creation_order_dependencies_first() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "a_comments".to_string(),
            Table::new().column(
                "post",
                Column::new(ScalarType::BigInt).references("b_posts", "id"),
            ),
        );
        tables.insert(
            "b_posts".to_string(),
            Table::new().column(
                "author",
                Column::new(ScalarType::BigInt).references("c_users", "id"),
            ),
        );
        tables.insert(
            "c_users".to_string(),
            Table::new().column(
                "manager",
                Column::new(ScalarType::BigInt).references("c_users", "id"),
            ),
        );

        assert_eq!(
            creation_order(&tables),
            vec!["c_users", "b_posts", "a_comments"]
        );
    }

    #[test]
    fn test_creation_order_breaks_cycles() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "x".to_string(),
            Table::new().column("y", Column::new(ScalarType::BigInt).references("y", "id")),
        );
        tables.insert(
            "y".to_string(),
            Table::new().column("x", Column::new(ScalarType::BigInt).references("x", "id")),
        );
        assert_eq!(creation_order(&tables), vec!["x", "y"]);
    }

    #[test]
    fn test_alter_op_descriptions() {
        let op = AlterTableOp::SetType {
            column: "age".into(),
            column_type: ScalarType::BigInt.into(),
        };
        assert_eq!(op.to_string(), "change type of column 'age' to bigint");

        let op = AlterTableOp::AddConstraint {
            name: "age_positive".into(),
            constraint: Constraint::Check {
                expr: "age > 0".into(),
            },
        };
        assert_eq!(op.to_string(), "add check constraint 'age_positive'");
    }
}
