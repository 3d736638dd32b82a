//! Snapshot diffing.
//!
//! Compares two full snapshots and produces the [`Version`] that turns the
//! first into the second. Tables, columns, constraints and indexes are
//! matched by name; the result is a pure function of the two maps.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use crate::delta::{ColumnAlteration, ColumnOp, TableDelta, Version};
use crate::error::{Result, SchemaError};
use crate::schema::{Column, SchemaDecl, Table};

/// A change between two snapshots that the delta model cannot express in
/// place. The change is left out of the computed delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffWarning {
    /// Column facets other than type, default and nullability changed.
    ColumnRedefined {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// The facets that differ.
        facets: Vec<&'static str>,
    },
    /// A constraint changed its definition but kept its name.
    ConstraintRedefined {
        /// Table name.
        table: String,
        /// Constraint name.
        constraint: String,
    },
    /// An index changed its definition but kept its name.
    IndexRedefined {
        /// Index name.
        index: String,
    },
}

impl fmt::Display for DiffWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColumnRedefined {
                table,
                column,
                facets,
            } => write!(
                f,
                "column '{table}.{column}' changed {} which cannot be altered in place",
                facets.join(", ")
            ),
            Self::ConstraintRedefined { table, constraint } => write!(
                f,
                "constraint '{table}.{constraint}' changed its definition under the same name"
            ),
            Self::IndexRedefined { index } => {
                write!(f, "index '{index}' changed its definition under the same name")
            }
        }
    }
}

/// A computed delta plus the changes it could not express.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    /// The delta from the first snapshot to the second.
    pub delta: Version,
    /// Changes left out of the delta.
    pub warnings: Vec<DiffWarning>,
}

impl SchemaDiff {
    /// Returns the delta, or [`SchemaError::Inexpressible`] when some changes
    /// were left out of it. Applying such a delta would leave the database
    /// short of the target snapshot.
    pub fn ensure_expressible(self) -> Result<Version> {
        if self.warnings.is_empty() {
            Ok(self.delta)
        } else {
            Err(SchemaError::Inexpressible(self.warnings))
        }
    }
}

/// Compares two snapshots and returns the delta that turns `from` into `to`.
///
/// Changes the delta cannot express are logged as warnings; use
/// [`diff_with_warnings`] to inspect them.
#[must_use]
pub fn diff(from: &SchemaDecl, to: &SchemaDecl) -> Version {
    let SchemaDiff { delta, warnings } = diff_with_warnings(from, to);
    for warning in &warnings {
        warn!(%warning, "Change not expressible as a delta");
    }
    delta
}

/// Compares two snapshots, returning the delta and the list of changes that
/// were left out of it.
#[must_use]
pub fn diff_with_warnings(from: &SchemaDecl, to: &SchemaDecl) -> SchemaDiff {
    let mut delta = Version::new();
    let mut warnings = Vec::new();

    for (name, table) in &to.tables {
        match from.tables.get(name) {
            None => {
                delta.add_tables.insert(name.clone(), table.clone());
            }
            Some(old) => {
                let table_delta = diff_table(name, old, table, &mut warnings);
                if !table_delta.is_empty() {
                    delta.alter_tables.insert(name.clone(), table_delta);
                }
            }
        }
    }
    delta.drop_tables = removed(&from.tables, &to.tables);

    for (name, index) in &to.indexes {
        match from.indexes.get(name) {
            None => {
                delta.add_indexes.insert(name.clone(), index.clone());
            }
            Some(old) if old != index => warnings.push(DiffWarning::IndexRedefined {
                index: name.clone(),
            }),
            Some(_) => {}
        }
    }
    delta.drop_indexes = removed(&from.indexes, &to.indexes);

    SchemaDiff { delta, warnings }
}

/// Names present in `from` but not in `to`, in name order.
fn removed<T>(from: &BTreeMap<String, T>, to: &BTreeMap<String, T>) -> Vec<String> {
    from.keys().filter(|k| !to.contains_key(*k)).cloned().collect()
}

fn diff_table(name: &str, from: &Table, to: &Table, warnings: &mut Vec<DiffWarning>) -> TableDelta {
    let mut delta = TableDelta::new();

    for (column_name, column) in &to.columns {
        match from.columns.get(column_name) {
            None => {
                delta.add_columns.insert(column_name.clone(), column.clone());
            }
            Some(old) => {
                let facets = fixed_facet_changes(old, column);
                if !facets.is_empty() {
                    warnings.push(DiffWarning::ColumnRedefined {
                        table: name.to_string(),
                        column: column_name.clone(),
                        facets,
                    });
                }
                if let Some(alteration) = diff_column(old, column) {
                    delta.alter_columns.insert(column_name.clone(), alteration);
                }
            }
        }
    }
    delta.drop_columns = removed(&from.columns, &to.columns);

    for (constraint_name, constraint) in &to.constraints {
        match from.constraints.get(constraint_name) {
            None => {
                delta
                    .add_constraints
                    .insert(constraint_name.clone(), constraint.clone());
            }
            Some(old) if old != constraint => warnings.push(DiffWarning::ConstraintRedefined {
                table: name.to_string(),
                constraint: constraint_name.clone(),
            }),
            Some(_) => {}
        }
    }
    delta.drop_constraints = removed(&from.constraints, &to.constraints);

    delta
}

/// Compares the alterable facets of a column: type, default and nullability.
fn diff_column(from: &Column, to: &Column) -> Option<ColumnAlteration> {
    let mut alteration = ColumnAlteration::new();

    if from.column_type != to.column_type {
        alteration.column_type = Some(to.column_type);
    }

    if from.default != to.default {
        match &to.default {
            Some(default) => alteration.default = Some(default.clone()),
            None => alteration.ops.push(ColumnOp::DropDefault),
        }
    }

    if from.required != to.required {
        alteration.ops.push(if to.required {
            ColumnOp::SetRequired
        } else {
            ColumnOp::DropRequired
        });
    }

    if alteration.is_empty() {
        None
    } else {
        Some(alteration)
    }
}

fn fixed_facet_changes(from: &Column, to: &Column) -> Vec<&'static str> {
    let mut facets = Vec::new();
    if from.unique != to.unique {
        facets.push("unique");
    }
    if from.primary != to.primary {
        facets.push("primary");
    }
    if from.references != to.references {
        facets.push("references");
    }
    if from.on_delete != to.on_delete {
        facets.push("on_delete");
    }
    if from.check != to.check {
        facets.push("check");
    }
    facets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Constraint, DefaultValue, Index};
    use crate::types::ScalarType;

    fn users() -> Table {
        Table::new()
            .column("id", Column::new(ScalarType::BigInt).primary().required())
            .column("name", Column::new(ScalarType::Text))
    }

    #[test]
    fn test_detect_new_table() {
        let to = SchemaDecl::new().table("users", users());
        let delta = diff(&SchemaDecl::new(), &to);
        assert_eq!(delta, Version::new().add_table("users", users()));
    }

    #[test]
    fn test_detect_dropped_table() {
        let from = SchemaDecl::new().table("users", users());
        let delta = diff(&from, &SchemaDecl::new());
        assert_eq!(delta.drop_tables, vec!["users"]);
        assert!(delta.add_tables.is_empty());
    }

    #[test]
    fn test_detect_new_and_dropped_column() {
        let from = SchemaDecl::new().table("users", users());
        let to = SchemaDecl::new().table(
            "users",
            Table::new()
                .column("id", Column::new(ScalarType::BigInt).primary().required())
                .column("email", Column::new(ScalarType::Text)),
        );

        let delta = diff(&from, &to);
        let users = &delta.alter_tables["users"];
        assert!(users.add_columns.contains_key("email"));
        assert_eq!(users.drop_columns, vec!["name"]);
        assert!(users.alter_columns.is_empty());
    }

    #[test]
    fn test_detect_column_changes() {
        let from = SchemaDecl::new().table(
            "users",
            users().column(
                "age",
                Column::new(ScalarType::Integer).default(DefaultValue::Integer(0)),
            ),
        );
        let to = SchemaDecl::new().table(
            "users",
            users().column("age", Column::new(ScalarType::BigInt).required()),
        );

        let delta = diff(&from, &to);
        assert_eq!(
            delta.alter_tables["users"].alter_columns["age"],
            ColumnAlteration::new()
                .set_type(ScalarType::BigInt)
                .op(ColumnOp::DropDefault)
                .op(ColumnOp::SetRequired)
        );
    }

    #[test]
    fn test_only_changed_facets_recorded() {
        let from = SchemaDecl::new().table("users", users());
        let to = SchemaDecl::new().table(
            "users",
            users().column(
                "name",
                Column::new(ScalarType::Text).default(DefaultValue::Text {
                    literal: "anon".into(),
                }),
            ),
        );

        let alteration = &diff(&from, &to).alter_tables["users"].alter_columns["name"];
        assert!(alteration.column_type.is_none());
        assert!(alteration.ops.is_empty());
        assert!(alteration.default.is_some());
    }

    #[test]
    fn test_constraints_and_indexes_whole_unit() {
        let unique = Constraint::Unique {
            on: vec!["name".into()],
            nulls_not_distinct: false,
        };
        let from = SchemaDecl::new()
            .table("users", users().constraint("old_check", Constraint::Check {
                expr: "id > 0".into(),
            }))
            .index("users_by_id", Index::new("users", &["id"]));
        let to = SchemaDecl::new()
            .table("users", users().constraint("users_name_key", unique.clone()))
            .index("users_by_name", Index::new("users", &["name"]));

        let delta = diff(&from, &to);
        let users = &delta.alter_tables["users"];
        assert_eq!(users.add_constraints["users_name_key"], unique);
        assert_eq!(users.drop_constraints, vec!["old_check"]);
        assert!(delta.add_indexes.contains_key("users_by_name"));
        assert_eq!(delta.drop_indexes, vec!["users_by_id"]);
    }

    #[test]
    fn test_no_changes() {
        let schema = SchemaDecl::new()
            .table("users", users())
            .index("users_by_name", Index::new("users", &["name"]));
        assert!(diff(&schema, &schema).is_empty());
    }

    #[test]
    fn test_warnings_for_inexpressible_changes() {
        let from = SchemaDecl::new()
            .table("users", users())
            .index("users_by_name", Index::new("users", &["name"]));
        let to = SchemaDecl::new()
            .table(
                "users",
                users().column("name", Column::new(ScalarType::Text).unique()),
            )
            .index("users_by_name", Index::new("users", &["name", "id"]));

        let SchemaDiff { delta, warnings } = diff_with_warnings(&from, &to);
        assert!(delta.is_empty());
        assert_eq!(
            warnings,
            vec![
                DiffWarning::ColumnRedefined {
                    table: "users".into(),
                    column: "name".into(),
                    facets: vec!["unique"],
                },
                DiffWarning::IndexRedefined {
                    index: "users_by_name".into()
                },
            ]
        );
    }

    #[test]
    fn test_inexpressible_changes_refused() {
        let from = SchemaDecl::new().table("users", users());
        let to = SchemaDecl::new().table(
            "users",
            users().column("name", Column::new(ScalarType::Text).unique()),
        );

        let err = diff_with_warnings(&from, &to)
            .ensure_expressible()
            .unwrap_err();
        match &err {
            SchemaError::Inexpressible(warnings) => assert_eq!(warnings.len(), 1),
            other => panic!("Expected Inexpressible, got {other:?}"),
        }
        assert!(err.to_string().contains("'users.name' changed unique"));

        let grown = SchemaDecl::new().table(
            "users",
            users().column("bio", Column::new(ScalarType::Text)),
        );
        let delta = diff_with_warnings(&from, &grown)
            .ensure_expressible()
            .unwrap();
        assert!(delta.alter_tables["users"].add_columns.contains_key("bio"));
    }
}
