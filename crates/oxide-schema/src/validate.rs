//! Internal consistency checks for deltas.

use std::collections::BTreeMap;

use crate::delta::{TableDelta, Version};
use crate::error::{Result, SchemaError};

/// Checks that no table, column, constraint or index name appears in more
/// than one of a delta's add/drop/alter sets (or twice in a drop list).
///
/// Every duplicate is reported; several are combined into
/// [`SchemaError::Multiple`].
pub fn validate(delta: &Version) -> Result<()> {
    let mut errors = Vec::new();

    let tables = count(
        delta
            .add_tables
            .keys()
            .chain(&delta.drop_tables)
            .chain(delta.alter_tables.keys()),
    );
    for name in tables {
        errors.push(SchemaError::DuplicateTable {
            name: name.to_string(),
            owners: None,
        });
    }

    for (table, table_delta) in &delta.alter_tables {
        validate_table(table, table_delta, &mut errors);
    }

    let indexes = count(delta.add_indexes.keys().chain(&delta.drop_indexes));
    for name in indexes {
        errors.push(SchemaError::DuplicateIndex {
            name: name.to_string(),
            owners: None,
        });
    }

    SchemaError::from_list(errors)
}

fn validate_table(table: &str, delta: &TableDelta, errors: &mut Vec<SchemaError>) {
    let columns = count(
        delta
            .add_columns
            .keys()
            .chain(&delta.drop_columns)
            .chain(delta.alter_columns.keys()),
    );
    for column in columns {
        errors.push(SchemaError::DuplicateColumn {
            table: table.to_string(),
            column: column.to_string(),
        });
    }

    let constraints = count(delta.add_constraints.keys().chain(&delta.drop_constraints));
    for constraint in constraints {
        errors.push(SchemaError::DuplicateConstraint {
            table: table.to_string(),
            constraint: constraint.to_string(),
        });
    }
}

/// Returns the names that occur more than once, in name order.
fn count<'a>(names: impl Iterator<Item = &'a String>) -> Vec<&'a str> {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    for name in names {
        *seen.entry(name.as_str()).or_default() += 1;
    }
    seen.into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(name, _)| name)
        .collect()
}

/// Checks that no column alteration both sets and drops a default.
pub(crate) fn check_column_ops(delta: &Version) -> Result<()> {
    let errors = delta
        .alter_tables
        .iter()
        .flat_map(|(table, table_delta)| {
            table_delta
                .alter_columns
                .iter()
                .filter(|(_, alteration)| alteration.conflicts())
                .map(move |(column, _)| SchemaError::ConflictingColumnOp {
                    table: table.clone(),
                    column: column.clone(),
                    detail: "a new default is set and dropped in the same alteration".to_string(),
                })
        })
        .collect();
    SchemaError::from_list(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{ColumnAlteration, ColumnOp};
    use crate::schema::{Column, DefaultValue, Index, Table};
    use crate::types::ScalarType;

    #[test]
    fn test_valid_delta() {
        let delta = Version::new()
            .add_table("posts", Table::new())
            .drop_table("legacy")
            .alter_table(
                "users",
                TableDelta::new()
                    .add_column("name", Column::new(ScalarType::Text))
                    .drop_column("nickname"),
            )
            .add_index("posts_by_id", Index::new("posts", &["id"]));
        validate(&delta).unwrap();
    }

    #[test]
    fn test_add_and_drop_same_column() {
        let delta = Version::new().alter_table(
            "users",
            TableDelta::new()
                .add_column("c", Column::new(ScalarType::Text))
                .drop_column("c"),
        );

        match validate(&delta) {
            Err(SchemaError::DuplicateColumn { table, column }) => {
                assert_eq!(table, "users");
                assert_eq!(column, "c");
            }
            other => panic!("Expected DuplicateColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_reports_every_duplicate() {
        let delta = Version::new()
            .add_table("t", Table::new())
            .drop_table("t")
            .drop_table("u")
            .drop_table("u")
            .add_index("i", Index::new("t", &["id"]))
            .drop_index("i")
            .alter_table(
                "v",
                TableDelta::new()
                    .drop_column("x")
                    .alter_column("x", ColumnAlteration::new().op(ColumnOp::SetRequired))
                    .drop_constraint("k")
                    .drop_constraint("k"),
            );

        let err = validate(&delta).unwrap_err();
        let SchemaError::Multiple(errors) = &err else {
            panic!("Expected Multiple, got {err:?}");
        };
        assert_eq!(errors.len(), 5);

        let message = err.to_string();
        for needle in ["'t'", "'u'", "'i'", "'x'", "'k'"] {
            assert!(message.contains(needle), "{needle} missing from {message}");
        }
    }

    #[test]
    fn test_conflicting_default_ops() {
        let delta = Version::new().alter_table(
            "users",
            TableDelta::new().alter_column(
                "age",
                ColumnAlteration::new()
                    .set_default(DefaultValue::Integer(0))
                    .op(ColumnOp::DropDefault),
            ),
        );
        validate(&delta).unwrap();
        assert!(matches!(
            check_column_ops(&delta),
            Err(SchemaError::ConflictingColumnOp { .. })
        ));
    }
}
