//! Folding a chain of deltas into one net delta.
//!
//! Adding and later dropping the same table, column, constraint or index
//! cancels out. Alterations of something added earlier in the chain are
//! folded into the added definition. Repeated alterations of the same column
//! merge, the last value of each facet winning.

use tracing::debug;

use crate::delta::{ColumnAlteration, ColumnOp, TableDelta, Version};
use crate::error::{ObjectKind, Result, SchemaError};
use crate::state::apply_table_delta;
use crate::validate::{check_column_ops, validate};

/// Collapses an ordered sequence of deltas into a single delta with the same
/// effect as applying them in order.
///
/// Each delta is validated first. Re-adding something the net delta already
/// adds (or has dropped), and dropping or altering something the net delta
/// has already dropped, are errors.
///
/// One delta cannot both drop and add the same table or index name, so a
/// chain that drops a table or index and later re-adds it under the same
/// name has no net delta. Such chains fail with
/// [`SchemaError::DuplicateTable`] or [`SchemaError::DuplicateIndex`]. This
/// holds for chains produced by [`diff`](crate::diff::diff) too.
pub fn collapse(deltas: &[Version]) -> Result<Version> {
    let net = deltas
        .iter()
        .enumerate()
        .try_fold(Version::new(), |net, (position, delta)| {
            validate(delta)?;
            check_column_ops(delta)?;
            debug!(position, "Folding delta");
            fold(net, delta)
        })?;
    Ok(net.prune())
}

fn fold(mut net: Version, delta: &Version) -> Result<Version> {
    for name in &delta.drop_indexes {
        if net.add_indexes.remove(name).is_some() {
            continue;
        }
        if net.drop_indexes.contains(name) {
            return Err(SchemaError::missing("drop", ObjectKind::Index, name));
        }
        net.drop_indexes.push(name.clone());
    }

    for name in &delta.drop_tables {
        if net.add_tables.remove(name).is_some() {
            continue;
        }
        if net.drop_tables.contains(name) {
            return Err(SchemaError::missing("drop", ObjectKind::Table, name));
        }
        net.alter_tables.remove(name);
        net.drop_tables.push(name.clone());
    }

    for (name, table) in &delta.add_tables {
        if net.add_tables.contains_key(name)
            || net.drop_tables.contains(name)
            || net.alter_tables.contains_key(name)
        {
            return Err(SchemaError::DuplicateTable {
                name: name.clone(),
                owners: None,
            });
        }
        net.add_tables.insert(name.clone(), table.clone());
    }

    for (name, table_delta) in &delta.alter_tables {
        if let Some(table) = net.add_tables.get_mut(name) {
            apply_table_delta(name, table, table_delta)?;
        } else if net.drop_tables.contains(name) {
            return Err(SchemaError::missing("alter", ObjectKind::Table, name));
        } else {
            let merged = net.alter_tables.entry(name.clone()).or_default();
            merge_table_delta(name, merged, table_delta)?;
        }
    }

    for (name, index) in &delta.add_indexes {
        if net.add_indexes.contains_key(name) || net.drop_indexes.contains(name) {
            return Err(SchemaError::DuplicateIndex {
                name: name.clone(),
                owners: None,
            });
        }
        net.add_indexes.insert(name.clone(), index.clone());
    }

    Ok(net)
}

fn merge_table_delta(table: &str, net: &mut TableDelta, delta: &TableDelta) -> Result<()> {
    for name in &delta.drop_constraints {
        if net.add_constraints.remove(name).is_some() {
            continue;
        }
        if net.drop_constraints.contains(name) {
            return Err(SchemaError::missing(
                "drop",
                ObjectKind::Constraint,
                format!("{table}.{name}"),
            ));
        }
        net.drop_constraints.push(name.clone());
    }

    for name in &delta.drop_columns {
        if net.add_columns.remove(name).is_some() {
            continue;
        }
        if net.drop_columns.contains(name) {
            return Err(SchemaError::missing(
                "drop",
                ObjectKind::Column,
                format!("{table}.{name}"),
            ));
        }
        net.alter_columns.remove(name);
        net.drop_columns.push(name.clone());
    }

    for (name, column) in &delta.add_columns {
        if net.add_columns.contains_key(name)
            || net.drop_columns.contains(name)
            || net.alter_columns.contains_key(name)
        {
            return Err(SchemaError::DuplicateColumn {
                table: table.to_string(),
                column: name.clone(),
            });
        }
        net.add_columns.insert(name.clone(), column.clone());
    }

    for (name, alteration) in &delta.alter_columns {
        if let Some(column) = net.add_columns.get_mut(name) {
            alteration.apply_to(column);
        } else if net.drop_columns.contains(name) {
            return Err(SchemaError::missing(
                "alter",
                ObjectKind::Column,
                format!("{table}.{name}"),
            ));
        } else {
            merge_alteration(net.alter_columns.entry(name.clone()).or_default(), alteration);
        }
    }

    for (name, constraint) in &delta.add_constraints {
        if net.add_constraints.contains_key(name) || net.drop_constraints.contains(name) {
            return Err(SchemaError::DuplicateConstraint {
                table: table.to_string(),
                constraint: name.clone(),
            });
        }
        net.add_constraints.insert(name.clone(), constraint.clone());
    }

    Ok(())
}

/// Merges a later alteration into an earlier one. The last type, the last
/// default decision and the last nullability operation win.
fn merge_alteration(net: &mut ColumnAlteration, later: &ColumnAlteration) {
    if let Some(column_type) = later.column_type {
        net.column_type = Some(column_type);
    }
    if let Some(default) = &later.default {
        net.default = Some(default.clone());
        net.ops.retain(|op| *op != ColumnOp::DropDefault);
    }
    for op in &later.ops {
        match op {
            ColumnOp::DropDefault => {
                net.default = None;
                net.ops.retain(|o| *o != ColumnOp::DropDefault);
            }
            ColumnOp::SetRequired | ColumnOp::DropRequired => {
                net.ops
                    .retain(|o| !matches!(o, ColumnOp::SetRequired | ColumnOp::DropRequired));
            }
        }
        net.ops.push(*op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, DefaultValue, Index, Table};
    use crate::types::ScalarType;

    fn table() -> Table {
        Table::new().column("id", Column::new(ScalarType::BigInt).primary().required())
    }

    #[test]
    fn test_add_then_drop_table_cancels() {
        let net = collapse(&[
            Version::new().add_table("t", table()),
            Version::new().drop_table("t"),
        ])
        .unwrap();
        assert!(!net.add_tables.contains_key("t"));
        assert!(!net.drop_tables.contains(&"t".to_string()));
        assert!(net.is_empty());
    }

    #[test]
    fn test_add_then_drop_index_cancels() {
        let net = collapse(&[
            Version::new().add_index("i", Index::new("t", &["id"])),
            Version::new().drop_index("i"),
        ])
        .unwrap();
        assert!(net.is_empty());
    }

    #[test]
    fn test_add_then_alter_folds_into_add() {
        let net = collapse(&[
            Version::new().add_table("t", table()),
            Version::new().alter_table(
                "t",
                TableDelta::new()
                    .add_column("name", Column::new(ScalarType::Text))
                    .alter_column(
                        "id",
                        ColumnAlteration::new().set_default(DefaultValue::Integer(1)),
                    ),
            ),
        ])
        .unwrap();

        assert!(net.alter_tables.is_empty());
        let t = &net.add_tables["t"];
        assert!(t.columns.contains_key("name"));
        assert_eq!(t.columns["id"].default, Some(DefaultValue::Integer(1)));
    }

    #[test]
    fn test_alter_then_drop_keeps_only_drop() {
        let net = collapse(&[
            Version::new().alter_table("t", TableDelta::new().drop_column("x")),
            Version::new().drop_table("t"),
        ])
        .unwrap();
        assert_eq!(net, Version::new().drop_table("t"));
    }

    #[test]
    fn test_column_add_then_drop_cancels() {
        let net = collapse(&[
            Version::new().alter_table(
                "t",
                TableDelta::new().add_column("tmp", Column::new(ScalarType::Text)),
            ),
            Version::new().alter_table("t", TableDelta::new().drop_column("tmp")),
        ])
        .unwrap();
        assert!(net.is_empty());
    }

    #[test]
    fn test_alterations_merge() {
        let net = collapse(&[
            Version::new().alter_table(
                "t",
                TableDelta::new().alter_column(
                    "c",
                    ColumnAlteration::new()
                        .set_type(ScalarType::Integer)
                        .set_default(DefaultValue::Integer(0)),
                ),
            ),
            Version::new().alter_table(
                "t",
                TableDelta::new().alter_column(
                    "c",
                    ColumnAlteration::new()
                        .set_type(ScalarType::BigInt)
                        .op(ColumnOp::DropDefault),
                ),
            ),
        ])
        .unwrap();

        assert_eq!(
            net.alter_tables["t"].alter_columns["c"],
            ColumnAlteration::new()
                .set_type(ScalarType::BigInt)
                .op(ColumnOp::DropDefault)
        );
    }

    // Inferred policy: the last nullability operation of a column wins.
    #[test]
    fn test_last_nullability_op_wins() {
        let step = |op| {
            Version::new().alter_table(
                "t",
                TableDelta::new().alter_column("c", ColumnAlteration::new().op(op)),
            )
        };
        let net = collapse(&[
            step(ColumnOp::SetRequired),
            step(ColumnOp::DropRequired),
            step(ColumnOp::SetRequired),
        ])
        .unwrap();
        assert_eq!(
            net.alter_tables["t"].alter_columns["c"].ops,
            vec![ColumnOp::SetRequired]
        );
    }

    #[test]
    fn test_re_adding_fails() {
        let result = collapse(&[
            Version::new().add_table("t", table()),
            Version::new().add_table("t", table()),
        ]);
        assert!(matches!(result, Err(SchemaError::DuplicateTable { .. })));
    }

    #[test]
    fn test_dropping_twice_fails() {
        let result = collapse(&[
            Version::new().drop_table("t"),
            Version::new().drop_table("t"),
        ]);
        assert!(matches!(result, Err(SchemaError::MissingTarget { .. })));
    }

    #[test]
    fn test_invalid_element_rejected() {
        let result = collapse(&[Version::new().add_table("t", table()).drop_table("t")]);
        assert!(matches!(result, Err(SchemaError::DuplicateTable { .. })));
    }

    #[test]
    fn test_empty_chain() {
        assert!(collapse(&[]).unwrap().is_empty());
    }
}
