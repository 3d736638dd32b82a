//! In-memory application of deltas to snapshots.
//!
//! This is the reducer behind version replay: [`apply_delta_to_schema`] never
//! touches a database, it produces the snapshot a delta leads to or explains
//! why the delta does not fit the snapshot it is applied to.

use crate::delta::{TableDelta, Version};
use crate::error::{ObjectKind, Result, SchemaError};
use crate::schema::{SchemaDecl, Table};
use crate::validate::{check_column_ops, validate};

/// Applies a delta to a snapshot, returning the new snapshot.
///
/// Steps run in the same order as a live application: index drops, table
/// drops, table creation, table alterations, index creation. Drop and alter
/// targets must exist; add targets must not.
pub fn apply_delta_to_schema(schema: &SchemaDecl, delta: &Version) -> Result<SchemaDecl> {
    validate(delta)?;
    check_column_ops(delta)?;

    let mut next = schema.clone();

    for name in &delta.drop_indexes {
        next.indexes
            .remove(name)
            .ok_or_else(|| SchemaError::missing("drop", ObjectKind::Index, name))?;
    }

    for name in &delta.drop_tables {
        next.tables
            .remove(name)
            .ok_or_else(|| SchemaError::missing("drop", ObjectKind::Table, name))?;
    }

    for (name, table) in &delta.add_tables {
        if next.tables.contains_key(name) {
            return Err(SchemaError::DuplicateTable {
                name: name.clone(),
                owners: None,
            });
        }
        next.tables.insert(name.clone(), table.clone());
    }

    for (name, table_delta) in &delta.alter_tables {
        let table = next
            .tables
            .get_mut(name)
            .ok_or_else(|| SchemaError::missing("alter", ObjectKind::Table, name))?;
        apply_table_delta(name, table, table_delta)?;
    }

    for (name, index) in &delta.add_indexes {
        if next.indexes.contains_key(name) {
            return Err(SchemaError::DuplicateIndex {
                name: name.clone(),
                owners: None,
            });
        }
        next.indexes.insert(name.clone(), index.clone());
    }

    Ok(next)
}

/// Applies a table delta in place: constraint drops, column drops, column
/// additions, column alterations, constraint additions.
pub(crate) fn apply_table_delta(name: &str, table: &mut Table, delta: &TableDelta) -> Result<()> {
    for constraint in &delta.drop_constraints {
        table.constraints.remove(constraint).ok_or_else(|| {
            SchemaError::missing("drop", ObjectKind::Constraint, format!("{name}.{constraint}"))
        })?;
    }

    for column in &delta.drop_columns {
        table.columns.remove(column).ok_or_else(|| {
            SchemaError::missing("drop", ObjectKind::Column, format!("{name}.{column}"))
        })?;
    }

    for (column_name, column) in &delta.add_columns {
        if table.columns.contains_key(column_name) {
            return Err(SchemaError::DuplicateColumn {
                table: name.to_string(),
                column: column_name.clone(),
            });
        }
        table.columns.insert(column_name.clone(), column.clone());
    }

    for (column_name, alteration) in &delta.alter_columns {
        if alteration.conflicts() {
            return Err(SchemaError::ConflictingColumnOp {
                table: name.to_string(),
                column: column_name.clone(),
                detail: "a new default is set and dropped in the same alteration".to_string(),
            });
        }
        let column = table.columns.get_mut(column_name).ok_or_else(|| {
            SchemaError::missing("alter", ObjectKind::Column, format!("{name}.{column_name}"))
        })?;
        alteration.apply_to(column);
    }

    for (constraint_name, constraint) in &delta.add_constraints {
        if table.constraints.contains_key(constraint_name) {
            return Err(SchemaError::DuplicateConstraint {
                table: name.to_string(),
                constraint: constraint_name.clone(),
            });
        }
        table
            .constraints
            .insert(constraint_name.clone(), constraint.clone());
    }

    Ok(())
}
