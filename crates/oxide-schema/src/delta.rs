//! Delta types.
//!
//! A [`Version`] describes the structural change between two snapshots: which
//! tables and indexes to add or drop, and per-table [`TableDelta`]s for tables
//! that exist on both sides. Deltas are either authored by a schema owner as a
//! version increment or computed by [`diff`](crate::diff::diff) and
//! [`collapse`](crate::collapse::collapse).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::{Column, Constraint, DefaultValue, Index, Table};
use crate::types::ColumnType;

/// An explicit operation on an existing column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnOp {
    /// Remove the column's default.
    DropDefault,
    /// Make the column NOT NULL.
    SetRequired,
    /// Make the column nullable.
    DropRequired,
}

/// Changes to an existing column. Only the facets that change are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnAlteration {
    /// New column type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<ColumnType>,
    /// New default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Explicit operations, applied in order after the type and default.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ops: Vec<ColumnOp>,
}

impl ColumnAlteration {
    /// Creates an empty alteration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a new type.
    #[must_use]
    pub fn set_type(mut self, column_type: impl Into<ColumnType>) -> Self {
        self.column_type = Some(column_type.into());
        self
    }

    /// Sets a new default.
    #[must_use]
    pub fn set_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Appends an explicit operation.
    #[must_use]
    pub fn op(mut self, op: ColumnOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Returns true if no changes are specified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.column_type.is_none() && self.default.is_none() && self.ops.is_empty()
    }

    /// Returns true when a new default is set and dropped in the same
    /// alteration.
    #[must_use]
    pub fn conflicts(&self) -> bool {
        self.default.is_some() && self.ops.contains(&ColumnOp::DropDefault)
    }

    /// Applies the alteration to a column declaration.
    pub fn apply_to(&self, column: &mut Column) {
        if let Some(column_type) = self.column_type {
            column.column_type = column_type;
        }
        if let Some(default) = &self.default {
            column.default = Some(default.clone());
        }
        for op in &self.ops {
            match op {
                ColumnOp::DropDefault => column.default = None,
                ColumnOp::SetRequired => column.required = true,
                ColumnOp::DropRequired => column.required = false,
            }
        }
    }
}

/// Changes to an existing table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDelta {
    /// Columns to add.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add_columns: BTreeMap<String, Column>,
    /// Columns to drop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop_columns: Vec<String>,
    /// Columns to alter.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alter_columns: BTreeMap<String, ColumnAlteration>,
    /// Constraints to add.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add_constraints: BTreeMap<String, Constraint>,
    /// Constraints to drop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop_constraints: Vec<String>,
}

impl TableDelta {
    /// Creates an empty table delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column.
    #[must_use]
    pub fn add_column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.add_columns.insert(name.into(), column);
        self
    }

    /// Drops a column.
    #[must_use]
    pub fn drop_column(mut self, name: impl Into<String>) -> Self {
        self.drop_columns.push(name.into());
        self
    }

    /// Alters a column.
    #[must_use]
    pub fn alter_column(mut self, name: impl Into<String>, alteration: ColumnAlteration) -> Self {
        self.alter_columns.insert(name.into(), alteration);
        self
    }

    /// Adds a constraint.
    #[must_use]
    pub fn add_constraint(mut self, name: impl Into<String>, constraint: Constraint) -> Self {
        self.add_constraints.insert(name.into(), constraint);
        self
    }

    /// Drops a constraint.
    #[must_use]
    pub fn drop_constraint(mut self, name: impl Into<String>) -> Self {
        self.drop_constraints.push(name.into());
        self
    }

    /// Returns true if the delta changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add_columns.is_empty()
            && self.drop_columns.is_empty()
            && self.alter_columns.is_empty()
            && self.add_constraints.is_empty()
            && self.drop_constraints.is_empty()
    }
}

/// A schema-level delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Version {
    /// Tables to create.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add_tables: BTreeMap<String, Table>,
    /// Tables to drop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop_tables: Vec<String>,
    /// Tables to alter.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alter_tables: BTreeMap<String, TableDelta>,
    /// Indexes to create.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add_indexes: BTreeMap<String, Index>,
    /// Indexes to drop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop_indexes: Vec<String>,
}

impl Version {
    /// Creates an empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table.
    #[must_use]
    pub fn add_table(mut self, name: impl Into<String>, table: Table) -> Self {
        self.add_tables.insert(name.into(), table);
        self
    }

    /// Drops a table.
    #[must_use]
    pub fn drop_table(mut self, name: impl Into<String>) -> Self {
        self.drop_tables.push(name.into());
        self
    }

    /// Alters a table.
    #[must_use]
    pub fn alter_table(mut self, name: impl Into<String>, delta: TableDelta) -> Self {
        self.alter_tables.insert(name.into(), delta);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn add_index(mut self, name: impl Into<String>, index: Index) -> Self {
        self.add_indexes.insert(name.into(), index);
        self
    }

    /// Drops an index.
    #[must_use]
    pub fn drop_index(mut self, name: impl Into<String>) -> Self {
        self.drop_indexes.push(name.into());
        self
    }

    /// Returns true if every add, drop and alter set is empty.
    ///
    /// An altered table whose own delta is empty still counts as a change
    /// here; use [`Version::prune`] to remove such entries first.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add_tables.is_empty()
            && self.drop_tables.is_empty()
            && self.alter_tables.is_empty()
            && self.add_indexes.is_empty()
            && self.drop_indexes.is_empty()
    }

    /// Removes table deltas and column alterations that change nothing.
    #[must_use]
    pub fn prune(mut self) -> Self {
        for delta in self.alter_tables.values_mut() {
            delta.alter_columns.retain(|_, alteration| !alteration.is_empty());
        }
        self.alter_tables.retain(|_, delta| !delta.is_empty());
        self
    }
}

/// Returns true iff every add, drop and alter set of the delta is empty.
#[must_use]
pub fn is_empty(delta: &Version) -> bool {
    delta.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarType;
    use serde_json::json;

    #[test]
    fn test_empty_delta() {
        assert!(is_empty(&Version::new()));
        assert!(!is_empty(&Version::new().drop_index("idx")));
    }

    #[test]
    fn test_prune_removes_noops() {
        let delta = Version::new()
            .alter_table("users", TableDelta::new())
            .alter_table(
                "posts",
                TableDelta::new().alter_column("title", ColumnAlteration::new()),
            );
        assert!(!delta.is_empty());
        assert!(delta.prune().is_empty());
    }

    #[test]
    fn test_alteration_apply_to() {
        let mut column = Column::new(ScalarType::Integer)
            .default(DefaultValue::Integer(0))
            .required();

        ColumnAlteration::new()
            .set_type(ScalarType::BigInt)
            .op(ColumnOp::DropDefault)
            .op(ColumnOp::DropRequired)
            .apply_to(&mut column);

        assert_eq!(column.column_type, ScalarType::BigInt.into());
        assert_eq!(column.default, None);
        assert!(!column.required);
    }

    #[test]
    fn test_conflicting_alteration() {
        let alteration = ColumnAlteration::new()
            .set_default(DefaultValue::Integer(1))
            .op(ColumnOp::DropDefault);
        assert!(alteration.conflicts());
    }

    #[test]
    fn test_delta_from_json() {
        let delta: Version = serde_json::from_value(json!({
            "add_tables": {},
            "alter_tables": {
                "users": {
                    "add_columns": {"name": {"type": "text", "required": true}},
                    "alter_columns": {"age": {"type": "bigint", "ops": ["drop_required"]}}
                }
            },
            "drop_indexes": ["users_by_age"]
        }))
        .unwrap();

        let users = &delta.alter_tables["users"];
        assert!(users.add_columns["name"].required);
        assert_eq!(users.alter_columns["age"].ops, vec![ColumnOp::DropRequired]);
        assert_eq!(delta.drop_indexes, vec!["users_by_age"]);
    }
}
