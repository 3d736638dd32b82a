//! Schema representation types.
//!
//! A [`SchemaDecl`] is a full snapshot: every table with its columns and named
//! constraints, plus every index. Maps are ordered by name so that snapshots
//! compare, serialize and render deterministically.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::types::ColumnType;

/// Action taken on referencing rows when a referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    /// No action (error if referenced row is deleted).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete to referencing rows.
    Cascade,
    /// Set the referencing column to NULL.
    SetNull,
    /// Set the referencing column to its default value.
    SetDefault,
}

impl ReferentialAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Default value for a column.
///
/// JSON booleans and numbers are literals. A JSON string is an opaque SQL
/// expression forwarded verbatim (`"now()"`, `"CURRENT_DATE"`, `"0.5"`); a
/// quoted text literal is written as `{"literal": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// SQL expression, never interpreted.
    Expression(String),
    /// Text literal, quoted when rendered.
    Text {
        /// The literal value.
        literal: String,
    },
}

impl DefaultValue {
    /// Returns the SQL representation of this default value.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Expression(expr) => expr.clone(),
            Self::Text { literal } => format!("'{}'", literal.replace('\'', "''")),
        }
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// A `table.column` reference, written as a single dotted string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnRef {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
}

impl ColumnRef {
    /// Creates a new reference.
    #[must_use]
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl TryFrom<String> for ColumnRef {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.split_once('.') {
            Some((table, column))
                if !table.is_empty() && !column.is_empty() && !column.contains('.') =>
            {
                Ok(Self::new(table, column))
            }
            _ => Err(format!("'{value}' is not a 'table.column' reference")),
        }
    }
}

impl From<ColumnRef> for String {
    fn from(value: ColumnRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

/// Declaration of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Column {
    /// Column type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Whether the column is NOT NULL.
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    /// Whether the column has a UNIQUE constraint.
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    /// Whether the column is part of the primary key.
    #[serde(default, skip_serializing_if = "is_false")]
    pub primary: bool,
    /// Foreign key target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ColumnRef>,
    /// Delete action of the foreign key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ReferentialAction>,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Check constraint expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
}

impl Column {
    /// Creates a nullable column of the given type.
    #[must_use]
    pub fn new(column_type: impl Into<ColumnType>) -> Self {
        Self {
            column_type: column_type.into(),
            required: false,
            unique: false,
            primary: false,
            references: None,
            on_delete: None,
            default: None,
            check: None,
        }
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the column as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the column as part of the primary key.
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Sets the foreign key target.
    #[must_use]
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ColumnRef::new(table, column));
        self
    }

    /// Sets the foreign key delete action.
    #[must_use]
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets a check constraint.
    #[must_use]
    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.check = Some(expr.into());
        self
    }
}

/// A named table-level constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    /// Composite primary key.
    PrimaryKey {
        /// Key columns.
        on: Vec<String>,
    },
    /// Foreign key.
    ForeignKey {
        /// Referencing columns.
        on: Vec<String>,
        /// Referenced table.
        target: String,
        /// Referenced columns, positionally matched with `on`.
        references: Vec<String>,
        /// Delete action.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_delete: Option<ReferentialAction>,
    },
    /// Unique constraint.
    Unique {
        /// Columns that form the unique key.
        on: Vec<String>,
        /// Whether NULLs compare equal for uniqueness.
        #[serde(default, skip_serializing_if = "is_false")]
        nulls_not_distinct: bool,
    },
    /// Check constraint.
    Check {
        /// Boolean SQL expression.
        expr: String,
    },
}

impl Constraint {
    /// Returns the local columns this constraint covers.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        match self {
            Self::PrimaryKey { on } | Self::ForeignKey { on, .. } | Self::Unique { on, .. } => on,
            Self::Check { .. } => &[],
        }
    }

    /// Returns a short name of the constraint kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PrimaryKey { .. } => "primary key",
            Self::ForeignKey { .. } => "foreign key",
            Self::Unique { .. } => "unique",
            Self::Check { .. } => "check",
        }
    }
}

/// Declaration of a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Table {
    /// Columns by name.
    pub columns: BTreeMap<String, Column>,
    /// Named constraints.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constraints: BTreeMap<String, Constraint>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    /// Adds a named constraint.
    #[must_use]
    pub fn constraint(mut self, name: impl Into<String>, constraint: Constraint) -> Self {
        self.constraints.insert(name.into(), constraint);
        self
    }

    /// Returns the names of the primary key columns.
    #[must_use]
    pub fn primary_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, c)| c.primary)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Returns whether the primary key can be declared inline on its column:
    /// exactly one primary column, and that column is required.
    #[must_use]
    pub fn inline_primary_key(&self) -> bool {
        let mut primaries = self.columns.values().filter(|c| c.primary);
        matches!((primaries.next(), primaries.next()), (Some(c), None) if c.required)
    }

    /// Returns the tables this table references (excluding itself).
    pub fn referenced_tables<'a>(&'a self, own_name: &'a str) -> impl Iterator<Item = &'a str> {
        let from_columns = self
            .columns
            .values()
            .filter_map(|c| c.references.as_ref().map(|r| r.table.as_str()));
        let from_constraints = self.constraints.values().filter_map(|c| match c {
            Constraint::ForeignKey { target, .. } => Some(target.as_str()),
            _ => None,
        });
        from_columns
            .chain(from_constraints)
            .filter(move |t| *t != own_name)
    }
}

/// Declaration of an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Index {
    /// Indexed table.
    pub on: String,
    /// Indexed columns.
    pub columns: Vec<String>,
}

impl Index {
    /// Creates a new index declaration.
    #[must_use]
    pub fn new(on: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            on: on.into(),
            columns: columns.iter().map(ToString::to_string).collect(),
        }
    }
}

/// A full schema snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDecl {
    /// Tables by name.
    pub tables: BTreeMap<String, Table>,
    /// Indexes by name.
    #[serde(default)]
    pub indexes: BTreeMap<String, Index>,
}

impl SchemaDecl {
    /// Creates a new empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table to the schema.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>, table: Table) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    /// Adds an index to the schema.
    #[must_use]
    pub fn index(mut self, name: impl Into<String>, index: Index) -> Self {
        self.indexes.insert(name.into(), index);
        self
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Returns true if the schema declares nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.indexes.is_empty()
    }

    /// Checks the structural invariants of the snapshot: constraint and index
    /// columns exist, foreign keys have matching arity, and no reference
    /// points at a table or column that does not exist.
    ///
    /// Every problem is reported, not just the first one.
    pub fn check_integrity(&self) -> Result<()> {
        let mut errors = Vec::new();
        let mut problem = |table: &str, message: String| {
            errors.push(SchemaError::InvalidSchema {
                table: table.to_string(),
                message,
            });
        };

        for (table_name, table) in &self.tables {
            for (column_name, column) in &table.columns {
                match &column.references {
                    Some(target) => {
                        if let Some(message) = self.missing_column(&target.table, &target.column) {
                            problem(
                                table_name,
                                format!("column '{column_name}' references {message}"),
                            );
                        }
                    }
                    None if column.on_delete.is_some() => problem(
                        table_name,
                        format!("column '{column_name}' has on_delete but no reference"),
                    ),
                    None => {}
                }
            }

            for (constraint_name, constraint) in &table.constraints {
                if !matches!(constraint, Constraint::Check { .. }) && constraint.columns().is_empty()
                {
                    problem(
                        table_name,
                        format!("constraint '{constraint_name}' covers no columns"),
                    );
                }
                for column in constraint.columns() {
                    if !table.columns.contains_key(column) {
                        problem(
                            table_name,
                            format!(
                                "constraint '{constraint_name}' uses unknown column '{column}'"
                            ),
                        );
                    }
                }
                if let Constraint::ForeignKey {
                    on,
                    target,
                    references,
                    ..
                } = constraint
                {
                    if on.len() != references.len() {
                        problem(
                            table_name,
                            format!(
                                "foreign key '{constraint_name}' maps {} columns onto {}",
                                on.len(),
                                references.len()
                            ),
                        );
                    }
                    for referenced in references {
                        if let Some(message) = self.missing_column(target, referenced) {
                            problem(
                                table_name,
                                format!("foreign key '{constraint_name}' references {message}"),
                            );
                        }
                    }
                }
            }
        }

        for (index_name, index) in &self.indexes {
            match self.tables.get(&index.on) {
                None => problem(
                    &index.on,
                    format!("index '{index_name}' is on a table that does not exist"),
                ),
                Some(table) => {
                    if index.columns.is_empty() {
                        problem(&index.on, format!("index '{index_name}' covers no columns"));
                    }
                    for column in &index.columns {
                        if !table.columns.contains_key(column) {
                            problem(
                                &index.on,
                                format!("index '{index_name}' uses unknown column '{column}'"),
                            );
                        }
                    }
                }
            }
        }

        SchemaError::from_list(errors)
    }

    fn missing_column(&self, table: &str, column: &str) -> Option<String> {
        match self.tables.get(table) {
            None => Some(format!("unknown table '{table}'")),
            Some(t) if !t.columns.contains_key(column) => {
                Some(format!("unknown column '{table}.{column}'"))
            }
            Some(_) => None,
        }
    }
}
