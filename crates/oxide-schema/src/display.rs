//! Human-readable rendering of deltas.
//!
//! [`display`] walks a [`Version`] and yields one [`DisplayLine`] per change,
//! `+` for additions, `-` for drops and `*` for alterations. Tables come
//! before indexes; within each level changes are sorted by name.

use std::collections::BTreeMap;
use std::fmt;
use std::iter;

use crate::delta::{ColumnAlteration, ColumnOp, TableDelta, Version};
use crate::schema::{Column, Constraint, Index, Table};

/// Kind of change a line describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Something is added.
    Add,
    /// Something is dropped.
    Drop,
    /// Something is altered.
    Alter,
}

impl Marker {
    /// Returns the prefix character.
    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Drop => '-',
            Self::Alter => '*',
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// One line of a rendered delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    /// Nesting depth: 0 for tables and indexes, 1 for columns and constraints.
    pub depth: usize,
    /// Kind of change.
    pub marker: Marker,
    /// Description of the changed object.
    pub text: String,
}

impl DisplayLine {
    fn new(depth: usize, marker: Marker, text: String) -> Self {
        Self {
            depth,
            marker,
            text,
        }
    }
}

impl fmt::Display for DisplayLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:indent$}{} {}",
            "",
            self.marker,
            self.text,
            indent = self.depth * 2
        )
    }
}

enum Change<'a, A, D> {
    Add(&'a A),
    Drop,
    Alter(&'a D),
}

/// Merges the add, drop and alter sets of one level into a single list
/// sorted by name.
fn changes<'a, A, D>(
    adds: &'a BTreeMap<String, A>,
    drops: &'a [String],
    alters: impl Iterator<Item = (&'a String, &'a D)>,
) -> Vec<(&'a str, Change<'a, A, D>)> {
    let mut all: Vec<_> = adds
        .iter()
        .map(|(name, a)| (name.as_str(), Change::Add(a)))
        .chain(drops.iter().map(|name| (name.as_str(), Change::Drop)))
        .chain(alters.map(|(name, d)| (name.as_str(), Change::Alter(d))))
        .collect();
    all.sort_by(|a, b| a.0.cmp(b.0));
    all
}

/// Renders a delta as a sorted list of change lines.
///
/// The iterator borrows the delta and produces lines on demand; call again to
/// restart.
pub fn display(delta: &Version) -> impl Iterator<Item = DisplayLine> + '_ {
    let tables = changes(
        &delta.add_tables,
        &delta.drop_tables,
        delta.alter_tables.iter(),
    )
    .into_iter()
    .flat_map(|(name, change)| table_lines(name, change));

    let indexes = changes::<Index, ()>(&delta.add_indexes, &delta.drop_indexes, iter::empty())
        .into_iter()
        .map(|(name, change)| match change {
            Change::Add(index) => DisplayLine::new(
                0,
                Marker::Add,
                format!("index {name} on {} ({})", index.on, index.columns.join(", ")),
            ),
            Change::Drop | Change::Alter(_) => {
                DisplayLine::new(0, Marker::Drop, format!("index {name}"))
            }
        });

    tables.chain(indexes)
}

fn table_lines<'a>(
    name: &'a str,
    change: Change<'a, Table, TableDelta>,
) -> Box<dyn Iterator<Item = DisplayLine> + 'a> {
    match change {
        Change::Add(table) => Box::new(
            iter::once(DisplayLine::new(0, Marker::Add, format!("table {name}")))
                .chain(table.columns.iter().map(|(column, declaration)| {
                    DisplayLine::new(
                        1,
                        Marker::Add,
                        format!("column {column}: {}", describe_column(declaration)),
                    )
                }))
                .chain(table.constraints.iter().map(|(constraint, declaration)| {
                    DisplayLine::new(
                        1,
                        Marker::Add,
                        format!("constraint {constraint}: {}", describe_constraint(declaration)),
                    )
                })),
        ),
        Change::Drop => Box::new(iter::once(DisplayLine::new(
            0,
            Marker::Drop,
            format!("table {name}"),
        ))),
        Change::Alter(delta) => {
            let columns = changes(
                &delta.add_columns,
                &delta.drop_columns,
                delta.alter_columns.iter(),
            )
            .into_iter()
            .map(|(column, change)| match change {
                Change::Add(declaration) => DisplayLine::new(
                    1,
                    Marker::Add,
                    format!("column {column}: {}", describe_column(declaration)),
                ),
                Change::Drop => DisplayLine::new(1, Marker::Drop, format!("column {column}")),
                Change::Alter(alteration) => DisplayLine::new(
                    1,
                    Marker::Alter,
                    format!("column {column}: {}", describe_alteration(alteration)),
                ),
            });

            let constraints = changes::<Constraint, ()>(
                &delta.add_constraints,
                &delta.drop_constraints,
                iter::empty(),
            )
            .into_iter()
            .map(|(constraint, change)| match change {
                Change::Add(declaration) => DisplayLine::new(
                    1,
                    Marker::Add,
                    format!("constraint {constraint}: {}", describe_constraint(declaration)),
                ),
                Change::Drop | Change::Alter(_) => {
                    DisplayLine::new(1, Marker::Drop, format!("constraint {constraint}"))
                }
            });

            Box::new(
                iter::once(DisplayLine::new(0, Marker::Alter, format!("table {name}")))
                    .chain(columns)
                    .chain(constraints),
            )
        }
    }
}

fn describe_column(column: &Column) -> String {
    let mut parts = vec![column.column_type.to_string()];
    if column.primary {
        parts.push("primary".to_string());
    }
    if column.required {
        parts.push("required".to_string());
    }
    if column.unique {
        parts.push("unique".to_string());
    }
    if let Some(target) = &column.references {
        parts.push(format!("references {target}"));
    }
    if let Some(action) = column.on_delete {
        parts.push(format!("on delete {}", action.as_sql()));
    }
    if let Some(default) = &column.default {
        parts.push(format!("default {default}"));
    }
    if let Some(check) = &column.check {
        parts.push(format!("check ({check})"));
    }
    parts.join(", ")
}

fn describe_constraint(constraint: &Constraint) -> String {
    match constraint {
        Constraint::PrimaryKey { on } => format!("primary key ({})", on.join(", ")),
        Constraint::ForeignKey {
            on,
            target,
            references,
            on_delete,
        } => {
            let mut text = format!(
                "foreign key ({}) references {target} ({})",
                on.join(", "),
                references.join(", ")
            );
            if let Some(action) = on_delete {
                text.push_str(" on delete ");
                text.push_str(action.as_sql());
            }
            text
        }
        Constraint::Unique {
            on,
            nulls_not_distinct,
        } => {
            let mut text = format!("unique ({})", on.join(", "));
            if *nulls_not_distinct {
                text.push_str(" nulls not distinct");
            }
            text
        }
        Constraint::Check { expr } => format!("check ({expr})"),
    }
}

fn describe_alteration(alteration: &ColumnAlteration) -> String {
    let mut parts = Vec::new();
    if let Some(column_type) = alteration.column_type {
        parts.push(format!("type {column_type}"));
    }
    if let Some(default) = &alteration.default {
        parts.push(format!("default {default}"));
    }
    parts.extend(alteration.ops.iter().map(|op| {
        match op {
            ColumnOp::DropDefault => "drop default",
            ColumnOp::SetRequired => "set required",
            ColumnOp::DropRequired => "drop required",
        }
        .to_string()
    }));
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DefaultValue;
    use crate::types::ScalarType;

    fn render(delta: &Version) -> Vec<String> {
        display(delta).map(|line| line.to_string()).collect()
    }

    #[test]
    fn test_empty_delta_renders_nothing() {
        assert_eq!(display(&Version::new()).count(), 0);
    }

    #[test]
    fn test_sorted_and_nested() {
        let delta = Version::new()
            .drop_table("zebra")
            .add_table(
                "accounts",
                Table::new()
                    .column("id", Column::new(ScalarType::Uuid).primary().required())
                    .column(
                        "owner",
                        Column::new(ScalarType::Uuid).references("users", "id"),
                    ),
            )
            .alter_table(
                "users",
                TableDelta::new()
                    .drop_column("nickname")
                    .add_column("email", Column::new(ScalarType::Text).unique())
                    .alter_column(
                        "age",
                        ColumnAlteration::new()
                            .set_type(ScalarType::BigInt)
                            .op(ColumnOp::SetRequired),
                    )
                    .add_constraint(
                        "age_positive",
                        Constraint::Check {
                            expr: "age > 0".into(),
                        },
                    ),
            )
            .drop_index("users_by_nickname")
            .add_index("accounts_by_owner", Index::new("accounts", &["owner"]));

        assert_eq!(
            render(&delta),
            vec![
                "+ table accounts",
                "  + column id: uuid, primary, required",
                "  + column owner: uuid, references users.id",
                "* table users",
                "  * column age: type bigint, set required",
                "  + column email: text, unique",
                "  - column nickname",
                "  + constraint age_positive: check (age > 0)",
                "- table zebra",
                "+ index accounts_by_owner on accounts (owner)",
                "- index users_by_nickname",
            ]
        );
    }

    #[test]
    fn test_restartable() {
        let delta = Version::new().alter_table(
            "t",
            TableDelta::new().alter_column(
                "c",
                ColumnAlteration::new().set_default(DefaultValue::Text {
                    literal: "x".into(),
                }),
            ),
        );
        let first = render(&delta);
        assert_eq!(first, render(&delta));
        assert_eq!(first[1], "  * column c: default 'x'");
    }

    #[test]
    fn test_line_fields() {
        let delta = Version::new().drop_table("old");
        let line = display(&delta).next().unwrap();
        assert_eq!(line.depth, 0);
        assert_eq!(line.marker, Marker::Drop);
        assert_eq!(line.text, "table old");
    }
}
