//! Export of a snapshot as SQL text or as a Graphviz graph.
//!
//! Neither export touches a database. [`to_sql`] renders the same
//! [`CreateTablePlan`](crate::builder::CreateTablePlan)s that the executor
//! hands to a live backend, so the script matches what `apply` would run on an
//! empty database.

use std::collections::BTreeSet;

use crate::builder::{creation_order, plan_table};
use crate::dialect::SqlDialect;
use crate::schema::{Constraint, SchemaDecl, Table};

/// Renders a snapshot as a SQL script: the creation statements of each
/// table, with referenced tables first, then one `CREATE INDEX` per index. Every
/// statement is terminated with `;`.
#[must_use]
pub fn to_sql<D: SqlDialect + ?Sized>(schema: &SchemaDecl, dialect: &D) -> Vec<String> {
    let tables = creation_order(&schema.tables)
        .into_iter()
        .filter_map(|name| schema.tables.get(name).map(|table| (name, table)))
        .flat_map(|(name, table)| dialect.create_table_statements(&plan_table(name, table)));
    let indexes = schema
        .indexes
        .iter()
        .map(|(name, index)| dialect.create_index_sql(name, index));

    tables
        .chain(indexes)
        .map(|sql| format!("{sql};"))
        .collect()
}

/// Renders a snapshot as a Graphviz `digraph`.
///
/// Each table is a node whose label lists its columns; primary key columns
/// are bold and foreign key columns italic. Each foreign key column gets an
/// edge to the column it references, which for a self-referencing table is
/// an edge from the node to itself. Output is ordered by name.
#[must_use]
pub fn to_graph(schema: &SchemaDecl) -> String {
    let mut out = String::from("digraph schema {\n");
    out.push_str("  rankdir=LR;\n");
    out.push_str("  node [shape=plaintext];\n");

    for (name, table) in &schema.tables {
        out.push_str(&format!(
            "  {} [label=<{}>];\n",
            quote(name),
            table_label(name, table)
        ));
    }

    for (name, table) in &schema.tables {
        for (column, target_table, target_column) in foreign_keys(table) {
            out.push_str(&format!(
                "  {}:{} -> {}:{};\n",
                quote(name),
                quote(column),
                quote(target_table),
                quote(target_column)
            ));
        }
    }

    out.push_str("}\n");
    out
}

fn table_label(name: &str, table: &Table) -> String {
    let foreign: BTreeSet<&str> = foreign_keys(table).map(|(column, _, _)| column).collect();

    let mut label = String::from(r#"<table border="0" cellborder="1" cellspacing="0">"#);
    label.push_str(&format!("<tr><td><b>{}</b></td></tr>", escape(name)));
    for (column_name, column) in &table.columns {
        let mut text = escape(column_name);
        if column.primary {
            text = format!("<b>{text}</b>");
        }
        if foreign.contains(column_name.as_str()) {
            text = format!("<i>{text}</i>");
        }
        label.push_str(&format!(
            r#"<tr><td port="{}" align="left">{text}: {}</td></tr>"#,
            escape(column_name),
            escape(&column.column_type.to_string())
        ));
    }
    label.push_str("</table>");
    label
}

/// Yields `(column, target table, target column)` for every foreign key
/// column of a table: inline references first, then foreign key constraints
/// matched positionally.
fn foreign_keys(table: &Table) -> impl Iterator<Item = (&str, &str, &str)> {
    let inline = table.columns.iter().filter_map(|(name, column)| {
        column
            .references
            .as_ref()
            .map(|r| (name.as_str(), r.table.as_str(), r.column.as_str()))
    });
    let constrained = table
        .constraints
        .values()
        .filter_map(|constraint| match constraint {
            Constraint::ForeignKey {
                on,
                target,
                references,
                ..
            } => Some(
                on.iter()
                    .zip(references)
                    .map(move |(column, referenced)| {
                        (column.as_str(), target.as_str(), referenced.as_str())
                    }),
            ),
            _ => None,
        })
        .flatten();
    inline.chain(constrained)
}

fn quote(id: &str) -> String {
    format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\""))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
