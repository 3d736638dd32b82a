//! Transactional application of deltas.
//!
//! A delta is first turned into an ordered list of [`Step`]s, then every step
//! runs inside one transaction. The first failing step rolls the whole
//! transaction back; a failing rollback is reported together with the error
//! that caused it.

use std::fmt;

use tracing::{debug, info, warn};

use crate::backend::{BackendError, Database, SchemaTransaction};
use crate::builder::{
    creation_order, plan_table, primary_key_constraint_name, AlterTableOp, ColumnPlan,
    CreateTablePlan,
};
use crate::delta::{ColumnOp, Version};
use crate::error::{Result, SchemaError};
use crate::schema::{Constraint, Index, SchemaDecl};
use crate::validate::{check_column_ops, validate};

/// One operation against the live database.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Drop an index.
    DropIndex(String),
    /// Create a table.
    CreateTable(CreateTablePlan),
    /// Drop a table.
    DropTable(String),
    /// Alter a table.
    AlterTable {
        /// Table name.
        table: String,
        /// The alteration.
        op: AlterTableOp,
    },
    /// Create an index.
    CreateIndex {
        /// Index name.
        name: String,
        /// The index.
        index: Index,
    },
}

impl Step {
    async fn run<T: SchemaTransaction>(&self, tx: &mut T) -> std::result::Result<(), BackendError> {
        match self {
            Self::DropIndex(name) => tx.drop_index(name).await,
            Self::CreateTable(plan) => tx.create_table(plan).await,
            Self::DropTable(name) => tx.drop_table(name).await,
            Self::AlterTable { table, op } => tx.alter_table(table, op).await,
            Self::CreateIndex { name, index } => tx.create_index(name, index).await,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DropIndex(name) => write!(f, "drop index '{name}'"),
            Self::CreateTable(plan) => write!(f, "create table '{}'", plan.name),
            Self::DropTable(name) => write!(f, "drop table '{name}'"),
            Self::AlterTable { table, op } => write!(f, "{op} on table '{table}'"),
            Self::CreateIndex { name, .. } => write!(f, "create index '{name}'"),
        }
    }
}

/// Lists the steps that apply a delta, in execution order.
///
/// Indexes scheduled for dropping go first, so that dropping their table or
/// column cannot take them along. Then: table creation (referenced tables
/// first), table drops, per altered table constraint drops, column drops,
/// column additions, column alterations (default, type, then each op) and
/// constraint additions. Index creation comes last.
///
/// Dropped constraints carry no definition; see [`plan_from`].
#[must_use]
pub fn plan(delta: &Version) -> Vec<Step> {
    build_plan(None, delta)
}

/// Like [`plan`], with `current` being the schema the delta applies to.
/// Each dropped constraint then carries its definition, which some
/// dialects need to know how to drop it.
#[must_use]
pub fn plan_from(current: &SchemaDecl, delta: &Version) -> Vec<Step> {
    build_plan(Some(current), delta)
}

fn build_plan(current: Option<&SchemaDecl>, delta: &Version) -> Vec<Step> {
    let mut steps: Vec<Step> = delta
        .drop_indexes
        .iter()
        .map(|name| Step::DropIndex(name.clone()))
        .collect();

    steps.extend(
        creation_order(&delta.add_tables)
            .into_iter()
            .filter_map(|name| delta.add_tables.get(name).map(|t| (name, t)))
            .map(|(name, table)| Step::CreateTable(plan_table(name, table))),
    );

    steps.extend(
        delta
            .drop_tables
            .iter()
            .map(|name| Step::DropTable(name.clone())),
    );

    for (table, table_delta) in &delta.alter_tables {
        let alter = |op| Step::AlterTable {
            table: table.clone(),
            op,
        };

        let existing = current.and_then(|schema| schema.tables.get(table));
        for name in &table_delta.drop_constraints {
            steps.push(alter(AlterTableOp::DropConstraint {
                name: name.clone(),
                constraint: existing.and_then(|t| t.constraints.get(name)).cloned(),
            }));
        }
        for column in &table_delta.drop_columns {
            steps.push(alter(AlterTableOp::DropColumn(column.clone())));
        }
        // A lone required primary column is declared inline; any other set
        // of added primary columns gets a `PK_<table>` constraint.
        let added_primaries: Vec<String> = table_delta
            .add_columns
            .iter()
            .filter(|(_, column)| column.primary)
            .map(|(name, _)| name.clone())
            .collect();
        let inline = match added_primaries.as_slice() {
            [only] => table_delta.add_columns[only].required,
            _ => false,
        };
        for (name, column) in &table_delta.add_columns {
            steps.push(alter(AlterTableOp::AddColumn(ColumnPlan::new(name, column, inline))));
        }
        for (column, alteration) in &table_delta.alter_columns {
            if let Some(default) = &alteration.default {
                steps.push(alter(AlterTableOp::SetDefault {
                    column: column.clone(),
                    default: default.to_sql(),
                }));
            }
            if let Some(column_type) = alteration.column_type {
                steps.push(alter(AlterTableOp::SetType {
                    column: column.clone(),
                    column_type,
                }));
            }
            for op in &alteration.ops {
                let column = column.clone();
                steps.push(alter(match op {
                    ColumnOp::DropDefault => AlterTableOp::DropDefault { column },
                    ColumnOp::SetRequired => AlterTableOp::SetNotNull { column },
                    ColumnOp::DropRequired => AlterTableOp::DropNotNull { column },
                }));
            }
        }
        if !inline && !added_primaries.is_empty() {
            steps.push(alter(AlterTableOp::AddConstraint {
                name: primary_key_constraint_name(table),
                constraint: Constraint::PrimaryKey {
                    on: added_primaries,
                },
            }));
        }
        for (name, constraint) in &table_delta.add_constraints {
            steps.push(alter(AlterTableOp::AddConstraint {
                name: name.clone(),
                constraint: constraint.clone(),
            }));
        }
    }

    steps.extend(delta.add_indexes.iter().map(|(name, index)| Step::CreateIndex {
        name: name.clone(),
        index: index.clone(),
    }));

    steps
}

/// Applies deltas to a live database, one transaction per delta.
pub struct DeltaExecutor<'a, D: Database> {
    db: &'a D,
    current: Option<&'a SchemaDecl>,
    force_abort: bool,
}

impl<'a, D: Database> DeltaExecutor<'a, D> {
    /// Creates an executor for the given database.
    pub const fn new(db: &'a D) -> Self {
        Self {
            db,
            current: None,
            force_abort: false,
        }
    }

    /// Sets the schema the database is currently at, so that dropped
    /// constraints can be planned from their definitions.
    #[must_use]
    pub const fn current(mut self, schema: &'a SchemaDecl) -> Self {
        self.current = Some(schema);
        self
    }

    /// Rolls the transaction back even when every step succeeds, to verify a
    /// delta without keeping its changes.
    #[must_use]
    pub const fn force_abort(mut self, enabled: bool) -> Self {
        self.force_abort = enabled;
        self
    }

    /// Applies a delta inside one transaction.
    ///
    /// The delta is validated before the transaction opens. On the first
    /// failing step the transaction is rolled back and
    /// [`SchemaError::ApplyFailed`] is returned; if the rollback fails too,
    /// [`SchemaError::RollbackFailed`] carries both errors.
    pub async fn apply(&self, delta: &Version) -> Result<()> {
        validate(delta)?;
        check_column_ops(delta)?;

        let steps = build_plan(self.current, delta);
        if steps.is_empty() {
            info!("Nothing to apply");
            return Ok(());
        }

        info!(steps = steps.len(), "Applying delta");
        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|source| SchemaError::ApplyFailed {
                step: "begin transaction".to_string(),
                source,
            })?;

        for step in &steps {
            debug!(%step, "Running step");
            if let Err(source) = step.run(&mut tx).await {
                let error = SchemaError::ApplyFailed {
                    step: step.to_string(),
                    source,
                };
                warn!(%error, "Step failed, rolling back");
                return Err(match tx.rollback().await {
                    Ok(()) => error,
                    Err(rollback) => SchemaError::RollbackFailed {
                        error: Box::new(error),
                        rollback,
                    },
                });
            }
        }

        if self.force_abort {
            warn!("All steps succeeded, rolling back because force_abort is set");
            return tx.rollback().await.map_err(|source| SchemaError::ApplyFailed {
                step: "roll back".to_string(),
                source,
            });
        }

        tx.commit()
            .await
            .map_err(|source| SchemaError::ApplyFailed {
                step: "commit".to_string(),
                source,
            })?;
        info!("Delta applied");
        Ok(())
    }
}

/// Applies a delta to a database inside one transaction. See
/// [`DeltaExecutor::apply`].
pub async fn apply<D: Database>(delta: &Version, db: &D, force_abort: bool) -> Result<()> {
    DeltaExecutor::new(db).force_abort(force_abort).apply(delta).await
}
