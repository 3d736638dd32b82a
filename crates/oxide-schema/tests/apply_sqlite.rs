//! Transactional application of deltas against an in-memory SQLite database.

mod common;

use common::{blog_schema, column_names, index_names, memory_db, table_names, users_table};
use oxide_schema::prelude::*;

fn simple_table() -> Table {
    Table::new().column("id", Column::new(ScalarType::Integer).primary().required())
}

// =============================================================================
// Atomicity
// =============================================================================

#[tokio::test]
async fn failed_step_leaves_no_partial_tables() {
    let db = memory_db().await;
    sqlx::query("CREATE TABLE \"c\" (\"id\" INTEGER)")
        .execute(db.pool())
        .await
        .unwrap();

    let delta = Version::new()
        .add_table("a", simple_table())
        .add_table("b", simple_table())
        .add_table("c", simple_table());

    let err = apply(&delta, &db, false).await.unwrap_err();
    match &err {
        SchemaError::ApplyFailed { step, .. } => assert_eq!(step, "create table 'c'"),
        other => panic!("Expected ApplyFailed, got {other:?}"),
    }
    assert_eq!(table_names(db.pool()).await, vec!["c"]);
}

#[tokio::test]
async fn unsupported_alter_rolls_back_earlier_steps() {
    let db = memory_db().await;
    apply(&Version::new().add_table("users", users_table()), &db, false)
        .await
        .unwrap();

    let delta = Version::new().alter_table(
        "users",
        TableDelta::new()
            .add_column("bio", Column::new(ScalarType::Text))
            .alter_column(
                "email",
                ColumnAlteration::new().set_type(ScalarType::Text),
            ),
    );

    let err = apply(&delta, &db, false).await.unwrap_err();
    assert!(matches!(
        err,
        SchemaError::ApplyFailed {
            source: BackendError::Unsupported(_),
            ..
        }
    ));
    assert!(!column_names(db.pool(), "users")
        .await
        .contains(&"bio".to_string()));
}

#[tokio::test]
async fn force_abort_leaves_database_unchanged() {
    let db = memory_db().await;
    let delta = diff(&SchemaDecl::new(), &blog_schema());

    apply(&delta, &db, true).await.unwrap();

    assert!(table_names(db.pool()).await.is_empty());
    assert!(index_names(db.pool()).await.is_empty());
}

// =============================================================================
// Successful applies
// =============================================================================

#[tokio::test]
async fn creates_tables_and_indexes() {
    let db = memory_db().await;
    let delta = diff(&SchemaDecl::new(), &blog_schema());

    apply(&delta, &db, false).await.unwrap();

    assert_eq!(table_names(db.pool()).await, vec!["posts", "users"]);
    assert_eq!(
        index_names(db.pool()).await,
        vec!["posts_author", "users_email_key"]
    );
    assert_eq!(
        column_names(db.pool(), "users").await,
        vec!["created_at", "email", "id"]
    );
}

#[tokio::test]
async fn adds_and_drops_columns() {
    let db = memory_db().await;
    let before = blog_schema();
    apply(&diff(&SchemaDecl::new(), &before), &db, false)
        .await
        .unwrap();

    let mut after = before.clone();
    {
        let users = after.tables.get_mut("users").unwrap();
        users.columns.remove("created_at");
        users
            .columns
            .insert("handle".into(), Column::new(ScalarType::Text).unique());
    }
    apply(&diff(&before, &after), &db, false).await.unwrap();

    assert_eq!(
        column_names(db.pool(), "users").await,
        vec!["email", "handle", "id"]
    );
    assert!(index_names(db.pool())
        .await
        .contains(&"users_handle_key".to_string()));
}

#[tokio::test]
async fn drops_index_and_table() {
    let db = memory_db().await;
    let before = blog_schema();
    apply(&diff(&SchemaDecl::new(), &before), &db, false)
        .await
        .unwrap();

    let after = SchemaDecl::new().table("users", users_table());
    apply(&diff(&before, &after), &db, false).await.unwrap();

    assert_eq!(table_names(db.pool()).await, vec!["users"]);
    assert_eq!(index_names(db.pool()).await, vec!["users_email_key"]);
}

#[tokio::test]
async fn drops_unique_columns() {
    let db = memory_db().await;
    let before = SchemaDecl::new().table("users", users_table());
    apply(&diff(&SchemaDecl::new(), &before), &db, false)
        .await
        .unwrap();

    let mut with_handle = before.clone();
    with_handle
        .tables
        .get_mut("users")
        .unwrap()
        .columns
        .insert("handle".into(), Column::new(ScalarType::Text).unique());
    apply(&diff(&before, &with_handle), &db, false).await.unwrap();

    let mut after = with_handle.clone();
    {
        let users = after.tables.get_mut("users").unwrap();
        users.columns.remove("handle");
        users.columns.remove("email");
    }
    apply(&diff(&with_handle, &after), &db, false).await.unwrap();

    assert_eq!(
        column_names(db.pool(), "users").await,
        vec!["created_at", "id"]
    );
    assert!(index_names(db.pool()).await.is_empty());
}

#[tokio::test]
async fn drops_unique_constraint_declared_at_creation() {
    let db = memory_db().await;
    let before = SchemaDecl::new().table(
        "users",
        users_table().constraint(
            "users_created_once",
            Constraint::Unique {
                on: vec!["id".into(), "created_at".into()],
                nulls_not_distinct: false,
            },
        ),
    );
    apply(&diff(&SchemaDecl::new(), &before), &db, false)
        .await
        .unwrap();
    assert!(index_names(db.pool())
        .await
        .contains(&"users_created_once".to_string()));

    let after = SchemaDecl::new().table("users", users_table());
    DeltaExecutor::new(&db)
        .current(&before)
        .apply(&diff(&before, &after))
        .await
        .unwrap();

    assert_eq!(index_names(db.pool()).await, vec!["users_email_key"]);
}

#[tokio::test]
async fn dropping_check_constraint_is_unsupported() {
    let db = memory_db().await;
    let before = blog_schema();
    apply(&diff(&SchemaDecl::new(), &before), &db, false)
        .await
        .unwrap();

    let mut after = before.clone();
    after
        .tables
        .get_mut("posts")
        .unwrap()
        .constraints
        .remove("title_not_blank");

    let err = DeltaExecutor::new(&db)
        .current(&before)
        .apply(&diff(&before, &after))
        .await
        .unwrap_err();
    match &err {
        SchemaError::ApplyFailed {
            step,
            source: BackendError::Unsupported(_),
        } => assert_eq!(step, "drop constraint 'title_not_blank' on table 'posts'"),
        other => panic!("Expected an unsupported step, got {other:?}"),
    }
    assert_eq!(table_names(db.pool()).await, vec!["posts", "users"]);
}

#[tokio::test]
async fn empty_delta_is_a_no_op() {
    let db = memory_db().await;
    apply(&Version::new(), &db, false).await.unwrap();
    assert!(table_names(db.pool()).await.is_empty());
}

// =============================================================================
// Export and history
// =============================================================================

#[tokio::test]
async fn exported_sql_runs_on_sqlite() {
    let db = memory_db().await;
    for statement in to_sql(&blog_schema(), &SqliteDialect::new()) {
        sqlx::query(&statement)
            .execute(db.pool())
            .await
            .unwrap_or_else(|e| panic!("Failed to run: {statement}\nError: {e}"));
    }
    assert_eq!(table_names(db.pool()).await, vec!["posts", "users"]);
}

#[tokio::test]
async fn recorded_versions_reproduce_applied_schema() {
    let db = memory_db().await;
    let history = VersionHistory::new(db.pool().clone());
    history.ensure_table().await.unwrap();

    let owners = vec![
        (
            "auth".to_string(),
            SchemaFile::new(SchemaDecl::new().table("users", users_table())).version(
                Version::new().alter_table(
                    "users",
                    TableDelta::new().add_column("bio", Column::new(ScalarType::Text)),
                ),
            ),
        ),
    ];
    let (declared, versions) = merge_all(&owners).unwrap();
    apply(&diff(&SchemaDecl::new(), &declared), &db, false)
        .await
        .unwrap();
    for (owner, version) in &versions {
        history.record(owner, *version).await.unwrap();
    }

    let applied = history.applied_versions().await.unwrap();
    assert_eq!(applied["auth"], 1);
    let current = merge_snapshots(
        owners
            .iter()
            .map(|(owner, file)| (owner.as_str(), file.resolve(applied[owner]).unwrap())),
    )
    .unwrap();
    assert!(is_empty(&diff(&current, &declared)));
    assert!(column_names(db.pool(), "users")
        .await
        .contains(&"bio".to_string()));
}
