//! oxide-schema CLI
//!
//! Command-line tool for previewing and applying declared schemas.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Parser, Subcommand, ValueEnum};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_schema::prelude::*;

/// Declarative, versioned relational schemas.
#[derive(Parser)]
#[command(name = "oxide-schema")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Directory holding one `<owner>.json` schema file per owner.
    #[arg(short, long, env = "OXIDE_SCHEMAS_DIR", default_value = "schemas")]
    schemas_dir: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the version history table.
    Init,

    /// Show the applied and declared version of every owner.
    Status,

    /// Check every schema file without touching the database.
    Validate,

    /// Show the changes between the applied and the declared schema.
    Diff,

    /// Apply the pending changes.
    Migrate {
        /// Run every step, then roll back instead of committing.
        #[arg(long)]
        dry_run: bool,

        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,

        /// Apply and record the declared versions even when some changes
        /// cannot be expressed as a delta.
        #[arg(long)]
        allow_partial: bool,
    },

    /// Print the declared schema as SQL.
    Sql {
        /// SQL dialect to render.
        #[arg(long, value_enum, default_value_t = DialectArg::Sqlite)]
        dialect: DialectArg,
    },

    /// Print the declared schema as a Graphviz graph.
    Graph,
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Sqlite,
    Postgres,
}

/// Declared state of every owner.
struct Declared {
    owners: Vec<(String, SchemaFile)>,
    schema: SchemaDecl,
    versions: BTreeMap<String, usize>,
}

fn load_declared(dir: &Path) -> anyhow::Result<Declared> {
    let owners = load_schema_dir(dir)?;
    for (owner, file) in &owners {
        file.check()
            .map_err(|e| anyhow::anyhow!("schema file of '{owner}': {e}"))?;
    }
    let (schema, versions) = merge_all(&owners)?;
    schema.check_integrity()?;
    Ok(Declared {
        owners,
        schema,
        versions,
    })
}

/// Rebuilds the schema currently in the database from the recorded versions.
/// Owners that were never applied contribute nothing.
fn applied_schema(
    owners: &[(String, SchemaFile)],
    applied: &BTreeMap<String, usize>,
) -> anyhow::Result<SchemaDecl> {
    for owner in applied.keys() {
        if !owners.iter().any(|(name, _)| name == owner) {
            warn!(owner = %owner, "Applied owner has no schema file; its tables are ignored");
        }
    }

    let mut snapshots = Vec::new();
    for (owner, file) in owners {
        if let Some(&version) = applied.get(owner) {
            snapshots.push((owner.as_str(), file.resolve(version)?));
        }
    }
    Ok(merge_snapshots(snapshots)?)
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn print_changes(diff: &SchemaDiff) {
    for line in display(&diff.delta) {
        println!("{line}");
    }
    for warning in &diff.warnings {
        warn!(%warning, "Change not expressible as a delta");
    }
}

async fn connect(url: &str) -> anyhow::Result<SqliteDatabase> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(SqliteDatabase::new(pool))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Validate => {
            let declared = load_declared(&cli.schemas_dir)?;
            info!(
                owners = declared.owners.len(),
                tables = declared.schema.tables.len(),
                indexes = declared.schema.indexes.len(),
                "All schema files are valid"
            );
        }

        Commands::Sql { dialect } => {
            let declared = load_declared(&cli.schemas_dir)?;
            let statements = match dialect {
                DialectArg::Sqlite => to_sql(&declared.schema, &SqliteDialect::new()),
                DialectArg::Postgres => to_sql(&declared.schema, &PostgresDialect::new()),
            };
            for statement in statements {
                println!("{statement}\n");
            }
        }

        Commands::Graph => {
            let declared = load_declared(&cli.schemas_dir)?;
            print!("{}", to_graph(&declared.schema));
        }

        Commands::Init => {
            let db = connect(&cli.database).await?;
            info!("Initializing version history...");
            VersionHistory::new(db.pool().clone()).ensure_table().await?;
            info!("Version history table created successfully.");
        }

        Commands::Status => {
            let declared = load_declared(&cli.schemas_dir)?;
            let db = connect(&cli.database).await?;
            let history = VersionHistory::new(db.pool().clone());
            history.ensure_table().await?;
            let applied = history.applied_versions().await?;

            println!("\nSchema owners:");
            println!("{:-<60}", "");
            for (owner, latest) in &declared.versions {
                match applied.get(owner) {
                    Some(version) if version == latest => {
                        println!(" [X] {owner} (version {version})");
                    }
                    Some(version) => {
                        println!(" [ ] {owner} (version {version}, declared {latest})");
                    }
                    None => println!(" [ ] {owner} (not applied, declared {latest})"),
                }
            }
            println!();
        }

        Commands::Diff => {
            let declared = load_declared(&cli.schemas_dir)?;
            let db = connect(&cli.database).await?;
            let history = VersionHistory::new(db.pool().clone());
            history.ensure_table().await?;
            let applied = history.applied_versions().await?;

            let current = applied_schema(&declared.owners, &applied)?;
            let changes = diff_with_warnings(&current, &declared.schema);
            if is_empty(&changes.delta) {
                info!("No changes.");
            }
            print_changes(&changes);
        }

        Commands::Migrate {
            dry_run,
            yes,
            allow_partial,
        } => {
            let declared = load_declared(&cli.schemas_dir)?;
            let db = connect(&cli.database).await?;
            let history = VersionHistory::new(db.pool().clone());
            history.ensure_table().await?;
            let applied = history.applied_versions().await?;

            let current = applied_schema(&declared.owners, &applied)?;
            let changes = diff_with_warnings(&current, &declared.schema);
            print_changes(&changes);
            let delta = if allow_partial {
                changes.delta
            } else {
                changes.ensure_expressible()?
            };

            if is_empty(&delta) {
                info!("No structural changes to apply.");
            } else {
                if dry_run {
                    info!("Dry run mode - changes will be rolled back.");
                } else if !yes && !confirm("Apply these changes?")? {
                    info!("Aborted.");
                    return Ok(());
                }
                DeltaExecutor::new(&db)
                    .current(&current)
                    .force_abort(dry_run)
                    .apply(&delta)
                    .await?;
            }

            if dry_run {
                info!("Dry run complete, nothing was recorded.");
            } else {
                for (owner, version) in &declared.versions {
                    if applied.get(owner) != Some(version) {
                        history.record(owner, *version).await?;
                        info!(owner = %owner, version = *version, "Recorded version");
                    }
                }
                info!("Migration complete.");
            }
        }
    }

    Ok(())
}
