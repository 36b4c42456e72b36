use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rustmigrate::{ConnectionConfig, Migrator, RevertOutcome, RevertPolicy, StatusReport};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rustmigrate")]
#[command(about = "Apply, roll back and inspect database schema migrations")]
struct Cli {
    /// Database to migrate (`sqlite://<path>`, a file path or `sqlite::memory:`).
    /// Falls back to `DATABASE_URL`.
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Ledger table name. Falls back to `MIGRATE_LEDGER_TABLE`.
    #[arg(long, global = true)]
    ledger_table: Option<String>,

    /// Environment file to load before reading configuration.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Fail `down` instead of removing the ledger entry of an irreversible migration.
    #[arg(long, global = true)]
    refuse_irreversible: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply all pending migrations
    Up,
    /// Roll back the last applied migration
    Down,
    /// Show which migrations are applied
    Status {
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Also list ledger rows with their timestamps
        #[arg(long)]
        verbose: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let mut migrator = Migrator::connect_builtin(&config).with_context(|| {
        format!("Failed to connect to database '{}'", config.database_url)
    })?;

    match cli.command {
        Command::Up => {
            let report = migrator.up().await.context("Migration failed")?;
            println!(
                "All migrations completed successfully ({} applied, {} already applied)",
                report.applied.len(),
                report.skipped.len()
            );
        }
        Command::Down => match migrator.down().await.context("Rollback failed")? {
            RevertOutcome::Nothing => println!("Nothing to roll back"),
            RevertOutcome::Reverted(id) => println!("Rollback of {} completed successfully", id),
        },
        Command::Status { format, verbose } => {
            let report = migrator.status().await;
            match format {
                Format::Json => {
                    let mut value = serde_json::to_value(&report)?;
                    if verbose {
                        value["ledger"] = serde_json::to_value(migrator.entries().await?)?;
                    }
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                Format::Text => {
                    print_status(&report);
                    if verbose {
                        for entry in migrator.entries().await? {
                            let at = entry
                                .applied_at
                                .map(|t| t.to_string())
                                .unwrap_or_else(|| "-".to_string());
                            println!("  {}  {}  {}", entry.version, at, entry.name);
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ConnectionConfig> {
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file '{}'", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let url = cli.database_url.clone();
    let mut config = ConnectionConfig::from_lookup(|key| match (key, &url) {
        ("DATABASE_URL", Some(url)) => Some(url.clone()),
        _ => std::env::var(key).ok(),
    })
    .context("Invalid configuration")?;

    if let Some(table) = &cli.ledger_table {
        config = config.ledger_table(table);
    }
    if cli.refuse_irreversible {
        config = config.revert_policy(RevertPolicy::Refuse);
    }
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

fn print_status(report: &StatusReport) {
    if let Some(shape) = report.ledger_shape {
        println!("Ledger table: {}", shape);
    }
    for entry in &report.entries {
        println!("  {}: {}", entry.id, entry.state);
    }
}
