// ============================================================================
// rustmigrate Library
// ============================================================================

pub mod connection;
pub mod core;
pub mod ledger;
pub mod migration;
pub mod result;
pub mod runner;

// Re-export main types for convenience
pub use crate::core::{MigrateError, MigrationStep, Result, Value};
pub use connection::{
    Connection, ConnectionConfig, Executor, RevertPolicy, SchemaIntrospector, SqliteConnection,
    Transaction,
};
pub use ledger::{Ledger, LedgerEntry, LedgerRepair, LedgerShape};
pub use migration::{Catalog, Migration, Reversibility, SqlMigration};
pub use result::QueryResult;
pub use runner::{ApplyReport, MigrationState, RevertOutcome, Runner, StatusEntry, StatusReport};

// ============================================================================
// High-level Migrator API
// ============================================================================

/// A runner bound to an open SQLite database.
///
/// This is the recommended entry point for tools; library users with their
/// own [`Connection`] implementation use [`Runner`] directly.
///
/// # Examples
///
/// ```
/// use rustmigrate::{Catalog, ConnectionConfig, Migration, Migrator, SqlMigration};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let migrations: Vec<Arc<dyn Migration>> = vec![Arc::new(
///     SqlMigration::new("001_create_notes")
///         .up("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")
///         .down("DROP TABLE notes"),
/// )];
/// let catalog = Catalog::new(migrations)?;
///
/// let mut migrator = Migrator::connect(&ConnectionConfig::in_memory(), catalog)?;
/// let report = migrator.up().await?;
/// assert_eq!(report.applied, vec!["001_create_notes"]);
/// # Ok(())
/// # }
/// ```
pub struct Migrator {
    conn: SqliteConnection,
    runner: Runner,
}

impl Migrator {
    /// Open the database named by `config` and bind `catalog` to it.
    pub fn connect(config: &ConnectionConfig, catalog: Catalog) -> Result<Self> {
        let runner = Runner::from_config(config, catalog)?;
        let conn = SqliteConnection::connect(config)?;
        Ok(Self { conn, runner })
    }

    /// Bind the application's built-in catalog.
    pub fn connect_builtin(config: &ConnectionConfig) -> Result<Self> {
        let ledger = Ledger::new(&config.ledger_table)?;
        let catalog = migration::builtin::catalog(&ledger)?;
        Self::connect(config, catalog)
    }

    /// Apply all pending migrations.
    pub async fn up(&mut self) -> Result<ApplyReport> {
        self.runner.apply_all(&mut self.conn).await
    }

    /// Revert the last applied migration.
    pub async fn down(&mut self) -> Result<RevertOutcome> {
        self.runner.revert_last(&mut self.conn).await
    }

    pub async fn status(&mut self) -> StatusReport {
        self.runner.status(&mut self.conn).await
    }

    /// Ledger rows as stored, ordered by version.
    pub async fn entries(&mut self) -> Result<Vec<LedgerEntry>> {
        self.runner.ledger_ref().entries(&mut self.conn).await
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}
