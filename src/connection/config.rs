use crate::core::{MigrateError, Result};
use serde::Serialize;
use std::str::FromStr;

/// Default name of the applied-migration ledger table.
pub const DEFAULT_LEDGER_TABLE: &str = "schema_migrations";

const MEMORY_URL: &str = "sqlite::memory:";
const SQLITE_SCHEME: &str = "sqlite://";

/// What `down` does when the last applied migration cannot be undone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevertPolicy {
    /// Run the migration's no-op revert and drop its ledger row.
    #[default]
    Permit,
    /// Fail without touching the database.
    Refuse,
}

impl FromStr for RevertPolicy {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permit" => Ok(Self::Permit),
            "refuse" => Ok(Self::Refuse),
            other => Err(MigrateError::Config(format!(
                "Unknown revert policy '{}', expected 'permit' or 'refuse'",
                other
            ))),
        }
    }
}

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(String),
}

/// Migration tool configuration
///
/// Built with the builder methods, from a URL, or from the environment.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Database location, `sqlite::memory:`, `sqlite://<path>` or a bare path
    pub database_url: String,

    /// Name of the ledger table
    pub ledger_table: String,

    /// Policy for reverting irreversible migrations
    pub revert_policy: RevertPolicy,
}

impl ConnectionConfig {
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
            revert_policy: RevertPolicy::default(),
        }
    }

    /// Configuration for a private in-memory database
    pub fn in_memory() -> Self {
        Self::new(MEMORY_URL)
    }

    /// Set the ledger table name
    pub fn ledger_table(mut self, table: &str) -> Self {
        self.ledger_table = table.to_string();
        self
    }

    /// Set the revert policy
    pub fn revert_policy(mut self, policy: RevertPolicy) -> Self {
        self.revert_policy = policy;
        self
    }

    /// Parse from connection string
    ///
    /// Accepts `sqlite::memory:`, `sqlite://<path>` or a plain file path.
    pub fn from_url(url: &str) -> Result<Self> {
        let config = Self::new(url.trim());
        config.location()?;
        Ok(config)
    }

    /// Read configuration from `DATABASE_URL`, `MIGRATE_LEDGER_TABLE` and
    /// `MIGRATE_REVERT_POLICY`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL")
            .ok_or_else(|| MigrateError::Config("DATABASE_URL is not set".into()))?;
        let mut config = Self::from_url(&url)?;

        if let Some(table) = lookup("MIGRATE_LEDGER_TABLE") {
            config = config.ledger_table(&table);
        }
        if let Some(policy) = lookup("MIGRATE_REVERT_POLICY") {
            config = config.revert_policy(policy.parse()?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Resolve the database location from the URL.
    pub fn location(&self) -> Result<DatabaseLocation> {
        let url = self.database_url.as_str();
        if url.is_empty() {
            return Err(MigrateError::Config("Database URL cannot be empty".into()));
        }
        if url == MEMORY_URL || url == ":memory:" {
            return Ok(DatabaseLocation::Memory);
        }
        if let Some(path) = url.strip_prefix(SQLITE_SCHEME) {
            if path.is_empty() {
                return Err(MigrateError::Config(format!("Missing path in '{}'", url)));
            }
            return Ok(DatabaseLocation::File(path.to_string()));
        }
        if url.contains("://") {
            return Err(MigrateError::Config(format!(
                "Unsupported database URL '{}', expected '{}<path>'",
                url, SQLITE_SCHEME
            )));
        }
        Ok(DatabaseLocation::File(url.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.location()?;

        if !is_identifier(&self.ledger_table) {
            return Err(MigrateError::Config(format!(
                "Invalid ledger table name '{}'",
                self.ledger_table
            )));
        }

        Ok(())
    }
}

/// Plain, unquoted SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}
