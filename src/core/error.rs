use std::fmt;
use thiserror::Error;

/// The step of a migration's lifecycle that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    CheckStatus,
    Begin,
    Apply,
    MarkApplied,
    Commit,
    Revert,
    MarkUnapplied,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::CheckStatus => "check migration status for",
            Self::Begin => "start transaction for",
            Self::Apply => "run migration",
            Self::MarkApplied => "mark as applied migration",
            Self::Commit => "commit migration",
            Self::Revert => "roll back migration",
            Self::MarkUnapplied => "mark as unapplied migration",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Migration '{0}' is defined more than once")]
    DuplicateMigration(String),

    #[error("Migration '{0}' not found")]
    UnknownMigration(String),

    #[error("Migration '{0}' is irreversible")]
    Irreversible(String),

    #[error("failed to create migrations table {table}: {source}")]
    EnsureLedger {
        table: String,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("failed to {step} {id}: {source}")]
    Step {
        id: String,
        step: MigrationStep,
        #[source]
        source: Box<MigrateError>,
    },
}

impl MigrateError {
    /// Wraps `self` with the migration id and step it happened in.
    pub fn at(self, id: &str, step: MigrationStep) -> Self {
        Self::Step {
            id: id.to_string(),
            step,
            source: Box::new(self),
        }
    }

    /// Migration id carried by a wrapped error, if any.
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            Self::Step { id, .. } => Some(id),
            Self::DuplicateMigration(id) | Self::UnknownMigration(id) | Self::Irreversible(id) => {
                Some(id)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;

impl From<rusqlite::Error> for MigrateError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}
