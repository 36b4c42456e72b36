use crate::ledger::LedgerShape;
use serde::Serialize;
use std::fmt;

/// Outcome of [`Runner::apply_all`](super::Runner::apply_all).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Migrations applied by this call, in order.
    pub applied: Vec<String>,
    /// Migrations found already applied and skipped.
    pub skipped: Vec<String>,
}

impl ApplyReport {
    /// True when the database was already up to date.
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Outcome of [`Runner::revert_last`](super::Runner::revert_last).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "id", rename_all = "lowercase")]
pub enum RevertOutcome {
    /// No migration was applied.
    Nothing,
    Reverted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    Applied,
    Pending,
    /// The ledger could not be read for this migration.
    Error(String),
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "Applied"),
            Self::Pending => write!(f, "Pending"),
            Self::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub id: String,
    pub state: MigrationState,
}

/// Per-migration state in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Layout of the ledger table, when it could be inspected.
    pub ledger_shape: Option<LedgerShape>,
    pub entries: Vec<StatusEntry>,
}

impl StatusReport {
    pub fn state_of(&self, id: &str) -> Option<&MigrationState> {
        self.entries.iter().find(|e| e.id == id).map(|e| &e.state)
    }

    pub fn applied(&self) -> impl Iterator<Item = &str> {
        self.with_state(MigrationState::Applied)
    }

    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.with_state(MigrationState::Pending)
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.state, MigrationState::Error(_)))
    }

    fn with_state(&self, state: MigrationState) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |e| e.state == state)
            .map(|e| e.id.as_str())
    }
}
