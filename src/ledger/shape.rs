use serde::Serialize;
use std::fmt;

/// Column layouts the ledger table has had over time.
///
/// The set is closed: every table the engine can meet maps to exactly one
/// variant, so detection never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerShape {
    /// No ledger table.
    Absent,
    /// `(version, name, applied_at)`.
    Canonical,
    /// `(id, name, applied_at)`.
    LegacyFull,
    /// `(id, applied_at)`.
    LegacyMinimal,
    /// A table whose columns match no known layout.
    Unrecognized,
}

impl LedgerShape {
    /// Classify a table from its column names (`None` when it does not exist).
    pub fn detect<S: AsRef<str>>(columns: Option<&[S]>) -> Self {
        let Some(columns) = columns else {
            return Self::Absent;
        };
        let has = |wanted: &str| columns.iter().any(|c| c.as_ref().eq_ignore_ascii_case(wanted));

        if has("version") && has("name") {
            Self::Canonical
        } else if has("id") && has("name") {
            Self::LegacyFull
        } else if has("id") {
            Self::LegacyMinimal
        } else {
            Self::Unrecognized
        }
    }

    /// Whether the table exists but must be rebuilt before normal use.
    pub fn needs_repair(self) -> bool {
        matches!(self, Self::LegacyFull | Self::LegacyMinimal | Self::Unrecognized)
    }
}

impl fmt::Display for LedgerShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Absent => "absent",
            Self::Canonical => "canonical (version, name, applied_at)",
            Self::LegacyFull => "legacy (id, name, applied_at)",
            Self::LegacyMinimal => "legacy (id, applied_at)",
            Self::Unrecognized => "unrecognized",
        };
        f.write_str(text)
    }
}
