//! Migrations and the ordered catalog they live in.

pub mod builtin;
pub mod catalog;

use crate::connection::Transaction;
use crate::core::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

pub use catalog::Catalog;

/// Whether a migration's `revert` actually undoes its `apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reversibility {
    Reversible,
    /// `revert` is a documented no-op.
    Irreversible,
}

/// One versioned unit of schema change.
///
/// `apply` and `revert` run inside a transaction owned by the runner; an
/// error from either rolls the whole transaction back.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique, ordered identifier such as `001_create_users_table`.
    fn id(&self) -> &str;

    /// Label stored in the ledger's `name` column.
    fn name(&self) -> &str {
        self.id()
    }

    fn reversibility(&self) -> Reversibility {
        Reversibility::Reversible
    }

    /// Whether this migration rebuilds the ledger table itself. The runner
    /// applies such a migration ahead of the others when the ledger layout
    /// cannot be read at all.
    fn repairs_ledger(&self) -> bool {
        false
    }

    async fn apply(&self, tx: &mut dyn Transaction) -> Result<()>;

    async fn revert(&self, tx: &mut dyn Transaction) -> Result<()>;
}

impl fmt::Debug for dyn Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id())
            .field("reversibility", &self.reversibility())
            .finish()
    }
}

/// A migration made of plain SQL statements.
///
/// `up` statements run in order on apply, `down` statements in order on
/// revert. A migration without `down` statements is irreversible.
///
/// # Examples
///
/// ```
/// use rustmigrate::SqlMigration;
///
/// let migration = SqlMigration::new("004_add_user_locale")
///     .up("ALTER TABLE users ADD COLUMN locale VARCHAR(16)")
///     .down("ALTER TABLE users DROP COLUMN locale");
/// ```
#[derive(Debug, Clone)]
pub struct SqlMigration {
    id: String,
    name: Option<String>,
    up: Vec<String>,
    down: Vec<String>,
}

impl SqlMigration {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            up: Vec::new(),
            down: Vec::new(),
        }
    }

    /// Override the ledger label (defaults to the id).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn up(mut self, sql: impl Into<String>) -> Self {
        self.up.push(sql.into());
        self
    }

    pub fn down(mut self, sql: impl Into<String>) -> Self {
        self.down.push(sql.into());
        self
    }

    async fn run(&self, tx: &mut dyn Transaction, statements: &[String]) -> Result<()> {
        for sql in statements {
            tx.execute(sql, &[]).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Migration for SqlMigration {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    fn reversibility(&self) -> Reversibility {
        if self.down.is_empty() {
            Reversibility::Irreversible
        } else {
            Reversibility::Reversible
        }
    }

    async fn apply(&self, tx: &mut dyn Transaction) -> Result<()> {
        self.run(tx, &self.up).await
    }

    async fn revert(&self, tx: &mut dyn Transaction) -> Result<()> {
        self.run(tx, &self.down).await
    }
}
