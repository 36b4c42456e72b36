//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use rustmigrate::{
    Catalog, Executor, MigrateError, Migration, Result, SchemaIntrospector, SqlMigration,
    SqliteConnection, Transaction, Value,
};
use std::sync::{Arc, Mutex};

/// Records the order in which migrations run.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Wraps a migration and records its apply/revert calls.
pub struct Recorded<M> {
    pub inner: M,
    pub journal: Journal,
}

#[async_trait]
impl<M: Migration> Migration for Recorded<M> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn reversibility(&self) -> rustmigrate::Reversibility {
        self.inner.reversibility()
    }

    fn repairs_ledger(&self) -> bool {
        self.inner.repairs_ledger()
    }

    async fn apply(&self, tx: &mut dyn Transaction) -> Result<()> {
        self.journal.push(format!("apply {}", self.id()));
        self.inner.apply(tx).await
    }

    async fn revert(&self, tx: &mut dyn Transaction) -> Result<()> {
        self.journal.push(format!("revert {}", self.id()));
        self.inner.revert(tx).await
    }
}

/// Performs real DDL/DML and then fails.
pub struct FailsAfterWork {
    pub id: String,
}

#[async_trait]
impl Migration for FailsAfterWork {
    fn id(&self) -> &str {
        &self.id
    }

    async fn apply(&self, tx: &mut dyn Transaction) -> Result<()> {
        tx.execute("CREATE TABLE half_done (id INTEGER)", &[]).await?;
        tx.execute("INSERT INTO half_done VALUES (1)", &[]).await?;
        tx.execute("INSERT INTO accounts (owner) VALUES ('mallory')", &[])
            .await?;
        Err(MigrateError::Database("simulated failure".into()))
    }

    async fn revert(&self, _tx: &mut dyn Transaction) -> Result<()> {
        Ok(())
    }
}

/// Applies cleanly but cannot be reverted.
pub struct FailsOnRevert {
    pub id: String,
}

#[async_trait]
impl Migration for FailsOnRevert {
    fn id(&self) -> &str {
        &self.id
    }

    async fn apply(&self, tx: &mut dyn Transaction) -> Result<()> {
        tx.execute("CREATE TABLE sticky (id INTEGER)", &[]).await?;
        Ok(())
    }

    async fn revert(&self, tx: &mut dyn Transaction) -> Result<()> {
        tx.execute("DROP TABLE sticky", &[]).await?;
        Err(MigrateError::Database("cannot drop sticky".into()))
    }
}

pub fn create_accounts() -> SqlMigration {
    SqlMigration::new("001_create_accounts")
        .up("CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT NOT NULL)")
        .down("DROP TABLE accounts")
}

/// Depends on `accounts` existing.
pub fn seed_accounts() -> SqlMigration {
    SqlMigration::new("002_seed_accounts")
        .up("INSERT INTO accounts (owner) VALUES ('alice'), ('bob')")
        .down("DELETE FROM accounts WHERE owner IN ('alice', 'bob')")
}

/// Depends on `accounts` existing.
pub fn add_balance() -> SqlMigration {
    SqlMigration::new("003_add_balance")
        .up("ALTER TABLE accounts ADD COLUMN balance INTEGER NOT NULL DEFAULT 0")
        .down("ALTER TABLE accounts DROP COLUMN balance")
}

pub fn catalog(migrations: Vec<Arc<dyn Migration>>) -> Catalog {
    Catalog::new(migrations).unwrap()
}

pub fn accounts_catalog() -> Catalog {
    catalog(vec![
        Arc::new(create_accounts()),
        Arc::new(seed_accounts()),
        Arc::new(add_balance()),
    ])
}

pub fn memory() -> SqliteConnection {
    SqliteConnection::open_in_memory().unwrap()
}

pub async fn count(conn: &mut SqliteConnection, sql: &str) -> i64 {
    conn.query(sql, &[])
        .await
        .unwrap()
        .scalar()
        .and_then(Value::as_i64)
        .unwrap()
}

pub async fn columns(conn: &mut SqliteConnection, table: &str) -> Option<Vec<String>> {
    conn.table_columns(table).await.unwrap()
}

/// Ledger versions in table order.
pub async fn ledger_versions(conn: &mut SqliteConnection) -> Vec<String> {
    conn.query("SELECT version FROM schema_migrations ORDER BY version", &[])
        .await
        .unwrap()
        .rows
        .into_iter()
        .map(|row| row[0].to_string())
        .collect()
}

/// Full schema dump used to compare database states.
pub async fn schema(conn: &mut SqliteConnection) -> Vec<String> {
    conn.query(
        "SELECT type || ' ' || name || ' ' || COALESCE(sql, '') FROM sqlite_master ORDER BY type, name",
        &[],
    )
    .await
    .unwrap()
    .rows
    .into_iter()
    .map(|row| row[0].to_string())
    .collect()
}
