//! Bookkeeping of which migrations have been applied.
//!
//! The ledger is a single table keyed by migration version. Earlier releases
//! created it with a different layout (see [`LedgerShape`]), so every read and
//! write first tries the canonical columns and falls back to the legacy ones
//! when the canonical statement itself fails. [`LedgerRepair`] rebuilds a
//! legacy table in place; once it has run only the canonical path is used.

mod repair;
mod shape;

use crate::connection::config::{DEFAULT_LEDGER_TABLE, is_identifier};
use crate::connection::{Executor, SchemaIntrospector, Transaction};
use crate::core::{MigrateError, Result, TIMESTAMP_FORMAT, Value};
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use tracing::debug;

pub use repair::LedgerRepair;
pub use shape::LedgerShape;

/// A persisted ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub version: String,
    pub name: String,
    pub applied_at: Option<NaiveDateTime>,
}

/// Reads and writes ledger rows in one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    table: String,
}

impl Ledger {
    /// Ledger stored in `table`, which must be a plain SQL identifier.
    pub fn new(table: &str) -> Result<Self> {
        if !is_identifier(table) {
            return Err(MigrateError::Config(format!(
                "Invalid ledger table name '{}'",
                table
            )));
        }
        Ok(Self {
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The table name as a quoted SQL identifier, so names that are also
    /// keywords (`order`, `group`) stay usable.
    pub(crate) fn quoted(&self) -> String {
        quote_ident(&self.table)
    }

    pub(crate) fn create_sql(&self, if_not_exists: bool) -> String {
        format!(
            "CREATE TABLE {}{} (\
             version VARCHAR(255) PRIMARY KEY, \
             name VARCHAR(255) NOT NULL, \
             applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            self.quoted()
        )
    }

    /// Creates the canonical table unless a table of that name exists.
    pub async fn ensure_table<E>(&self, exec: &mut E) -> Result<()>
    where
        E: Executor + ?Sized,
    {
        exec.execute(&self.create_sql(true), &[]).await?;
        Ok(())
    }

    /// Current layout of the ledger table.
    pub async fn shape<I>(&self, introspector: &mut I) -> Result<LedgerShape>
    where
        I: SchemaIntrospector + ?Sized,
    {
        let columns = introspector.table_columns(&self.table).await?;
        Ok(LedgerShape::detect(columns.as_deref()))
    }

    /// Whether a row exists for `version`.
    pub async fn is_applied<E>(&self, exec: &mut E, version: &str) -> Result<bool>
    where
        E: Executor + ?Sized,
    {
        let params = [Value::from(version)];
        let canonical = format!("SELECT COUNT(*) FROM {} WHERE version = ?", self.quoted());
        let result = match exec.query(&canonical, &params).await {
            Ok(result) => result,
            Err(canonical_err) => {
                debug!(table = %self.table, error = %canonical_err, "canonical ledger read failed, trying legacy layout");
                let legacy = format!("SELECT COUNT(*) FROM {} WHERE id = ?", self.quoted());
                exec.query(&legacy, &params)
                    .await
                    .map_err(|legacy_err| both_failed(canonical_err, legacy_err))?
            }
        };

        let count = result.scalar().and_then(Value::as_i64).ok_or_else(|| {
            MigrateError::Database(format!("unexpected COUNT result from {}", self.table))
        })?;
        Ok(count > 0)
    }

    /// Records `version` as applied inside the caller's transaction.
    pub async fn mark_applied(
        &self,
        tx: &mut dyn Transaction,
        version: &str,
        name: &str,
    ) -> Result<()> {
        let applied_at = Value::timestamp(Utc::now());
        let canonical = format!(
            "INSERT INTO {} (version, name, applied_at) VALUES (?, ?, ?)",
            self.quoted()
        );
        let params = [Value::from(version), Value::from(name), applied_at.clone()];
        let canonical_err = match tx.execute(&canonical, &params).await {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };
        debug!(table = %self.table, error = %canonical_err, "canonical ledger insert failed, trying legacy layout");

        let legacy = format!(
            "INSERT INTO {} (id, name, applied_at) VALUES (?, ?, ?)",
            self.quoted()
        );
        let legacy_err = match tx.execute(&legacy, &params).await {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };

        let minimal = format!("INSERT INTO {} (id, applied_at) VALUES (?, ?)", self.quoted());
        tx.execute(&minimal, &[Value::from(version), applied_at])
            .await
            .map(|_| ())
            .map_err(|_| both_failed(canonical_err, legacy_err))
    }

    /// Removes the row for `version` inside the caller's transaction.
    pub async fn mark_unapplied(&self, tx: &mut dyn Transaction, version: &str) -> Result<()> {
        let params = [Value::from(version)];
        let canonical = format!("DELETE FROM {} WHERE version = ?", self.quoted());
        let canonical_err = match tx.execute(&canonical, &params).await {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };
        debug!(table = %self.table, error = %canonical_err, "canonical ledger delete failed, trying legacy layout");

        let legacy = format!("DELETE FROM {} WHERE id = ?", self.quoted());
        tx.execute(&legacy, &params)
            .await
            .map(|_| ())
            .map_err(|legacy_err| both_failed(canonical_err, legacy_err))
    }

    /// All rows ordered by version, whatever the table's layout.
    pub async fn entries<C>(&self, conn: &mut C) -> Result<Vec<LedgerEntry>>
    where
        C: Executor + SchemaIntrospector + ?Sized,
    {
        let select = match self.shape(conn).await? {
            LedgerShape::Absent | LedgerShape::Unrecognized => return Ok(Vec::new()),
            LedgerShape::Canonical => "version, name, applied_at",
            LedgerShape::LegacyFull => "id, COALESCE(name, id), applied_at",
            LedgerShape::LegacyMinimal => "id, id, applied_at",
        };
        let key = if select.starts_with("version") { "version" } else { "id" };
        let sql = format!("SELECT {} FROM {} ORDER BY {}", select, self.quoted(), key);

        let result = conn.query(&sql, &[]).await?;
        let entries = result
            .rows
            .into_iter()
            .map(|row| {
                let mut cells = row.into_iter();
                let version = cells.next().unwrap_or(Value::Null).to_string();
                let name = cells.next().unwrap_or(Value::Null).to_string();
                let applied_at = cells.next().and_then(|v| parse_timestamp(&v));
                LedgerEntry {
                    version,
                    name,
                    applied_at,
                }
            })
            .collect();
        Ok(entries)
    }

    /// The self-repair migration for this ledger's table.
    pub fn repair(&self, id: &str) -> LedgerRepair {
        LedgerRepair::new(id, self.clone())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }
}

/// Quotes a name already checked by `is_identifier`.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

fn parse_timestamp(value: &Value) -> Option<NaiveDateTime> {
    let text = value.as_str()?;
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

fn both_failed(canonical: MigrateError, legacy: MigrateError) -> MigrateError {
    MigrateError::Database(format!(
        "{} (legacy layout: {})",
        detail(canonical),
        detail(legacy)
    ))
}

/// The driver message, without the `Database error:` prefix.
fn detail(err: MigrateError) -> String {
    match err {
        MigrateError::Database(message) => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, SqliteConnection};

    async fn conn_with(ddl: &str) -> SqliteConnection {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute(ddl, &[]).await.unwrap();
        conn
    }

    #[test]
    fn test_rejects_unsafe_table_name() {
        assert!(Ledger::new("schema_migrations").is_ok());
        assert!(Ledger::new("x; DROP TABLE users").is_err());
        assert_eq!(Ledger::default().table(), "schema_migrations");
    }

    #[tokio::test]
    async fn test_keyword_table_name() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let ledger = Ledger::new("order").unwrap();
        ledger.ensure_table(&mut conn).await.unwrap();
        assert_eq!(ledger.shape(&mut conn).await.unwrap(), LedgerShape::Canonical);

        let mut tx = conn.begin().await.unwrap();
        ledger.mark_applied(tx.as_mut(), "001_x", "001_x").await.unwrap();
        tx.commit().await.unwrap();
        assert!(ledger.is_applied(&mut conn, "001_x").await.unwrap());
        assert_eq!(ledger.entries(&mut conn).await.unwrap().len(), 1);

        let mut tx = conn.begin().await.unwrap();
        ledger.mark_unapplied(tx.as_mut(), "001_x").await.unwrap();
        tx.commit().await.unwrap();
        assert!(!ledger.is_applied(&mut conn, "001_x").await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let ledger = Ledger::default();

        ledger.ensure_table(&mut conn).await.unwrap();
        ledger.ensure_table(&mut conn).await.unwrap();
        assert_eq!(ledger.shape(&mut conn).await.unwrap(), LedgerShape::Canonical);
    }

    #[tokio::test]
    async fn test_mark_and_check_canonical() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let ledger = Ledger::default();
        ledger.ensure_table(&mut conn).await.unwrap();

        let mut tx = conn.begin().await.unwrap();
        ledger.mark_applied(tx.as_mut(), "001_x", "create x").await.unwrap();
        tx.commit().await.unwrap();

        assert!(ledger.is_applied(&mut conn, "001_x").await.unwrap());
        assert!(!ledger.is_applied(&mut conn, "002_y").await.unwrap());

        let entries = ledger.entries(&mut conn).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].version, "001_x");
        assert_eq!(entries[0].name, "create x");
        assert!(entries[0].applied_at.is_some());

        let mut tx = conn.begin().await.unwrap();
        ledger.mark_unapplied(tx.as_mut(), "001_x").await.unwrap();
        tx.commit().await.unwrap();
        assert!(!ledger.is_applied(&mut conn, "001_x").await.unwrap());
    }

    #[tokio::test]
    async fn test_legacy_full_fallback() {
        let mut conn = conn_with(
            "CREATE TABLE schema_migrations (id VARCHAR(255) PRIMARY KEY, name VARCHAR(255), applied_at TIMESTAMP)",
        )
        .await;
        let ledger = Ledger::default();

        let mut tx = conn.begin().await.unwrap();
        ledger.mark_applied(tx.as_mut(), "001_x", "001_x").await.unwrap();
        tx.commit().await.unwrap();
        assert!(ledger.is_applied(&mut conn, "001_x").await.unwrap());

        let mut tx = conn.begin().await.unwrap();
        ledger.mark_unapplied(tx.as_mut(), "001_x").await.unwrap();
        tx.commit().await.unwrap();
        assert!(!ledger.is_applied(&mut conn, "001_x").await.unwrap());
    }

    #[tokio::test]
    async fn test_legacy_minimal_fallback() {
        let mut conn = conn_with(
            "CREATE TABLE schema_migrations (id VARCHAR(255) PRIMARY KEY, applied_at TIMESTAMP)",
        )
        .await;
        let ledger = Ledger::default();

        let mut tx = conn.begin().await.unwrap();
        ledger.mark_applied(tx.as_mut(), "001_x", "ignored").await.unwrap();
        tx.commit().await.unwrap();

        assert!(ledger.is_applied(&mut conn, "001_x").await.unwrap());
        let entries = ledger.entries(&mut conn).await.unwrap();
        assert_eq!(entries[0].name, "001_x");
    }

    #[tokio::test]
    async fn test_both_layouts_failing_is_an_error() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let err = Ledger::default().is_applied(&mut conn, "001_x").await.unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Database error: no such table"));
        assert!(message.contains("(legacy layout: no such table"));
        assert_eq!(message.matches("Database error").count(), 1);

        let mut conn = conn_with("CREATE TABLE schema_migrations (migration TEXT)").await;
        let mut tx = conn.begin().await.unwrap();
        assert!(Ledger::default().mark_applied(tx.as_mut(), "001_x", "001_x").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let ledger = Ledger::default();
        ledger.ensure_table(&mut conn).await.unwrap();

        let mut tx = conn.begin().await.unwrap();
        ledger.mark_applied(tx.as_mut(), "001_x", "001_x").await.unwrap();
        assert!(ledger.mark_applied(tx.as_mut(), "001_x", "001_x").await.is_err());
    }
}
