//! SQLite backend over `rusqlite`.

use super::config::{ConnectionConfig, DatabaseLocation};
use super::{Connection, Executor, SchemaIntrospector, Transaction};
use crate::core::{MigrateError, Result, Row, Value};
use crate::result::QueryResult;
use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::params_from_iter;
use tracing::{debug, warn};

/// A SQLite database connection.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Open (or create) a database file.
    pub fn open(path: &str) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| MigrateError::Connection(format!("cannot open '{}': {}", path, e)))?;
        debug!(path, "opened sqlite database");
        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| MigrateError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Open the database named by `config`.
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        match config.location()? {
            DatabaseLocation::Memory => Self::open_in_memory(),
            DatabaseLocation::File(path) => Self::open(&path),
        }
    }

    /// The underlying `rusqlite` connection.
    pub fn raw(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

#[async_trait]
impl Executor for SqliteConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        execute(&self.conn, sql, params)
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        query(&self.conn, sql, params)
    }
}

#[async_trait]
impl SchemaIntrospector for SqliteConnection {
    async fn table_columns(&mut self, table: &str) -> Result<Option<Vec<String>>> {
        table_columns(&self.conn, table)
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn begin<'a>(&'a mut self) -> Result<Box<dyn Transaction + 'a>> {
        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| MigrateError::Connection(format!("cannot begin transaction: {}", e)))?;
        Ok(Box::new(SqliteTransaction {
            conn: &mut self.conn,
            finished: false,
        }))
    }
}

/// A transaction opened by [`SqliteConnection::begin`].
pub struct SqliteTransaction<'a> {
    conn: &'a mut rusqlite::Connection,
    finished: bool,
}

impl SqliteTransaction<'_> {
    fn finish(&mut self, statement: &str) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch(statement)?;
        Ok(())
    }
}

#[async_trait]
impl<'a> Executor for SqliteTransaction<'a> {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        execute(self.conn, sql, params)
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        query(self.conn, sql, params)
    }
}

#[async_trait]
impl<'a> SchemaIntrospector for SqliteTransaction<'a> {
    async fn table_columns(&mut self, table: &str) -> Result<Option<Vec<String>>> {
        table_columns(self.conn, table)
    }
}

#[async_trait]
impl<'a> Transaction for SqliteTransaction<'a> {
    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        if let Err(err) = this.finish("COMMIT") {
            // A failed COMMIT can leave the transaction open.
            if !this.conn.is_autocommit() {
                let _ = this.conn.execute_batch("ROLLBACK");
            }
            return Err(err);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.finish("ROLLBACK")
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.conn.is_autocommit() {
            warn!("transaction dropped without commit, rolling back");
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Boolean(b) => SqlValue::Integer(*b as i64),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn execute(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> Result<u64> {
    let affected = conn.execute(sql, params_from_iter(params.iter().map(to_sql)))?;
    Ok(affected as u64)
}

fn query(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql)))?;
    let mut out: Vec<Row> = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(from_sql(row.get_ref(idx)?));
        }
        out.push(values);
    }

    Ok(QueryResult::new(columns, out))
}

fn table_columns(conn: &rusqlite::Connection, table: &str) -> Result<Option<Vec<String>>> {
    let result = query(
        conn,
        "SELECT name FROM pragma_table_info(?1) ORDER BY cid",
        &[Value::from(table)],
    )?;
    if result.is_empty() {
        return Ok(None);
    }

    let columns = result
        .rows
        .iter()
        .filter_map(|row| row.first().and_then(Value::as_str).map(String::from))
        .collect();
    Ok(Some(columns))
}
