//! The transactional connection the migration engine runs against.
//!
//! The engine only ever needs three capabilities from a database: run a
//! statement, run a query, and list a table's columns. A [`Connection`]
//! additionally opens [`Transaction`]s; a transaction borrows its connection
//! mutably, so at most one is open at a time.

pub mod config;
pub mod sqlite;

use crate::core::{Result, Value};
use crate::result::QueryResult;
use async_trait::async_trait;

pub use config::{ConnectionConfig, RevertPolicy};
pub use sqlite::SqliteConnection;

/// Statement execution shared by connections and transactions.
#[async_trait]
pub trait Executor: Send {
    /// Executes a statement and returns the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Executes a query and returns its rows.
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult>;
}

/// Column listing for a table (`DESCRIBE` / `PRAGMA table_info`).
#[async_trait]
pub trait SchemaIntrospector: Send {
    /// Column names of `table` in declaration order, or `None` if it does not exist.
    async fn table_columns(&mut self, table: &str) -> Result<Option<Vec<String>>>;
}

/// An open database transaction.
///
/// Dropping a transaction without calling [`commit`](Transaction::commit)
/// rolls it back.
#[async_trait]
pub trait Transaction: Executor + SchemaIntrospector {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// A live database connection lent to the engine for one call.
#[async_trait]
pub trait Connection: Executor + SchemaIntrospector {
    async fn begin<'a>(&'a mut self) -> Result<Box<dyn Transaction + 'a>>;
}
