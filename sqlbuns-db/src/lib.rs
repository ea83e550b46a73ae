//! # sqlbuns-db
//!
//! The database seam consumed by the sqlbuns migration engine.
//!
//! The engine never talks to a driver directly: it goes through the
//! [`Database`] trait for execution and transactions, [`Introspect`] for
//! existence probes, and [`Catalog`] for the `inspectdb` bootstrap. Rows
//! surface as `serde_json::Value` maps, one object per row.
//!
//! Adapters for the three supported engines live behind cargo features:
//!
//! | feature    | driver stack                        |
//! |------------|-------------------------------------|
//! | `postgres` | `tokio-postgres` + `deadpool-postgres` |
//! | `mysql`    | `mysql_async`                       |
//! | `sqlite`   | `rusqlite` + `tokio-rusqlite`       |
//!
//! [`memory::MemoryDatabase`] is an in-process fake for tests.

pub mod error;
pub mod memory;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;

pub use error::{DbError, DbResult};

/// A connection pool with per-connection transaction primitives.
///
/// `exec` runs its argument as a single script: the runner never splits
/// migration files on `;`, so multi-line trigger bodies survive intact.
/// `begin` pins a connection until the matching `commit` or `rollback`;
/// statements issued in between run on that connection.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a single statement with positional parameters and collect rows.
    async fn query(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Value>>;

    /// Run a single statement with positional parameters, returning the
    /// affected-row count.
    async fn execute(&self, sql: &str, params: &[Value]) -> DbResult<u64>;

    /// Execute a multi-statement script.
    async fn exec(&self, sql: &str) -> DbResult<()>;

    /// Open a transaction.
    async fn begin(&self) -> DbResult<()>;

    /// Commit the open transaction.
    async fn commit(&self) -> DbResult<()>;

    /// Roll back the open transaction.
    async fn rollback(&self) -> DbResult<()>;
}

/// Existence probes against the live database.
///
/// Lookup failures are swallowed as "no": a table that cannot be probed is
/// treated as absent, which biases the differ toward emitting creation DDL
/// rather than silently skipping it.
#[async_trait]
pub trait Introspect: Send + Sync {
    /// Check whether a table exists.
    async fn table_exists(&self, table: &str) -> bool;

    /// Check whether a column exists on a table.
    async fn column_exists(&self, table: &str, column: &str) -> bool;
}

/// A column as reported by the database catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDesc {
    pub name: String,
    /// The dialect's reported type name, lowercased.
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

/// Catalog listing used by the `inspectdb` bootstrap.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// User tables, excluding the migration history table and any
    /// driver-internal tables.
    async fn tables(&self) -> DbResult<Vec<String>>;

    /// Columns of a table, in ordinal order.
    async fn columns(&self, table: &str) -> DbResult<Vec<ColumnDesc>>;
}

/// The full capability set of a dialect adapter, for callers that hold one
/// boxed connection and hand out its facets separately.
pub trait Backend: Database + Introspect + Catalog {}

impl<T: Database + Introspect + Catalog> Backend for T {}

/// What kind of object a rename confirmation is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameKind {
    Column,
    Table,
}

impl std::fmt::Display for RenameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Column => write!(f, "column"),
            Self::Table => write!(f, "table"),
        }
    }
}

/// Answers "did you rename old to new?" during diffing.
///
/// Interactive front-ends prompt the user; non-interactive runs answer `false`
/// so a drop-and-add is emitted instead of a destructive guess.
pub trait RenameOracle: Send + Sync {
    fn confirm_rename(&self, table: &str, old: &str, new: &str, kind: RenameKind) -> bool;
}

/// A [`RenameOracle`] that never confirms. Used in non-interactive mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl RenameOracle for NoPrompt {
    fn confirm_rename(&self, _table: &str, _old: &str, _new: &str, _kind: RenameKind) -> bool {
        false
    }
}

/// An oracle with a fixed answer set, for tests.
#[derive(Debug, Default)]
pub struct FixedRenames {
    renames: Vec<(String, String, String)>,
}

impl FixedRenames {
    /// Confirm the rename of `old` to `new` on `table`.
    pub fn confirm(mut self, table: &str, old: &str, new: &str) -> Self {
        self.renames
            .push((table.to_string(), old.to_string(), new.to_string()));
        self
    }
}

impl RenameOracle for FixedRenames {
    fn confirm_rename(&self, table: &str, old: &str, new: &str, _kind: RenameKind) -> bool {
        self.renames
            .iter()
            .any(|(t, o, n)| t == table && o == old && n == new)
    }
}
