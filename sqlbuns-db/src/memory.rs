//! An in-process database fake for tests.
//!
//! Records every script and statement it is asked to run, answers existence
//! probes from a configured table map, and serves canned `sqlite_master`
//! rows so the SQLite rebuild guards can be exercised without a real file.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::{Database, DbResult, Introspect};

#[derive(Debug, Default)]
struct MemoryState {
    tables: IndexMap<String, BTreeSet<String>>,
    master: Vec<(String, String, String, String)>,
    log: Vec<String>,
    tx_depth: usize,
}

/// A scriptable [`Database`] + [`Introspect`] fake.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
}

impl MemoryDatabase {
    /// An empty database: no tables, no columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table with its columns.
    pub fn with_table(
        self,
        table: &str,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.state.lock().unwrap().tables.insert(
            table.to_string(),
            columns.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Register a `sqlite_master` entry (`kind` is `table` or `trigger`;
    /// `tbl_name` is the table the object belongs to).
    pub fn with_master_entry(self, kind: &str, name: &str, tbl_name: &str, sql: &str) -> Self {
        self.state.lock().unwrap().master.push((
            kind.to_string(),
            name.to_string(),
            tbl_name.to_string(),
            sql.to_string(),
        ));
        self
    }

    /// Every script and statement executed so far, in order.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn query(&self, sql: &str, _params: &[Value]) -> DbResult<Vec<Value>> {
        let state = self.state.lock().unwrap();
        if sql.contains("sqlite_master") {
            let kind = if sql.contains("'trigger'") { "trigger" } else { "table" };
            return Ok(state
                .master
                .iter()
                .filter(|(k, _, _, _)| k == kind)
                .map(|(_, name, tbl, sql)| json!({ "name": name, "tbl_name": tbl, "sql": sql }))
                .collect());
        }
        Ok(Vec::new())
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> DbResult<u64> {
        self.state.lock().unwrap().log.push(sql.to_string());
        Ok(0)
    }

    async fn exec(&self, sql: &str) -> DbResult<()> {
        self.state.lock().unwrap().log.push(sql.to_string());
        Ok(())
    }

    async fn begin(&self) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        state.tx_depth += 1;
        state.log.push("BEGIN".to_string());
        Ok(())
    }

    async fn commit(&self) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        state.tx_depth = state.tx_depth.saturating_sub(1);
        state.log.push("COMMIT".to_string());
        Ok(())
    }

    async fn rollback(&self) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        state.tx_depth = state.tx_depth.saturating_sub(1);
        state.log.push("ROLLBACK".to_string());
        Ok(())
    }
}

#[async_trait]
impl Introspect for MemoryDatabase {
    async fn table_exists(&self, table: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(table)
    }

    async fn column_exists(&self, table: &str, column: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .is_some_and(|cols| cols.contains(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probes_and_log() {
        let db = MemoryDatabase::new().with_table("users", ["id", "email"]);

        assert!(db.table_exists("users").await);
        assert!(db.column_exists("users", "id").await);
        assert!(!db.column_exists("users", "age").await);
        assert!(!db.table_exists("posts").await);

        db.exec("CREATE TABLE posts (id INTEGER);").await.unwrap();
        assert_eq!(db.log(), ["CREATE TABLE posts (id INTEGER);"]);
    }

    #[tokio::test]
    async fn test_master_entries() {
        let db = MemoryDatabase::new()
            .with_master_entry(
                "table",
                "posts",
                "posts",
                "CREATE TABLE posts (user_id INTEGER REFERENCES users(id))",
            )
            .with_master_entry("trigger", "trg", "posts", "UPDATE users SET n = n + 1");

        let tables = db
            .query("SELECT name, sql FROM sqlite_master WHERE type = 'table'", &[])
            .await
            .unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0]["name"], "posts");

        let triggers = db
            .query("SELECT name, sql FROM sqlite_master WHERE type = 'trigger'", &[])
            .await
            .unwrap();
        assert_eq!(triggers.len(), 1);
    }
}
