//! SQLite adapter over a single shared connection.
//!
//! SQLite has no server-side connection pool; the engine's transaction
//! primitives (`BEGIN TRANSACTION` / `COMMIT` / `ROLLBACK`) run on the shared
//! connection, matching the single-writer model of the migration runner.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::{Catalog, ColumnDesc, Database, DbError, DbResult, Introspect};

/// A [`Database`] backed by one `tokio_rusqlite` connection.
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Open (or create) a database file.
    pub async fn connect(path: &str) -> DbResult<Self> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| DbError::connection(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Open an in-memory database.
    pub async fn in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DbError::connection(e.to_string()))?;
        Ok(Self { conn })
    }
}

fn to_sqlite_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else {
                Sql::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

fn ref_to_json(value: rusqlite::types::ValueRef<'_>) -> Value {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn query(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Value>> {
        let sql = sql.to_string();
        let params: Vec<rusqlite::types::Value> = params.iter().map(to_sqlite_value).collect();
        debug!(sql = %sql, "sqlite query");

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let columns: Vec<String> =
                    stmt.column_names().iter().map(|s| s.to_string()).collect();

                let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
                    let mut map = Map::new();
                    for (i, col) in columns.iter().enumerate() {
                        map.insert(col.clone(), ref_to_json(row.get_ref(i)?));
                    }
                    Ok(Value::Object(map))
                })?;

                let results: Result<Vec<_>, _> = rows.collect();
                Ok(results?)
            })
            .await
            .map_err(|e| DbError::query(e.to_string()))
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> DbResult<u64> {
        let sql = sql.to_string();
        let params: Vec<rusqlite::types::Value> = params.iter().map(to_sqlite_value).collect();
        debug!(sql = %sql, "sqlite execute");

        self.conn
            .call(move |conn| {
                let changed = conn.execute(&sql, rusqlite::params_from_iter(params))?;
                Ok(changed as u64)
            })
            .await
            .map_err(|e| DbError::query(e.to_string()))
    }

    async fn exec(&self, sql: &str) -> DbResult<()> {
        let sql = sql.to_string();
        debug!(len = sql.len(), "sqlite script");

        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await
            .map_err(|e| DbError::query(e.to_string()))
    }

    async fn begin(&self) -> DbResult<()> {
        self.exec("BEGIN TRANSACTION;")
            .await
            .map_err(|e| DbError::transaction(e.to_string()))
    }

    async fn commit(&self) -> DbResult<()> {
        self.exec("COMMIT;")
            .await
            .map_err(|e| DbError::transaction(e.to_string()))
    }

    async fn rollback(&self) -> DbResult<()> {
        self.exec("ROLLBACK;")
            .await
            .map_err(|e| DbError::transaction(e.to_string()))
    }
}

#[async_trait]
impl Introspect for SqliteDatabase {
    async fn table_exists(&self, table: &str) -> bool {
        let rows = self
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                &[Value::String(table.to_string())],
            )
            .await;
        rows.map(|r| !r.is_empty()).unwrap_or(false)
    }

    async fn column_exists(&self, table: &str, column: &str) -> bool {
        // PRAGMA table_info takes an identifier, not a bind parameter.
        let rows = self
            .query(&format!("PRAGMA table_info({table})"), &[])
            .await;
        rows.map(|rows| {
            rows.iter()
                .any(|row| row.get("name").and_then(Value::as_str) == Some(column))
        })
        .unwrap_or(false)
    }
}

#[async_trait]
impl Catalog for SqliteDatabase {
    async fn tables(&self) -> DbResult<Vec<String>> {
        let rows = self
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' AND name <> '_sqlbuns_migrations' \
                 ORDER BY name",
                &[],
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str))
            .map(String::from)
            .collect())
    }

    async fn columns(&self, table: &str) -> DbResult<Vec<ColumnDesc>> {
        let rows = self
            .query(&format!("PRAGMA table_info({table})"), &[])
            .await?;
        Ok(rows
            .iter()
            .map(|row| ColumnDesc {
                name: row
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                data_type: row
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_lowercase(),
                nullable: row.get("notnull").and_then(Value::as_i64) == Some(0),
                default: row
                    .get("dflt_value")
                    .and_then(Value::as_str)
                    .map(String::from),
                primary_key: row.get("pk").and_then(Value::as_i64).unwrap_or(0) > 0,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_and_query() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT); INSERT INTO t (name) VALUES ('a');")
            .await
            .unwrap();

        let rows = db.query("SELECT id, name FROM t", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "a");
        assert_eq!(rows[0]["id"], 1);
    }

    #[tokio::test]
    async fn test_introspection() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.exec("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT);")
            .await
            .unwrap();

        assert!(db.table_exists("users").await);
        assert!(!db.table_exists("posts").await);
        assert!(db.column_exists("users", "email").await);
        assert!(!db.column_exists("users", "age").await);
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.exec("CREATE TABLE t (id INTEGER);").await.unwrap();

        db.begin().await.unwrap();
        db.exec("INSERT INTO t VALUES (1);").await.unwrap();
        db.rollback().await.unwrap();

        let rows = db.query("SELECT id FROM t", &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_catalog() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.exec("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL);")
            .await
            .unwrap();

        let tables = db.tables().await.unwrap();
        assert_eq!(tables, ["users"]);

        let columns = db.columns("users").await.unwrap();
        assert_eq!(columns.len(), 2);
        assert!(columns[0].primary_key);
        assert!(!columns[1].nullable);
    }

    #[tokio::test]
    async fn test_multi_statement_trigger_script_survives() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.exec(
            "CREATE TABLE t (id INTEGER, n INTEGER DEFAULT 0);\n\
             CREATE TRIGGER trg_t_insert_after_0 AFTER INSERT ON t FOR EACH ROW BEGIN\n\
             UPDATE t SET n = n + 1;\nEND;",
        )
        .await
        .unwrap();

        let rows = db
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'trigger'",
                &[],
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["name"], "trg_t_insert_after_0");
    }
}
