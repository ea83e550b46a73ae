//! MySQL adapter over a `mysql_async` pool.
//!
//! Like the PostgreSQL adapter, `begin` pins a connection for the duration of
//! the transaction; migration scripts run on the pinned connection.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, Params, Pool, Row};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Catalog, ColumnDesc, Database, DbError, DbResult, Introspect};

/// A [`Database`] backed by `mysql_async`.
pub struct MySqlDatabase {
    pool: Pool,
    tx: Mutex<Option<Conn>>,
}

impl MySqlDatabase {
    /// Connect using a `mysql://` URL.
    pub fn connect(url: &str) -> DbResult<Self> {
        let opts = Opts::from_url(url).map_err(|e| DbError::connection(e.to_string()))?;
        Ok(Self {
            pool: Pool::new(opts),
            tx: Mutex::new(None),
        })
    }

    async fn checkout(&self) -> DbResult<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| DbError::connection(e.to_string()))
    }
}

fn to_mysql_params(params: &[Value]) -> Params {
    if params.is_empty() {
        return Params::Empty;
    }
    Params::Positional(
        params
            .iter()
            .map(|value| match value {
                Value::Null => mysql_async::Value::NULL,
                Value::Bool(b) => mysql_async::Value::Int(*b as i64),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        mysql_async::Value::Int(i)
                    } else {
                        mysql_async::Value::Double(n.as_f64().unwrap_or(0.0))
                    }
                }
                Value::String(s) => mysql_async::Value::Bytes(s.clone().into_bytes()),
                other => mysql_async::Value::Bytes(other.to_string().into_bytes()),
            })
            .collect(),
    )
}

fn row_to_json(row: Row) -> Value {
    let columns = row.columns();
    let values = row.unwrap();
    let mut map = Map::new();
    for (column, value) in columns.iter().zip(values) {
        let json = match value {
            mysql_async::Value::NULL => Value::Null,
            mysql_async::Value::Bytes(bytes) => {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }
            mysql_async::Value::Int(i) => Value::from(i),
            mysql_async::Value::UInt(u) => Value::from(u),
            mysql_async::Value::Float(f) => Value::from(f as f64),
            mysql_async::Value::Double(d) => Value::from(d),
            other => Value::String(format!("{other:?}")),
        };
        map.insert(column.name_str().into_owned(), json);
    }
    Value::Object(map)
}

#[async_trait]
impl Database for MySqlDatabase {
    async fn query(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Value>> {
        debug!(sql = %sql, "mysql query");
        let params = to_mysql_params(params);

        let mut tx = self.tx.lock().await;
        let rows: Vec<Row> = if let Some(conn) = tx.as_mut() {
            conn.exec(sql, params).await
        } else {
            self.checkout().await?.exec(sql, params).await
        }
        .map_err(|e| DbError::query(e.to_string()))?;

        Ok(rows.into_iter().map(row_to_json).collect())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> DbResult<u64> {
        debug!(sql = %sql, "mysql execute");
        let params = to_mysql_params(params);

        let mut tx = self.tx.lock().await;
        if let Some(conn) = tx.as_mut() {
            conn.exec_drop(sql, params)
                .await
                .map_err(|e| DbError::query(e.to_string()))?;
            Ok(conn.affected_rows())
        } else {
            let mut conn = self.checkout().await?;
            conn.exec_drop(sql, params)
                .await
                .map_err(|e| DbError::query(e.to_string()))?;
            Ok(conn.affected_rows())
        }
    }

    async fn exec(&self, sql: &str) -> DbResult<()> {
        debug!(len = sql.len(), "mysql script");
        let mut tx = self.tx.lock().await;
        if let Some(conn) = tx.as_mut() {
            conn.query_drop(sql).await
        } else {
            self.checkout().await?.query_drop(sql).await
        }
        .map_err(|e| DbError::query(e.to_string()))
    }

    async fn begin(&self) -> DbResult<()> {
        let mut tx = self.tx.lock().await;
        if tx.is_some() {
            return Err(DbError::transaction("transaction already open"));
        }
        let mut conn = self.checkout().await?;
        conn.query_drop("START TRANSACTION")
            .await
            .map_err(|e| DbError::transaction(e.to_string()))?;
        *tx = Some(conn);
        Ok(())
    }

    async fn commit(&self) -> DbResult<()> {
        let mut tx = self.tx.lock().await;
        let mut conn = tx
            .take()
            .ok_or_else(|| DbError::transaction("no open transaction"))?;
        conn.query_drop("COMMIT")
            .await
            .map_err(|e| DbError::transaction(e.to_string()))
    }

    async fn rollback(&self) -> DbResult<()> {
        let mut tx = self.tx.lock().await;
        let mut conn = tx
            .take()
            .ok_or_else(|| DbError::transaction("no open transaction"))?;
        conn.query_drop("ROLLBACK")
            .await
            .map_err(|e| DbError::transaction(e.to_string()))
    }
}

#[async_trait]
impl Introspect for MySqlDatabase {
    async fn table_exists(&self, table: &str) -> bool {
        self.query(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ?",
            &[Value::String(table.to_string())],
        )
        .await
        .map(|rows| !rows.is_empty())
        .unwrap_or(false)
    }

    async fn column_exists(&self, table: &str, column: &str) -> bool {
        self.query(
            "SELECT 1 FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? AND column_name = ?",
            &[
                Value::String(table.to_string()),
                Value::String(column.to_string()),
            ],
        )
        .await
        .map(|rows| !rows.is_empty())
        .unwrap_or(false)
    }
}

#[async_trait]
impl Catalog for MySqlDatabase {
    async fn tables(&self) -> DbResult<Vec<String>> {
        let rows = self
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
                 AND table_name <> '_sqlbuns_migrations' ORDER BY table_name",
                &[],
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                row.get("table_name")
                    .or_else(|| row.get("TABLE_NAME"))
                    .and_then(Value::as_str)
            })
            .map(String::from)
            .collect())
    }

    async fn columns(&self, table: &str) -> DbResult<Vec<ColumnDesc>> {
        let rows = self
            .query(
                "SELECT column_name, data_type, is_nullable, column_default, column_key \
                 FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name = ? \
                 ORDER BY ordinal_position",
                &[Value::String(table.to_string())],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let get = |key: &str, upper: &str| {
                    row.get(key)
                        .or_else(|| row.get(upper))
                        .and_then(Value::as_str)
                        .map(String::from)
                };
                ColumnDesc {
                    name: get("column_name", "COLUMN_NAME").unwrap_or_default(),
                    data_type: get("data_type", "DATA_TYPE").unwrap_or_default().to_lowercase(),
                    nullable: get("is_nullable", "IS_NULLABLE").as_deref() == Some("YES"),
                    default: get("column_default", "COLUMN_DEFAULT"),
                    primary_key: get("column_key", "COLUMN_KEY").as_deref() == Some("PRI"),
                }
            })
            .collect())
    }
}
