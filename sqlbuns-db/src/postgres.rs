//! PostgreSQL adapter over a deadpool connection pool.
//!
//! `begin` checks a connection out of the pool and pins it until the matching
//! `commit` or `rollback`; in between, every statement runs on the pinned
//! connection so the transaction actually covers the script it wraps.

use std::str::FromStr;

use async_trait::async_trait;
use deadpool_postgres::{Manager, Object, Pool};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::debug;

use crate::{Catalog, ColumnDesc, Database, DbError, DbResult, Introspect};

/// A [`Database`] backed by `tokio-postgres` via `deadpool-postgres`.
pub struct PostgresDatabase {
    pool: Pool,
    tx: Mutex<Option<Object>>,
}

impl PostgresDatabase {
    /// Connect using a `postgres://` URL.
    pub fn connect(url: &str) -> DbResult<Self> {
        let config = tokio_postgres::Config::from_str(url)
            .map_err(|e| DbError::connection(e.to_string()))?;
        let manager = Manager::new(config, NoTls);
        let pool = Pool::builder(manager)
            .max_size(4)
            .build()
            .map_err(|e| DbError::connection(e.to_string()))?;
        Ok(Self {
            pool,
            tx: Mutex::new(None),
        })
    }

    async fn checkout(&self) -> DbResult<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| DbError::connection(e.to_string()))
    }
}

fn to_pg_params(params: &[Value]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    params
        .iter()
        .map(|value| -> Box<dyn ToSql + Sync + Send> {
            match value {
                Value::Null => Box::new(Option::<String>::None),
                Value::Bool(b) => Box::new(*b),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Box::new(i)
                    } else {
                        Box::new(n.as_f64().unwrap_or(0.0))
                    }
                }
                Value::String(s) => Box::new(s.clone()),
                other => Box::new(other.to_string()),
            }
        })
        .collect()
}

fn row_to_json(row: &tokio_postgres::Row) -> Value {
    let mut map = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_().name() {
            "int2" => row.try_get::<_, Option<i16>>(i).ok().flatten().map(Value::from),
            "int4" => row.try_get::<_, Option<i32>>(i).ok().flatten().map(Value::from),
            "int8" => row.try_get::<_, Option<i64>>(i).ok().flatten().map(Value::from),
            "float4" => row.try_get::<_, Option<f32>>(i).ok().flatten().map(Value::from),
            "float8" => row.try_get::<_, Option<f64>>(i).ok().flatten().map(Value::from),
            "bool" => row.try_get::<_, Option<bool>>(i).ok().flatten().map(Value::from),
            "timestamp" | "timestamptz" => row
                .try_get::<_, Option<chrono::NaiveDateTime>>(i)
                .ok()
                .flatten()
                .map(|ts| Value::String(ts.to_string())),
            _ => row
                .try_get::<_, Option<String>>(i)
                .ok()
                .flatten()
                .map(Value::String),
        };
        map.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    Value::Object(map)
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn query(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Value>> {
        debug!(sql = %sql, "postgres query");
        let boxed = to_pg_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> =
            boxed.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

        let tx = self.tx.lock().await;
        let rows = if let Some(client) = tx.as_ref() {
            client.query(sql, &refs).await
        } else {
            self.checkout().await?.query(sql, &refs).await
        }
        .map_err(|e| DbError::query(e.to_string()))?;

        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> DbResult<u64> {
        debug!(sql = %sql, "postgres execute");
        let boxed = to_pg_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> =
            boxed.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

        let tx = self.tx.lock().await;
        let affected = if let Some(client) = tx.as_ref() {
            client.execute(sql, &refs).await
        } else {
            self.checkout().await?.execute(sql, &refs).await
        }
        .map_err(|e| DbError::query(e.to_string()))?;

        Ok(affected)
    }

    async fn exec(&self, sql: &str) -> DbResult<()> {
        debug!(len = sql.len(), "postgres script");
        let tx = self.tx.lock().await;
        if let Some(client) = tx.as_ref() {
            client.batch_execute(sql).await
        } else {
            self.checkout().await?.batch_execute(sql).await
        }
        .map_err(|e| DbError::query(e.to_string()))
    }

    async fn begin(&self) -> DbResult<()> {
        let mut tx = self.tx.lock().await;
        if tx.is_some() {
            return Err(DbError::transaction("transaction already open"));
        }
        let client = self.checkout().await?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| DbError::transaction(e.to_string()))?;
        *tx = Some(client);
        Ok(())
    }

    async fn commit(&self) -> DbResult<()> {
        let mut tx = self.tx.lock().await;
        let client = tx
            .take()
            .ok_or_else(|| DbError::transaction("no open transaction"))?;
        client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| DbError::transaction(e.to_string()))
    }

    async fn rollback(&self) -> DbResult<()> {
        let mut tx = self.tx.lock().await;
        let client = tx
            .take()
            .ok_or_else(|| DbError::transaction("no open transaction"))?;
        client
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| DbError::transaction(e.to_string()))
    }
}

#[async_trait]
impl Introspect for PostgresDatabase {
    async fn table_exists(&self, table: &str) -> bool {
        self.query(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_name = $1",
            &[Value::String(table.to_string())],
        )
        .await
        .map(|rows| !rows.is_empty())
        .unwrap_or(false)
    }

    async fn column_exists(&self, table: &str, column: &str) -> bool {
        self.query(
            "SELECT 1 FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 AND column_name = $2",
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
impl Catalog for PostgresDatabase {
    async fn tables(&self) -> DbResult<Vec<String>> {
        let rows = self
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
                 AND table_name <> '_sqlbuns_migrations' ORDER BY table_name",
                &[],
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("table_name").and_then(Value::as_str))
            .map(String::from)
            .collect())
    }

    async fn columns(&self, table: &str) -> DbResult<Vec<ColumnDesc>> {
        let rows = self
            .query(
                "SELECT c.column_name, c.data_type, c.is_nullable, c.column_default, \
                 EXISTS (SELECT 1 FROM information_schema.key_column_usage k \
                   JOIN information_schema.table_constraints tc \
                     ON tc.constraint_name = k.constraint_name \
                   WHERE tc.constraint_type = 'PRIMARY KEY' \
                     AND k.table_name = c.table_name \
                     AND k.column_name = c.column_name) AS is_pk \
                 FROM information_schema.columns c \
                 WHERE c.table_schema = 'public' AND c.table_name = $1 \
                 ORDER BY c.ordinal_position",
                &[Value::String(table.to_string())],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| ColumnDesc {
                name: row
                    .get("column_name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                data_type: row
                    .get("data_type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_lowercase(),
                nullable: row.get("is_nullable").and_then(Value::as_str) == Some("YES"),
                default: row
                    .get("column_default")
                    .and_then(Value::as_str)
                    .map(String::from),
                primary_key: row.get("is_pk").and_then(Value::as_bool).unwrap_or(false),
            })
            .collect())
    }
}
