//! The database-resident migration history.
//!
//! Every applied migration leaves a row in `_sqlbuns_migrations`, written in
//! the same transaction as the DDL it records. The checksum column chains the
//! snapshot state each migration was created against, which is what drift
//! detection compares.

use serde_json::Value;

use sqlbuns_db::Database;

use crate::dialect::Dialect;
use crate::error::{MigrateResult, MigrationError};

/// Name of the history table.
pub const HISTORY_TABLE: &str = "_sqlbuns_migrations";

/// Direction of a recorded migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// The value stored in the `direction` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// A row of the history table.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub name: String,
    pub checksum: String,
    pub previous_checksum: Option<String>,
    pub direction: Direction,
    pub rolled_back: bool,
}

impl HistoryRow {
    fn from_value(row: &Value) -> MigrateResult<Self> {
        let get_str = |key: &str| row.get(key).and_then(Value::as_str).map(String::from);

        let name = get_str("name")
            .ok_or_else(|| MigrationError::invalid_migration("history row without a name"))?;
        let checksum = get_str("checksum").unwrap_or_default();
        let direction = match get_str("direction").as_deref() {
            Some("down") => Direction::Down,
            _ => Direction::Up,
        };
        // SQLite stores booleans as 0/1 integers.
        let rolled_back = match row.get("rolled_back") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
            _ => false,
        };

        Ok(Self {
            name,
            checksum,
            previous_checksum: get_str("previous_checksum"),
            direction,
            rolled_back,
        })
    }
}

/// Accessor for the history table.
pub struct HistoryStore<'a> {
    db: &'a dyn Database,
    dialect: Dialect,
}

impl<'a> HistoryStore<'a> {
    /// Create a store over a database handle.
    pub fn new(db: &'a dyn Database, dialect: Dialect) -> Self {
        Self { db, dialect }
    }

    fn false_literal(&self) -> &'static str {
        match self.dialect {
            Dialect::Sqlite => "0",
            _ => "FALSE",
        }
    }

    fn true_literal(&self) -> &'static str {
        match self.dialect {
            Dialect::Sqlite => "1",
            _ => "TRUE",
        }
    }

    /// Create the history table on first contact.
    pub async fn ensure(&self) -> MigrateResult<()> {
        for statement in self.dialect.history_ddl() {
            self.db.exec(&statement).await?;
        }
        Ok(())
    }

    /// Rows recorded as applied: `direction = 'up' AND rolled_back = false`,
    /// oldest first.
    pub async fn applied(&self) -> MigrateResult<Vec<HistoryRow>> {
        let sql = format!(
            "SELECT name, checksum, previous_checksum, direction, rolled_back \
             FROM {HISTORY_TABLE} WHERE direction = 'up' AND rolled_back = {} ORDER BY id",
            self.false_literal()
        );
        let rows = self.db.query(&sql, &[]).await?;
        rows.iter().map(HistoryRow::from_value).collect()
    }

    /// The most recently applied row, if any.
    pub async fn latest_applied(&self) -> MigrateResult<Option<HistoryRow>> {
        let sql = format!(
            "SELECT name, checksum, previous_checksum, direction, rolled_back \
             FROM {HISTORY_TABLE} WHERE direction = 'up' AND rolled_back = {} \
             ORDER BY id DESC LIMIT 1",
            self.false_literal()
        );
        let rows = self.db.query(&sql, &[]).await?;
        rows.first().map(HistoryRow::from_value).transpose()
    }

    /// Record a migration as applied, on the caller's open transaction.
    ///
    /// `name` is unique: re-applying a rolled-back migration revives its
    /// existing row instead of inserting a duplicate.
    pub async fn insert_applied(
        &self,
        name: &str,
        checksum: &str,
        previous_checksum: Option<&str>,
    ) -> MigrateResult<()> {
        let insert = format!(
            "INSERT INTO {HISTORY_TABLE} (name, checksum, previous_checksum, direction, rolled_back) \
             VALUES ({}, {}, {}, 'up', {})",
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
            self.dialect.placeholder(3),
            self.false_literal()
        );
        let sql = match self.dialect {
            Dialect::Postgres | Dialect::Sqlite => format!(
                "{insert} ON CONFLICT (name) DO UPDATE SET \
                 checksum = EXCLUDED.checksum, previous_checksum = EXCLUDED.previous_checksum, \
                 direction = 'up', applied_at = CURRENT_TIMESTAMP, \
                 rolled_back = {}, rolled_back_at = NULL",
                self.false_literal()
            ),
            Dialect::MySql => format!(
                "{insert} ON DUPLICATE KEY UPDATE \
                 checksum = VALUES(checksum), previous_checksum = VALUES(previous_checksum), \
                 direction = 'up', applied_at = CURRENT_TIMESTAMP, \
                 rolled_back = FALSE, rolled_back_at = NULL"
            ),
        };
        let params = [
            Value::String(name.to_string()),
            Value::String(checksum.to_string()),
            previous_checksum
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Null),
        ];
        self.db.execute(&sql, &params).await?;
        Ok(())
    }

    /// Mark a row rolled back. Runs on the caller's open transaction.
    pub async fn mark_rolled_back(&self, name: &str) -> MigrateResult<()> {
        let sql = format!(
            "UPDATE {HISTORY_TABLE} SET rolled_back = {}, rolled_back_at = CURRENT_TIMESTAMP \
             WHERE name = {}",
            self.true_literal(),
            self.dialect.placeholder(1)
        );
        self.db
            .execute(&sql, &[Value::String(name.to_string())])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_parsing_sqlite_booleans() {
        let row = HistoryRow::from_value(&json!({
            "name": "1700_add_users",
            "checksum": "abc",
            "previous_checksum": null,
            "direction": "up",
            "rolled_back": 0,
        }))
        .unwrap();
        assert!(!row.rolled_back);
        assert_eq!(row.direction, Direction::Up);
        assert_eq!(row.previous_checksum, None);

        let row = HistoryRow::from_value(&json!({
            "name": "1700_add_users",
            "checksum": "abc",
            "rolled_back": true,
            "direction": "down",
        }))
        .unwrap();
        assert!(row.rolled_back);
        assert_eq!(row.direction, Direction::Down);
    }

    #[test]
    fn test_row_without_name_is_invalid() {
        assert!(HistoryRow::from_value(&json!({ "checksum": "abc" })).is_err());
    }

    #[tokio::test]
    async fn test_insert_uses_dialect_placeholders() {
        let db = sqlbuns_db::memory::MemoryDatabase::new();
        let store = HistoryStore::new(&db, Dialect::Postgres);
        store
            .insert_applied("1700_x", "abc", Some("prev"))
            .await
            .unwrap();

        let log = db.log();
        assert!(log[0].contains("$1"));
        assert!(log[0].contains("'up'"));
        assert!(log[0].contains("ON CONFLICT (name) DO UPDATE"));

        let db = sqlbuns_db::memory::MemoryDatabase::new();
        let store = HistoryStore::new(&db, Dialect::MySql);
        store.insert_applied("1700_x", "abc", None).await.unwrap();
        assert!(db.log()[0].contains("?"));
        assert!(db.log()[0].contains("ON DUPLICATE KEY UPDATE"));
    }
}
