//! Dialect adapters: the per-engine SQL generation primitives.
//!
//! Everything dialect-specific lives here (identifier quoting,
//! auto-increment forms, default rendering, enum representation, trigger
//! emission, the history-table DDL) so the differ and lifecycle stay
//! dialect-independent. The dialect is passed explicitly at construction;
//! nothing in this crate reads the process environment.

use serde_json::Value;
use sha1::{Digest, Sha1};

use sqlbuns_schema::{FieldKind, FieldView, TriggerEvent, TriggerTiming};

use crate::error::{MigrateResult, MigrationError};

/// The supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Resolve a `DATABASE_ENGINE` value, case-insensitively.
    pub fn from_engine(engine: &str) -> MigrateResult<Self> {
        match engine.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(MigrationError::DialectUnsupported(other.to_string())),
        }
    }

    /// The canonical engine name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Quote an identifier.
    ///
    /// Postgres and MySQL always double-quote; SQLite leaves safe identifiers
    /// bare and quotes the rest.
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Self::Postgres | Self::MySql => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::Sqlite => {
                if is_safe_ident(ident) {
                    ident.to_string()
                } else {
                    format!("\"{}\"", ident.replace('"', "\"\""))
                }
            }
        }
    }

    /// The positional bind placeholder for parameter `n` (1-based).
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${n}"),
            Self::MySql | Self::Sqlite => "?".to_string(),
        }
    }

    /// Render a default value for a DEFAULT clause.
    ///
    /// Strings are single-quoted with `'` doubled, unless they are recognized
    /// SQL tokens (`CURRENT_TIMESTAMP`, `gen_random_uuid()`, ...), which pass
    /// through unquoted.
    pub fn render_default(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => match self {
                Self::Sqlite => if *b { "1" } else { "0" }.to_string(),
                _ => if *b { "TRUE" } else { "FALSE" }.to_string(),
            },
            Value::Number(n) => n.to_string(),
            Value::String(s) => {
                if is_sql_token(s) {
                    s.clone()
                } else {
                    quote_string(s)
                }
            }
            other => quote_string(&other.to_string()),
        }
    }

    /// The SQL type of a column, including the enum representation.
    ///
    /// `table` and `column` feed the SQLite CHECK clause and the Postgres
    /// enum type name; the CHECK clause uses the column's final name, so
    /// callers must pass the post-rename name.
    pub fn column_type(&self, kind: &FieldKind, table: &str, column: &str) -> String {
        match kind {
            FieldKind::Integer => "INTEGER".to_string(),
            FieldKind::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
            FieldKind::Float => match self {
                Self::Postgres => "DOUBLE PRECISION".to_string(),
                Self::MySql => "DOUBLE".to_string(),
                Self::Sqlite => "REAL".to_string(),
            },
            FieldKind::Varchar { max_length } => match max_length {
                Some(len) => format!("VARCHAR({len})"),
                None => "VARCHAR".to_string(),
            },
            FieldKind::Text => "TEXT".to_string(),
            FieldKind::Enum { choices, type_name } => match self {
                Self::Postgres => type_name
                    .clone()
                    .unwrap_or_else(|| enum_type_name(table, column, choices)),
                Self::MySql => format!("ENUM({})", quote_choices(choices)),
                Self::Sqlite => {
                    format!("TEXT CHECK({} IN ({}))", column, quote_choices(choices))
                }
            },
            FieldKind::Date => "DATE".to_string(),
            FieldKind::DateTime => match self {
                Self::Postgres => "TIMESTAMP".to_string(),
                Self::MySql | Self::Sqlite => "DATETIME".to_string(),
            },
            FieldKind::Blob => match self {
                Self::Postgres => "BYTEA".to_string(),
                Self::MySql | Self::Sqlite => "BLOB".to_string(),
            },
            FieldKind::Boolean => "BOOLEAN".to_string(),
            FieldKind::Uuid => match self {
                Self::Postgres => "UUID".to_string(),
                Self::MySql => "CHAR(36)".to_string(),
                Self::Sqlite => "TEXT".to_string(),
            },
            FieldKind::Json => match self {
                Self::Postgres => "JSONB".to_string(),
                Self::MySql => "JSON".to_string(),
                Self::Sqlite => "TEXT".to_string(),
            },
            FieldKind::Xml => match self {
                Self::Postgres => "XML".to_string(),
                Self::MySql | Self::Sqlite => "TEXT".to_string(),
            },
        }
    }

    /// The `CREATE TYPE` statement a Postgres enum column needs, if any.
    pub fn enum_prelude(&self, kind: &FieldKind, table: &str, column: &str) -> Option<String> {
        if *self != Self::Postgres {
            return None;
        }
        let FieldKind::Enum { choices, type_name } = kind else {
            return None;
        };
        let name = type_name
            .clone()
            .unwrap_or_else(|| enum_type_name(table, column, choices));
        Some(format!(
            "CREATE TYPE {} AS ENUM ({});",
            name,
            quote_choices(choices)
        ))
    }

    /// Render a full column definition for CREATE TABLE / ADD COLUMN.
    ///
    /// `inline_pk` marks the single-column auto-increment form that carries
    /// `PRIMARY KEY` inline; composite keys get a table-level clause instead.
    pub fn column_def(
        &self,
        table: &str,
        column: &str,
        field: &FieldView,
        inline_pk: bool,
    ) -> String {
        let mut parts: Vec<String> = vec![column.to_string()];

        if field.auto_increment {
            match self {
                Self::Postgres => {
                    parts.push("SERIAL".to_string());
                    if inline_pk {
                        parts.push("PRIMARY KEY".to_string());
                    }
                }
                Self::MySql => {
                    parts.push(self.column_type(&field.kind, table, column));
                    parts.push("AUTO_INCREMENT".to_string());
                    if inline_pk {
                        parts.push("PRIMARY KEY".to_string());
                    }
                }
                Self::Sqlite => {
                    parts.push(self.column_type(&field.kind, table, column));
                    if inline_pk {
                        parts.push("PRIMARY KEY".to_string());
                    }
                    parts.push("AUTOINCREMENT".to_string());
                }
            }
        } else {
            parts.push(self.column_type(&field.kind, table, column));
            if inline_pk {
                parts.push("PRIMARY KEY".to_string());
            }
        }

        if field.unique && !field.primary_key {
            parts.push("UNIQUE".to_string());
        }
        if !field.nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(default) = &field.default {
            parts.push(format!("DEFAULT {}", self.render_default(default)));
        }

        parts.join(" ")
    }

    /// Whether `ALTER TABLE ... ALTER COLUMN` is expressible.
    pub fn supports_alter_column(&self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    /// Whether `ALTER TABLE ... ADD CONSTRAINT` is expressible.
    pub fn supports_add_constraint(&self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    /// Whether a column can be added in place. SQLite rejects constrained
    /// additions and routes them through a rebuild.
    pub fn supports_add_column(&self, field: &FieldView) -> bool {
        match self {
            Self::Sqlite => !field.unique && !field.primary_key && !field.auto_increment,
            _ => true,
        }
    }

    /// Whether a column can be dropped in place.
    pub fn supports_drop_column(&self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    /// The statements creating one trigger instance.
    ///
    /// Postgres needs a companion plpgsql function; MySQL and SQLite inline
    /// the body. The body is the canonical (snapshot) form; using one form
    /// for both storage and emission keeps trigger comparison drift-free.
    pub fn create_trigger(
        &self,
        table: &str,
        name: &str,
        timing: TriggerTiming,
        event: TriggerEvent,
        body: &str,
        when: Option<&str>,
    ) -> Vec<String> {
        let body = body.trim().trim_end_matches(';');
        let when_clause = when
            .map(strip_when)
            .filter(|w| !w.is_empty())
            .map(|w| format!(" WHEN ({w})"))
            .unwrap_or_default();

        match self {
            Self::Postgres => {
                let returns = match event {
                    TriggerEvent::Delete => "OLD",
                    _ => "NEW",
                };
                vec![
                    format!(
                        "CREATE OR REPLACE FUNCTION {name}_func() RETURNS trigger AS $$ \
                         BEGIN {body}; RETURN {returns}; END; $$ LANGUAGE plpgsql;"
                    ),
                    format!(
                        "CREATE TRIGGER {name} {} {} ON {table} FOR EACH ROW{when_clause} \
                         EXECUTE FUNCTION {name}_func();",
                        timing.as_sql(),
                        event.as_sql()
                    ),
                ]
            }
            Self::MySql | Self::Sqlite => vec![format!(
                "CREATE TRIGGER {name} {} {} ON {table} FOR EACH ROW{when_clause} BEGIN {body}; END;",
                timing.as_sql(),
                event.as_sql()
            )],
        }
    }

    /// The statements dropping one trigger instance (and, on Postgres, its
    /// companion function).
    pub fn drop_trigger(&self, table: &str, name: &str) -> Vec<String> {
        match self {
            Self::Postgres => vec![
                format!("DROP TRIGGER IF EXISTS {name} ON {table};"),
                format!("DROP FUNCTION IF EXISTS {name}_func();"),
            ],
            Self::MySql | Self::Sqlite => vec![format!("DROP TRIGGER IF EXISTS {name};")],
        }
    }

    /// Create an index. `if_not_exists` is honored where the dialect has the
    /// form (MySQL does not).
    pub fn create_index(
        &self,
        name: &str,
        table: &str,
        columns: &[&str],
        unique: bool,
        if_not_exists: bool,
    ) -> String {
        let unique = if unique { "UNIQUE " } else { "" };
        let guard = if if_not_exists && !matches!(self, Self::MySql) {
            "IF NOT EXISTS "
        } else {
            ""
        };
        format!(
            "CREATE {unique}INDEX {guard}{name} ON {table}({});",
            columns.join(", ")
        )
    }

    /// Drop a named constraint (MySQL spells foreign keys differently).
    pub fn drop_constraint(&self, table: &str, name: &str) -> String {
        match self {
            Self::MySql => format!("ALTER TABLE {table} DROP FOREIGN KEY {name};"),
            _ => format!("ALTER TABLE {table} DROP CONSTRAINT {name};"),
        }
    }

    /// Drop an index.
    pub fn drop_index(&self, name: &str, table: &str) -> String {
        match self {
            // MySQL has no IF EXISTS form and scopes index names per table.
            Self::MySql => format!("DROP INDEX {name} ON {table};"),
            _ => format!("DROP INDEX IF EXISTS {name};"),
        }
    }

    /// The DDL creating the migration history table.
    ///
    /// `name` is UNIQUE, which every supported engine backs with an index, so
    /// no separate name index is needed. Postgres gets an `applied_at` index
    /// for the latest-applied lookup.
    pub fn history_ddl(&self) -> Vec<String> {
        match self {
            Self::Postgres => vec![
                "CREATE TABLE IF NOT EXISTS _sqlbuns_migrations (\n    \
                 id SERIAL PRIMARY KEY,\n    \
                 name VARCHAR(255) NOT NULL UNIQUE,\n    \
                 checksum VARCHAR(64) NOT NULL,\n    \
                 previous_checksum VARCHAR(64),\n    \
                 direction VARCHAR(8) NOT NULL DEFAULT 'up' CHECK (direction IN ('up', 'down')),\n    \
                 applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,\n    \
                 rolled_back BOOLEAN NOT NULL DEFAULT FALSE,\n    \
                 rolled_back_at TIMESTAMP\n);"
                    .to_string(),
                "CREATE INDEX IF NOT EXISTS idx_sqlbuns_migrations_applied_at \
                 ON _sqlbuns_migrations (applied_at DESC);"
                    .to_string(),
            ],
            Self::MySql => vec![
                "CREATE TABLE IF NOT EXISTS _sqlbuns_migrations (\n    \
                 id INTEGER AUTO_INCREMENT PRIMARY KEY,\n    \
                 name VARCHAR(255) NOT NULL UNIQUE,\n    \
                 checksum VARCHAR(64) NOT NULL,\n    \
                 previous_checksum VARCHAR(64),\n    \
                 direction VARCHAR(8) NOT NULL DEFAULT 'up' CHECK (direction IN ('up', 'down')),\n    \
                 applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,\n    \
                 rolled_back BOOLEAN NOT NULL DEFAULT FALSE,\n    \
                 rolled_back_at DATETIME\n);"
                    .to_string(),
            ],
            Self::Sqlite => vec![
                "CREATE TABLE IF NOT EXISTS _sqlbuns_migrations (\n    \
                 id INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
                 name TEXT NOT NULL UNIQUE,\n    \
                 checksum TEXT NOT NULL,\n    \
                 previous_checksum TEXT,\n    \
                 direction TEXT NOT NULL DEFAULT 'up' CHECK (direction IN ('up', 'down')),\n    \
                 applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,\n    \
                 rolled_back INTEGER NOT NULL DEFAULT 0,\n    \
                 rolled_back_at DATETIME\n);"
                    .to_string(),
            ],
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_safe_ident(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Recognized SQL function tokens pass through DEFAULT clauses unquoted.
fn is_sql_token(s: &str) -> bool {
    const KEYWORDS: [&str; 3] = ["CURRENT_TIMESTAMP", "CURRENT_DATE", "CURRENT_TIME"];
    if KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(s)) {
        return true;
    }
    // Zero-argument function calls such as gen_random_uuid() or NOW().
    s.strip_suffix("()").is_some_and(is_safe_ident)
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn quote_choices(choices: &[String]) -> String {
    choices
        .iter()
        .map(|c| quote_string(c))
        .collect::<Vec<_>>()
        .join(",")
}

/// The auto-generated Postgres enum type name:
/// `enum_<table>_<column>_<8-hex>`, where the hex is the first 8 chars of
/// SHA-1 over `<table>_<column>:<choices-sorted-joined-by-pipe>`.
pub fn enum_type_name(table: &str, column: &str, choices: &[String]) -> String {
    let mut sorted: Vec<&str> = choices.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut hasher = Sha1::new();
    hasher.update(format!("{table}_{column}:{}", sorted.join("|")).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("enum_{table}_{column}_{}", &digest[..8])
}

/// Normalize a trigger WHEN predicate: strip a leading `WHEN` keyword
/// (case-insensitive) and trailing semicolons. The caller wraps the result in
/// parentheses.
pub fn strip_when(when: &str) -> String {
    let mut text = when.trim();
    if text.len() >= 4 && text[..4].eq_ignore_ascii_case("when") {
        let rest = &text[4..];
        if rest.starts_with([' ', '\t', '(']) || rest.is_empty() {
            text = rest.trim_start();
        }
    }
    text.trim_end_matches(';').trim().to_string()
}
