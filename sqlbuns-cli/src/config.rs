//! Project configuration resolution.
//!
//! The CLI is the only place the process environment is read: the dialect
//! comes from `DATABASE_ENGINE`, connection parameters from `DATABASE_URL`,
//! and the models path from `package.json`'s `sqlBuns.modelsPath` when
//! present. Everything below the CLI receives explicit values.

use std::path::{Path, PathBuf};

use serde_json::Value;

use sqlbuns_migrate::{Dialect, MigrationError};

use crate::error::{CliError, CliResult};

/// Default models file relative to the project root.
pub const DEFAULT_MODELS_PATH: &str = "database/models/index.json";

/// Default migrations directory relative to the project root.
pub const MIGRATIONS_DIR: &str = "database/migrations";

/// Default SQLite database file, used when `DATABASE_URL` is unset.
pub const DEFAULT_SQLITE_PATH: &str = "database/app.db";

/// Resolved project configuration.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// The target dialect, from `DATABASE_ENGINE`.
    pub dialect: Dialect,
    /// Connection URL (or SQLite file path), from `DATABASE_URL`.
    pub database_url: Option<String>,
    /// Path of the model definition file.
    pub models_path: PathBuf,
    /// The migrations directory.
    pub migrations_dir: PathBuf,
}

impl ProjectConfig {
    /// Resolve configuration from the environment and the project root.
    pub fn resolve(root: &Path) -> CliResult<Self> {
        let engine = std::env::var("DATABASE_ENGINE")
            .map_err(|_| MigrationError::DialectUnsupported("(unset)".to_string()))?;
        let dialect = Dialect::from_engine(&engine)?;

        let models_path = models_path_from_package_json(root)
            .unwrap_or_else(|| root.join(DEFAULT_MODELS_PATH));

        Ok(Self {
            dialect,
            database_url: std::env::var("DATABASE_URL").ok(),
            models_path,
            migrations_dir: root.join(MIGRATIONS_DIR),
        })
    }

    /// The connection URL, required for server dialects.
    pub fn require_url(&self) -> CliResult<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| CliError::config("DATABASE_URL must be set for this engine"))
    }

    /// The SQLite file path: `DATABASE_URL` or the conventional default.
    pub fn sqlite_path(&self, root: &Path) -> PathBuf {
        match &self.database_url {
            Some(url) => PathBuf::from(url.strip_prefix("sqlite://").unwrap_or(url)),
            None => root.join(DEFAULT_SQLITE_PATH),
        }
    }
}

/// Read `sqlBuns.modelsPath` from `package.json`, if the file and key exist.
fn models_path_from_package_json(root: &Path) -> Option<PathBuf> {
    let raw = std::fs::read_to_string(root.join("package.json")).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed
        .get("sqlBuns")
        .and_then(|section| section.get("modelsPath"))
        .and_then(Value::as_str)
        .map(|p| root.join(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_models_path_from_package_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "app", "sqlBuns": { "modelsPath": "src/models.json" } }"#,
        )
        .unwrap();

        let path = models_path_from_package_json(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("src/models.json"));
    }

    #[test]
    fn test_missing_package_json_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        assert!(models_path_from_package_json(dir.path()).is_none());
    }

    #[test]
    fn test_sqlite_path_strips_scheme() {
        let config = ProjectConfig {
            dialect: Dialect::Sqlite,
            database_url: Some("sqlite://data/dev.db".to_string()),
            models_path: PathBuf::new(),
            migrations_dir: PathBuf::new(),
        };
        assert_eq!(
            config.sqlite_path(Path::new(".")),
            PathBuf::from("data/dev.db")
        );
    }
}
