//! Command implementations.

pub mod create;
pub mod down;
pub mod inspectdb;
pub mod up;

use std::path::Path;

use sqlbuns_db::Backend;
use sqlbuns_migrate::Dialect;

use crate::config::ProjectConfig;
use crate::error::CliResult;

/// Open the configured database.
pub(crate) async fn connect(config: &ProjectConfig, root: &Path) -> CliResult<Box<dyn Backend>> {
    Ok(match config.dialect {
        Dialect::Postgres => Box::new(sqlbuns_db::postgres::PostgresDatabase::connect(
            config.require_url()?,
        )?),
        Dialect::MySql => Box::new(sqlbuns_db::mysql::MySqlDatabase::connect(
            config.require_url()?,
        )?),
        Dialect::Sqlite => {
            let path = config.sqlite_path(root);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Box::new(sqlbuns_db::sqlite::SqliteDatabase::connect(&path.to_string_lossy()).await?)
        }
    })
}
