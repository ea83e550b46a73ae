//! `sqlbuns down` (alias `rollback`) - revert the latest applied migration.

use sqlbuns_migrate::{MigrationConfig, MigrationEngine};

use crate::commands;
use crate::config::ProjectConfig;
use crate::error::CliResult;
use crate::output::{self, PromptOracle};

pub async fn run() -> CliResult<()> {
    output::header("Migrate Down");

    let root = std::env::current_dir()?;
    let config = ProjectConfig::resolve(&root)?;
    let db = commands::connect(&config, &root).await?;

    let engine = MigrationEngine::new(
        MigrationConfig::new(config.dialect).migrations_dir(&config.migrations_dir),
        db.as_ref(),
        db.as_ref(),
        &PromptOracle,
    );

    match engine.down().await? {
        Some(name) => {
            output::success(&format!("Rolled back '{name}'"));
        }
        None => {
            output::info("Nothing to roll back.");
        }
    }

    Ok(())
}
