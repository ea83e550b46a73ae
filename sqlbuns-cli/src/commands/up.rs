//! `sqlbuns up` - apply the next pending migration.

use sqlbuns_migrate::{MigrationConfig, MigrationEngine};

use crate::commands;
use crate::config::ProjectConfig;
use crate::error::CliResult;
use crate::output::{self, PromptOracle};

pub async fn run() -> CliResult<()> {
    output::header("Migrate Up");

    let root = std::env::current_dir()?;
    let config = ProjectConfig::resolve(&root)?;
    let db = commands::connect(&config, &root).await?;

    let engine = MigrationEngine::new(
        MigrationConfig::new(config.dialect).migrations_dir(&config.migrations_dir),
        db.as_ref(),
        db.as_ref(),
        &PromptOracle,
    );

    match engine.up().await? {
        Some(name) => {
            output::success(&format!("Applied '{name}'"));
        }
        None => {
            output::info("No pending migrations.");
        }
    }

    let status = engine.status().await?;
    output::newline();
    output::kv("Applied", &status.applied.len().to_string());
    output::kv("Pending", &status.pending.len().to_string());
    if !status.pending.is_empty() {
        output::list_item("Run `sqlbuns up` again to apply the next migration");
    }

    Ok(())
}
