//! `sqlbuns create <name>` - generate a migration from the current models.

use sqlbuns_migrate::{MigrationConfig, MigrationEngine, MigrationError};

use crate::cli::CreateArgs;
use crate::config::ProjectConfig;
use crate::error::CliResult;
use crate::output::{self, PromptOracle};
use crate::{commands, loader};

pub async fn run(args: CreateArgs) -> CliResult<()> {
    output::header("Create Migration");

    let root = std::env::current_dir()?;
    let config = ProjectConfig::resolve(&root)?;

    output::kv("Engine", config.dialect.as_str());
    output::kv("Models", &config.models_path.display().to_string());
    output::kv("Migrations", &config.migrations_dir.display().to_string());
    output::newline();

    output::step(1, 3, "Loading models...");
    let schema = loader::load_models(&config.models_path)?;

    output::step(2, 3, "Connecting...");
    let db = commands::connect(&config, &root).await?;

    output::step(3, 3, "Diffing against the last snapshot...");
    let engine = MigrationEngine::new(
        MigrationConfig::new(config.dialect).migrations_dir(&config.migrations_dir),
        db.as_ref(),
        db.as_ref(),
        &PromptOracle,
    );

    match engine.create(&args.name, &schema).await {
        Ok(outcome) => {
            output::newline();
            output::warnings(&outcome.warnings);
            output::success(&format!("Migration '{}' created", outcome.stem));
            output::list_item(&outcome.path.display().to_string());
            output::newline();
            output::list_item("Review the generated SQL, then run `sqlbuns up`");
            Ok(())
        }
        Err(MigrationError::NoChanges) => {
            output::newline();
            output::info("No changes - the schema matches the last snapshot.");
            Ok(())
        }
        Err(MigrationError::SchemaDrift {
            expected,
            actual,
            pending_diff,
        }) => {
            output::newline();
            output::warn("The database history does not match the local snapshot.");
            output::kv("History checksum", &expected);
            output::kv("Local checksum", &actual);
            if !pending_diff.is_empty() {
                output::newline();
                output::warn("Reconstructed diff:");
                for statement in &pending_diff {
                    output::list_item(statement);
                }
            }
            Err(MigrationError::SchemaDrift {
                expected,
                actual,
                pending_diff,
            }
            .into())
        }
        Err(other) => Err(other.into()),
    }
}
