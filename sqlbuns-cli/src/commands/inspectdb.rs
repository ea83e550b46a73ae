//! `sqlbuns inspectdb` - bootstrap models and a baseline from a live database.
//!
//! Reads the catalog, writes a model definition file mirroring what exists,
//! records the snapshot, and inserts a baseline history row so the next
//! `create` diffs against reality instead of an empty schema.

use serde_json::{json, Map, Value};

use sqlbuns_db::ColumnDesc;
use sqlbuns_migrate::{schema_checksum, HistoryStore, SnapshotStore};

use crate::cli::InspectArgs;
use crate::commands;
use crate::config::ProjectConfig;
use crate::error::{CliError, CliResult};
use crate::{loader, output};

pub async fn run(args: InspectArgs) -> CliResult<()> {
    output::header("Inspect Database");

    let root = std::env::current_dir()?;
    let config = ProjectConfig::resolve(&root)?;

    if config.models_path.exists() && !args.force {
        return Err(CliError::config(format!(
            "{} already exists; pass --force to overwrite",
            config.models_path.display()
        )));
    }

    output::step(1, 3, "Reading the database catalog...");
    let db = commands::connect(&config, &root).await?;
    let tables = db.tables().await?;
    if tables.is_empty() {
        output::info("The database has no tables; nothing to bootstrap.");
        return Ok(());
    }

    let mut models = Map::new();
    for table in &tables {
        let columns = db.columns(table).await?;
        models.insert(table.clone(), model_definition(&columns));
        output::list_item(&format!("{table} ({} columns)", columns.len()));
    }

    output::step(2, 3, "Writing model definitions...");
    if let Some(parent) = config.models_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut rendered = serde_json::to_string_pretty(&Value::Object(models))?;
    rendered.push('\n');
    std::fs::write(&config.models_path, rendered)?;

    output::step(3, 3, "Recording the baseline...");
    let schema = loader::load_models(&config.models_path)?;
    let view = schema.view();

    let store = SnapshotStore::new(&config.migrations_dir);
    store.write_snapshot(&view).await?;

    let history = HistoryStore::new(db.as_ref(), config.dialect);
    history.ensure().await?;
    let checksum = schema_checksum(&view)?;
    let stem = store.make_stem("baseline");
    history.insert_applied(&stem, &checksum, None).await?;

    output::newline();
    output::success(&format!(
        "Bootstrapped {} models into {}",
        tables.len(),
        config.models_path.display()
    ));
    output::list_item("Adjust the generated definitions, then use `sqlbuns create`");

    Ok(())
}

/// Render one table's columns as a model definition.
fn model_definition(columns: &[ColumnDesc]) -> Value {
    let mut fields = Map::new();
    for column in columns {
        let mut def = Map::new();
        def.insert("type".to_string(), json!(field_type(&column.data_type)));
        if column.nullable {
            def.insert("nullable".to_string(), json!(true));
        }
        if column.primary_key {
            def.insert("primary_key".to_string(), json!(true));
        }
        if let Some(default) = &column.default {
            // Serial/identity defaults are auto-increment, not literals.
            if default.contains("nextval") {
                def.insert("auto_increment".to_string(), json!(true));
            } else {
                def.insert("default".to_string(), json!(normalize_default(default)));
            }
        }
        fields.insert(column.name.clone(), Value::Object(def));
    }
    json!({ "fields": fields })
}

/// Map a catalog type name onto a sqlbuns field type.
fn field_type(data_type: &str) -> &'static str {
    let t = data_type.to_lowercase();
    if t.contains("int") {
        "integer"
    } else if t.contains("char") {
        "varchar"
    } else if t.contains("bool") {
        "boolean"
    } else if t.contains("timestamp") || t.contains("datetime") {
        "datetime"
    } else if t == "date" {
        "date"
    } else if t.contains("decimal") || t.contains("numeric") {
        "decimal"
    } else if t.contains("float") || t.contains("double") || t == "real" {
        "float"
    } else if t.contains("blob") || t == "bytea" {
        "blob"
    } else if t == "uuid" {
        "uuid"
    } else if t.contains("json") {
        "json"
    } else if t == "xml" {
        "xml"
    } else {
        "text"
    }
}

/// Strip the quoting and casts catalogs wrap defaults in.
fn normalize_default(default: &str) -> String {
    let trimmed = default.split("::").next().unwrap_or(default).trim();
    trimmed.trim_matches('\'').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_mapping() {
        assert_eq!(field_type("INTEGER"), "integer");
        assert_eq!(field_type("character varying"), "varchar");
        assert_eq!(field_type("tinyint(1)"), "integer");
        assert_eq!(field_type("timestamp with time zone"), "datetime");
        assert_eq!(field_type("numeric"), "decimal");
        assert_eq!(field_type("bytea"), "blob");
        assert_eq!(field_type("something_else"), "text");
    }

    #[test]
    fn test_normalize_default() {
        assert_eq!(normalize_default("'A'::text"), "A");
        assert_eq!(normalize_default("0"), "0");
        assert_eq!(normalize_default("CURRENT_TIMESTAMP"), "CURRENT_TIMESTAMP");
    }

    #[test]
    fn test_model_definition_shape() {
        let columns = [
            ColumnDesc {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                nullable: false,
                default: Some("nextval('users_id_seq')".to_string()),
                primary_key: true,
            },
            ColumnDesc {
                name: "email".to_string(),
                data_type: "character varying".to_string(),
                nullable: true,
                default: None,
                primary_key: false,
            },
        ];

        let def = model_definition(&columns);
        assert_eq!(def["fields"]["id"]["auto_increment"], json!(true));
        assert_eq!(def["fields"]["id"]["primary_key"], json!(true));
        assert_eq!(def["fields"]["email"]["type"], json!("varchar"));
        assert_eq!(def["fields"]["email"]["nullable"], json!(true));
    }
}
