//! The model loader: declarative JSON definitions into a validated [`Schema`].
//!
//! The models file maps export keys to model definitions:
//!
//! ```json
//! {
//!   "users": {
//!     "fields": {
//!       "id": { "type": "integer", "primary_key": true, "auto_increment": true },
//!       "email": { "type": "varchar", "unique": true },
//!       "level": { "type": "enum", "choices": ["A", "B"], "default": "A" }
//!     },
//!     "relations": {
//!       "posts": { "kind": "hasMany", "target": "posts", "foreign_key": "user_id" }
//!     },
//!     "triggers": {
//!       "afterInsert": ["UPDATE stats SET users = users + 1"]
//!     },
//!     "meta": { "timestamps": true }
//!   }
//! }
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use sqlbuns_schema::{
    Field, FieldKind, Index, Model, ModelMeta, Relation, RelationKind, Schema, SchemaError,
    TriggerSlot, TriggerStatement,
};

use crate::error::{CliError, CliResult};

#[derive(Debug, Deserialize)]
struct ModelDef {
    fields: IndexMap<String, FieldDef>,
    #[serde(default)]
    relations: IndexMap<String, RelationDef>,
    #[serde(default)]
    triggers: IndexMap<String, Vec<StatementDef>>,
    #[serde(default)]
    meta: MetaDef,
}

#[derive(Debug, Deserialize)]
struct FieldDef {
    #[serde(rename = "type")]
    kind: String,
    precision: Option<u8>,
    scale: Option<u8>,
    max_length: Option<u32>,
    choices: Option<Vec<String>>,
    type_name: Option<String>,
    #[serde(default)]
    nullable: bool,
    default: Option<Value>,
    #[serde(default)]
    unique: bool,
    #[serde(default)]
    primary_key: bool,
    #[serde(default)]
    auto_increment: bool,
    comment: Option<String>,
    help_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelationDef {
    kind: String,
    target: String,
    foreign_key: String,
    other_key: Option<String>,
    through: Option<String>,
}

/// A trigger statement: a raw body string, or a body with a row predicate.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatementDef {
    Body(String),
    Guarded { body: String, when: Option<String> },
}

#[derive(Debug, Default, Deserialize)]
struct MetaDef {
    table_name: Option<String>,
    #[serde(default)]
    indexes: Vec<IndexDef>,
    comment: Option<String>,
    #[serde(default)]
    timestamps: bool,
}

#[derive(Debug, Deserialize)]
struct IndexDef {
    fields: Vec<String>,
    #[serde(default)]
    unique: bool,
    name: Option<String>,
}

/// Load and validate the models file.
pub fn load_models(path: &Path) -> CliResult<Schema> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        CliError::models(format!("cannot read models file {}: {e}", path.display()))
    })?;
    let defs: IndexMap<String, ModelDef> = serde_json::from_str(&raw)
        .map_err(|e| CliError::models(format!("invalid models file: {e}")))?;

    let mut models = Vec::with_capacity(defs.len());
    for (key, def) in defs {
        models.push((key.clone(), build_model(&key, def)?));
    }
    Ok(Schema::from_models(models)?)
}

fn build_model(key: &str, def: ModelDef) -> CliResult<Model> {
    let mut model = Model::new(key);

    for (name, field_def) in def.fields {
        let field = build_field(key, &name, field_def)?;
        model = model.field(name, field);
    }

    for (name, rel) in def.relations {
        let kind = RelationKind::parse(&rel.kind)?;
        let mut relation = Relation {
            kind,
            target: rel.target.into(),
            foreign_key: rel.foreign_key.into(),
            other_key: rel.other_key.map(Into::into),
            through: None,
        };
        if let Some(through) = rel.through {
            relation = relation.with_through(through);
        }
        model = model.relation(name, relation);
    }

    for (slot_name, statements) in def.triggers {
        let slot = TriggerSlot::parse(&slot_name)?;
        let statements = statements
            .into_iter()
            .map(|s| match s {
                StatementDef::Body(body) => TriggerStatement::new(body),
                StatementDef::Guarded { body, when } => TriggerStatement { body, when },
            })
            .collect();
        model = model.trigger(slot, statements);
    }

    model = model.meta(ModelMeta {
        table_name: def.meta.table_name.map(Into::into),
        indexes: def
            .meta
            .indexes
            .into_iter()
            .map(|i| {
                let mut index = Index::new(i.fields);
                index.unique = i.unique;
                index.name = i.name.map(Into::into);
                index
            })
            .collect(),
        comment: def.meta.comment,
        timestamps: def.meta.timestamps,
    });

    Ok(model)
}

fn build_field(model: &str, name: &str, def: FieldDef) -> CliResult<Field> {
    let label = format!("{model}.{name}");
    let kind = match def.kind.as_str() {
        "integer" => FieldKind::Integer,
        "decimal" => FieldKind::Decimal {
            precision: def.precision.unwrap_or(10),
            scale: def.scale.unwrap_or(2),
        },
        "float" => FieldKind::Float,
        "varchar" => FieldKind::Varchar {
            max_length: def.max_length,
        },
        "text" => FieldKind::Text,
        "enum" => FieldKind::Enum {
            choices: def
                .choices
                .ok_or_else(|| SchemaError::invalid_field(&label, "enum requires choices"))?,
            type_name: def.type_name,
        },
        "date" => FieldKind::Date,
        "datetime" => FieldKind::DateTime,
        "blob" => FieldKind::Blob,
        "boolean" => FieldKind::Boolean,
        "uuid" => FieldKind::Uuid,
        "json" => FieldKind::Json,
        "xml" => FieldKind::Xml,
        other => {
            return Err(
                SchemaError::invalid_field(&label, format!("unknown field type `{other}`")).into(),
            );
        }
    };

    let mut field = Field::new(kind);
    if def.nullable {
        field = field.nullable();
    }
    if let Some(default) = def.default {
        field = field.with_default(default);
    }
    if def.unique {
        field = field.unique();
    }
    if def.primary_key {
        field = field.primary_key();
    }
    if def.auto_increment {
        field = field.auto_increment();
    }
    if let Some(comment) = def.comment {
        field = field.with_comment(comment);
    }
    if let Some(help) = def.help_text {
        field = field.with_help_text(help);
    }
    Ok(field)
}
