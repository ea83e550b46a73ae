//! Model (table) definitions and the schema container.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::error::{SchemaError, SchemaResult};
use crate::field::{Field, FieldKind, FieldView};
use crate::relation::{Index, Relation};
use crate::trigger::{Trigger, TriggerSlot, TriggerStatement};

/// Model-level metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelMeta {
    /// Table-name override. The effective table name is this value when
    /// present, else the model name.
    pub table_name: Option<SmolStr>,
    /// Secondary indexes.
    pub indexes: Vec<Index>,
    /// Table comment.
    pub comment: Option<String>,
    /// When set, `created_at` / `updated_at` columns are materialized at
    /// normalization.
    pub timestamps: bool,
}

/// A table definition.
///
/// Constructed once per process from field descriptors and frozen by
/// [`Schema::from_models`]; user methods attached on the authoring surface are
/// not part of the schema and never reach the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Model name.
    pub name: SmolStr,
    /// Ordered mapping of field name to definition.
    pub fields: IndexMap<SmolStr, Field>,
    /// Relations owned by this model.
    pub relations: IndexMap<SmolStr, Relation>,
    /// Triggers by slot.
    pub triggers: IndexMap<TriggerSlot, Trigger>,
    /// Model metadata.
    pub meta: ModelMeta,
}

impl Model {
    /// Create an empty model.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            relations: IndexMap::new(),
            triggers: IndexMap::new(),
            meta: ModelMeta::default(),
        }
    }

    /// Add a field.
    pub fn field(mut self, name: impl Into<SmolStr>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Add a relation.
    pub fn relation(mut self, name: impl Into<SmolStr>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    /// Attach statements to a trigger slot.
    pub fn trigger(mut self, slot: TriggerSlot, statements: Vec<TriggerStatement>) -> Self {
        self.triggers.insert(slot, Trigger::for_slot(slot, statements));
        self
    }

    /// Set the model metadata.
    pub fn meta(mut self, meta: ModelMeta) -> Self {
        self.meta = meta;
        self
    }

    /// The effective table name: `meta.table_name` if present, else the
    /// model name.
    pub fn table_name(&self) -> &str {
        self.meta
            .table_name
            .as_deref()
            .unwrap_or(self.name.as_str())
    }

    /// Primary-key field names, in declaration order.
    pub fn primary_key_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, f)| f.primary_key)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Normalize the model: materialize timestamp columns, then validate
    /// every field, relation, and trigger.
    pub fn normalize(mut self) -> SchemaResult<Self> {
        if self.meta.timestamps {
            for column in ["created_at", "updated_at"] {
                if !self.fields.contains_key(column) {
                    self.fields.insert(
                        column.into(),
                        Field::new(FieldKind::DateTime).with_default(Value::String(
                            "CURRENT_TIMESTAMP".to_string(),
                        )),
                    );
                }
            }
        }

        for (name, field) in &self.fields {
            field.validate(&format!("{}.{}", self.name, name))?;
        }

        let pk = self.primary_key_fields();
        let has_auto = self.fields.values().any(|f| f.auto_increment);
        if has_auto && pk.len() > 1 {
            return Err(SchemaError::invalid_schema(format!(
                "model `{}` combines auto-increment with a composite primary key",
                self.name
            )));
        }

        for (name, relation) in &self.relations {
            relation.validate(&format!("{}.{}", self.name, name))?;
        }

        for trigger in self.triggers.values() {
            if trigger.statements.is_empty() {
                return Err(SchemaError::invalid_trigger(
                    trigger.base_name(self.table_name()),
                    "trigger has no statements",
                ));
            }
        }

        Ok(self)
    }

    /// The canonical snapshot view of this model.
    pub fn view(&self) -> ModelView {
        let fields = self
            .fields
            .iter()
            .map(|(name, field)| (name.to_string(), field.view()))
            .collect();

        let relations = self
            .relations
            .iter()
            .map(|(name, relation)| (name.to_string(), relation.clone()))
            .collect();

        let mut triggers = IndexMap::new();
        for slot in TriggerSlot::ALL {
            if let Some(trigger) = self.triggers.get(&slot) {
                triggers.insert(slot.as_str().to_string(), trigger.view());
            }
        }

        // An explicit index name equal to the auto-synthesized one carries no
        // information; the view drops it so the checksum cannot tell the two
        // spellings apart.
        let table = self.table_name();
        let indexes = self
            .meta
            .indexes
            .iter()
            .map(|index| {
                let mut index = index.clone();
                if index.name.as_deref() == Some(index.auto_name(table).as_str()) {
                    index.name = None;
                }
                index
            })
            .collect();

        ModelView {
            name: self.name.to_string(),
            table_name: self.meta.table_name.as_ref().map(|t| t.to_string()),
            fields,
            relations,
            triggers,
            indexes,
            comment: self.meta.comment.clone(),
            timestamps: self.meta.timestamps,
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// The serializable snapshot view of a [`Model`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelView {
    /// Model name.
    pub name: String,
    /// Table-name override, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    /// Columns.
    pub fields: IndexMap<String, FieldView>,
    /// Relations.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub relations: IndexMap<String, Relation>,
    /// Triggers, keyed by slot name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub triggers: IndexMap<String, Trigger>,
    /// Secondary indexes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
    /// Table comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Timestamp-column flag.
    #[serde(default, skip_serializing_if = "is_false")]
    pub timestamps: bool,
}

impl ModelView {
    /// The effective table name.
    pub fn table(&self) -> &str {
        self.table_name.as_deref().unwrap_or(&self.name)
    }

    /// Primary-key column names, in declaration order.
    pub fn primary_key_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, f)| f.primary_key)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// An ordered set of models: the unit the differ and snapshot operate on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    /// Models by export key, in insertion (or topological) order.
    pub models: IndexMap<SmolStr, Model>,
}

impl Schema {
    /// Build a schema from models, normalizing and validating each.
    pub fn from_models(
        models: impl IntoIterator<Item = (impl Into<SmolStr>, Model)>,
    ) -> SchemaResult<Self> {
        let mut normalized = IndexMap::new();
        for (key, model) in models {
            normalized.insert(key.into(), model.normalize()?);
        }
        Ok(Self { models: normalized })
    }

    /// The canonical snapshot view, preserving model order.
    pub fn view(&self) -> SchemaView {
        SchemaView(
            self.models
                .iter()
                .map(|(key, model)| (key.to_string(), model.view()))
                .collect(),
        )
    }
}

/// The serializable snapshot view of a [`Schema`]: model key to model view,
/// in topological order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaView(pub IndexMap<String, ModelView>);

impl SchemaView {
    /// Check whether the view holds no models.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a model by its effective table name.
    pub fn by_table(&self, table: &str) -> Option<(&String, &ModelView)> {
        self.0.iter().find(|(_, m)| m.table() == table)
    }

    /// Look up a model by its export key.
    pub fn by_key(&self, key: &str) -> Option<&ModelView> {
        self.0.get(key)
    }

    /// Check whether any model's effective table name matches.
    pub fn contains_table(&self, table: &str) -> bool {
        self.by_table(table).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> Model {
        Model::new("users")
            .field(
                "id",
                Field::new(FieldKind::Integer).primary_key().auto_increment(),
            )
            .field("email", Field::new(FieldKind::varchar()).unique())
    }

    #[test]
    fn test_effective_table_name() {
        let model = users();
        assert_eq!(model.table_name(), "users");

        let model = users().meta(ModelMeta {
            table_name: Some("app_users".into()),
            ..Default::default()
        });
        assert_eq!(model.table_name(), "app_users");
    }

    #[test]
    fn test_composite_pk_with_auto_increment_rejected() {
        let model = Model::new("bad")
            .field(
                "id",
                Field::new(FieldKind::Integer).primary_key().auto_increment(),
            )
            .field("other", Field::new(FieldKind::Integer).primary_key());
        let err = model.normalize().unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSchema { .. }));
    }

    #[test]
    fn test_timestamps_materialized() {
        let model = users()
            .meta(ModelMeta {
                timestamps: true,
                ..Default::default()
            })
            .normalize()
            .unwrap();
        assert!(model.fields.contains_key("created_at"));
        assert!(model.fields.contains_key("updated_at"));
        assert_eq!(
            model.fields["created_at"].default,
            Some(json!("CURRENT_TIMESTAMP"))
        );
    }

    #[test]
    fn test_view_preserves_field_order() {
        let schema = Schema::from_models([("users", users())]).unwrap();
        let view = schema.view();
        let names: Vec<&String> = view.0["users"].fields.keys().collect();
        assert_eq!(names, ["id", "email"]);
    }

    #[test]
    fn test_view_round_trips_through_json() {
        let schema = Schema::from_models([("users", users())]).unwrap();
        let view = schema.view();
        let json = serde_json::to_string_pretty(&view).unwrap();
        let back: SchemaView = serde_json::from_str(&json).unwrap();
        assert_eq!(back, view);
    }

    #[test]
    fn test_by_table_uses_effective_name() {
        let model = users().meta(ModelMeta {
            table_name: Some("app_users".into()),
            ..Default::default()
        });
        let schema = Schema::from_models([("users", model)]).unwrap();
        let view = schema.view();
        assert!(view.by_table("app_users").is_some());
        assert!(view.by_table("users").is_none());
        assert!(view.by_key("users").is_some());
    }

    #[test]
    fn test_empty_trigger_rejected() {
        let model = users().trigger(TriggerSlot::AfterInsert, vec![]);
        assert!(model.normalize().is_err());
    }

    #[test]
    fn test_index_named_as_auto_name_views_identically() {
        use crate::relation::Index;

        let unnamed = users().meta(ModelMeta {
            indexes: vec![Index::new(["email"])],
            ..Default::default()
        });
        let named = users().meta(ModelMeta {
            indexes: vec![Index::new(["email"]).with_name("idx_users_email")],
            ..Default::default()
        });
        assert_eq!(unnamed.view(), named.view());

        // A genuinely custom name survives.
        let custom = users().meta(ModelMeta {
            indexes: vec![Index::new(["email"]).with_name("users_email_key")],
            ..Default::default()
        });
        assert_eq!(
            custom.view().indexes[0].name.as_deref(),
            Some("users_email_key")
        );
    }
}
