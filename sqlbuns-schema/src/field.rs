//! Column definitions for the sqlbuns schema model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SchemaError, SchemaResult};

/// The logical type of a column.
///
/// Dialect adapters map these onto concrete SQL types; the schema model never
/// carries dialect-specific type names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Integer,
    Decimal {
        precision: u8,
        scale: u8,
    },
    Float,
    Varchar {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<u32>,
    },
    Text,
    Enum {
        choices: Vec<String>,
        /// Explicit database type name (PostgreSQL only). Auto-generated
        /// when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
    },
    Date,
    DateTime,
    Blob,
    Boolean,
    Uuid,
    Json,
    Xml,
}

impl FieldKind {
    /// Shorthand for a varchar without an explicit length.
    pub fn varchar() -> Self {
        Self::Varchar { max_length: None }
    }

    /// Shorthand for a varchar with a maximum length.
    pub fn varchar_len(max_length: u32) -> Self {
        Self::Varchar {
            max_length: Some(max_length),
        }
    }

    /// Shorthand for an enum with the given choices.
    pub fn enumeration(choices: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Enum {
            choices: choices.into_iter().map(Into::into).collect(),
            type_name: None,
        }
    }

    /// Check if this is the integer kind (required for auto-increment).
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Integer)
    }
}

/// A column definition.
///
/// Fields are frozen once the owning model is normalized; mutation after that
/// point would desynchronize the snapshot from the emitted DDL.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Logical column type.
    pub kind: FieldKind,
    /// Whether NULL is allowed. Columns are NOT NULL by default.
    pub nullable: bool,
    /// Default value: a JSON literal, or a string naming a SQL function
    /// token such as `CURRENT_TIMESTAMP` (classified at render time).
    pub default: Option<Value>,
    /// Single-column UNIQUE constraint.
    pub unique: bool,
    /// Primary-key membership.
    pub primary_key: bool,
    /// Auto-increment flag. Implies an integer, single-column primary key.
    pub auto_increment: bool,
    /// Human comment, carried into the snapshot.
    pub comment: Option<String>,
    /// Help text for the authoring surface. Never emitted to SQL or the
    /// snapshot.
    pub help_text: Option<String>,
}

impl Field {
    /// Create a field of the given kind with default attributes.
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            nullable: false,
            default: None,
            unique: false,
            primary_key: false,
            auto_increment: false,
            comment: None,
            help_text: None,
        }
    }

    /// Allow NULL values.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Mark the column UNIQUE.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark the column as (part of) the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark the column auto-increment.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Attach a comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Attach authoring-surface help text.
    pub fn with_help_text(mut self, help: impl Into<String>) -> Self {
        self.help_text = Some(help.into());
        self
    }

    /// Validate the field's own invariants.
    pub(crate) fn validate(&self, name: &str) -> SchemaResult<()> {
        if let FieldKind::Enum { choices, .. } = &self.kind {
            if choices.is_empty() {
                return Err(SchemaError::invalid_field(name, "enum choices must not be empty"));
            }
            let mut seen = std::collections::HashSet::new();
            for choice in choices {
                if !seen.insert(choice.as_str()) {
                    return Err(SchemaError::invalid_field(
                        name,
                        format!("duplicate enum choice `{choice}`"),
                    ));
                }
            }
            if let Some(Value::String(default)) = &self.default {
                if !choices.iter().any(|c| c == default) {
                    return Err(SchemaError::invalid_field(
                        name,
                        format!("default `{default}` is not one of the enum choices"),
                    ));
                }
            } else if self.default.is_some() {
                return Err(SchemaError::invalid_field(
                    name,
                    "enum default must be one of the choices",
                ));
            }
        }

        if self.auto_increment {
            if !self.kind.is_integer() {
                return Err(SchemaError::invalid_field(
                    name,
                    "auto-increment requires an integer column",
                ));
            }
            if !self.primary_key {
                return Err(SchemaError::invalid_field(
                    name,
                    "auto-increment requires the column to be the primary key",
                ));
            }
        }

        Ok(())
    }

    /// The canonical snapshot view of this field. Excludes help text.
    pub fn view(&self) -> FieldView {
        FieldView {
            kind: self.kind.clone(),
            nullable: self.nullable,
            default: self.default.clone(),
            unique: self.unique,
            primary_key: self.primary_key,
            auto_increment: self.auto_increment,
            comment: self.comment.clone(),
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// The serializable snapshot view of a [`Field`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldView {
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_increment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl FieldView {
    /// Check whether two columns agree on type, nullability, and default.
    ///
    /// This is the identity used by rename detection: a dropped and an added
    /// column are rename candidates only when this holds.
    pub fn same_shape(&self, other: &FieldView) -> bool {
        self.kind == other.kind && self.nullable == other.nullable && self.default == other.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enum_requires_choices() {
        let field = Field::new(FieldKind::enumeration(Vec::<String>::new()));
        assert!(field.validate("level").is_err());
    }

    #[test]
    fn test_enum_default_must_be_choice() {
        let field =
            Field::new(FieldKind::enumeration(["A", "B"])).with_default(json!("C"));
        let err = field.validate("level").unwrap_err();
        assert!(err.to_string().contains("not one of the enum choices"));

        let field = Field::new(FieldKind::enumeration(["A", "B"])).with_default(json!("A"));
        assert!(field.validate("level").is_ok());
    }

    #[test]
    fn test_enum_choices_must_be_distinct() {
        let field = Field::new(FieldKind::enumeration(["A", "A"]));
        assert!(field.validate("level").is_err());
    }

    #[test]
    fn test_auto_increment_requires_integer_pk() {
        let field = Field::new(FieldKind::Text).primary_key().auto_increment();
        assert!(field.validate("id").is_err());

        let field = Field::new(FieldKind::Integer).auto_increment();
        assert!(field.validate("id").is_err());

        let field = Field::new(FieldKind::Integer).primary_key().auto_increment();
        assert!(field.validate("id").is_ok());
    }

    #[test]
    fn test_view_excludes_help_text() {
        let field = Field::new(FieldKind::Integer)
            .with_comment("visible")
            .with_help_text("internal only");
        let json = serde_json::to_value(field.view()).unwrap();
        assert_eq!(json["comment"], json!("visible"));
        assert!(json.get("help_text").is_none());
    }

    #[test]
    fn test_field_kind_serde_round_trip() {
        let kind = FieldKind::enumeration(["A", "B"]);
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], json!("enum"));
        let back: FieldKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, kind);

        let kind = FieldKind::Decimal {
            precision: 10,
            scale: 2,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["precision"], json!(10));
        let back: FieldKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn test_varchar_without_length_serializes_compactly() {
        let view = Field::new(FieldKind::varchar()).view();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json, json!({ "type": "varchar" }));
    }

    #[test]
    fn test_same_shape_ignores_constraints() {
        let a = Field::new(FieldKind::varchar()).unique().view();
        let b = Field::new(FieldKind::varchar()).view();
        assert!(a.same_shape(&b));

        let c = Field::new(FieldKind::varchar()).nullable().view();
        assert!(!a.same_shape(&c));
    }
}
