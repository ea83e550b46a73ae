//! Parameter assertion for user model methods.
//!
//! Model methods live on the authoring surface and interact with the engine
//! only through this helper: a method receives its model explicitly and
//! validates its inputs against declarative rules.

use serde_json::Value;

use crate::error::{SchemaError, SchemaResult};

/// The expected JSON type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// A validation rule for one named parameter.
#[derive(Debug, Clone, Default)]
pub struct ParamRule {
    /// Parameter name.
    pub name: String,
    /// Whether the parameter must be present.
    pub required: bool,
    /// Expected type, if constrained.
    pub kind: Option<ParamType>,
    /// Minimum numeric value or string/array length.
    pub min: Option<f64>,
    /// Maximum numeric value or string/array length.
    pub max: Option<f64>,
    /// Allowed values, if constrained.
    pub one_of: Vec<Value>,
}

impl ParamRule {
    /// A rule for an optional parameter.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Mark the parameter required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Constrain the type.
    pub fn of_type(mut self, kind: ParamType) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Constrain the minimum value or length.
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Constrain the maximum value or length.
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Constrain to an allowed set of values.
    pub fn one_of(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.one_of = values.into_iter().collect();
        self
    }
}

/// The magnitude used for min/max checks: the numeric value for numbers, the
/// length for strings and arrays.
fn magnitude(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(a) => Some(a.len() as f64),
        _ => None,
    }
}

/// Validate a parameter object against a set of rules.
///
/// `params` must be a JSON object; each rule is checked against the entry of
/// the same name. Unknown entries are allowed.
pub fn assert_params(params: &Value, rules: &[ParamRule]) -> SchemaResult<()> {
    let map = params.as_object().ok_or_else(|| {
        SchemaError::invalid_param("params", "expected an object of named parameters")
    })?;

    for rule in rules {
        let value = match map.get(&rule.name) {
            Some(Value::Null) | None => {
                if rule.required {
                    return Err(SchemaError::invalid_param(&rule.name, "parameter is required"));
                }
                continue;
            }
            Some(value) => value,
        };

        if let Some(kind) = rule.kind {
            if !kind.matches(value) {
                return Err(SchemaError::invalid_param(
                    &rule.name,
                    format!("expected {}", kind.name()),
                ));
            }
        }

        if rule.min.is_some() || rule.max.is_some() {
            let size = magnitude(value).ok_or_else(|| {
                SchemaError::invalid_param(&rule.name, "min/max applies to numbers, strings, and arrays")
            })?;
            if let Some(min) = rule.min {
                if size < min {
                    return Err(SchemaError::invalid_param(
                        &rule.name,
                        format!("must be at least {min}"),
                    ));
                }
            }
            if let Some(max) = rule.max {
                if size > max {
                    return Err(SchemaError::invalid_param(
                        &rule.name,
                        format!("must be at most {max}"),
                    ));
                }
            }
        }

        if !rule.one_of.is_empty() && !rule.one_of.contains(value) {
            return Err(SchemaError::invalid_param(
                &rule.name,
                "value is not in the allowed set",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_param_missing() {
        let rules = [ParamRule::new("email").required()];
        assert!(assert_params(&json!({}), &rules).is_err());
        assert!(assert_params(&json!({ "email": null }), &rules).is_err());
        assert!(assert_params(&json!({ "email": "a@b" }), &rules).is_ok());
    }

    #[test]
    fn test_type_check() {
        let rules = [ParamRule::new("age").of_type(ParamType::Number)];
        assert!(assert_params(&json!({ "age": 3 }), &rules).is_ok());
        assert!(assert_params(&json!({ "age": "3" }), &rules).is_err());
    }

    #[test]
    fn test_min_max_on_strings_and_numbers() {
        let rules = [ParamRule::new("name").min(2.0).max(4.0)];
        assert!(assert_params(&json!({ "name": "ab" }), &rules).is_ok());
        assert!(assert_params(&json!({ "name": "a" }), &rules).is_err());
        assert!(assert_params(&json!({ "name": "abcde" }), &rules).is_err());

        let rules = [ParamRule::new("n").min(0.0)];
        assert!(assert_params(&json!({ "n": -1 }), &rules).is_err());
    }

    #[test]
    fn test_one_of() {
        let rules = [ParamRule::new("level").one_of([json!("A"), json!("B")])];
        assert!(assert_params(&json!({ "level": "A" }), &rules).is_ok());
        assert!(assert_params(&json!({ "level": "C" }), &rules).is_err());
    }

    #[test]
    fn test_optional_absent_is_ok() {
        let rules = [ParamRule::new("nick").of_type(ParamType::String)];
        assert!(assert_params(&json!({}), &rules).is_ok());
    }
}
