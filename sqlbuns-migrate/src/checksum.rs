//! Canonical serialization and the checksum protocol.
//!
//! Two schemas that mean the same thing must hash identically regardless of
//! key order or auto-synthesized index names. Canonicalization sorts mapping
//! keys recursively; [`normalize_index_names`] strips auto-names the user
//! never wrote before the hash is taken.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use sqlbuns_schema::SchemaView;

use crate::error::MigrateResult;

/// Rewrite a value into canonical form: mapping keys sorted lexicographically,
/// sequences and scalars untouched, recursively.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        scalar => scalar.clone(),
    }
}

/// Serialize a value canonically: compact JSON, UTF-8, keys sorted.
pub fn to_canonical_json(value: &Value) -> MigrateResult<String> {
    Ok(serde_json::to_string(&canonicalize(value))?)
}

/// The lowercase hex SHA-256 of a value's canonical serialization.
pub fn checksum(value: &Value) -> MigrateResult<String> {
    let json = to_canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// The checksum of a schema view.
pub fn schema_checksum(view: &SchemaView) -> MigrateResult<String> {
    checksum(&serde_json::to_value(view)?)
}

/// The lowercase hex SHA-256 of raw text. Used for artifacts that carry no
/// embedded snapshot checksum.
pub fn text_checksum(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Pre-checksum normalization for index names.
///
/// Index names are auto-synthesized when absent, so an old snapshot may carry
/// a name the current schema never wrote. Walk both sides pairwise by
/// effective table name; where the current side's index has no explicit name
/// but the old side holds one under the same pairing key, strip the old
/// side's name. The current side is never altered and no names are invented.
pub fn normalize_index_names(old: &mut SchemaView, current: &SchemaView) {
    for (_, old_model) in old.0.iter_mut() {
        let Some((_, cur_model)) = current.by_table(old_model.table()) else {
            continue;
        };

        for old_index in old_model.indexes.iter_mut() {
            if old_index.name.is_none() {
                continue;
            }
            let key = old_index.pairing_key();
            let unnamed_match = cur_model
                .indexes
                .iter()
                .any(|cur| cur.name.is_none() && cur.pairing_key() == key);
            if unnamed_match {
                old_index.name = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlbuns_schema::{Field, FieldKind, Index, Model, ModelMeta, Schema};

    fn schema_with_index(index: Index) -> SchemaView {
        let model = Model::new("users")
            .field(
                "id",
                Field::new(FieldKind::Integer).primary_key().auto_increment(),
            )
            .meta(ModelMeta {
                indexes: vec![index],
                ..Default::default()
            });
        Schema::from_models([("users", model)]).unwrap().view()
    }

    #[test]
    fn test_canonicalize_sorts_keys() {
        let value = json!({ "b": 1, "a": { "z": 2, "y": 3 } });
        let canonical = to_canonical_json(&value).unwrap();
        assert_eq!(canonical, r#"{"a":{"y":3,"z":2},"b":1}"#);
    }

    #[test]
    fn test_canonicalize_preserves_sequence_order() {
        let value = json!({ "seq": [3, 1, 2] });
        let canonical = to_canonical_json(&value).unwrap();
        assert_eq!(canonical, r#"{"seq":[3,1,2]}"#);
    }

    #[test]
    fn test_checksum_is_key_order_independent() {
        let a = json!({ "x": 1, "y": 2 });
        let b = json!({ "y": 2, "x": 1 });
        assert_eq!(checksum(&a).unwrap(), checksum(&b).unwrap());
    }

    #[test]
    fn test_checksum_round_trip_stability() {
        let value = json!({ "users": { "fields": { "id": { "type": "integer" } } } });
        let serialized = to_canonical_json(&value).unwrap();
        let reparsed: Value = serde_json::from_str(&serialized).unwrap();
        assert_eq!(checksum(&value).unwrap(), checksum(&reparsed).unwrap());
    }

    #[test]
    fn test_checksum_shape() {
        let digest = checksum(&json!({})).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_normalize_strips_stored_name_from_old_side() {
        // An old snapshot may carry a synthesized name (e.g. written by an
        // earlier naming scheme) that the current models never spelled out.
        let mut old = schema_with_index(Index::new(["email"]));
        old.0["users"].indexes[0].name = Some("users_email_idx".into());
        let current = schema_with_index(Index::new(["email"]));

        normalize_index_names(&mut old, &current);
        assert!(old.0["users"].indexes[0].name.is_none());
        assert_eq!(
            schema_checksum(&old).unwrap(),
            schema_checksum(&current).unwrap()
        );
    }

    #[test]
    fn test_normalize_keeps_name_when_current_names_it() {
        let mut old = schema_with_index(Index::new(["email"]).with_name("custom"));
        let current = schema_with_index(Index::new(["email"]).with_name("custom"));

        normalize_index_names(&mut old, &current);
        assert_eq!(old.0["users"].indexes[0].name.as_deref(), Some("custom"));
    }

    #[test]
    fn test_normalize_never_touches_current() {
        let mut old = schema_with_index(Index::new(["email"]));
        old.0["users"].indexes[0].name = Some("users_email_idx".into());
        let current = schema_with_index(Index::new(["email"]));
        let before = current.clone();

        normalize_index_names(&mut old, &current);
        assert_eq!(current, before);
    }

    #[test]
    fn test_user_supplied_name_equal_to_auto_name_is_invariant() {
        // Naming an index exactly its auto-name must not change the
        // pre-checksum-normalized view, hence the checksum.
        let unnamed = schema_with_index(Index::new(["email"]));
        let mut named = schema_with_index(Index::new(["email"]).with_name("idx_users_email"));

        normalize_index_names(&mut named, &unnamed);
        assert_eq!(
            schema_checksum(&named).unwrap(),
            schema_checksum(&unnamed).unwrap()
        );
    }
}
