//! Dependency resolution: topological ordering of models.
//!
//! A model must be created after every model its relations reference, so the
//! differ walks models in dependency order. The sort is an iterative DFS:
//! deterministic, stable (independent models keep their insertion order), and
//! cycle-aware.

use std::collections::HashMap;

use smol_str::SmolStr;

use sqlbuns_schema::Schema;

use crate::error::{MigrateResult, MigrationError};

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Compute the topological order of a schema's model keys.
///
/// An edge exists from a relation's target to its owner: the target is
/// created first. Targets that name no model in the schema are phantom nodes
/// and impose no ordering. A back-edge raises [`MigrationError::CyclicSchema`]
/// carrying the full cycle path.
pub fn sort_keys(schema: &Schema) -> MigrateResult<Vec<SmolStr>> {
    // Relation targets address models by name; resolve them to schema keys.
    let by_name: HashMap<&str, &SmolStr> = schema
        .models
        .iter()
        .map(|(key, model)| (model.name.as_str(), key))
        .collect();

    let deps: HashMap<&SmolStr, Vec<&SmolStr>> = schema
        .models
        .iter()
        .map(|(key, model)| {
            let targets = model
                .relations
                .values()
                .filter_map(|rel| {
                    by_name
                        .get(rel.target.as_str())
                        .copied()
                        .or_else(|| schema.models.get_key_value(&rel.target).map(|(k, _)| k))
                })
                .collect();
            (key, targets)
        })
        .collect();

    let mut marks: HashMap<&SmolStr, Mark> =
        schema.models.keys().map(|key| (key, Mark::New)).collect();
    let mut order: Vec<SmolStr> = Vec::with_capacity(schema.models.len());

    for root in schema.models.keys() {
        if marks[root] != Mark::New {
            continue;
        }

        let mut stack: Vec<(&SmolStr, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::Active);

        while let Some(&mut (key, ref mut next)) = stack.last_mut() {
            let key_deps = &deps[key];
            if *next < key_deps.len() {
                let dep = key_deps[*next];
                *next += 1;
                match marks[dep] {
                    Mark::New => {
                        marks.insert(dep, Mark::Active);
                        stack.push((dep, 0));
                    }
                    Mark::Active => {
                        // Back-edge: reconstruct the cycle from the DFS stack.
                        let start = stack
                            .iter()
                            .position(|(k, _)| *k == dep)
                            .unwrap_or(0);
                        let mut path: Vec<String> =
                            stack[start..].iter().map(|(k, _)| k.to_string()).collect();
                        path.push(dep.to_string());
                        return Err(MigrationError::CyclicSchema { path });
                    }
                    Mark::Done => {}
                }
            } else {
                stack.pop();
                marks.insert(key, Mark::Done);
                order.push(key.clone());
            }
        }
    }

    Ok(order)
}

/// Reorder a schema's models topologically.
pub fn sort_schema(schema: &Schema) -> MigrateResult<Schema> {
    let keys = sort_keys(schema)?;
    let mut models = indexmap::IndexMap::new();
    for key in keys {
        if let Some(model) = schema.models.get(&key) {
            models.insert(key, model.clone());
        }
    }
    Ok(Schema { models })
}
