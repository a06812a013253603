//! Structural diff between two content trees.
//!
//! Objects are walked recursively and reported by dotted path. Arrays and
//! scalars are leaves: a changed array is one modification.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub old: Value,
    pub new: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionDiff {
    pub added: BTreeMap<String, Value>,
    pub removed: BTreeMap<String, Value>,
    pub modified: BTreeMap<String, Modification>,
}

impl VersionDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

pub fn diff(old: &Value, new: &Value) -> VersionDiff {
    let mut out = VersionDiff::default();
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => walk(a, b, "", &mut out),
        _ if old != new => {
            out.modified.insert(
                String::new(),
                Modification {
                    old: old.clone(),
                    new: new.clone(),
                },
            );
        }
        _ => {}
    }
    out
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn walk(old: &Map<String, Value>, new: &Map<String, Value>, prefix: &str, out: &mut VersionDiff) {
    for (key, old_value) in old {
        let path = join(prefix, key);
        match new.get(key) {
            None => {
                out.removed.insert(path, old_value.clone());
            }
            Some(new_value) => match (old_value, new_value) {
                (Value::Object(a), Value::Object(b)) => walk(a, b, &path, out),
                _ if old_value != new_value => {
                    out.modified.insert(
                        path,
                        Modification {
                            old: old_value.clone(),
                            new: new_value.clone(),
                        },
                    );
                }
                _ => {}
            },
        }
    }
    for (key, new_value) in new {
        if !old.contains_key(key) {
            out.added.insert(join(prefix, key), new_value.clone());
        }
    }
}
