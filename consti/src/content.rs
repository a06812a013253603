//! Dotted-path access into a constitution content tree.
//!
//! Content is an opaque JSON tree. Paths are dot-separated object keys
//! (`invariants.user_control.constraints`); arrays are leaves and are never
//! indexed into.

use serde_json::{Map, Value};

use crate::ConstiError;

/// Split a dotted path into its segments. Empty segments are rejected.
pub fn segments(path: &str) -> Result<Vec<&str>, ConstiError> {
    let parts: Vec<&str> = path.split('.').map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ConstiError::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

pub fn get_path<'a>(content: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = content;
    for seg in segments(path).ok()? {
        node = node.as_object()?.get(seg)?;
    }
    Some(node)
}

/// Set the value at `path`, creating intermediate objects as needed.
/// Returns the previous value, if any.
pub fn set_path(content: &mut Value, path: &str, value: Value) -> Result<Option<Value>, ConstiError> {
    let parts = segments(path)?;
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| ConstiError::InvalidPath(path.to_string()))?;
    let mut node = content;
    for seg in parents {
        let obj = node
            .as_object_mut()
            .ok_or_else(|| ConstiError::PathConflict(path.to_string()))?;
        node = obj
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let obj = node
        .as_object_mut()
        .ok_or_else(|| ConstiError::PathConflict(path.to_string()))?;
    Ok(obj.insert(last.to_string(), value))
}

/// Remove the value at `path`. Returns what was removed.
pub fn remove_path(content: &mut Value, path: &str) -> Result<Option<Value>, ConstiError> {
    let parts = segments(path)?;
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| ConstiError::InvalidPath(path.to_string()))?;
    let mut node = content;
    for seg in parents {
        match node.as_object_mut().and_then(|o| o.get_mut(*seg)) {
            Some(next) => node = next,
            None => return Ok(None),
        }
    }
    Ok(node.as_object_mut().and_then(|o| o.remove(*last)))
}

/// Append `item` to the array at `path` unless already present, creating the
/// array if the path is absent. Returns whether the array changed.
pub fn append_to_set(content: &mut Value, path: &str, item: Value) -> Result<bool, ConstiError> {
    match get_path(content, path) {
        None | Some(Value::Null) => {
            set_path(content, path, Value::Array(vec![item]))?;
            Ok(true)
        }
        Some(Value::Array(items)) if items.contains(&item) => Ok(false),
        Some(Value::Array(items)) => {
            let mut items = items.clone();
            items.push(item);
            set_path(content, path, Value::Array(items))?;
            Ok(true)
        }
        Some(_) => Err(ConstiError::PathConflict(path.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_nested() {
        let c = json!({"invariants": {"user_control": {"constraints": ["can_export"]}}});
        assert_eq!(
            get_path(&c, "invariants.user_control.constraints"),
            Some(&json!(["can_export"]))
        );
        assert_eq!(get_path(&c, "invariants.missing"), None);
        assert_eq!(get_path(&c, "invariants..x"), None);
    }

    #[test]
    fn set_creates_parents() {
        let mut c = json!({});
        assert_eq!(set_path(&mut c, "features.dark_mode.enabled", json!(true)).unwrap(), None);
        assert_eq!(c, json!({"features": {"dark_mode": {"enabled": true}}}));
        assert_eq!(
            set_path(&mut c, "features.dark_mode.enabled", json!(false)).unwrap(),
            Some(json!(true))
        );
    }

    #[test]
    fn set_through_scalar_conflicts() {
        let mut c = json!({"a": 1});
        assert!(matches!(
            set_path(&mut c, "a.b", json!(2)),
            Err(ConstiError::PathConflict(_))
        ));
    }

    #[test]
    fn remove_missing_is_none() {
        let mut c = json!({"a": {"b": 1}});
        assert_eq!(remove_path(&mut c, "a.x.y").unwrap(), None);
        assert_eq!(remove_path(&mut c, "a.b").unwrap(), Some(json!(1)));
        assert_eq!(c, json!({"a": {}}));
    }

    #[test]
    fn append_to_set_is_idempotent() {
        let mut c = json!({"i": {"c": ["a"]}});
        assert!(append_to_set(&mut c, "i.c", json!("b")).unwrap());
        assert!(!append_to_set(&mut c, "i.c", json!("b")).unwrap());
        assert_eq!(get_path(&c, "i.c"), Some(&json!(["a", "b"])));
        assert!(append_to_set(&mut c, "i.new", json!("x")).unwrap());
        assert_eq!(get_path(&c, "i.new"), Some(&json!(["x"])));
    }
}
