//! Helpers for the shapes IIIF JSON-LD allows for the same property: a single
//! resource may be written as a one-element list, a list as a single resource,
//! and a resource as its bare id string.

use glam::DVec3;
use serde_json::{Map, Value};

use crate::error::TranscodeError;

/// `null` and `[]` become `None`; a list yields its first element.
pub fn force_as_singleton(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => {
            if items.len() > 1 {
                log::warn!("list of {} elements coerced to a single resource", items.len());
            }
            items.into_iter().next()
        }
        other => Some(other),
    }
}

/// First element of a value that may be a list, and the elements after it.
/// `null` and `[]` become `None`.
pub fn split_first(value: Value) -> Option<(Value, Vec<Value>)> {
    let mut items = force_as_list(value).into_iter();
    let first = items.next()?;
    Some((first, items.collect()))
}

/// `null` becomes an empty list, a non-list becomes a list of one.
pub fn force_as_list(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// Objects pass through; a string is read as the id of a resource.
pub fn force_as_object(value: Value, context: &str) -> Result<Map<String, Value>, TranscodeError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::String(id) => {
            let mut map = Map::new();
            map.insert("id".to_string(), Value::String(id));
            Ok(map)
        }
        other => Err(TranscodeError::malformed(format!(
            "{context}: expected a resource, found {other}"
        ))),
    }
}

/// Reads optional `x`, `y`, `z` members, using `default` for absent axes.
pub fn axes_named_values(map: &Map<String, Value>, default: f64, context: &str) -> Result<DVec3, TranscodeError> {
    let axis = |name: &str| -> Result<f64, TranscodeError> {
        match map.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value.as_f64().ok_or_else(|| {
                TranscodeError::malformed(format!("{context}: {name} must be a number, found {value}"))
            }),
        }
    };
    Ok(DVec3::new(axis("x")?, axis("y")?, axis("z")?))
}

/// `{"type": kind, "x": .., "y": .., "z": ..}`
pub fn create_axes_named_values(kind: &str, v: DVec3) -> Value {
    let mut map = Map::new();
    map.insert("type".to_string(), Value::String(kind.to_string()));
    map.insert("x".to_string(), Value::from(v.x));
    map.insert("y".to_string(), Value::from(v.y));
    map.insert("z".to_string(), Value::from(v.z));
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn singleton_and_list_coercions() {
        assert_eq!(force_as_singleton(json!(null)), None);
        assert_eq!(force_as_singleton(json!([])), None);
        assert_eq!(force_as_singleton(json!([{"id": "a"}, {"id": "b"}])), Some(json!({"id": "a"})));
        assert_eq!(force_as_list(json!("a")), vec![json!("a")]);
        assert!(force_as_list(json!(null)).is_empty());
    }

    #[test]
    fn split_first_keeps_the_rest() {
        assert_eq!(split_first(json!({"id": "a"})), Some((json!({"id": "a"}), Vec::new())));
        assert_eq!(
            split_first(json!(["a", "b", "c"])),
            Some((json!("a"), vec![json!("b"), json!("c")]))
        );
        assert_eq!(split_first(json!([])), None);
    }

    #[test]
    fn string_resource_becomes_object() {
        let map = force_as_object(json!("https://example.org/scene"), "target").unwrap();
        assert_eq!(map.get("id"), Some(&json!("https://example.org/scene")));
        assert!(force_as_object(json!(3), "target").is_err());
    }

    #[test]
    fn axes_default_and_validate() {
        let map = json!({"type": "ScaleTransform", "y": 2}).as_object().cloned().unwrap();
        assert_eq!(axes_named_values(&map, 1.0, "scale").unwrap(), DVec3::new(1.0, 2.0, 1.0));

        let bad = json!({"x": "far"}).as_object().cloned().unwrap();
        assert!(axes_named_values(&bad, 0.0, "selector").is_err());
    }
}
