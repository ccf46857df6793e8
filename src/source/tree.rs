//! Key-tree helpers shared by the in-memory source and the streaming cache.
//!
//! The realtime database stores a JSON tree without nulls or empty objects:
//! writing `null` deletes a node and a parent left empty disappears with it.

use crate::error::{HubError, Result};
use serde_json::{Map, Value};

/// Key used by the database for server-resolved placeholders.
pub const SERVER_VALUE_KEY: &str = ".sv";

/// Split a slash-separated path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Reject keys the database would refuse.
pub fn validate_path(path: &str) -> Result<()> {
    const FORBIDDEN: [char; 5] = ['.', '$', '#', '[', ']'];
    if path.chars().any(|c| FORBIDDEN.contains(&c) || c.is_control()) {
        return Err(HubError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// True when one path is an ancestor of (or equal to) the other.
pub fn related<S: AsRef<str>, T: AsRef<str>>(a: &[S], b: &[T]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x.as_ref() == y.as_ref())
}

/// Read the node at `path`, `None` when it does not exist.
pub fn get_at<'a, S: AsRef<str>>(root: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut node = root;
    for segment in path {
        node = node.as_object()?.get(segment.as_ref())?;
    }
    if node.is_null() { None } else { Some(node) }
}

/// Replace the node at `path`. A null value deletes the node.
pub fn set_at<S: AsRef<str>>(root: &mut Value, path: &[S], value: Value) {
    match path.split_first() {
        None => *root = prune(value),
        Some((head, rest)) => {
            if !root.is_object() {
                if value.is_null() {
                    return;
                }
                *root = Value::Object(Map::new());
            }
            let Value::Object(map) = root else {
                return;
            };
            let child = map.entry(head.as_ref().to_string()).or_insert(Value::Null);
            set_at(child, rest, value);
            if child.is_null() {
                map.remove(head.as_ref());
            }
            if map.is_empty() {
                *root = Value::Null;
            }
        }
    }
}

/// Merge `fields` as children of the node at `path`.
///
/// Keys may themselves be slash paths relative to `path`, as in a
/// multi-location update.
pub fn merge_at<S: AsRef<str>>(root: &mut Value, path: &[S], fields: Map<String, Value>) {
    for (key, value) in fields {
        let mut target: Vec<String> = path.iter().map(|s| s.as_ref().to_string()).collect();
        target.extend(segments(&key).into_iter().map(str::to_string));
        set_at(root, &target, value);
    }
}

/// Drop nulls and empty objects so the stored tree matches what the database keeps.
pub fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if pruned.is_empty() {
                Value::Null
            } else {
                Value::Object(pruned)
            }
        }
        other => other,
    }
}

/// The placeholder the database replaces with its own clock on write.
pub fn server_timestamp() -> Value {
    let mut map = Map::new();
    map.insert(
        SERVER_VALUE_KEY.to_string(),
        Value::String("timestamp".to_string()),
    );
    Value::Object(map)
}

/// Replace every server timestamp placeholder with `now_ms`.
pub fn resolve_server_values(value: &mut Value, now_ms: i64) {
    if let Value::Object(map) = value {
        if map.len() == 1
            && map.get(SERVER_VALUE_KEY).and_then(Value::as_str) == Some("timestamp")
        {
            *value = Value::from(now_ms);
            return;
        }
        for child in map.values_mut() {
            resolve_server_values(child, now_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segments_ignore_extra_slashes() {
        assert_eq!(segments("/home//room1/sensor/"), vec!["home", "room1", "sensor"]);
        assert!(segments("/").is_empty());
    }

    #[test]
    fn test_validate_path_rejects_forbidden_characters() {
        assert!(validate_path("home/room1/sensor").is_ok());
        assert!(validate_path("home/room.1").is_err());
        assert!(validate_path("users/$id").is_err());
    }

    #[test]
    fn test_related_is_prefix_either_way() {
        assert!(related(&["home", "room1"], &["home", "room1", "sensor"]));
        assert!(related(&["home", "room1", "sensor"], &["home"]));
        assert!(related::<&str, &str>(&[], &["home"]));
        assert!(!related(&["home", "room1"], &["home", "room2"]));
    }

    #[test]
    fn test_set_and_get_nested() {
        let mut root = Value::Null;
        set_at(&mut root, &["home", "room1", "controls", "light"], json!(true));
        assert_eq!(
            get_at(&root, &["home", "room1", "controls"]),
            Some(&json!({"light": true}))
        );
        assert_eq!(get_at(&root, &["home", "room2"]), None);
    }

    #[test]
    fn test_null_deletes_and_prunes_empty_parents() {
        let mut root = json!({"home": {"users": {"a": {"name": "x"}}, "other": 1}});
        set_at(&mut root, &["home", "users", "a"], Value::Null);
        assert_eq!(root, json!({"home": {"other": 1}}));

        set_at(&mut root, &["home", "other"], Value::Null);
        assert_eq!(root, Value::Null);
    }

    #[test]
    fn test_merge_keeps_siblings() {
        let mut root = json!({"controls": {"light": false, "fan": true}});
        let mut fields = Map::new();
        fields.insert("light".into(), json!(true));
        fields.insert("timestamp".into(), json!(5));
        merge_at(&mut root, &["controls"], fields);
        assert_eq!(
            root,
            json!({"controls": {"light": true, "fan": true, "timestamp": 5}})
        );
    }

    #[test]
    fn test_resolve_server_timestamp_placeholders() {
        let mut value = json!({"light": true, "timestamp": server_timestamp()});
        resolve_server_values(&mut value, 1234);
        assert_eq!(value, json!({"light": true, "timestamp": 1234}));
    }
}
