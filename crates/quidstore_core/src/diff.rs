//! Diff reduction for change logging.
//!
//! When an update replaces a large nested value, only the parts that
//! actually changed are worth logging. [`reduce`] strips everything equal
//! on both sides.

use crate::document::json_eq;
use serde_json::{Map, Value};

/// Reduces a pair of values to the parts that differ.
///
/// Objects keep only keys whose values differ, recursively; a key present on
/// one side only appears with `null` on the other. Arrays are turned into
/// objects keyed by the differing positions. Anything else is returned as is.
#[must_use]
pub fn reduce(old: &Value, new: &Value) -> (Value, Value) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let (x, y) = reduce_entries(
                a.iter().map(|(k, v)| (k.clone(), v)),
                |key| b.get(key),
                b.iter().filter(|(k, _)| !a.contains_key(*k)).map(|(k, v)| (k.clone(), v)),
            );
            (Value::Object(x), Value::Object(y))
        }
        (Value::Array(a), Value::Array(b)) => {
            let (x, y) = reduce_entries(
                a.iter().enumerate().map(|(i, v)| (i.to_string(), v)),
                |key| key.parse::<usize>().ok().and_then(|i| b.get(i)),
                b.iter().enumerate().skip(a.len()).map(|(i, v)| (i.to_string(), v)),
            );
            (Value::Object(x), Value::Object(y))
        }
        _ => (old.clone(), new.clone()),
    }
}

fn reduce_entries<'a>(
    left: impl Iterator<Item = (String, &'a Value)>,
    right: impl Fn(&str) -> Option<&'a Value>,
    right_only: impl Iterator<Item = (String, &'a Value)>,
) -> (Map<String, Value>, Map<String, Value>) {
    let mut old = Map::new();
    let mut new = Map::new();
    for (key, a) in left {
        match right(&key) {
            Some(b) if json_eq(a, b) => {}
            Some(b) => {
                let (x, y) = reduce(a, b);
                old.insert(key.clone(), x);
                new.insert(key, y);
            }
            None => {
                old.insert(key.clone(), a.clone());
                new.insert(key, Value::Null);
            }
        }
    }
    for (key, b) in right_only {
        old.insert(key.clone(), Value::Null);
        new.insert(key, b.clone());
    }
    (old, new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_pass_through() {
        assert_eq!(reduce(&json!(100), &json!(70)), (json!(100), json!(70)));
    }

    #[test]
    fn objects_keep_changed_keys() {
        let (old, new) = reduce(
            &json!({"hp": 100, "name": "Rex", "stats": {"level": 1, "xp": 3}}),
            &json!({"hp": 100, "name": "Ash", "stats": {"level": 2, "xp": 3}, "title": "Elder"}),
        );
        assert_eq!(old, json!({"name": "Rex", "stats": {"level": 1}, "title": null}));
        assert_eq!(new, json!({"name": "Ash", "stats": {"level": 2}, "title": "Elder"}));
    }

    #[test]
    fn arrays_become_indexed_objects() {
        let (old, new) = reduce(&json!(["a", "b", "c"]), &json!(["a", "x", "c", "d"]));
        assert_eq!(old, json!({"1": "b", "3": null}));
        assert_eq!(new, json!({"1": "x", "3": "d"}));
    }

    #[test]
    fn numerically_equal_values_are_dropped() {
        let (old, new) = reduce(&json!({"a": 1}), &json!({"a": 1.0}));
        assert_eq!(old, json!({}));
        assert_eq!(new, json!({}));
    }
}
