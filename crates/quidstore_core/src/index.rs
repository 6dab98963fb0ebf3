//! In-memory equality index over selected top-level fields.

use crate::document::Document;
use crate::filter::Filter;
use serde_json::{Number, Value};
use std::collections::{BTreeSet, HashMap};

/// Hash index mapping field values to document ids.
///
/// Only primitive values are indexed. Values are keyed so that numbers
/// that compare equal (`1` and `1.0`) share a key, matching filter
/// equality.
///
/// # Example
///
/// ```rust,ignore
/// let mut index = FieldIndex::new(["userId"]);
/// index.insert("a1", &document);
///
/// let ids = index.lookup("userId", &json!("u1"));
/// ```
#[derive(Debug, Default)]
pub struct FieldIndex {
    /// Field -> key -> document ids.
    entries: HashMap<String, HashMap<String, BTreeSet<String>>>,
    /// Document id -> the (field, key) pairs it is indexed under.
    documents: HashMap<String, Vec<(String, String)>>,
}

impl FieldIndex {
    /// Creates an empty index over `fields`.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: fields.into_iter().map(|f| (f.into(), HashMap::new())).collect(),
            documents: HashMap::new(),
        }
    }

    /// Returns `true` if `field` is indexed.
    #[must_use]
    pub fn covers(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    /// Indexes `document` under `id`, replacing any earlier entry.
    pub fn insert(&mut self, id: &str, document: &Document) {
        self.remove(id);
        let mut keys = Vec::new();
        for (field, values) in &mut self.entries {
            if let Some(key) = document.get(field).and_then(index_key) {
                values.entry(key.clone()).or_default().insert(id.to_string());
                keys.push((field.clone(), key));
            }
        }
        self.documents.insert(id.to_string(), keys);
    }

    /// Removes the entry for `id`.
    ///
    /// Returns `true` if the document was indexed.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(keys) = self.documents.remove(id) else {
            return false;
        };
        for (field, key) in keys {
            if let Some(values) = self.entries.get_mut(&field) {
                if let Some(ids) = values.get_mut(&key) {
                    ids.remove(id);
                    if ids.is_empty() {
                        values.remove(&key);
                    }
                }
            }
        }
        true
    }

    /// Returns the ids of documents whose `field` equals `value`.
    ///
    /// Returns `None` if the field is not indexed or the value is not a
    /// primitive.
    #[must_use]
    pub fn lookup(&self, field: &str, value: &Value) -> Option<BTreeSet<String>> {
        let values = self.entries.get(field)?;
        let key = index_key(value)?;
        Some(values.get(&key).cloned().unwrap_or_default())
    }

    /// Returns the only ids that can match `filter`, if the index can tell.
    ///
    /// Intersects the lookups of every indexed field the filter requires to
    /// equal a primitive literal.
    #[must_use]
    pub fn candidates(&self, filter: &Filter) -> Option<BTreeSet<String>> {
        let mut result: Option<BTreeSet<String>> = None;
        for field in self.entries.keys() {
            let Some(ids) = filter
                .required_equality(field)
                .and_then(|value| self.lookup(field, value))
            else {
                continue;
            };
            result = Some(match result {
                Some(acc) => acc.intersection(&ids).cloned().collect(),
                None => ids,
            });
        }
        result
    }

    /// Returns the number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns `true` if no document is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Drops every entry, keeping the indexed fields.
    pub fn clear(&mut self) {
        for values in self.entries.values_mut() {
            values.clear();
        }
        self.documents.clear();
    }
}

fn index_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("null".to_string()),
        Value::Bool(b) => Some(format!("b:{b}")),
        Value::String(s) => Some(format!("s:{s}")),
        Value::Number(n) => Some(format!("n:{}", number_key(n))),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn number_key(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    let f = n.as_f64().unwrap_or(f64::NAN);
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        return (f as i64).to_string();
    }
    f.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn insert_and_lookup() {
        let mut index = FieldIndex::new(["userId", "serverId"]);
        index.insert("a", &doc(json!({"userId": "u1", "serverId": "s1"})));
        index.insert("b", &doc(json!({"userId": "u1", "serverId": "s2"})));

        assert_eq!(index.lookup("userId", &json!("u1")), Some(ids(&["a", "b"])));
        assert_eq!(index.lookup("serverId", &json!("s3")), Some(BTreeSet::new()));
        assert_eq!(index.lookup("name", &json!("Rex")), None);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn reinsert_moves_entries() {
        let mut index = FieldIndex::new(["userId"]);
        index.insert("a", &doc(json!({"userId": "u1"})));
        index.insert("a", &doc(json!({"userId": "u2"})));

        assert_eq!(index.lookup("userId", &json!("u1")), Some(BTreeSet::new()));
        assert_eq!(index.lookup("userId", &json!("u2")), Some(ids(&["a"])));
    }

    #[test]
    fn remove_entries() {
        let mut index = FieldIndex::new(["userId"]);
        index.insert("a", &doc(json!({"userId": "u1"})));
        assert!(index.remove("a"));
        assert!(!index.remove("a"));
        assert!(index.is_empty());
        assert_eq!(index.lookup("userId", &json!("u1")), Some(BTreeSet::new()));
    }

    #[test]
    fn numbers_share_keys_across_representations() {
        let mut index = FieldIndex::new(["level"]);
        index.insert("a", &doc(json!({"level": 2})));
        index.insert("b", &doc(json!({"level": 2.0})));
        index.insert("c", &doc(json!({"level": "2"})));

        assert_eq!(index.lookup("level", &json!(2.0)), Some(ids(&["a", "b"])));
        assert_eq!(index.lookup("level", &json!("2")), Some(ids(&["c"])));
    }

    #[test]
    fn composite_values_are_not_indexed() {
        let mut index = FieldIndex::new(["tags"]);
        index.insert("a", &doc(json!({"tags": ["x"]})));
        assert_eq!(index.lookup("tags", &json!(["x"])), None);
    }

    #[test]
    fn candidates_intersect_required_equalities() {
        let mut index = FieldIndex::new(["userId", "serverId"]);
        index.insert("a", &doc(json!({"userId": "u1", "serverId": "s1"})));
        index.insert("b", &doc(json!({"userId": "u1", "serverId": "s2"})));
        index.insert("c", &doc(json!({"userId": "u2", "serverId": "s1"})));

        let filter = Filter::parse(&json!({"userId": "u1", "serverId": "s1"})).unwrap();
        assert_eq!(index.candidates(&filter), Some(ids(&["a"])));

        let filter = Filter::parse(&json!({"serverId": "s1", "hp": {"$gt": 0}})).unwrap();
        assert_eq!(index.candidates(&filter), Some(ids(&["a", "c"])));

        let filter = Filter::parse(&json!({"$or": [{"userId": "u1"}]})).unwrap();
        assert_eq!(index.candidates(&filter), None);
    }
}
