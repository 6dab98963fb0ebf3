//! Schema reconciliation of stored documents.
//!
//! When a schema gains, loses or retypes fields, documents written under the
//! old schema are brought up to date by [`reconcile`]:
//!
//! - missing fields receive their default
//! - present fields are kept and reconciled recursively against nested
//!   object, array and nest schemas
//! - values of the wrong type are replaced by the default
//! - fields the schema no longer declares are dropped
//!
//! Reconciliation is idempotent: reconciling its own output changes nothing.

use crate::document::Document;
use crate::schema::{FieldSchema, Schema, Shape};
use serde_json::{Map, Value};

/// Outcome of reconciling one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// The reconciled document.
    pub document: Document,
    /// Whether the document differs from its input.
    pub changed: bool,
}

/// Summary of a collection-wide migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Documents examined.
    pub scanned: usize,
    /// Documents rewritten because reconciliation changed them.
    pub rewritten: usize,
    /// Documents skipped because they could not be decoded.
    pub skipped: usize,
}

/// Reconciles `old` against `schema`.
#[must_use]
pub fn reconcile(old: &Document, schema: &Schema) -> Reconciled {
    let fields = reconcile_fields(old.as_map(), schema);
    let changed = &fields != old.as_map();
    Reconciled {
        document: Document::from(fields),
        changed,
    }
}

fn reconcile_fields(old: &Map<String, Value>, schema: &Schema) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, field) in schema.fields() {
        let value = match old.get(name) {
            Some(existing) => reconcile_value(existing, field),
            None => field.default_value().cloned(),
        };
        if let Some(value) = value {
            out.insert(name.to_string(), value);
        }
    }
    out
}

fn reconcile_value(value: &Value, field: &FieldSchema) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    if !field.accepts(value) {
        return field.default_value().cloned();
    }
    let reconciled = match (field.shape(), value) {
        (Shape::Object(fields), Value::Object(map)) => Value::Object(reconcile_fields(map, fields)),
        (Shape::Array(element), Value::Array(items)) => Value::Array(
            items
                .iter()
                .filter_map(|item| reconcile_value(item, element))
                .collect(),
        ),
        (Shape::Nest(inner), Value::Object(map)) => Value::Object(
            map.iter()
                .filter_map(|(key, item)| {
                    reconcile_value(item, inner).map(|v| (key.clone(), v))
                })
                .collect(),
        ),
        _ => value.clone(),
    };
    Some(reconciled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn profile_schema() -> Schema {
        Schema::from_json(&json!({
            "userId": {"type": "string", "locked": true},
            "name": "",
            "hp": 100,
            "stats": {"type": "object", "default": {"level": 1, "xp": 0}},
            "tags": {"type": "array", "default": [{"type": "string"}]},
            "quids": {"type": "nest", "default": {"name": "", "energy": 100}},
            "extra": {"type": "object", "default": {}},
            "note": {"type": "any"},
            "ghost": {"type": "undefined"},
        }))
        .unwrap()
    }

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn fills_missing_fields() {
        let out = reconcile(&doc(json!({"uuid": "a1", "name": "Rex"})), &profile_schema());
        assert!(out.changed);
        assert_eq!(
            out.document.into_value(),
            json!({
                "uuid": "a1",
                "userId": "",
                "name": "Rex",
                "hp": 100,
                "stats": {"level": 1, "xp": 0},
                "tags": [],
                "quids": {},
                "extra": {},
                "note": null,
            })
        );
    }

    #[test]
    fn drops_removed_fields_and_replaces_mistyped() {
        let out = reconcile(
            &doc(json!({"uuid": "a1", "hp": "lots", "legacy": true, "ghost": 3})),
            &profile_schema(),
        );
        let d = out.document;
        assert_eq!(d.get("hp"), Some(&json!(100)));
        assert!(!d.contains_key("legacy"));
        assert!(!d.contains_key("ghost"));
    }

    #[test]
    fn keeps_null_and_existing_values() {
        let out = reconcile(
            &doc(json!({"uuid": "a1", "name": null, "hp": 42, "note": [1, 2]})),
            &profile_schema(),
        );
        let d = out.document;
        assert_eq!(d.get("name"), Some(&Value::Null));
        assert_eq!(d.get("hp"), Some(&json!(42)));
        assert_eq!(d.get("note"), Some(&json!([1, 2])));
    }

    #[test]
    fn recurses_into_nested_shapes() {
        let out = reconcile(
            &doc(json!({
                "uuid": "a1",
                "stats": {"level": 3, "old": 1},
                "tags": ["a", 7, "b"],
                "quids": {"q1": {"name": "Ash"}, "q2": "broken"},
                "extra": {"anything": {"goes": true}},
            })),
            &profile_schema(),
        );
        let d = out.document;
        assert_eq!(d.get("stats"), Some(&json!({"level": 3, "xp": 0})));
        assert_eq!(d.get("tags"), Some(&json!(["a", "", "b"])));
        assert_eq!(
            d.get("quids"),
            Some(&json!({
                "q1": {"name": "Ash", "energy": 100},
                "q2": {"name": "", "energy": 100},
            }))
        );
        assert_eq!(d.get("extra"), Some(&json!({"anything": {"goes": true}})));
    }

    #[test]
    fn second_pass_is_a_fixed_point() {
        let schema = profile_schema();
        let first = reconcile(&doc(json!({"uuid": "x", "stats": 5})), &schema);
        let second = reconcile(&first.document, &schema);
        assert!(!second.changed);
        assert_eq!(second.document, first.document);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(Value::from),
            "[a-z]{0,6}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,5}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_document() -> impl Strategy<Value = Document> {
        let keys = prop_oneof![
            Just("uuid".to_string()),
            Just("name".to_string()),
            Just("hp".to_string()),
            Just("stats".to_string()),
            Just("tags".to_string()),
            Just("quids".to_string()),
            Just("extra".to_string()),
            Just("ghost".to_string()),
            "[a-z]{1,6}",
        ];
        prop::collection::btree_map(keys, arb_json(), 0..8)
            .prop_map(|m| Document::from(m.into_iter().collect::<Map<String, Value>>()))
    }

    proptest! {
        #[test]
        fn reconcile_is_idempotent(input in arb_document()) {
            let schema = profile_schema();
            let first = reconcile(&input, &schema);
            let second = reconcile(&first.document, &schema);
            prop_assert!(!second.changed);
            prop_assert_eq!(second.document, first.document);
        }

        #[test]
        fn reconciled_documents_pass_schema_check(input in arb_document()) {
            let schema = profile_schema();
            let out = reconcile(&input, &schema);
            prop_assert!(schema.check(out.document.as_map()).is_ok());
        }
    }
}
