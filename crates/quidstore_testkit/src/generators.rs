//! Property-based test generators using proptest.
//!
//! Strategies produce JSON values that stay inside what the store can
//! persist: finite numbers and short printable keys.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Strategy for generating valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,23}").expect("Invalid regex")
}

/// Strategy for generating field names without path separators.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9]{0,11}")
        .expect("Invalid regex")
        .prop_filter("uuid is reserved", |s| s != "uuid")
}

/// Strategy for JSON primitives (the values the equality index keys).
pub fn json_primitive_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1_000i64..1_000).prop_map(Value::from),
        (-1_000.0f64..1_000.0).prop_map(|f| json!(f)),
        prop::string::string_regex("[a-zA-Z ]{0,12}")
            .expect("Invalid regex")
            .prop_map(Value::String),
    ]
}

/// Strategy for arbitrary JSON values up to a small depth.
pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    json_primitive_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name_strategy(), inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Strategy for partial profiles accepted by
/// [`profile_schema`](crate::fixtures::profile_schema).
pub fn profile_partial_strategy() -> impl Strategy<Value = Value> {
    (
        prop::option::of(prop::string::string_regex("[0-9]{6,8}").expect("Invalid regex")),
        prop::option::of(prop::string::string_regex("[A-Z][a-z]{2,8}").expect("Invalid regex")),
        prop::option::of(0i64..10_000),
        prop::option::of(0i64..=100),
    )
        .prop_map(|(user_id, name, experience, hp)| {
            let mut partial = Map::new();
            if let Some(v) = user_id {
                partial.insert("userId".into(), Value::String(v));
            }
            if let Some(v) = name {
                partial.insert("name".into(), Value::String(v));
            }
            if let Some(v) = experience {
                partial.insert("experience".into(), Value::from(v));
            }
            if let Some(v) = hp {
                partial.insert("hp".into(), Value::from(v));
            }
            Value::Object(partial)
        })
}

/// Strategy for simple filters over the profile fields.
pub fn profile_filter_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(json!({})),
        (0i64..10_000).prop_map(|n| json!({"experience": {"$gte": n}})),
        (0i64..=100).prop_map(|n| json!({"hp": n})),
        (0i64..=100).prop_map(|n| json!({"hp": {"$ne": n}})),
        prop::collection::vec(0i64..=100, 1..4).prop_map(|ns| json!({"hp": {"$in": ns}})),
        (0i64..=100, 0i64..10_000)
            .prop_map(|(hp, xp)| json!({"$or": [{"hp": hp}, {"experience": {"$lt": xp}}]})),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use quidstore_core::Filter;

    proptest! {
        #[test]
        fn filters_parse(filter in profile_filter_strategy()) {
            prop_assert!(Filter::parse(&filter).is_ok());
        }

        #[test]
        fn field_names_are_plain(name in field_name_strategy()) {
            prop_assert!(!name.contains('.'));
            prop_assert_ne!(name, "uuid");
        }

        #[test]
        fn values_serialize(value in json_value_strategy()) {
            prop_assert!(serde_json::to_vec(&value).is_ok());
        }
    }
}
