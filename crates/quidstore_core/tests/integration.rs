//! End-to-end tests of collections over real and in-memory stores.

use proptest::prelude::*;
use quidstore_core::{
    CollectionStore, Config, CoreError, Document, Filter, IdGenerator, Schema,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn fast_config() -> Config {
    Config::default().sync_on_write(false)
}

fn rex_schema() -> Schema {
    Schema::from_json(&json!({
        "name": {"type": "string", "default": ""},
        "hp": {"type": "number", "default": 100},
    }))
    .unwrap()
}

fn values_of(docs: &[Document], field: &str) -> Vec<Value> {
    docs.iter()
        .map(|d| d.get(field).cloned().unwrap_or(Value::Null))
        .collect()
}

#[test]
fn rex_lifecycle() {
    let temp = tempdir().unwrap();
    let store = CollectionStore::open(temp.path(), fast_config()).unwrap();
    let profiles = store.collection("profiles", rex_schema()).unwrap();

    let rex = profiles.create(json!({"name": "Rex"})).unwrap();
    let id = rex.uuid().unwrap().to_string();
    assert_eq!(rex.get("name"), Some(&json!("Rex")));
    assert_eq!(rex.get("hp"), Some(&json!(100)));

    let hurt = profiles
        .find_one_and_update(&json!({"uuid": id}), &json!({"$inc": {"hp": -30}}))
        .unwrap()
        .unwrap();
    assert_eq!(hurt.get("hp"), Some(&json!(70)));

    let err = profiles
        .find_one_and_update(&json!({"uuid": id}), &json!({"$set": {"hp": "dead"}}))
        .unwrap_err();
    assert!(matches!(err, CoreError::FieldTypeMismatch { .. }));
    let still = profiles.find_one(&json!({"uuid": id})).unwrap().unwrap();
    assert_eq!(still.get("hp"), Some(&json!(70)));

    let file = temp.path().join("profiles").join(format!("{id}.json"));
    assert!(file.exists());
    let deleted = profiles.find_one_and_delete(&json!({"uuid": id})).unwrap();
    assert_eq!(deleted.unwrap().get("hp"), Some(&json!(70)));
    assert!(!file.exists());
    assert!(profiles.find_one(&json!({"uuid": id})).unwrap().is_none());
}

#[test]
fn create_round_trips_through_find() {
    let store = CollectionStore::in_memory(Config::default());
    let profiles = store.collection("profiles", rex_schema()).unwrap();

    let created = profiles.create(json!({"name": "Ash"})).unwrap();
    let found = profiles
        .find_one(&json!({"uuid": created.uuid()}))
        .unwrap()
        .unwrap();
    assert_eq!(found, created);
    assert_eq!(
        found.into_value(),
        json!({"uuid": created.uuid(), "name": "Ash", "hp": 100})
    );
}

#[test]
fn concurrent_creates_get_distinct_ids() {
    let temp = tempdir().unwrap();
    let store = CollectionStore::open(temp.path(), fast_config()).unwrap();
    let profiles = store.collection("profiles", rex_schema()).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let profiles = Arc::clone(&profiles);
            thread::spawn(move || {
                (0..25)
                    .map(|i| {
                        profiles
                            .create(json!({"name": format!("quid-{t}-{i}")}))
                            .unwrap()
                            .uuid()
                            .unwrap()
                            .to_string()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(ids.insert(id), "duplicate id");
        }
    }
    assert_eq!(ids.len(), 200);
    assert_eq!(profiles.len().unwrap(), 200);
}

#[test]
fn concurrent_increments_are_not_lost() {
    let temp = tempdir().unwrap();
    let store = CollectionStore::open(temp.path(), fast_config()).unwrap();
    let profiles = store.collection("profiles", rex_schema()).unwrap();
    let id = profiles
        .create(json!({"name": "Rex"}))
        .unwrap()
        .uuid()
        .unwrap()
        .to_string();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let profiles = Arc::clone(&profiles);
            let id = id.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    profiles
                        .find_one_and_update(&json!({"uuid": id}), &json!({"$inc": {"hp": 1}}))
                        .unwrap()
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let rex = profiles.get(&id).unwrap().unwrap();
    assert_eq!(rex.get("hp"), Some(&json!(300)));
}

#[test]
fn increment_persists() {
    let temp = tempdir().unwrap();
    let schema = Schema::from_json(&json!({"userId": "", "experience": 0})).unwrap();
    {
        let store = CollectionStore::open(temp.path(), fast_config()).unwrap();
        let profiles = store.collection("profiles", schema.clone()).unwrap();
        profiles.create(json!({"userId": "u1", "experience": 15})).unwrap();
        profiles
            .find_one_and_update(&json!({"userId": "u1"}), &json!({"$inc": {"experience": 10}}))
            .unwrap();
    }

    let store = CollectionStore::open(temp.path(), fast_config()).unwrap();
    let profiles = store.collection("profiles", schema).unwrap();
    let found = profiles.find_one(&json!({"userId": "u1"})).unwrap().unwrap();
    assert_eq!(found.get("experience"), Some(&json!(25)));
}

#[test]
fn or_nin_gt_predicates() {
    let store = CollectionStore::in_memory(Config::default());
    let schema = Schema::from_json(&json!({
        "label": "",
        "a": {"type": ["undefined", "number", "string"]},
    }))
    .unwrap();
    let items = store.collection("items", schema).unwrap();
    for (label, a) in [
        ("one", json!(1)),
        ("two", json!(2)),
        ("three", json!(3)),
        ("ten", json!(10)),
        ("text", json!("7")),
    ] {
        items.create(json!({"label": label, "a": a})).unwrap();
    }
    items.create(json!({"label": "none"})).unwrap();

    let labels = |filter: Value| {
        let mut found: Vec<String> = values_of(&items.find(&filter).unwrap(), "label")
            .into_iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect();
        found.sort();
        found
    };

    assert_eq!(labels(json!({"$or": [{"a": 1}, {"a": 2}]})), vec!["one", "two"]);
    assert_eq!(
        labels(json!({"a": {"$nin": [1, 2]}})),
        vec!["ten", "text", "three"]
    );
    assert_eq!(labels(json!({"a": {"$gt": 5}})), vec!["ten"]);
    assert_eq!(labels(json!({"a": {"$exists": false}})), vec!["none"]);
}

#[test]
fn schema_changes_migrate_on_reopen() {
    let temp = tempdir().unwrap();
    let id;
    {
        let store = CollectionStore::open(temp.path(), fast_config()).unwrap();
        let profiles = store.collection("profiles", rex_schema()).unwrap();
        id = profiles
            .create(json!({"name": "Rex"}))
            .unwrap()
            .uuid()
            .unwrap()
            .to_string();
    }

    let v2 = Schema::from_json(&json!({
        "name": "",
        "hp": "full",
        "stats": {"type": "object", "default": {"level": 1}},
    }))
    .unwrap();
    let store = CollectionStore::open(temp.path(), fast_config()).unwrap();
    let profiles = store.collection("profiles", v2).unwrap();
    let rex = profiles.get(&id).unwrap().unwrap();
    assert_eq!(
        rex.into_value(),
        json!({"uuid": id, "name": "Rex", "hp": "full", "stats": {"level": 1}})
    );

    let again = profiles.migrate_all().unwrap();
    assert_eq!(again.rewritten, 0);
    assert_eq!(again.scanned, 1);
}

#[test]
fn locked_fields_reject_updates() {
    let store = CollectionStore::in_memory(Config::default());
    let schema = Schema::from_json(&json!({
        "userId": {"type": "string", "locked": true},
        "name": "",
    }))
    .unwrap();
    let profiles = store.collection("profiles", schema).unwrap();
    profiles.create(json!({"userId": "u1", "name": "Rex"})).unwrap();

    for update in [
        json!({"$set": {"userId": "u2"}}),
        json!({"$set": {"uuid": "other"}}),
    ] {
        let err = profiles
            .find_one_and_update(&json!({"userId": "u1"}), &update)
            .unwrap_err();
        assert!(matches!(err, CoreError::LockedField { .. }));
    }
    assert_eq!(profiles.count(&json!({"userId": "u1"})).unwrap(), 1);
}

struct Constant;

impl IdGenerator for Constant {
    fn generate(&self) -> String {
        "always-the-same".to_string()
    }
}

#[test]
fn colliding_generator_exhausts() {
    let store = CollectionStore::in_memory(Config::default().max_id_attempts(3))
        .with_id_generator(Arc::new(Constant));
    let profiles = store.collection("profiles", rex_schema()).unwrap();

    let first = profiles.create(json!({"name": "Rex"})).unwrap();
    assert_eq!(first.uuid(), Some("always-the-same"));

    let err = profiles.create(json!({"name": "Ash"})).unwrap_err();
    assert!(matches!(err, CoreError::IdExhausted { attempts: 3 }));
    assert_eq!(profiles.len().unwrap(), 1);
}

#[test]
fn corrupted_files_are_skipped_on_open() {
    let temp = tempdir().unwrap();
    std::fs::create_dir_all(temp.path().join("profiles")).unwrap();
    std::fs::write(temp.path().join("profiles").join("broken.json"), b"{\"name\": ").unwrap();
    std::fs::write(
        temp.path().join("profiles").join("good.json"),
        br#"{"uuid": "good", "name": "Rex"}"#,
    )
    .unwrap();

    let store = CollectionStore::open(temp.path(), fast_config()).unwrap();
    let profiles = store.collection("profiles", rex_schema()).unwrap();

    assert_eq!(
        profiles.get("good").unwrap().unwrap().get("hp"),
        Some(&json!(100))
    );
    assert!(matches!(profiles.get("broken"), Err(CoreError::Codec { .. })));
    assert!(matches!(
        profiles.find(&json!({})),
        Err(CoreError::Codec { .. })
    ));
}

fn indexed_schema() -> Schema {
    Schema::from_json(&json!({"userId": "", "serverId": "", "hp": 100})).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn index_and_scan_agree(
        rows in prop::collection::vec((0..3u8, 0..3u8, 0..200i64), 0..20),
        user in 0..4u8,
        server in 0..4u8,
        threshold in 0..200i64,
    ) {
        let store = CollectionStore::in_memory(Config::default());
        let profiles = store.collection("profiles", indexed_schema()).unwrap();
        for (u, s, hp) in rows {
            profiles
                .create(json!({"userId": format!("u{u}"), "serverId": format!("s{s}"), "hp": hp}))
                .unwrap();
        }

        let filters = [
            json!({"userId": format!("u{user}")}),
            json!({"userId": format!("u{user}"), "serverId": format!("s{server}")}),
            json!({"serverId": format!("s{server}"), "hp": {"$gt": threshold}}),
            json!({"$or": [{"userId": format!("u{user}")}, {"hp": {"$lte": threshold}}]}),
        ];
        for raw in filters {
            let filter = Filter::parse(&raw).unwrap();
            prop_assert_eq!(profiles.find_where(&filter).unwrap(), profiles.scan(&filter).unwrap());
        }
    }
}
