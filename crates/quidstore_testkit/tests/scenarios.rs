//! End-to-end scenarios across the storage and core crates.

use proptest::prelude::*;
use quidstore_core::{
    ActorContext, ChangeType, CollectionStore, Config, ContextResolver, CoreError, Filter, Schema,
};
use quidstore_storage::DocumentBackend;
use quidstore_testkit::prelude::*;
use serde_json::json;
use std::sync::Arc;

struct GuildNames;

impl ContextResolver for GuildNames {
    fn user_label(&self, user_id: &str) -> Option<String> {
        (user_id == "1001").then(|| "Ash#0001".to_string())
    }

    fn server_label(&self, server_id: &str) -> Option<String> {
        (server_id == "77").then(|| "Moonpaw Pack".to_string())
    }
}

#[test]
fn change_feed_follows_a_profile_lifecycle() {
    let store = CollectionStore::in_memory(Config::default()).with_resolver(Arc::new(GuildNames));
    let events = store.subscribe();
    let profiles = store.collection("profiles", profile_schema()).unwrap();

    let rex = profiles
        .create(json!({"userId": "1001", "serverId": "77", "name": "Rex"}))
        .unwrap();
    let uuid = rex.uuid().unwrap().to_string();
    profiles
        .find_one_and_update(&json!({"uuid": uuid}), &json!({"$inc": {"experience": 5}}))
        .unwrap()
        .unwrap();
    profiles.find_one_and_delete(&json!({"name": "Rex"})).unwrap().unwrap();

    let received: Vec<_> = events.try_iter().collect();
    let kinds: Vec<_> = received.iter().map(|e| e.change_type).collect();
    assert_eq!(kinds, vec![ChangeType::Insert, ChangeType::Update, ChangeType::Delete]);
    assert_eq!(
        received.iter().map(|e| e.sequence).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(received.iter().all(|e| e.uuid == uuid && e.collection == "profiles"));
    let updated = received[1].document.as_ref().unwrap();
    assert_eq!(updated.get("experience"), Some(&json!(5)));

    let actor = ActorContext::resolve(&rex, &GuildNames);
    assert_eq!(actor.to_string(), "Ash#0001 in Moonpaw Pack");
}

#[test]
fn reopening_with_a_grown_schema_fills_new_fields() {
    let store = TestStore::file();
    let v1 = Schema::from_json(&json!({"userId": "", "name": ""})).unwrap();
    let created = store
        .collection("profiles", v1)
        .unwrap()
        .create(json!({"userId": "1001", "name": "Rex"}))
        .unwrap();
    let uuid = created.uuid().unwrap().to_string();

    let store = store.reopen();
    let profile: Profile = store
        .profiles()
        .get(&uuid)
        .unwrap()
        .unwrap()
        .deserialize()
        .unwrap();
    assert_eq!(profile.name, "Rex");
    assert_eq!(profile.hp, 100);
    assert_eq!(profile.rank, "Youngling");

    // Migration rewrote the file itself.
    let raw = store.raw_backend("profiles").read(&uuid).unwrap().unwrap();
    let on_disk: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(on_disk["hp"], json!(100));
}

#[test]
fn planted_garbage_does_not_block_opening() {
    let store = TestStore::file();
    let rex = store.profiles().create(json!({"name": "Rex"})).unwrap();
    store
        .raw_backend("profiles")
        .write("broken-doc", b"{ not json")
        .unwrap();

    let store = store.reopen();
    let profiles = store.profiles();
    assert_eq!(profiles.get(rex.uuid().unwrap()).unwrap(), Some(rex.clone()));
    // Equality on uuid never touches the broken file.
    assert_eq!(
        profiles.find(&json!({"uuid": rex.uuid().unwrap()})).unwrap().len(),
        1
    );
    // A full scan does, and reports it.
    assert!(matches!(
        profiles.find(&json!({"hp": {"$gt": 0}})),
        Err(CoreError::Codec { .. })
    ));
}

#[test]
fn nested_quids_are_updated_in_place() {
    with_temp_store(|store| {
        let profiles = store.collection("profiles", profile_schema()).unwrap();
        let doc = profiles
            .create(json!({"userId": "1001", "quids": {"q1": {"name": "Rex", "species": "wolf"}}}))
            .unwrap();
        let uuid = doc.uuid().unwrap();

        let updated = profiles
            .find_one_and_update(
                &json!({"uuid": uuid}),
                &json!({"$set": {"quids.q1.name": "Rexy"}, "$inc": {"quids.q1.energy": -10}}),
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.get_path("quids.q1.name"), Some(&json!("Rexy")));
        assert_eq!(updated.get_path("quids.q1.energy"), Some(&json!(90)));

        let locked = profiles.find_one_and_update(
            &json!({"uuid": uuid}),
            &json!({"$set": {"userId": "2002"}}),
        );
        assert!(matches!(locked, Err(CoreError::LockedField { .. })));
        assert_eq!(profiles.get(uuid).unwrap(), Some(updated));
    });
}

#[test]
fn concurrent_workload_on_disk() {
    let store = TestStore::file();
    let profiles = store.profiles();
    let (result, ids) = concurrent_creates(&profiles, &StressConfig::default());
    assert_eq!(result.failed_ops, 0);
    assert!(all_unique(&ids));
    assert_eq!(store.raw_backend("profiles").list().unwrap().len(), ids.len());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn indexed_and_scanned_queries_agree(
        partials in prop::collection::vec(profile_partial_strategy(), 0..12),
        filter in profile_filter_strategy(),
    ) {
        let store = CollectionStore::in_memory(Config::default().index_fields(["userId", "hp"]));
        let profiles = store.collection("profiles", profile_schema()).unwrap();
        for partial in partials {
            profiles.create(partial).unwrap();
        }

        let parsed = Filter::parse(&filter).unwrap();
        let found = profiles.find_where(&parsed).unwrap();
        let scanned = profiles.scan(&parsed).unwrap();
        prop_assert_eq!(found, scanned);
    }
}
