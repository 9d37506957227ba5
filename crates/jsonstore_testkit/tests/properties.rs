//! End-to-end checks of the store's observable guarantees.

use jsonstore_core::{
    DirtyState, FieldType, FieldValueMap, FindOptions, JsonStore, ProvisionOutcome, SearchFields,
    StoreError,
};
use jsonstore_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::{json, Value};

fn query(value: Value) -> FieldValueMap {
    value.as_object().cloned().unwrap()
}

fn names(store: &JsonStore, q: Value, exact: bool) -> Vec<String> {
    store
        .find("people", vec![query(q)], FindOptions::new().exact(exact))
        .unwrap()
        .into_iter()
        .map(|d| d.json["name"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn stored_dirty_documents_are_visible_and_pending() {
    let store = scenarios::ann_and_bob();
    let all = store.find_all("people", FindOptions::new()).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(store.count("people").unwrap(), 2);
    assert_eq!(store.dirty_count("people").unwrap(), 2);
    for doc in &all {
        assert_eq!(
            store.dirty_state("people", doc.id).unwrap(),
            Some(DirtyState::Add)
        );
        assert!(store.is_dirty("people", doc.id).unwrap());
    }
}

#[test]
fn dirty_removal_stays_pending_until_acknowledged() {
    let store = scenarios::ann_and_bob();
    let removed = store
        .remove("people", vec![query(json!({"name": "Ann"}))], true, true)
        .unwrap();
    assert_eq!(removed, 1);

    assert_eq!(names(&store, json!({"name": "Ann"}), true), Vec::<String>::new());
    assert_eq!(store.count("people").unwrap(), 1);
    assert_eq!(store.dirty_count("people").unwrap(), 2);

    let pending = store.all_dirty("people").unwrap();
    let ann = pending
        .iter()
        .find(|d| d.operation == DirtyState::Remove)
        .unwrap();
    assert_eq!(ann.document.json["name"], "Ann");

    assert!(store
        .mark_clean("people", ann.document.id, DirtyState::Remove)
        .unwrap());
    assert_eq!(store.dirty_state("people", ann.document.id).unwrap(), None);
    assert_eq!(store.dirty_count("people").unwrap(), 1);
    assert!(store
        .all_dirty("people")
        .unwrap()
        .iter()
        .all(|d| d.document.id != ann.document.id));
}

#[test]
fn exact_and_fuzzy_queries() {
    let store = scenarios::ann_and_bob();
    assert_eq!(names(&store, json!({"name": "Ann"}), true), vec!["Ann"]);
    assert_eq!(names(&store, json!({"name": "an"}), false), vec!["Ann"]);
    assert!(names(&store, json!({"name": "an"}), true).is_empty());
    assert_eq!(names(&store, json!({"age": 25}), true), vec!["Bob"]);

    let either = store
        .count_matching(
            "people",
            vec![query(json!({"name": "Ann"})), query(json!({"name": "Bob"}))],
            true,
        )
        .unwrap();
    assert_eq!(either, 2);

    assert!(matches!(
        store.find("people", vec![query(json!({"email": "x"}))], FindOptions::new()),
        Err(StoreError::QueryFieldNotIndexed { field, .. }) if field == "email"
    ));
}

fn tag_store() -> TestStore {
    let store = TestStore::memory();
    store
        .provision(
            "tags",
            SearchFields::new().with("tags", FieldType::String),
            SearchFields::new(),
        )
        .unwrap();
    store
        .store(
            "tags",
            vec![
                json!({"tags": "Red"}),
                json!({"tags": ["Red", "Blue"]}),
                json!({"tags": "x-@-y"}),
                json!({"tags": ["a-@", "b"]}),
            ],
            false,
        )
        .unwrap();
    store
}

fn tags(store: &JsonStore, value: &str, exact: bool) -> Vec<Value> {
    store
        .find("tags", vec![query(json!({"tags": value}))], FindOptions::new().exact(exact))
        .unwrap()
        .into_iter()
        .map(|d| d.json["tags"].clone())
        .collect()
}

#[test]
fn exact_match_on_multi_values_is_case_sensitive() {
    let store = tag_store();
    assert!(tags(&store, "red", true).is_empty());
    assert!(tags(&store, "blue", true).is_empty());
    assert_eq!(
        tags(&store, "Red", true),
        vec![json!("Red"), json!(["Red", "Blue"])]
    );
    assert_eq!(tags(&store, "Blue", true), vec![json!(["Red", "Blue"])]);

    let removed = store
        .remove("tags", vec![query(json!({"tags": "blue"}))], true, false)
        .unwrap();
    assert_eq!(removed, 0);
    assert_eq!(store.count("tags").unwrap(), 4);
}

#[test]
fn separator_inside_a_value_is_not_split() {
    let store = tag_store();
    assert!(tags(&store, "x", true).is_empty());
    assert!(tags(&store, "X", true).is_empty());
    assert!(tags(&store, "y", true).is_empty());
    assert_eq!(tags(&store, "x-@-y", true), vec![json!("x-@-y")]);
    assert!(tags(&store, "a", true).is_empty());
    assert_eq!(tags(&store, "a-@", true), vec![json!(["a-@", "b"])]);
    assert_eq!(tags(&store, "b", true), vec![json!(["a-@", "b"])]);
    assert_eq!(tags(&store, "x-@", false), vec![json!("x-@-y")]);
}

#[test]
fn fuzzy_match_folds_non_ascii_case() {
    let store = scenarios::ann_and_bob();
    store
        .store(
            "people",
            vec![json!({"name": "Émile", "age": 41}), json!({"name": "Ölaf", "age": 52})],
            true,
        )
        .unwrap();
    assert_eq!(names(&store, json!({"name": "émi"}), false), vec!["Émile"]);
    assert_eq!(names(&store, json!({"name": "ÖLA"}), false), vec!["Ölaf"]);
    assert_eq!(names(&store, json!({"name": "ÉMILE"}), false), vec!["Émile"]);
    assert!(names(&store, json!({"name": "emi"}), false).is_empty());
    assert!(names(&store, json!({"name": "émile"}), true).is_empty());
}

#[test]
fn failed_batch_stores_nothing() {
    let store = scenarios::ann_and_bob();
    let result = store.store(
        "people",
        vec![
            json!({"name": "Cy", "age": 40}),
            json!({"name": "Di", "age": "forty"}),
            json!({"name": "Ed", "age": 50}),
        ],
        true,
    );
    assert!(matches!(result, Err(StoreError::InvalidSchema { .. })));
    assert_eq!(store.count("people").unwrap(), 2);
    assert_eq!(store.dirty_count("people").unwrap(), 2);
}

#[test]
fn provisioning_is_idempotent_and_appends_keep_data() {
    let store = scenarios::ann_and_bob();
    assert_eq!(
        store
            .provision("people", scenarios::people_fields(), SearchFields::new())
            .unwrap(),
        ProvisionOutcome::Unchanged
    );
    assert_eq!(store.count("people").unwrap(), 2);

    let before = store.find_all("people", FindOptions::new()).unwrap();
    let extended = scenarios::people_fields().with("city", jsonstore_core::FieldType::String);
    assert!(matches!(
        store.provision("people", extended, SearchFields::new()).unwrap(),
        ProvisionOutcome::Extended { added } if added == vec!["city".to_string()]
    ));
    assert_eq!(store.find_all("people", FindOptions::new()).unwrap(), before);
    assert_eq!(names(&store, json!({"age": 30}), true), vec!["Ann"]);
    assert_eq!(store.keys("people").unwrap(), vec!["name", "age", "city"]);
}

#[test]
fn reordering_fields_is_refused() {
    let store = scenarios::ann_and_bob();
    let reordered = SearchFields::new()
        .with("age", jsonstore_core::FieldType::Integer)
        .with("name", jsonstore_core::FieldType::String);
    assert!(matches!(
        store.provision("people", reordered, SearchFields::new()),
        Err(StoreError::DestructiveSchemaChange { .. })
    ));
    assert_eq!(store.count("people").unwrap(), 2);
}

#[test]
fn encrypted_bodies_roundtrip_through_the_store() {
    let store = TestStore::encrypted("hunter2");
    scenarios::provision_people(&store);
    let doc = json!({"name": "Ann", "age": 30, "notes": ["secret", {"deep": true}]});
    store.store("people", vec![doc.clone()], false).unwrap();

    let found = store.find_all("people", FindOptions::new()).unwrap();
    assert_eq!(found[0].json, doc);
    assert_eq!(names(&store, json!({"name": "ann"}), false), vec!["Ann"]);
}

#[test]
fn wrong_or_missing_password_is_rejected() {
    let mut store = TestStore::encrypted("right");
    scenarios::provision_people(&store);
    store.store("people", vec![json!({"name": "Ann", "age": 1})], false).unwrap();

    assert!(matches!(
        store.reopen(Some("wrong")),
        Err(StoreError::EncryptionKeyInvalid)
    ));
    assert!(matches!(
        store.reopen(None),
        Err(StoreError::EncryptionKeyMissing)
    ));
    store.reopen(Some("right")).unwrap();
    assert_eq!(store.count("people").unwrap(), 1);
}

#[test]
fn rekey_then_reopen() {
    let mut store = TestStore::encrypted("old");
    scenarios::provision_people(&store);
    let docs = vec![
        json!({"name": "Ann", "age": 30, "tags": ["a", "b"]}),
        json!({"name": "Bob", "age": 25}),
    ];
    store.store("people", docs, true).unwrap();
    let before = store.find_all("people", FindOptions::new()).unwrap();

    store.change_password("old", "new").unwrap();
    assert_eq!(store.find_all("people", FindOptions::new()).unwrap(), before);

    store.reopen(Some("new")).unwrap();
    assert_eq!(store.find_all("people", FindOptions::new()).unwrap(), before);
    assert_eq!(store.dirty_count("people").unwrap(), 2);

    assert!(matches!(
        store.reopen(Some("old")),
        Err(StoreError::EncryptionKeyInvalid)
    ));
}

#[test]
fn change_password_with_wrong_old_password_keeps_data() {
    let store = TestStore::encrypted("old");
    scenarios::provision_people(&store);
    store.store("people", vec![json!({"name": "Ann", "age": 1})], false).unwrap();
    assert!(matches!(
        store.change_password("nope", "new"),
        Err(StoreError::EncryptionKeyInvalid)
    ));
    assert_eq!(store.count("people").unwrap(), 1);
}

#[test]
fn destroy_removes_the_user_directory() {
    let store = TestStore::file();
    scenarios::provision_people(&store);
    let dir = store.user_dir().unwrap();
    assert!(dir.is_dir());
    store.destroy().unwrap();
    assert!(!dir.exists());
    assert!(!store.is_open().unwrap());
    assert!(matches!(store.count("people"), Err(StoreError::StoreNotOpen)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn stored_documents_come_back_unchanged(docs in document_batch_strategy(8)) {
        let store = TestStore::memory();
        scenarios::provision_people(&store);
        let ids = store
            .store_with("people", docs.clone(), FieldValueMap::new(), true)
            .unwrap();
        prop_assert_eq!(ids.len(), docs.len());
        let found = store.find_by_ids("people", ids.clone()).unwrap();
        let bodies: Vec<Value> = found.into_iter().map(|d| d.json).collect();
        prop_assert_eq!(bodies, docs);
        prop_assert_eq!(store.dirty_count("people").unwrap(), ids.len() as u64);
    }

    #[test]
    fn exact_tag_match_finds_array_members(docs in document_batch_strategy(6)) {
        let store = TestStore::memory();
        store
            .provision(
                "people",
                scenarios::people_fields().with("tags", jsonstore_core::FieldType::String),
                SearchFields::new(),
            )
            .unwrap();
        store.store("people", docs.clone(), false).unwrap();
        for tag in docs.iter().flat_map(|d| d["tags"].as_array().cloned().unwrap_or_default()) {
            let expected = docs
                .iter()
                .filter(|d| d["tags"].as_array().is_some_and(|t| t.contains(&tag)))
                .count() as u64;
            let mut q = FieldValueMap::new();
            q.insert("tags".to_string(), tag.clone());
            prop_assert_eq!(store.count_matching("people", vec![q], true).unwrap(), expected);
        }
    }

    #[test]
    fn lifecycle_matches_model(
        docs in prop::collection::vec(document_strategy(), 1..6),
        ops in prop::collection::vec((0usize..4, any::<prop::sample::Index>(), any::<bool>()), 0..24),
    ) {
        let mut harness = ModelHarness::new();
        harness.store(docs.clone(), true);
        for (kind, pick, dirty) in ops {
            let ids = harness.ids();
            if ids.is_empty() {
                break;
            }
            let id = ids[pick.index(ids.len())];
            match kind {
                0 => {
                    harness.replace(id, docs[pick.index(docs.len())].clone(), dirty);
                }
                1 => {
                    harness.remove(id, dirty);
                }
                2 => {
                    for state in [DirtyState::Add, DirtyState::Replace, DirtyState::Remove] {
                        harness.mark_clean(id, state);
                    }
                }
                _ => {
                    harness.store(vec![docs[pick.index(docs.len())].clone()], dirty);
                }
            }
        }
        harness.verify();
    }
}
