//! Model-based integration helpers.
//!
//! [`ModelHarness`] applies every operation both to a real store and to a
//! plain in-memory model of what the store should contain, then checks the
//! two agree.

use crate::fixtures::{scenarios, TestStore};
use jsonstore_core::{DirtyState, Document, DocumentId, FindOptions, JsonStore};
use serde_json::Value;
use std::collections::BTreeMap;

/// Collection the harness works on.
pub const MODEL_COLLECTION: &str = "people";

#[derive(Debug, Clone, PartialEq)]
struct ModelRow {
    json: Value,
    state: DirtyState,
}

/// A test harness that tracks the expected contents of `people`.
pub struct ModelHarness {
    /// The store under test.
    pub store: TestStore,
    rows: BTreeMap<DocumentId, ModelRow>,
}

impl ModelHarness {
    /// Creates a harness over a fresh in-memory store.
    pub fn new() -> Self {
        Self::over(TestStore::memory())
    }

    /// Creates a harness over `store`, provisioning `people` on it.
    pub fn over(store: TestStore) -> Self {
        scenarios::provision_people(&store);
        Self {
            store,
            rows: BTreeMap::new(),
        }
    }

    fn handle(&self) -> &JsonStore {
        &self.store
    }

    /// Stores documents and tracks their ids.
    pub fn store(&mut self, documents: Vec<Value>, mark_dirty: bool) -> Vec<DocumentId> {
        let ids = self
            .handle()
            .store_with(MODEL_COLLECTION, documents.clone(), Default::default(), mark_dirty)
            .expect("Failed to store documents");
        let state = if mark_dirty {
            DirtyState::Add
        } else {
            DirtyState::Clean
        };
        for (id, json) in ids.iter().zip(documents) {
            self.rows.insert(*id, ModelRow { json, state });
        }
        ids
    }

    /// Replaces one document. Returns whether the store replaced it.
    pub fn replace(&mut self, id: DocumentId, json: Value, mark_dirty: bool) -> bool {
        let outcome = self
            .handle()
            .replace(MODEL_COLLECTION, vec![Document::new(id, json.clone())], mark_dirty)
            .expect("Failed to replace document");
        let replaced = outcome.replaced == 1;
        if let Some(row) = self.rows.get_mut(&id) {
            if row.state != DirtyState::Remove {
                assert!(replaced, "live document {id} was not replaced");
                row.json = json;
                if mark_dirty && row.state != DirtyState::Add {
                    row.state = DirtyState::Replace;
                }
            }
        }
        replaced
    }

    /// Removes one document by id.
    pub fn remove(&mut self, id: DocumentId, mark_dirty: bool) -> usize {
        let removed = self
            .handle()
            .remove_by_ids(MODEL_COLLECTION, vec![id], mark_dirty)
            .expect("Failed to remove document");
        let live = self.rows.get(&id).is_some_and(|r| r.state != DirtyState::Remove);
        if live {
            if mark_dirty {
                self.rows.entry(id).and_modify(|r| r.state = DirtyState::Remove);
            } else {
                self.rows.remove(&id);
            }
        }
        removed
    }

    /// Acknowledges a pending operation.
    pub fn mark_clean(&mut self, id: DocumentId, operation: DirtyState) -> bool {
        let cleaned = self
            .handle()
            .mark_clean(MODEL_COLLECTION, id, operation)
            .expect("Failed to mark clean");
        let expected = self.rows.get(&id).is_some_and(|r| r.state == operation);
        assert_eq!(cleaned, expected, "mark_clean({id}, {operation}) disagreed");
        if expected {
            if operation == DirtyState::Remove {
                self.rows.remove(&id);
            } else if let Some(row) = self.rows.get_mut(&id) {
                row.state = DirtyState::Clean;
            }
        }
        cleaned
    }

    /// Ids of every tracked document, pending removals included.
    pub fn ids(&self) -> Vec<DocumentId> {
        self.rows.keys().copied().collect()
    }

    /// Ids with the given pending state.
    pub fn ids_in(&self, state: DirtyState) -> Vec<DocumentId> {
        self.rows
            .iter()
            .filter(|(_, r)| r.state == state)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Checks the store against the model.
    pub fn verify(&self) {
        let live: Vec<Document> = self
            .rows
            .iter()
            .filter(|(_, r)| r.state != DirtyState::Remove)
            .map(|(id, r)| Document::new(*id, r.json.clone()))
            .collect();
        let found = self
            .handle()
            .find_all(MODEL_COLLECTION, FindOptions::new())
            .expect("Failed to list documents");
        assert_eq!(found, live, "live documents differ from the model");

        let count = self.handle().count(MODEL_COLLECTION).expect("Failed to count");
        assert_eq!(count, live.len() as u64);

        let dirty = self.rows.values().filter(|r| r.state.is_dirty()).count();
        let dirty_count = self
            .handle()
            .dirty_count(MODEL_COLLECTION)
            .expect("Failed to count dirty documents");
        assert_eq!(dirty_count, dirty as u64);

        for (id, row) in &self.rows {
            let state = self
                .handle()
                .dirty_state(MODEL_COLLECTION, *id)
                .expect("Failed to read dirty state");
            assert_eq!(state, Some(row.state), "state of {id} differs");
        }
    }
}

impl Default for ModelHarness {
    fn default() -> Self {
        Self::new()
    }
}
