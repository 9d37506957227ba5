//! The public store handle.

use crate::config::Config;
use crate::error::StoreResult;
use crate::lane::{Lane, Pending};
use crate::query::{FieldValueMap, FindOptions, QueryPart, ID_FIELD};
use crate::schema::{CollectionSchema, ProvisionOptions, ProvisionOutcome, SearchFields};
use crate::types::{DirtyDocument, DirtyState, Document, DocumentId, ReplaceOutcome};
use serde_json::Value;
use std::sync::Arc;

/// Handle to one user's document store.
///
/// Cloning the handle is cheap; all clones share the same operation lane,
/// so operations from any clone or thread run one at a time in the order
/// they were submitted.
///
/// # Example
///
/// ```rust
/// use jsonstore_core::{Config, FieldType, FindOptions, JsonStore, SearchFields};
/// use serde_json::json;
///
/// let store = JsonStore::open(Config::in_memory())?;
/// store.provision(
///     "people",
///     SearchFields::new()
///         .with("name", FieldType::String)
///         .with("age", FieldType::Integer),
///     SearchFields::new(),
/// )?;
/// store.store("people", vec![json!({"name": "Ann", "age": 30})], true)?;
///
/// let query = json!({"name": "an"}).as_object().cloned().unwrap_or_default();
/// let found = store.find("people", vec![query], FindOptions::new())?;
/// assert_eq!(found.len(), 1);
/// assert_eq!(store.dirty_count("people")?, 1);
/// # Ok::<(), jsonstore_core::StoreError>(())
/// ```
#[derive(Clone, Debug)]
pub struct JsonStore {
    lane: Arc<Lane>,
}

impl JsonStore {
    /// Opens a store on its own lane, outside any [`Registry`](crate::Registry).
    ///
    /// # Errors
    ///
    /// See [`Registry::open`](crate::Registry::open).
    pub fn open(config: Config) -> StoreResult<Self> {
        let lane = Arc::new(Lane::spawn(&config.username)?);
        lane.run(move |s| s.open(config))?;
        Ok(Self { lane })
    }

    pub(crate) fn from_lane(lane: Arc<Lane>) -> Self {
        Self { lane }
    }

    /// Owner of the store.
    #[must_use]
    pub fn username(&self) -> &str {
        self.lane.username()
    }

    /// Whether the store is open.
    pub fn is_open(&self) -> StoreResult<bool> {
        self.lane.run(|s| Ok(s.is_open()))
    }

    /// Whether document bodies are encrypted.
    pub fn is_encrypted(&self) -> StoreResult<bool> {
        self.lane.run(|s| {
            s.driver()?;
            Ok(s.is_encrypted())
        })
    }

    /// Creates a collection or checks an existing one against the given
    /// fields. Incompatible changes are refused; see
    /// [`provision_with`](Self::provision_with).
    pub fn provision(
        &self,
        collection: &str,
        search_fields: SearchFields,
        additional_fields: SearchFields,
    ) -> StoreResult<ProvisionOutcome> {
        self.provision_with(
            CollectionSchema::new(collection, search_fields, additional_fields),
            ProvisionOptions::default(),
        )
    }

    /// Provisions `schema`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DestructiveSchemaChange`](crate::StoreError::DestructiveSchemaChange)
    ///   when existing fields were removed, retyped or reordered and neither
    ///   `options` nor the configuration allow dropping the data
    /// - [`StoreError::InvalidSchema`](crate::StoreError::InvalidSchema) for
    ///   unusable field names
    pub fn provision_with(
        &self,
        schema: CollectionSchema,
        options: ProvisionOptions,
    ) -> StoreResult<ProvisionOutcome> {
        self.lane.run(move |s| s.provision(schema, options))
    }

    /// Schemas of all provisioned collections.
    pub fn collections(&self) -> StoreResult<Vec<CollectionSchema>> {
        self.lane.run(|s| s.collections())
    }

    /// Indexed field names of a collection, search fields first.
    pub fn keys(&self, collection: &str) -> StoreResult<Vec<String>> {
        let collection = collection.to_string();
        self.lane.run(move |s| {
            Ok(s.schema(&collection)?
                .keys()
                .into_iter()
                .map(str::to_string)
                .collect())
        })
    }

    /// Stores documents in one transaction and returns how many were stored.
    pub fn store(&self, collection: &str, documents: Vec<Value>, mark_dirty: bool) -> StoreResult<usize> {
        self.store_with(collection, documents, FieldValueMap::new(), mark_dirty)
            .map(|ids| ids.len())
    }

    /// Stores documents with values for the additional search fields and
    /// returns their new ids.
    pub fn store_with(
        &self,
        collection: &str,
        documents: Vec<Value>,
        additional: FieldValueMap,
        mark_dirty: bool,
    ) -> StoreResult<Vec<DocumentId>> {
        self.store_async(collection, documents, additional, mark_dirty)
            .wait()
    }

    /// Queues a store and returns without waiting for it.
    pub fn store_async(
        &self,
        collection: &str,
        documents: Vec<Value>,
        additional: FieldValueMap,
        mark_dirty: bool,
    ) -> Pending<Vec<DocumentId>> {
        let collection = collection.to_string();
        self.lane
            .submit(move |s| s.store(&collection, &documents, &additional, mark_dirty))
    }

    /// Finds documents matching any of `queries`; see
    /// [`FindOptions::exact`].
    pub fn find(
        &self,
        collection: &str,
        queries: Vec<FieldValueMap>,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let parts = queries
            .iter()
            .map(|q| QueryPart::from_map(q, options.exact))
            .collect();
        self.find_parts(collection, parts, options)
    }

    /// Finds documents matching any of `parts`.
    pub fn find_parts(
        &self,
        collection: &str,
        parts: Vec<QueryPart>,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>> {
        self.find_async(collection, parts, options).wait()
    }

    /// Queues a find and returns without waiting for it.
    pub fn find_async(
        &self,
        collection: &str,
        parts: Vec<QueryPart>,
        options: FindOptions,
    ) -> Pending<Vec<Document>> {
        let collection = collection.to_string();
        self.lane
            .submit(move |s| s.find(&collection, &parts, &options))
    }

    /// Every live document, in the order given by `options`.
    pub fn find_all(&self, collection: &str, options: FindOptions) -> StoreResult<Vec<Document>> {
        self.find_parts(collection, Vec::new(), options)
    }

    /// Live documents with the given ids, in id order. Unknown ids are
    /// skipped.
    pub fn find_by_ids(&self, collection: &str, ids: Vec<DocumentId>) -> StoreResult<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let part = QueryPart::new().inside(ID_FIELD, ids);
        self.find_parts(collection, vec![part], FindOptions::new())
    }

    /// Number of live documents.
    pub fn count(&self, collection: &str) -> StoreResult<u64> {
        self.count_parts(collection, Vec::new())
    }

    /// Number of live documents matching any of `queries`.
    pub fn count_matching(
        &self,
        collection: &str,
        queries: Vec<FieldValueMap>,
        exact: bool,
    ) -> StoreResult<u64> {
        let parts = queries.iter().map(|q| QueryPart::from_map(q, exact)).collect();
        self.count_parts(collection, parts)
    }

    fn count_parts(&self, collection: &str, parts: Vec<QueryPart>) -> StoreResult<u64> {
        let collection = collection.to_string();
        self.lane.run(move |s| s.count(&collection, &parts))
    }

    /// Number of documents with pending changes, pending removals included.
    pub fn dirty_count(&self, collection: &str) -> StoreResult<u64> {
        let collection = collection.to_string();
        self.lane.run(move |s| s.dirty_count(&collection))
    }

    /// Whether document `id` has pending changes.
    pub fn is_dirty(&self, collection: &str, id: DocumentId) -> StoreResult<bool> {
        let collection = collection.to_string();
        self.lane.run(move |s| s.is_dirty(&collection, id))
    }

    /// Pending state of document `id`; `None` if there is no such row.
    pub fn dirty_state(&self, collection: &str, id: DocumentId) -> StoreResult<Option<DirtyState>> {
        let collection = collection.to_string();
        self.lane.run(move |s| s.dirty_state(&collection, id))
    }

    /// All documents with pending changes, oldest first.
    pub fn all_dirty(&self, collection: &str) -> StoreResult<Vec<DirtyDocument>> {
        let collection = collection.to_string();
        self.lane.run(move |s| s.all_dirty(&collection))
    }

    /// Replaces documents by id. Missing or invalid documents are reported
    /// in the outcome instead of failing the call.
    pub fn replace(
        &self,
        collection: &str,
        documents: Vec<Document>,
        mark_dirty: bool,
    ) -> StoreResult<ReplaceOutcome> {
        let collection = collection.to_string();
        self.lane
            .run(move |s| s.replace(&collection, documents, mark_dirty))
    }

    /// Removes the documents matching any of `queries`.
    pub fn remove(
        &self,
        collection: &str,
        queries: Vec<FieldValueMap>,
        exact: bool,
        mark_dirty: bool,
    ) -> StoreResult<usize> {
        let parts = queries.iter().map(|q| QueryPart::from_map(q, exact)).collect();
        self.remove_parts(collection, parts, mark_dirty)
    }

    /// Removes the documents matching any of `parts`.
    pub fn remove_parts(
        &self,
        collection: &str,
        parts: Vec<QueryPart>,
        mark_dirty: bool,
    ) -> StoreResult<usize> {
        let collection = collection.to_string();
        self.lane
            .run(move |s| s.remove(&collection, &parts, mark_dirty))
    }

    /// Removes documents by id.
    pub fn remove_by_ids(
        &self,
        collection: &str,
        ids: Vec<DocumentId>,
        mark_dirty: bool,
    ) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.remove_parts(collection, vec![QueryPart::new().inside(ID_FIELD, ids)], mark_dirty)
    }

    /// Upserts documents, matching existing ones on `criteria`.
    pub fn change(
        &self,
        collection: &str,
        documents: Vec<Value>,
        criteria: Vec<String>,
        add_new: bool,
        mark_dirty: bool,
    ) -> StoreResult<usize> {
        let collection = collection.to_string();
        self.lane.run(move |s| {
            s.change(&collection, &documents, &criteria, add_new, mark_dirty)
        })
    }

    /// Acknowledges that `operation` on document `id` was synchronized.
    pub fn mark_clean(
        &self,
        collection: &str,
        id: DocumentId,
        operation: DirtyState,
    ) -> StoreResult<bool> {
        let collection = collection.to_string();
        self.lane
            .run(move |s| s.mark_clean(&collection, id, operation))
    }

    /// Drops a collection and all of its documents.
    pub fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        let collection = collection.to_string();
        self.lane.run(move |s| s.drop_collection(&collection))
    }

    /// Deletes every document of a collection and keeps its schema.
    pub fn clear_collection(&self, collection: &str) -> StoreResult<usize> {
        let collection = collection.to_string();
        self.lane.run(move |s| s.clear_collection(&collection))
    }

    /// Rotates the data key and protects it with `new_password`.
    pub fn change_password(&self, old_password: &str, new_password: &str) -> StoreResult<()> {
        let old_password = zeroize::Zeroizing::new(old_password.to_string());
        let new_password = zeroize::Zeroizing::new(new_password.to_string());
        self.lane
            .run(move |s| s.change_password(&old_password, &new_password))
    }

    /// Reopens a closed store with `config`, or checks the password of an
    /// open one.
    pub fn reopen(&self, config: Config) -> StoreResult<()> {
        self.lane.run(move |s| s.open(config))
    }

    /// Closes the store. Later operations fail with
    /// [`StoreError::StoreNotOpen`](crate::StoreError::StoreNotOpen) until it
    /// is reopened.
    pub fn close(&self) -> StoreResult<()> {
        self.lane.run(|s| s.close())
    }

    /// Closes the store and deletes the user's directory with all data.
    pub fn destroy(&self) -> StoreResult<()> {
        self.lane.run(|s| s.destroy())
    }
}
