//! Dirty-state queries and transitions.
//!
//! ```text
//!            store(dirty)          replace(dirty)
//!   (none) ───────────────► add ───────────────► add
//!                            │
//!   clean ──replace(dirty)──► replace
//!     │                       │
//!     └──remove(dirty)──► remove ◄──remove(dirty)──┘
//!
//!   mark_clean(add|replace) → clean      mark_clean(remove) → purged
//! ```

use super::documents::parse_state;
use super::Session;
use crate::error::{StoreError, StoreResult};
use crate::types::{DirtyDocument, DirtyState, Document, DocumentId};
use jsonstore_storage::{quote_ident, Statement};
use tracing::debug;

impl Session {
    /// Number of documents with pending changes, pending removals included.
    pub(crate) fn dirty_count(&mut self, collection: &str) -> StoreResult<u64> {
        let schema = self.schema(collection)?;
        let count = self.driver()?.select_count(&Statement::new(format!(
            "SELECT COUNT(*) FROM {} WHERE _operation != ''",
            quote_ident(&schema.name)
        )))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Whether document `id` has pending changes. Unknown ids are clean.
    pub(crate) fn is_dirty(&mut self, collection: &str, id: DocumentId) -> StoreResult<bool> {
        Ok(self
            .dirty_state(collection, id)?
            .is_some_and(DirtyState::is_dirty))
    }

    /// Current state of document `id`, removed documents included.
    pub(crate) fn dirty_state(
        &mut self,
        collection: &str,
        id: DocumentId,
    ) -> StoreResult<Option<DirtyState>> {
        let schema = self.schema(collection)?;
        let row = self.driver()?.select_one(
            &Statement::new(format!(
                "SELECT _operation FROM {} WHERE _id = ?",
                quote_ident(&schema.name)
            ))
            .bind(id),
        )?;
        row.map(|r| parse_state(r.text(0).unwrap_or_default()))
            .transpose()
    }

    /// Every document with pending changes, oldest change first.
    pub(crate) fn all_dirty(&mut self, collection: &str) -> StoreResult<Vec<DirtyDocument>> {
        let schema = self.schema(collection)?;
        let rows = self.driver()?.select(&Statement::new(format!(
            "SELECT _id, _json, _operation, _dirty FROM {} WHERE _operation != '' \
             ORDER BY _dirty, _id",
            quote_ident(&schema.name)
        )))?;
        rows.iter()
            .map(|row| -> StoreResult<DirtyDocument> {
                let document: Document = self.document_from_row(row)?;
                Ok(DirtyDocument {
                    document,
                    operation: parse_state(row.text(2).unwrap_or_default())?,
                    dirty_at: row.real(3).unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Acknowledges that `operation` on document `id` reached the remote.
    ///
    /// Only applies when the document's pending operation is `operation`;
    /// returns whether anything changed. Acknowledging a removal purges the
    /// document.
    pub(crate) fn mark_clean(
        &mut self,
        collection: &str,
        id: DocumentId,
        operation: DirtyState,
    ) -> StoreResult<bool> {
        let schema = self.schema(collection)?;
        if !operation.is_dirty() {
            return Err(StoreError::invalid_operation(
                "mark_clean needs the pending operation to acknowledge",
            ));
        }
        let table = quote_ident(&schema.name);

        let cleaned = self.transaction(|s| {
            let driver = s.driver()?;
            let current = driver.select_one(
                &Statement::new(format!("SELECT _operation FROM {table} WHERE _id = ?")).bind(id),
            )?;
            if current.as_ref().and_then(|row| row.text(0)) != Some(operation.as_operation()) {
                return Ok(false);
            }
            if operation == DirtyState::Remove {
                driver.delete(
                    &Statement::new(format!("DELETE FROM {table} WHERE _id = ?")).bind(id),
                )?;
            } else {
                driver.update(
                    &Statement::new(format!(
                        "UPDATE {table} SET _dirty = 0, _operation = '' WHERE _id = ?"
                    ))
                    .bind(id),
                )?;
            }
            Ok(true)
        })?;
        debug!(collection, id, %operation, cleaned, "mark clean");
        Ok(cleaned)
    }
}
