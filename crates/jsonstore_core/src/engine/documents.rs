//! Document writes and reads.

use super::Session;
use crate::error::{StoreError, StoreResult};
use crate::query::{FieldValueMap, FindOptions, Predicate, QueryPart, Translator};
use crate::schema::{coerce, index_value, CollectionSchema};
use crate::types::{
    now_millis, DirtyState, Document, DocumentId, FailureReason, ReplaceFailure, ReplaceOutcome,
};
use jsonstore_storage::{quote_ident, SqlValue, Statement};
use serde_json::Value;
use tracing::debug;

impl Session {
    /// Inserts a batch of documents in one transaction.
    ///
    /// Either every document is stored or none is. `additional` supplies the
    /// values of additional search fields for the whole batch.
    pub(crate) fn store(
        &mut self,
        collection: &str,
        documents: &[Value],
        additional: &FieldValueMap,
        mark_dirty: bool,
    ) -> StoreResult<Vec<DocumentId>> {
        let schema = self.schema(collection)?;
        if let Some(key) = additional.keys().find(|k| !schema.is_additional(k)) {
            return Err(StoreError::invalid_schema(format!(
                "{key:?} is not an additional search field of {collection}"
            )));
        }
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let ids = self.transaction(|s| {
            documents
                .iter()
                .map(|doc| s.insert_row(&schema, doc, additional, mark_dirty))
                .collect::<StoreResult<Vec<_>>>()
        })?;
        debug!(collection, stored = ids.len(), mark_dirty, "documents stored");
        Ok(ids)
    }

    fn insert_row(
        &mut self,
        schema: &CollectionSchema,
        doc: &Value,
        additional: &FieldValueMap,
        mark_dirty: bool,
    ) -> StoreResult<DocumentId> {
        ensure_object(doc)?;
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for field in schema.search_fields.iter() {
            columns.push(quote_ident(&field.name));
            values.push(index_value(doc, field)?);
        }
        for field in schema.additional_fields.iter() {
            columns.push(quote_ident(&field.name));
            values.push(match additional.get(&field.name) {
                Some(value) => coerce(&field.name, field.field_type, value)?,
                None => SqlValue::Null,
            });
        }

        let (dirty_at, state) = if mark_dirty {
            (now_millis(), DirtyState::Add)
        } else {
            (0.0, DirtyState::Clean)
        };
        columns.extend(["_json", "_dirty", "_operation"].map(str::to_string));
        values.push(SqlValue::Text(self.encode_body(doc)?));
        values.push(SqlValue::Real(dirty_at));
        values.push(SqlValue::Text(state.as_operation().to_string()));

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&schema.name),
            columns.join(", "),
            vec!["?"; values.len()].join(", ")
        );
        Ok(self.driver()?.insert(&Statement::with_params(sql, values))?)
    }

    /// Finds live documents matching `parts`.
    pub(crate) fn find(
        &mut self,
        collection: &str,
        parts: &[QueryPart],
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let schema = self.schema(collection)?;
        let translator = Translator::new(&schema);
        let Predicate { sql: filter, mut params } = translator.translate(parts)?;
        let order = translator.order_by(&options.sort)?;

        let mut sql = format!(
            "SELECT _id, _json FROM {} WHERE _deleted = 0 AND {filter} ORDER BY {order}",
            quote_ident(&schema.name)
        );
        match (options.limit, options.offset) {
            (None, None) => {}
            (limit, offset) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(SqlValue::Integer(limit.map_or(-1, clamp)));
                params.push(SqlValue::Integer(offset.map_or(0, clamp)));
            }
        }

        let rows = self.driver()?.select(&Statement::with_params(sql, params))?;
        rows.iter().map(|row| self.document_from_row(row)).collect()
    }

    /// Counts live documents matching `parts`.
    pub(crate) fn count(&mut self, collection: &str, parts: &[QueryPart]) -> StoreResult<u64> {
        let schema = self.schema(collection)?;
        let Predicate { sql: filter, params } = Translator::new(&schema).translate(parts)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE _deleted = 0 AND {filter}",
            quote_ident(&schema.name)
        );
        let count = self
            .driver()?
            .select_count(&Statement::with_params(sql, params))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Replaces documents by id, each in its own transaction.
    ///
    /// Documents that do not exist or fail validation are reported as
    /// failures; the others are replaced.
    pub(crate) fn replace(
        &mut self,
        collection: &str,
        documents: Vec<Document>,
        mark_dirty: bool,
    ) -> StoreResult<ReplaceOutcome> {
        let schema = self.schema(collection)?;
        let mut outcome = ReplaceOutcome::default();
        for document in documents {
            match self.transaction(|s| s.replace_one(&schema, &document, mark_dirty)) {
                Ok(true) => outcome.replaced += 1,
                Ok(false) => outcome.failures.push(ReplaceFailure {
                    document,
                    reason: FailureReason::NotFound,
                }),
                Err(err @ StoreError::StoreNotOpen) => return Err(err),
                Err(err) => {
                    let reason = match err {
                        StoreError::InvalidDocument { .. } | StoreError::InvalidSchema { .. } => {
                            FailureReason::Invalid(err.to_string())
                        }
                        other => FailureReason::Store(other.to_string()),
                    };
                    debug!(collection, id = document.id, %reason, "replace rejected");
                    outcome.failures.push(ReplaceFailure { document, reason });
                }
            }
        }
        Ok(outcome)
    }

    fn replace_one(
        &mut self,
        schema: &CollectionSchema,
        document: &Document,
        mark_dirty: bool,
    ) -> StoreResult<bool> {
        match self.live_state(schema, document.id)? {
            Some(state) => {
                self.update_row(schema, document.id, state, &document.json, mark_dirty)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// State of a document that has not been removed.
    fn live_state(
        &mut self,
        schema: &CollectionSchema,
        id: DocumentId,
    ) -> StoreResult<Option<DirtyState>> {
        let row = self.driver()?.select_one(
            &Statement::new(format!(
                "SELECT _operation FROM {} WHERE _id = ? AND _deleted = 0",
                quote_ident(&schema.name)
            ))
            .bind(id),
        )?;
        row.map(|r| parse_state(r.text(0).unwrap_or_default()))
            .transpose()
    }

    /// Rewrites the body and search fields of a row. Additional fields keep
    /// the values given at store time.
    ///
    /// A dirty replace keeps a pending add as an add; anything else becomes
    /// a pending replace. Without `mark_dirty` the state is left untouched.
    fn update_row(
        &mut self,
        schema: &CollectionSchema,
        id: DocumentId,
        current: DirtyState,
        json: &Value,
        mark_dirty: bool,
    ) -> StoreResult<()> {
        ensure_object(json)?;
        let mut sets = Vec::new();
        let mut values = Vec::new();
        for field in schema.search_fields.iter() {
            sets.push(format!("{} = ?", quote_ident(&field.name)));
            values.push(index_value(json, field)?);
        }
        sets.push("_json = ?".to_string());
        values.push(SqlValue::Text(self.encode_body(json)?));
        if mark_dirty {
            let next = match current {
                DirtyState::Add => DirtyState::Add,
                _ => DirtyState::Replace,
            };
            sets.push("_dirty = ?".to_string());
            values.push(SqlValue::Real(now_millis()));
            sets.push("_operation = ?".to_string());
            values.push(SqlValue::Text(next.as_operation().to_string()));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE _id = ?",
            quote_ident(&schema.name),
            sets.join(", ")
        );
        self.driver()?
            .update(&Statement::with_params(sql, values).bind(id))?;
        Ok(())
    }

    /// Removes live documents matching `parts` in one transaction.
    ///
    /// With `mark_dirty` the documents are hidden and flagged for a remote
    /// delete; otherwise they are deleted outright. A query that would match
    /// everything is refused; use `clear_collection` for that.
    pub(crate) fn remove(
        &mut self,
        collection: &str,
        parts: &[QueryPart],
        mark_dirty: bool,
    ) -> StoreResult<usize> {
        let schema = self.schema(collection)?;
        let predicate = Translator::new(&schema).translate(parts)?;
        if predicate == Predicate::match_all() {
            return Err(StoreError::invalid_query(
                "remove needs a query that selects documents",
            ));
        }
        let table = quote_ident(&schema.name);

        let removed = self.transaction(|s| {
            let driver = s.driver()?;
            let count = if mark_dirty {
                let stmt = Statement::new(format!(
                    "UPDATE {table} SET _deleted = 1, _operation = ?, _dirty = ? \
                     WHERE _deleted = 0 AND {}",
                    predicate.sql
                ))
                .bind(DirtyState::Remove.as_operation().to_string())
                .bind(now_millis())
                .bind_all(predicate.params.iter().cloned());
                driver.update(&stmt)?
            } else {
                driver.delete(&Statement::with_params(
                    format!("DELETE FROM {table} WHERE _deleted = 0 AND {}", predicate.sql),
                    predicate.params.clone(),
                ))?
            };
            Ok(count)
        })?;
        debug!(collection, removed, mark_dirty, "documents removed");
        Ok(removed)
    }

    /// Upserts documents in one transaction.
    ///
    /// Each document replaces every live document whose `criteria` fields
    /// equal its own; when none match and `add_new` is set it is inserted.
    /// Returns the number of documents written.
    pub(crate) fn change(
        &mut self,
        collection: &str,
        documents: &[Value],
        criteria: &[String],
        add_new: bool,
        mark_dirty: bool,
    ) -> StoreResult<usize> {
        let schema = self.schema(collection)?;
        if let Some(field) = criteria
            .iter()
            .find(|f| schema.search_fields.get(f).is_none())
        {
            return Err(StoreError::field_not_indexed(collection, field.as_str()));
        }

        self.transaction(|s| {
            let mut written = 0;
            for doc in documents {
                ensure_object(doc)?;
                let matches = s.matching_rows(&schema, doc, criteria)?;
                if matches.is_empty() {
                    if add_new {
                        s.insert_row(&schema, doc, &FieldValueMap::new(), mark_dirty)?;
                        written += 1;
                    }
                    continue;
                }
                for (id, state) in matches {
                    s.update_row(&schema, id, state, doc, mark_dirty)?;
                    written += 1;
                }
            }
            Ok(written)
        })
    }

    /// Live rows whose `criteria` columns equal the values in `doc`. A
    /// document missing any criterion matches nothing.
    fn matching_rows(
        &mut self,
        schema: &CollectionSchema,
        doc: &Value,
        criteria: &[String],
    ) -> StoreResult<Vec<(DocumentId, DirtyState)>> {
        if criteria.is_empty() {
            return Ok(Vec::new());
        }
        let mut conditions = Vec::with_capacity(criteria.len());
        let mut params = Vec::with_capacity(criteria.len());
        for name in criteria {
            let Some(field) = schema.search_fields.get(name) else {
                return Ok(Vec::new());
            };
            let value = index_value(doc, field)?;
            if value == SqlValue::Null {
                return Ok(Vec::new());
            }
            conditions.push(format!("{} = ?", quote_ident(name)));
            params.push(value);
        }

        let sql = format!(
            "SELECT _id, _operation FROM {} WHERE _deleted = 0 AND {}",
            quote_ident(&schema.name),
            conditions.join(" AND ")
        );
        self.driver()?
            .select(&Statement::with_params(sql, params))?
            .iter()
            .map(|row| -> StoreResult<(DocumentId, DirtyState)> {
                let id = row
                    .integer(0)
                    .ok_or_else(|| StoreError::invalid_document("stored row is missing its id"))?;
                Ok((id, parse_state(row.text(1).unwrap_or_default())?))
            })
            .collect()
    }
}

pub(super) fn parse_state(op: &str) -> StoreResult<DirtyState> {
    DirtyState::from_operation(op)
        .ok_or_else(|| StoreError::invalid_document(format!("unknown operation {op:?}")))
}

fn ensure_object(doc: &Value) -> StoreResult<()> {
    if doc.is_object() {
        Ok(())
    } else {
        Err(StoreError::invalid_document(format!(
            "documents must be JSON objects, got {}",
            kind_of(doc)
        )))
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn clamp(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
