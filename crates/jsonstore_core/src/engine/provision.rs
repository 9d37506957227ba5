//! Collection provisioning, dropping and clearing.

use super::Session;
use crate::error::{StoreError, StoreResult};
use crate::schema::{
    self, index_value, CollectionSchema, ProvisionOptions, ProvisionOutcome, SchemaChange,
    SearchField,
};
use jsonstore_storage::{quote_ident, SqlValue, Statement};
use tracing::{debug, info, warn};

impl Session {
    /// Creates or verifies a collection.
    ///
    /// Provisioning is idempotent for an identical field set. Fields appended
    /// at the end of either list are added in place and filled from the
    /// existing documents. Any other difference is destructive and is
    /// refused unless `options` or the store configuration allow it.
    pub(crate) fn provision(
        &mut self,
        schema: CollectionSchema,
        options: ProvisionOptions,
    ) -> StoreResult<ProvisionOutcome> {
        schema.validate()?;
        let allow_destructive = options.allow_destructive
            || self
                .config
                .as_ref()
                .is_some_and(|c| c.allow_destructive_schema_changes);

        let current = self.schemas.get(&schema.name).cloned();
        let outcome = match current {
            Some(current) => match current.plan(&schema) {
                SchemaChange::Identical => ProvisionOutcome::Unchanged,
                SchemaChange::Append(added) => {
                    self.transaction(|s| {
                        schema::append_fields(s.driver()?, &schema, &added)?;
                        s.backfill(&schema, &added)
                    })?;
                    let added: Vec<String> = added.into_iter().map(|f| f.name).collect();
                    info!(collection = %schema.name, ?added, "search fields appended");
                    ProvisionOutcome::Extended { added }
                }
                SchemaChange::Incompatible(reason) => {
                    self.recreate(&schema, allow_destructive, reason)?
                }
            },
            None if self.driver()?.table_exists(&schema.name)? => {
                if schema::columns_match(self.driver()?, &schema)? {
                    self.transaction(|s| schema::persist(s.driver()?, &schema))?;
                    ProvisionOutcome::Unchanged
                } else {
                    let reason = "existing table has different columns".to_string();
                    self.recreate(&schema, allow_destructive, reason)?
                }
            }
            None => {
                self.transaction(|s| schema::create_collection(s.driver()?, &schema))?;
                info!(collection = %schema.name, fields = ?schema.keys(), "collection created");
                ProvisionOutcome::Created
            }
        };

        self.schemas.insert(schema);
        Ok(outcome)
    }

    fn recreate(
        &mut self,
        schema: &CollectionSchema,
        allow_destructive: bool,
        reason: String,
    ) -> StoreResult<ProvisionOutcome> {
        if !allow_destructive {
            return Err(StoreError::DestructiveSchemaChange {
                collection: schema.name.clone(),
                reason,
            });
        }
        warn!(collection = %schema.name, %reason, "dropping collection to apply incompatible schema");
        self.transaction(|s| {
            let driver = s.driver()?;
            schema::drop_collection(driver, &schema.name)?;
            schema::create_collection(driver, schema)
        })?;
        Ok(ProvisionOutcome::Recreated { reason })
    }

    /// Fills newly added search-field columns from the stored bodies.
    /// Additional fields stay empty; their values never came from bodies.
    fn backfill(&mut self, schema: &CollectionSchema, added: &[SearchField]) -> StoreResult<()> {
        let fields: Vec<&SearchField> = added
            .iter()
            .filter(|f| !schema.is_additional(&f.name))
            .collect();
        if fields.is_empty() {
            return Ok(());
        }

        let table = quote_ident(&schema.name);
        let rows = self
            .driver()?
            .select(&Statement::new(format!("SELECT _id, _json FROM {table}")))?;
        let sets = fields
            .iter()
            .map(|f| format!("{} = ?", quote_ident(&f.name)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {table} SET {sets} WHERE _id = ?");

        for row in &rows {
            let doc = self.document_from_row(row)?;
            let values = fields
                .iter()
                .map(|field| {
                    index_value(&doc.json, field).unwrap_or_else(|err| {
                        warn!(id = doc.id, field = %field.name, error = %err, "value not indexable; left empty");
                        SqlValue::Null
                    })
                })
                .collect();
            self.driver()?
                .update(&Statement::with_params(sql.clone(), values).bind(doc.id))?;
        }
        debug!(collection = %schema.name, rows = rows.len(), "backfilled appended fields");
        Ok(())
    }

    /// Drops a collection with all its documents.
    pub(crate) fn drop_collection(&mut self, name: &str) -> StoreResult<()> {
        schema::validate_collection_name(name)?;
        let known = self.schemas.get(name).is_some();
        if !known && !self.driver()?.table_exists(name)? {
            return Err(StoreError::collection_not_found(name));
        }
        self.transaction(|s| schema::drop_collection(s.driver()?, name))?;
        self.schemas.remove(name);
        info!(collection = %name, "collection dropped");
        Ok(())
    }

    /// Deletes every document of a collection, dirty or not. Ids are not
    /// reused afterwards.
    pub(crate) fn clear_collection(&mut self, name: &str) -> StoreResult<usize> {
        let schema = self.schema(name)?;
        let removed = self.driver()?.delete(&Statement::new(format!(
            "DELETE FROM {}",
            quote_ident(&schema.name)
        )))?;
        info!(collection = %name, removed, "collection cleared");
        Ok(removed)
    }
}
