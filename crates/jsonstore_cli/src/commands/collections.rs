//! Collection-level commands.

use super::{print_json, CommandResult, Context};
use jsonstore_core::{CollectionSchema, ProvisionOptions, ProvisionOutcome, SearchFields};
use serde::Serialize;
use tracing::info;

/// Summary of one collection.
#[derive(Debug, Serialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Indexed fields, search fields first.
    pub fields: Vec<String>,
    /// Live documents.
    pub documents: u64,
    /// Documents with pending changes.
    pub dirty: u64,
}

/// Store-level summary printed by `info`.
#[derive(Debug, Serialize)]
pub struct StoreInfo {
    /// Owner of the store.
    pub username: String,
    /// Whether document bodies are encrypted.
    pub encrypted: bool,
    /// Provisioned collections.
    pub collections: Vec<CollectionInfo>,
}

/// Runs the info command.
pub fn info(ctx: &Context) -> CommandResult {
    let store = ctx.open(false)?;
    let mut collections = Vec::new();
    for schema in store.collections()? {
        collections.push(CollectionInfo {
            documents: store.count(&schema.name)?,
            dirty: store.dirty_count(&schema.name)?,
            fields: schema.keys().into_iter().map(str::to_string).collect(),
            name: schema.name,
        });
    }
    let summary = StoreInfo {
        username: store.username().to_string(),
        encrypted: store.is_encrypted()?,
        collections,
    };
    store.close()?;
    print_json(&summary)
}

/// Runs the provision command.
pub fn provision(
    ctx: &Context,
    collection: &str,
    fields: &str,
    additional: &str,
    allow_destructive: bool,
) -> CommandResult {
    let schema = CollectionSchema::new(
        collection,
        SearchFields::parse(fields)?,
        SearchFields::parse(additional)?,
    );
    let store = ctx.open(true)?;
    let outcome = store.provision_with(schema, ProvisionOptions { allow_destructive })?;
    match &outcome {
        ProvisionOutcome::Created => info!(collection, "collection created"),
        ProvisionOutcome::Unchanged => info!(collection, "collection unchanged"),
        ProvisionOutcome::Extended { added } => {
            info!(collection, added = added.len(), "collection extended");
        }
        ProvisionOutcome::Recreated { reason } => {
            info!(collection, %reason, "collection recreated");
        }
    }
    store.close()?;
    Ok(())
}

/// Runs the drop command.
pub fn drop_collection(ctx: &Context, collection: &str) -> CommandResult {
    let store = ctx.open(false)?;
    store.drop_collection(collection)?;
    info!(collection, "collection dropped");
    store.close()?;
    Ok(())
}
