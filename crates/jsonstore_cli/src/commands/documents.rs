//! Document commands.

use super::{parse_objects, parse_queries, print_json, CommandResult, Context};
use jsonstore_core::FindOptions;
use serde_json::{json, Value};
use tracing::info;

/// Runs the add command.
pub fn add(ctx: &Context, collection: &str, documents: &str, mark_dirty: bool) -> CommandResult {
    let documents: Vec<Value> = parse_objects(documents, "documents")?
        .into_iter()
        .map(Value::Object)
        .collect();
    let store = ctx.open(false)?;
    let ids = store.store_with(collection, documents, Default::default(), mark_dirty)?;
    store.close()?;
    info!(collection, stored = ids.len(), "documents stored");
    print_json(&ids)
}

/// Runs the find command.
pub fn find(
    ctx: &Context,
    collection: &str,
    query: Option<&str>,
    options: FindOptions,
) -> CommandResult {
    let queries = parse_queries(query)?;
    let store = ctx.open(false)?;
    let found = store.find(collection, queries, options)?;
    store.close()?;
    print_json(&found)
}

/// Runs the count command.
pub fn count(ctx: &Context, collection: &str, query: Option<&str>, exact: bool) -> CommandResult {
    let queries = parse_queries(query)?;
    let store = ctx.open(false)?;
    let count = store.count_matching(collection, queries, exact)?;
    store.close()?;
    print_json(&json!({ "count": count }))
}

/// Runs the remove command.
pub fn remove(
    ctx: &Context,
    collection: &str,
    query: &str,
    exact: bool,
    mark_dirty: bool,
) -> CommandResult {
    let queries = parse_queries(Some(query))?;
    let store = ctx.open(false)?;
    let removed = store.remove(collection, queries, exact, mark_dirty)?;
    store.close()?;
    print_json(&json!({ "removed": removed }))
}
