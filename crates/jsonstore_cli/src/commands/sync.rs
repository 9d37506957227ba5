//! Pending-change commands.

use super::{print_json, CommandResult, Context};
use jsonstore_core::DirtyState;
use serde_json::json;

/// Runs the dirty command.
pub fn dirty(ctx: &Context, collection: &str) -> CommandResult {
    let store = ctx.open(false)?;
    let pending = store.all_dirty(collection)?;
    store.close()?;
    print_json(&pending)
}

/// Runs the mark-clean command.
pub fn mark_clean(ctx: &Context, collection: &str, id: i64, operation: &str) -> CommandResult {
    let operation: DirtyState = operation.parse()?;
    let store = ctx.open(false)?;
    let acknowledged = store.mark_clean(collection, id, operation)?;
    store.close()?;
    print_json(&json!({ "id": id, "acknowledged": acknowledged }))
}
