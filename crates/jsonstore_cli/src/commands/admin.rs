//! Store administration commands.

use super::{CommandResult, Context};
use tracing::{info, warn};

/// Runs the change-password command. The global password is the old one.
pub fn change_password(ctx: &Context, new_password: &str) -> CommandResult {
    let old_password = ctx
        .password()
        .ok_or("--password is required to change the password")?;
    let store = ctx.open(false)?;
    store.change_password(old_password, new_password)?;
    store.close()?;
    info!(username = store.username(), "password changed");
    Ok(())
}

/// Runs the destroy command.
pub fn destroy(ctx: &Context) -> CommandResult {
    let store = ctx.open(false)?;
    warn!(username = store.username(), "destroying store");
    store.destroy()?;
    Ok(())
}
