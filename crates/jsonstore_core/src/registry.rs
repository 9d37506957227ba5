//! Store registry.
//!
//! At most one user store is active per registry. Opening the active user
//! again returns a handle to the same lane; opening another user while the
//! active store is still open is refused.

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::lane::Lane;
use crate::store::JsonStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Hands out store handles keyed by user name.
#[derive(Debug, Default)]
pub struct Registry {
    active: Mutex<Option<Arc<Lane>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the store of `config.username`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UsernameMismatch`] if another user's store is open
    /// - [`StoreError::EncryptionKeyMissing`] / [`StoreError::EncryptionKeyInvalid`]
    ///   for a missing or wrong password
    /// - [`StoreError::UnderlyingStore`] if the store cannot be opened, for
    ///   example because another process holds its lock
    pub fn open(&self, config: Config) -> StoreResult<JsonStore> {
        let mut active = self.active.lock();

        if let Some(lane) = active.as_ref() {
            if lane.username() == config.username {
                lane.run(move |s| s.open(config))?;
                return Ok(JsonStore::from_lane(Arc::clone(lane)));
            }
            if lane.run(|s| Ok(s.is_open()))? {
                return Err(StoreError::UsernameMismatch {
                    active: lane.username().to_string(),
                    requested: config.username,
                });
            }
            debug!(previous = %lane.username(), "replacing closed store");
        }

        let lane = Arc::new(Lane::spawn(&config.username)?);
        lane.run(move |s| s.open(config))?;
        *active = Some(Arc::clone(&lane));
        Ok(JsonStore::from_lane(lane))
    }

    /// User of the active store, if any.
    #[must_use]
    pub fn active_username(&self) -> Option<String> {
        self.active
            .lock()
            .as_ref()
            .map(|lane| lane.username().to_string())
    }

    /// Closes the active store and forgets it.
    pub fn close_active(&self) -> StoreResult<()> {
        match self.active.lock().take() {
            Some(lane) => lane.run(|s| s.close()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn same_user_shares_a_lane() {
        let root = tempdir().unwrap();
        let registry = Registry::new();
        let a = registry.open(Config::at(root.path()).username("ann")).unwrap();
        let b = registry.open(Config::at(root.path()).username("ann")).unwrap();
        a.close().unwrap();
        assert!(!b.is_open().unwrap());
        assert_eq!(registry.active_username().as_deref(), Some("ann"));
    }

    #[test]
    fn other_user_while_open_is_refused() {
        let root = tempdir().unwrap();
        let registry = Registry::new();
        let ann = registry.open(Config::at(root.path()).username("ann")).unwrap();
        assert!(matches!(
            registry.open(Config::at(root.path()).username("bob")),
            Err(StoreError::UsernameMismatch { active, requested })
                if active == "ann" && requested == "bob"
        ));

        ann.close().unwrap();
        let bob = registry.open(Config::at(root.path()).username("bob")).unwrap();
        assert_eq!(bob.username(), "bob");
        assert_eq!(registry.active_username().as_deref(), Some("bob"));
    }

    #[test]
    fn failed_open_leaves_registry_empty() {
        let root = tempdir().unwrap();
        let registry = Registry::new();
        assert!(registry
            .open(Config::at(root.path()).username("ann").create_if_missing(false))
            .is_err());
        assert_eq!(registry.active_username(), None);
        registry.close_active().unwrap();
    }
}
