//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores
//! and common test scenarios.

use jsonstore_core::{Config, JsonStore};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// PBKDF2 iterations used by test stores. Far below the production default
/// so key wrapping stays fast in debug builds.
pub const TEST_KDF_ITERATIONS: u32 = 64;

/// User name of test stores.
pub const TEST_USERNAME: &str = "tester";

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store handle.
    pub store: JsonStore,
    /// The temporary application root (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
    password: Option<String>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self {
            store: JsonStore::open(Config::in_memory().username(TEST_USERNAME))
                .expect("Failed to open in-memory store"),
            temp_dir: None,
            password: None,
        }
    }

    /// Creates a new on-disk test store under a temporary root.
    pub fn file() -> Self {
        Self::on_disk(None)
    }

    /// Creates a new on-disk test store whose bodies are encrypted under
    /// `password`.
    pub fn encrypted(password: &str) -> Self {
        Self::on_disk(Some(password.to_string()))
    }

    fn on_disk(password: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = file_config(temp_dir.path(), password.as_deref());
        Self {
            store: JsonStore::open(config).expect("Failed to open file store"),
            temp_dir: Some(temp_dir),
            password,
        }
    }

    /// The application root if on-disk, None if in-memory.
    pub fn root(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// The per-user store directory if on-disk.
    pub fn user_dir(&self) -> Option<PathBuf> {
        self.root().map(|root| root.join(TEST_USERNAME))
    }

    /// A configuration that reopens this store, optionally with a different
    /// password.
    pub fn config(&self, password: Option<&str>) -> Config {
        match self.root() {
            Some(root) => file_config(root, password),
            None => Config::in_memory().username(TEST_USERNAME),
        }
    }

    /// The password the store was created with.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Closes the store and opens it again with `password`, replacing the
    /// handle.
    pub fn reopen(&mut self, password: Option<&str>) -> jsonstore_core::StoreResult<()> {
        self.store.close()?;
        let store = JsonStore::open(self.config(password))?;
        self.store = store;
        Ok(())
    }
}

impl std::ops::Deref for TestStore {
    type Target = JsonStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Configuration of an on-disk test store under `root`.
pub fn file_config(root: &Path, password: Option<&str>) -> Config {
    let config = Config::at(root)
        .username(TEST_USERNAME)
        .kdf_iterations(TEST_KDF_ITERATIONS);
    match password {
        Some(password) => config.password(password),
        None => config,
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust,ignore
/// use jsonstore_testkit::with_temp_store;
///
/// #[test]
/// fn my_test() {
///     with_temp_store(|store| {
///         assert!(store.is_open().unwrap());
///     });
/// }
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&JsonStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary on-disk store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&JsonStore, &Path) -> R,
{
    let test_store = TestStore::file();
    let root = test_store
        .root()
        .expect("File store should have a root")
        .to_path_buf();
    f(&test_store.store, &root)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use jsonstore_core::{FieldType, SearchFields};
    use serde_json::json;

    /// Search fields of the `people` collection: `name` and `age`.
    pub fn people_fields() -> SearchFields {
        SearchFields::new()
            .with("name", FieldType::String)
            .with("age", FieldType::Integer)
    }

    /// Provisions `people` on `store`.
    pub fn provision_people(store: &JsonStore) {
        store
            .provision("people", people_fields(), SearchFields::new())
            .expect("Failed to provision people");
    }

    /// Creates a store holding Ann (30) and Bob (25) in `people`, both
    /// dirty-add.
    pub fn ann_and_bob() -> TestStore {
        let test_store = TestStore::memory();
        provision_people(&test_store);
        test_store
            .store(
                "people",
                vec![
                    json!({"name": "Ann", "age": 30}),
                    json!({"name": "Bob", "age": 25}),
                ],
                true,
            )
            .expect("Failed to store people");
        test_store
    }

    /// Creates a store with `count` people named `person-<i>`.
    pub fn populated_store(count: usize) -> TestStore {
        let test_store = TestStore::memory();
        provision_people(&test_store);
        let documents = (0..count)
            .map(|i| json!({"name": format!("person-{i}"), "age": i}))
            .collect();
        test_store
            .store("people", documents, false)
            .expect("Failed to store people");
        test_store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let test_store = TestStore::memory();
        assert!(test_store.is_open().unwrap());
        assert!(!test_store.is_encrypted().unwrap());
        assert!(test_store.root().is_none());
    }

    #[test]
    fn test_file_store_creates_user_dir() {
        let test_store = TestStore::file();
        assert!(test_store.user_dir().unwrap().is_dir());
    }

    #[test]
    fn test_encrypted_store() {
        let test_store = TestStore::encrypted("secret");
        assert!(test_store.is_encrypted().unwrap());
        assert_eq!(test_store.password(), Some("secret"));
    }

    #[test]
    fn test_with_temp_store() {
        with_temp_store(|store| {
            assert_eq!(store.username(), TEST_USERNAME);
        });
    }

    #[test]
    fn test_reopen_keeps_data() {
        let mut test_store = TestStore::file();
        scenarios::provision_people(&test_store);
        test_store
            .store("people", vec![serde_json::json!({"name": "Ann", "age": 1})], true)
            .unwrap();
        test_store.reopen(None).unwrap();
        assert_eq!(test_store.count("people").unwrap(), 1);
        assert_eq!(test_store.dirty_count("people").unwrap(), 1);
    }

    #[test]
    fn test_populated_scenario() {
        let test_store = scenarios::populated_store(10);
        assert_eq!(test_store.count("people").unwrap(), 10);
        assert_eq!(test_store.dirty_count("people").unwrap(), 0);
    }
}
