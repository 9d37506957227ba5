//! The store engine.
//!
//! A [`Session`] owns everything the lane worker needs: the store directory
//! lock, the driver, the schema catalog and the body cipher. It is created
//! and used on the worker thread only, so none of it is shared.

mod dirty;
mod documents;
mod keys;
mod provision;

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::schema::{CollectionSchema, SchemaManager};
use jsonstore_codec::EnvelopeCipher;
use jsonstore_storage::{destroy_store_directory, Row, SqliteDriver, StoreDir};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Per-user engine state.
pub(crate) struct Session {
    username: String,
    /// Configuration of the current (or last) open.
    config: Option<Config>,
    /// Directory lock. `None` for in-memory stores and when closed.
    dir: Option<StoreDir>,
    driver: Option<SqliteDriver>,
    schemas: SchemaManager,
    cipher: Option<EnvelopeCipher>,
}

impl Session {
    /// Creates a closed session for `username`.
    pub(crate) fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            config: None,
            dir: None,
            driver: None,
            schemas: SchemaManager::default(),
            cipher: None,
        }
    }

    pub(crate) fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn is_open(&self) -> bool {
        self.driver.is_some()
    }

    pub(crate) fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Opens the store described by `config`.
    ///
    /// Opening an already open session checks the password against the one
    /// the store was opened with and otherwise does nothing.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EncryptionKeyMissing`] if the store is encrypted and
    ///   no password was given
    /// - [`StoreError::EncryptionKeyInvalid`] for a wrong password
    /// - [`StoreError::UnderlyingStore`] if the directory is locked or the
    ///   database cannot be opened
    pub(crate) fn open(&mut self, config: Config) -> StoreResult<()> {
        if config.username != self.username {
            return Err(StoreError::UsernameMismatch {
                active: self.username.clone(),
                requested: config.username,
            });
        }
        if self.is_open() {
            return self.verify_reopen(&config);
        }

        let (dir, mut driver) = match &config.root {
            Some(root) => {
                let dir = StoreDir::open(root, &config.username, config.create_if_missing)?;
                let driver = SqliteDriver::open(&dir.store_path(), &config.driver_options())?;
                (Some(dir), driver)
            }
            None => (None, SqliteDriver::open_in_memory()?),
        };

        SchemaManager::bootstrap(&mut driver)?;
        let schemas = SchemaManager::load(&mut driver)?;
        let cipher = keys::setup(&mut driver, &config, &schemas)?;

        info!(
            username = %self.username,
            encrypted = cipher.is_some(),
            collections = schemas.names().len(),
            in_memory = config.is_in_memory(),
            "store opened"
        );
        self.dir = dir;
        self.driver = Some(driver);
        self.schemas = schemas;
        self.cipher = cipher;
        self.config = Some(config);
        Ok(())
    }

    fn verify_reopen(&mut self, config: &Config) -> StoreResult<()> {
        match (self.is_encrypted(), config.password_str()) {
            (true, Some(password)) => {
                let username = self.username.clone();
                keys::verify(self.driver()?, &username, password).map(drop)
            }
            (true, None) => Err(StoreError::EncryptionKeyMissing),
            (false, Some(_)) => Err(StoreError::invalid_operation(
                "store is open without encryption",
            )),
            (false, None) => Ok(()),
        }
    }

    /// Closes the store. Closing a closed store does nothing.
    pub(crate) fn close(&mut self) -> StoreResult<()> {
        let result = match self.driver.take() {
            Some(mut driver) => driver.close().map_err(StoreError::from),
            None => Ok(()),
        };
        // dropping the directory handle releases the lock
        self.dir = None;
        self.cipher = None;
        self.schemas.clear();
        if result.is_ok() {
            info!(username = %self.username, "store closed");
        }
        result
    }

    /// Closes the store and deletes its directory.
    pub(crate) fn destroy(&mut self) -> StoreResult<()> {
        let path = self.store_dir_path()?;
        self.close()?;
        if let Some(path) = path {
            destroy_store_directory(&path)?;
        }
        self.config = None;
        info!(username = %self.username, "store destroyed");
        Ok(())
    }

    fn store_dir_path(&self) -> StoreResult<Option<PathBuf>> {
        if let Some(dir) = &self.dir {
            return Ok(Some(dir.path().to_path_buf()));
        }
        match self.config.as_ref().and_then(|c| c.root.as_ref()) {
            Some(root) => Ok(Some(StoreDir::user_dir(root, &self.username)?)),
            None => Ok(None),
        }
    }

    /// Rolls back a transaction left open by an operation that panicked.
    pub(crate) fn abort_transaction(&mut self) {
        if let Some(driver) = self.driver.as_mut() {
            if driver.in_transaction() {
                if let Err(err) = driver.rollback() {
                    warn!(error = %err, "rollback after aborted operation failed");
                }
            }
        }
    }

    /// Schemas of all provisioned collections, sorted by name.
    pub(crate) fn collections(&mut self) -> StoreResult<Vec<CollectionSchema>> {
        self.driver()?;
        Ok(self
            .schemas
            .names()
            .iter()
            .filter_map(|name| self.schemas.get(name).cloned())
            .collect())
    }

    pub(crate) fn driver(&mut self) -> StoreResult<&mut SqliteDriver> {
        self.driver.as_mut().ok_or(StoreError::StoreNotOpen)
    }

    /// Schema of a provisioned collection; checks the store is open first.
    pub(crate) fn schema(&mut self, collection: &str) -> StoreResult<CollectionSchema> {
        self.driver()?;
        self.schemas.require(collection)
    }

    /// Runs `f` inside one transaction, committing on success and rolling
    /// back on any error.
    pub(crate) fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.driver()?
            .begin()
            .map_err(StoreError::transaction_failed)?;
        let result = f(self);
        let driver = self.driver()?;
        match result {
            Ok(value) => match driver.commit() {
                Ok(()) => Ok(value),
                Err(err) => {
                    if let Err(rb) = driver.rollback() {
                        warn!(error = %rb, "rollback after failed commit failed");
                    }
                    Err(StoreError::transaction_failed(err))
                }
            },
            Err(err) => {
                if let Err(rb) = driver.rollback() {
                    warn!(error = %rb, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Serializes a body for the `_json` column, encrypting if keyed.
    fn encode_body(&self, json: &Value) -> StoreResult<String> {
        let text = Zeroizing::new(serde_json::to_string(json)?);
        match &self.cipher {
            Some(cipher) => Ok(cipher.encrypt_to_string(text.as_bytes())?),
            None => Ok(text.to_string()),
        }
    }

    fn decode_body(&self, stored: &str) -> StoreResult<Value> {
        match &self.cipher {
            Some(cipher) => {
                let plain = Zeroizing::new(cipher.decrypt_str(stored)?);
                Ok(serde_json::from_slice(&plain)?)
            }
            None => Ok(serde_json::from_str(stored)?),
        }
    }

    /// Decodes an `(_id, _json)` row.
    fn document_from_row(&self, row: &Row) -> StoreResult<crate::types::Document> {
        let (Some(id), Some(body)) = (row.integer(0), row.text(1)) else {
            return Err(StoreError::invalid_document("stored row is missing its id or body"));
        };
        Ok(crate::types::Document::new(id, self.decode_body(body)?))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("open", &self.is_open())
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schema::{FieldType, ProvisionOptions, SearchFields};
    use tempfile::tempdir;

    pub(crate) fn open_session() -> Session {
        let mut session = Session::new("jsonstore");
        session.open(Config::in_memory()).unwrap();
        session
    }

    pub(crate) fn people(session: &mut Session) {
        session
            .provision(
                CollectionSchema::new(
                    "people",
                    SearchFields::new()
                        .with("name", FieldType::String)
                        .with("age", FieldType::Integer),
                    SearchFields::new(),
                ),
                ProvisionOptions::default(),
            )
            .unwrap();
    }

    #[test]
    fn closed_session_rejects_work() {
        let mut session = Session::new("jsonstore");
        assert!(matches!(session.driver(), Err(StoreError::StoreNotOpen)));
        assert!(matches!(
            session.collections(),
            Err(StoreError::StoreNotOpen)
        ));
        session.close().unwrap();
    }

    #[test]
    fn username_is_fixed_per_session() {
        let mut session = Session::new("alice");
        assert!(matches!(
            session.open(Config::in_memory().username("bob")),
            Err(StoreError::UsernameMismatch { .. })
        ));
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let mut session = open_session();
        people(&mut session);
        let result: StoreResult<()> = session.transaction(|s| {
            s.driver()?
                .execute_batch("INSERT INTO people (_json) VALUES ('{}')")?;
            Err(StoreError::invalid_operation("boom"))
        });
        assert!(result.is_err());
        assert_eq!(session.count("people", &[]).unwrap(), 0);
        assert!(!session.driver().unwrap().in_transaction());
    }

    #[test]
    fn abort_clears_dangling_transaction() {
        let mut session = open_session();
        session.driver().unwrap().begin().unwrap();
        session.abort_transaction();
        assert!(!session.driver().unwrap().in_transaction());
    }

    #[test]
    fn destroy_removes_directory_and_lock() {
        let root = tempdir().unwrap();
        let mut session = Session::new("alice");
        session
            .open(Config::at(root.path()).username("alice"))
            .unwrap();
        let user_dir = root.path().join("alice");
        assert!(user_dir.join("jsonstore.sqlite").exists());

        session.destroy().unwrap();
        assert!(!session.is_open());
        assert!(!user_dir.exists());

        session
            .open(Config::at(root.path()).username("alice"))
            .unwrap();
        assert!(session.collections().unwrap().is_empty());
    }

    #[test]
    fn reopen_checks_password() {
        let mut session = Session::new("jsonstore");
        session
            .open(Config::in_memory().password("pw").kdf_iterations(16))
            .unwrap();
        session
            .open(Config::in_memory().password("pw"))
            .unwrap();
        assert!(matches!(
            session.open(Config::in_memory().password("nope")),
            Err(StoreError::EncryptionKeyInvalid)
        ));
        assert!(matches!(
            session.open(Config::in_memory()),
            Err(StoreError::EncryptionKeyMissing)
        ));
    }
}
