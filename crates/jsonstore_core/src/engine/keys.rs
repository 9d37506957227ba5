//! Data protection key handling.
//!
//! Bodies are encrypted under a random data key. The data key is stored in
//! the keys table wrapped under a key derived from the user's password, so
//! changing the password never requires knowing more than the old one.

use super::Session;
use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::schema::{SchemaManager, KEYS_TABLE};
use jsonstore_codec::{unwrap_key, wrap_key, Envelope, EnvelopeCipher, SecretKey};
use jsonstore_storage::{quote_ident, SqlValue, SqliteDriver, Statement};
use tracing::info;
use zeroize::Zeroizing;

/// Derives the body cipher for a store being opened.
///
/// A password on a store without a key creates the key, but only while the
/// store holds no collections: existing plaintext data is never silently
/// mixed with encrypted data.
pub(super) fn setup(
    driver: &mut SqliteDriver,
    config: &Config,
    schemas: &SchemaManager,
) -> StoreResult<Option<EnvelopeCipher>> {
    let wrapped = load_wrapped(driver, &config.username)?;
    match (wrapped, config.password_str()) {
        (Some(envelope), Some(password)) => {
            let key = unwrap_key(&envelope, password)?;
            Ok(Some(EnvelopeCipher::new(&key)?))
        }
        (Some(_), None) => Err(StoreError::EncryptionKeyMissing),
        (None, Some(password)) => {
            if !schemas.is_empty() {
                return Err(StoreError::invalid_operation(
                    "store was created without a password",
                ));
            }
            let key = SecretKey::generate();
            let envelope = wrap_key(&key, password, config.kdf_iterations)?;
            store_wrapped(driver, &config.username, &envelope)?;
            info!(username = %config.username, iterations = config.kdf_iterations, "data key created");
            Ok(Some(EnvelopeCipher::new(&key)?))
        }
        (None, None) => Ok(None),
    }
}

/// Unwraps the data key with `password`.
pub(super) fn verify(
    driver: &mut SqliteDriver,
    username: &str,
    password: &str,
) -> StoreResult<SecretKey> {
    let envelope = load_wrapped(driver, username)?
        .ok_or_else(|| StoreError::invalid_operation("store is not encrypted"))?;
    Ok(unwrap_key(&envelope, password)?)
}

fn load_wrapped(driver: &mut SqliteDriver, username: &str) -> StoreResult<Option<Envelope>> {
    let row = driver.select_one(
        &Statement::new(format!("SELECT envelope FROM {KEYS_TABLE} WHERE username = ?"))
            .bind(username.to_string()),
    )?;
    match row.as_ref().and_then(|r| r.text(0)) {
        Some(text) => Ok(Some(Envelope::decode(text)?)),
        None => Ok(None),
    }
}

fn store_wrapped(driver: &mut SqliteDriver, username: &str, envelope: &Envelope) -> StoreResult<()> {
    driver.execute(
        &Statement::new(format!(
            "INSERT OR REPLACE INTO {KEYS_TABLE} (username, envelope) VALUES (?, ?)"
        ))
        .bind(username.to_string())
        .bind(envelope.encode()?),
    )?;
    Ok(())
}

/// Re-encrypts every body of `collections` from `old` to `new` and stores
/// the new wrapped key. Returns the number of bodies rewritten.
fn reencrypt_all(
    driver: &mut SqliteDriver,
    collections: &[String],
    old: &EnvelopeCipher,
    new: &EnvelopeCipher,
    username: &str,
    wrapped: &Envelope,
) -> StoreResult<usize> {
    let mut rewritten = 0;
    for name in collections {
        let table = quote_ident(name);
        let rows = driver.select(&Statement::new(format!("SELECT _id, _json FROM {table}")))?;
        let update = format!("UPDATE {table} SET _json = ? WHERE _id = ?");
        for row in rows {
            let (Some(id), Some(body)) = (row.integer(0), row.text(1)) else {
                continue;
            };
            let plain = Zeroizing::new(old.decrypt_str(body)?);
            let sealed = new.encrypt_to_string(&plain)?;
            driver.update(
                &Statement::new(update.clone())
                    .bind(SqlValue::Text(sealed))
                    .bind(id),
            )?;
            rewritten += 1;
        }
    }
    store_wrapped(driver, username, wrapped)?;
    Ok(rewritten)
}

impl Session {
    /// Rotates the data key and re-wraps it under `new_password`.
    ///
    /// Runs in one transaction: on any failure the store keeps the old key
    /// and the old password.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EncryptionKeyInvalid`] if `old_password` is wrong
    /// - [`StoreError::InvalidOperation`] if the store is not encrypted
    pub(crate) fn change_password(
        &mut self,
        old_password: &str,
        new_password: &str,
    ) -> StoreResult<()> {
        let username = self.username.clone();
        self.driver()?;
        if !self.is_encrypted() {
            return Err(StoreError::invalid_operation("store is not encrypted"));
        }
        verify(self.driver()?, &username, old_password)?;

        let iterations = self
            .config
            .as_ref()
            .map_or(jsonstore_codec::DEFAULT_ITERATIONS, |c| c.kdf_iterations);
        let new_key = SecretKey::generate();
        let wrapped = wrap_key(&new_key, new_password, iterations)?;
        let new_cipher = EnvelopeCipher::new(&new_key)?;
        let collections = self.schemas.names();

        let Some(old_cipher) = self.cipher.take() else {
            return Err(StoreError::EncryptionKeyMissing);
        };
        let result = self.transaction(|s| {
            reencrypt_all(
                s.driver()?,
                &collections,
                &old_cipher,
                &new_cipher,
                &username,
                &wrapped,
            )
        });
        match result {
            Ok(rewritten) => {
                self.cipher = Some(new_cipher);
                info!(username = %username, rewritten, "password changed and data key rotated");
                Ok(())
            }
            Err(err) => {
                self.cipher = Some(old_cipher);
                Err(err)
            }
        }
    }
}
