//! Per-user store directory management.
//!
//! Each user gets one directory under the application root:
//!
//! ```text
//! <root>/<username>/
//! ├─ LOCK              # Advisory lock, one open handle per user store
//! └─ jsonstore.sqlite  # The physical store
//! ```
//!
//! Destroying a store removes the whole per-user directory.

use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;

const LOCK_FILE: &str = "LOCK";
const STORE_FILE: &str = "jsonstore.sqlite";

/// A locked per-user store directory.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    lock_file: Option<File>,
}

impl StoreDir {
    /// Opens or creates the directory for `username` under `root` and takes
    /// its exclusive lock.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidPath`] for an unusable user name, or when the
    ///   directory is missing and `create_if_missing` is false
    /// - [`StorageError::StoreLocked`] when another handle holds the lock
    pub fn open(root: &Path, username: &str, create_if_missing: bool) -> StorageResult<Self> {
        let path = Self::user_dir(root, username)?;

        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(&path)?;
            } else {
                return Err(StorageError::InvalidPath(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(StorageError::InvalidPath(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::StoreLocked);
        }

        Ok(Self {
            path,
            lock_file: Some(lock_file),
        })
    }

    /// Resolves the directory of `username` under `root`.
    pub fn user_dir(root: &Path, username: &str) -> StorageResult<PathBuf> {
        validate_username(username)?;
        Ok(root.join(username))
    }

    /// The per-user directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path to the physical store file.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.path.join(STORE_FILE)
    }

    /// Whether the store file has not been created yet.
    #[must_use]
    pub fn is_new_store(&self) -> bool {
        !self.store_path().exists()
    }

    /// Releases the lock and removes the directory with everything in it.
    ///
    /// The caller must have closed every connection to the store first.
    pub fn destroy(mut self) -> StorageResult<()> {
        if let Some(file) = self.lock_file.take() {
            // Unlock explicitly; some platforms refuse to delete locked files.
            let _ = FileExt::unlock(&file);
        }
        destroy_store_directory(&self.path)
    }
}

impl Drop for StoreDir {
    fn drop(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

/// Removes a per-user store directory. Missing directories are not an error.
pub fn destroy_store_directory(path: &Path) -> StorageResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            info!(path = %path.display(), "destroyed store directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn validate_username(username: &str) -> StorageResult<()> {
    let valid = !username.is_empty()
        && username != "."
        && username != ".."
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidPath(format!(
            "invalid user name: {username:?}"
        )))
    }
}
