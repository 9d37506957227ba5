//! Store configuration.

use jsonstore_codec::DEFAULT_ITERATIONS;
use jsonstore_storage::DriverOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

/// User name used when none is given.
pub const DEFAULT_USERNAME: &str = "jsonstore";

/// Configuration for opening a store.
#[derive(Clone)]
pub struct Config {
    /// Application root. Each user store lives in `<root>/<username>/`.
    /// `None` keeps the store in memory.
    pub root: Option<PathBuf>,

    /// Owner of the store.
    pub username: String,

    /// Password protecting the data key. `None` opens a plaintext store.
    pub password: Option<Zeroizing<String>>,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// PBKDF2 iteration count used when wrapping a new data key.
    pub kdf_iterations: u32,

    /// How long to wait on a busy database file.
    pub busy_timeout: Duration,

    /// Whether provisioning may drop and recreate an incompatible collection.
    pub allow_destructive_schema_changes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: None,
            username: DEFAULT_USERNAME.to_string(),
            password: None,
            create_if_missing: true,
            kdf_iterations: DEFAULT_ITERATIONS,
            busy_timeout: Duration::from_secs(5),
            allow_destructive_schema_changes: false,
        }
    }
}

impl Config {
    /// Creates a configuration for an in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates a configuration for a store under `root`.
    #[must_use]
    pub fn at(root: impl AsRef<Path>) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Sets the owning user.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Sets the password that protects the data key.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the PBKDF2 iteration count for new keys.
    #[must_use]
    pub const fn kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    /// Sets the busy timeout.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Allows provisioning to drop incompatible collections.
    #[must_use]
    pub const fn allow_destructive_schema_changes(mut self, value: bool) -> Self {
        self.allow_destructive_schema_changes = value;
        self
    }

    /// Whether the store lives only in memory.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.root.is_none()
    }

    pub(crate) fn password_str(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.as_str())
    }

    pub(crate) fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            busy_timeout: self.busy_timeout,
            create_if_missing: self.create_if_missing,
            ..DriverOptions::default()
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("root", &self.root)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("create_if_missing", &self.create_if_missing)
            .field("kdf_iterations", &self.kdf_iterations)
            .field("busy_timeout", &self.busy_timeout)
            .field(
                "allow_destructive_schema_changes",
                &self.allow_destructive_schema_changes,
            )
            .finish()
    }
}
