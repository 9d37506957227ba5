//! Document and dirty-state types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Identifier assigned to a document on insertion.
///
/// Unique and increasing within a collection; never reused.
pub type DocumentId = i64;

/// Sync-relevant state of a document.
///
/// Persisted in the `_operation` column as `''`, `'add'`, `'replace'` or
/// `'remove'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirtyState {
    /// In sync with the remote.
    Clean,
    /// Added locally and not yet pushed.
    Add,
    /// Replaced locally and not yet pushed.
    Replace,
    /// Removed locally; hidden from queries until marked clean.
    Remove,
}

impl DirtyState {
    /// Value stored in the `_operation` column.
    #[must_use]
    pub const fn as_operation(self) -> &'static str {
        match self {
            Self::Clean => "",
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Remove => "remove",
        }
    }

    /// Parses an `_operation` column value.
    #[must_use]
    pub fn from_operation(op: &str) -> Option<Self> {
        match op {
            "" => Some(Self::Clean),
            "add" => Some(Self::Add),
            "replace" => Some(Self::Replace),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }

    /// Whether the document has unsynced local changes.
    #[must_use]
    pub const fn is_dirty(self) -> bool {
        !matches!(self, Self::Clean)
    }
}

impl fmt::Display for DirtyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => f.write_str("clean"),
            other => f.write_str(other.as_operation()),
        }
    }
}

impl FromStr for DirtyState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clean" | "" => Ok(Self::Clean),
            "add" | "store" => Ok(Self::Add),
            "replace" | "update" => Ok(Self::Replace),
            "remove" | "delete" => Ok(Self::Remove),
            other => Err(format!("unknown operation: {other}")),
        }
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned identifier.
    #[serde(rename = "_id")]
    pub id: DocumentId,
    /// The document body.
    pub json: Value,
}

impl Document {
    /// Creates a document.
    #[must_use]
    pub fn new(id: DocumentId, json: Value) -> Self {
        Self { id, json }
    }
}

/// A document with pending local changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirtyDocument {
    /// The document as last written locally.
    #[serde(flatten)]
    pub document: Document,
    /// The pending operation.
    #[serde(rename = "_operation")]
    pub operation: DirtyState,
    /// When the document became dirty, in milliseconds since the epoch.
    #[serde(rename = "_dirty")]
    pub dirty_at: f64,
}

/// Why a single document in a replace batch was not replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No live document has this id.
    NotFound,
    /// The document body was rejected.
    Invalid(String),
    /// The write itself failed.
    Store(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("document not found"),
            Self::Invalid(msg) => write!(f, "invalid document: {msg}"),
            Self::Store(msg) => write!(f, "write failed: {msg}"),
        }
    }
}

/// A document that a replace batch could not apply.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceFailure {
    /// The rejected document.
    pub document: Document,
    /// Why it was rejected.
    pub reason: FailureReason,
}

/// Result of a replace batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaceOutcome {
    /// Number of documents replaced.
    pub replaced: usize,
    /// Documents that were not replaced.
    pub failures: Vec<ReplaceFailure>,
}

impl ReplaceOutcome {
    /// Whether every document was replaced.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub(crate) fn now_millis() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}
