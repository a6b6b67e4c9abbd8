//! Storage backend trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use casefile_common::{ObjectKey, Result};

/// Content type used when none can be guessed.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Characters left unescaped in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode each key component and join with `/`.
pub fn encode_key_path(key: &ObjectKey) -> String {
    key.components()
        .iter()
        .map(|c| utf8_percent_encode(c, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Metadata for a stored object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Key of the object.
    pub key: ObjectKey,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// ETag or revision ID, when the backend reports one.
    pub etag: Option<String>,
}

/// Per-object write options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    /// MIME type recorded with the object.
    pub content_type: String,
    /// Restrict the object to authenticated access.
    pub private: bool,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            private: true,
        }
    }
}

/// Result of a delete. Deleting an absent object is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The object existed and was removed (or the backend cannot tell).
    Deleted,
    /// There was nothing to remove.
    AlreadyAbsent,
}

impl DeleteOutcome {
    /// Informational message for callers that report outcomes as text.
    pub fn message(&self, backend: &str) -> String {
        match self {
            DeleteOutcome::Deleted => format!("Document deleted from {} storage", backend),
            DeleteOutcome::AlreadyAbsent => {
                format!("Document already absent from {} storage", backend)
            }
        }
    }
}

/// Storage backend trait for the document storage façade.
///
/// Implementations convert every backend-specific failure into the common
/// error type; nothing else escapes.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get the backend name (e.g., "s3", "local", "memory").
    fn name(&self) -> &str;

    /// Whether objects live outside the local machine.
    fn is_remote(&self) -> bool;

    /// Store `data` under `key`, replacing any existing object.
    ///
    /// # Postconditions
    /// - Object is readable at `key`
    /// - Returns metadata of the stored object
    async fn put(&self, key: &ObjectKey, data: Vec<u8>, options: &PutOptions) -> Result<ObjectMetadata>;

    /// Read an object.
    ///
    /// # Errors
    /// - Object not found
    /// - Network/I/O errors
    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>>;

    /// Check if an object exists.
    async fn exists(&self, key: &ObjectKey) -> Result<bool>;

    /// Delete an object.
    ///
    /// Idempotent: an absent object yields [`DeleteOutcome::AlreadyAbsent`]
    /// (or `Deleted` where the backend cannot distinguish).
    async fn delete(&self, key: &ObjectKey) -> Result<DeleteOutcome>;

    /// List objects at or below `prefix`, sorted by key, at most `max_keys`.
    async fn list(&self, prefix: Option<&ObjectKey>, max_keys: usize) -> Result<Vec<ObjectMetadata>>;

    /// URL granting read access to an object.
    ///
    /// Remote backends return a signed URL valid for `expires_in`; local
    /// backends return a static path and ignore the expiry.
    async fn url(&self, key: &ObjectKey, expires_in: Duration) -> Result<String>;

    /// Unsigned public URL of an object, for backends that have one.
    fn public_url(&self, _key: &ObjectKey) -> Option<String> {
        None
    }
}
