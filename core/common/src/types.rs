//! Common types used throughout Casefile.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use zeroize::Zeroize;

/// Root prefix under which all document files are stored.
pub const DOCUMENTS_PREFIX: &str = "documents";

/// Stable external identifier for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generate a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for DocumentId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| crate::Error::InvalidInput(format!("Invalid document id '{}': {}", s, e)))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A key addressing one stored object, independent of the backend.
///
/// Keys are relative, `/`-separated and never contain empty, `.` or `..`
/// components, so the same key is valid both as an S3 object key and as a
/// path below a local media root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    components: Vec<String>,
}

impl ObjectKey {
    /// Create a key from string components.
    ///
    /// # Errors
    /// - No components given
    /// - A component is empty, `.`, `..` or contains a separator
    pub fn from_components(components: Vec<String>) -> crate::Result<Self> {
        if components.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Object key cannot be empty".to_string(),
            ));
        }
        for comp in &components {
            validate_component(comp)?;
        }
        Ok(Self { components })
    }

    /// Parse a key string. Leading and trailing separators are ignored.
    pub fn parse(key: &str) -> crate::Result<Self> {
        let key = key.trim_matches('/');
        if key.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Object key cannot be empty".to_string(),
            ));
        }
        Self::from_components(key.split('/').map(String::from).collect())
    }

    /// Key for one version of a document:
    /// `documents/{document-id}/{version-sequence}/{file-name}`.
    pub fn for_version(document: &DocumentId, sequence: u32, file_name: &str) -> crate::Result<Self> {
        if sequence == 0 {
            return Err(crate::Error::InvalidInput(
                "Version sequence starts at 1".to_string(),
            ));
        }
        Self::from_components(vec![
            DOCUMENTS_PREFIX.to_string(),
            document.to_string(),
            sequence.to_string(),
            file_name.to_string(),
        ])
    }

    /// Prefix covering every version of a document.
    pub fn document_prefix(document: &DocumentId) -> Self {
        Self {
            components: vec![DOCUMENTS_PREFIX.to_string(), document.to_string()],
        }
    }

    /// Get the parent key, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.components.len() <= 1 {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the final component (the file name).
    pub fn name(&self) -> &str {
        self.components
            .last()
            .map(|s| s.as_str())
            .unwrap_or_default()
    }

    /// Append a child component.
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        validate_component(child)?;
        let mut components = self.components.clone();
        components.push(child.to_string());
        Ok(Self { components })
    }

    /// Whether this key lies at or below `prefix`.
    pub fn starts_with(&self, prefix: &ObjectKey) -> bool {
        self.components.starts_with(&prefix.components)
    }

    /// Get the key components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// The key as a `/`-joined string without a leading separator.
    pub fn as_key_string(&self) -> String {
        self.components.join("/")
    }
}

fn validate_component(comp: &str) -> crate::Result<()> {
    if comp.is_empty() {
        return Err(crate::Error::InvalidInput(
            "Key component cannot be empty".to_string(),
        ));
    }
    if comp == "." || comp == ".." {
        return Err(crate::Error::InvalidInput(format!(
            "Key component '{}' is not allowed",
            comp
        )));
    }
    if comp.contains('/') || comp.contains('\\') {
        return Err(crate::Error::InvalidInput(
            "Key component cannot contain separators".to_string(),
        ));
    }
    Ok(())
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_key_string())
    }
}

/// Credential secret that zeroizes on drop and never prints its value.
#[derive(Clone, PartialEq, Eq, Zeroize, Serialize, Deserialize)]
#[zeroize(drop)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Expose the secret for handing to a client library.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if empty (after trimming whitespace).
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}
