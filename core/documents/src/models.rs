//! Document and version records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use casefile_common::{DocumentId, Error, ObjectKey, Result};
use casefile_storage::{StorageLocation, VersionedFile, DEFAULT_CONTENT_TYPE};

/// Review status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Draft,
    UnderReview,
    Approved,
    Archived,
}

impl DocumentStatus {
    /// Stored form, as written in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::UnderReview => "under_review",
            DocumentStatus::Approved => "approved",
            DocumentStatus::Archived => "archived",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(DocumentStatus::Draft),
            "under_review" => Ok(DocumentStatus::UnderReview),
            "approved" => Ok(DocumentStatus::Approved),
            "archived" => Ok(DocumentStatus::Archived),
            other => Err(Error::InvalidInput(format!("Unknown document status '{}'", other))),
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields for creating a document.
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub title: String,
    pub description: String,
    /// Comma-separated tags.
    pub tags: String,
    pub status: DocumentStatus,
    pub is_private: bool,
}

impl NewDocument {
    /// A private draft with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            is_private: true,
            ..Default::default()
        }
    }

    /// Set the free-text description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set comma-separated tags.
    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    /// Set the initial review status.
    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark stored files private or public.
    pub fn with_private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }
}

/// A logical document owning zero or more versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Row id.
    pub id: i64,
    /// Stable external identifier.
    pub uuid: DocumentId,
    pub title: String,
    pub description: String,
    pub tags: String,
    pub status: DocumentStatus,
    /// Stored objects get a private ACL when set.
    pub is_private: bool,
    /// Highest sequence number handed out so far.
    pub version_counter: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Tags split on commas, each trimmed.
    pub fn tag_list(&self) -> Vec<String> {
        if self.tags.is_empty() {
            return Vec::new();
        }
        self.tags.split(',').map(|tag| tag.trim().to_string()).collect()
    }
}

/// One uploaded file instance of a document.
///
/// Immutable apart from the storage location, attached once the bytes are
/// written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVersion {
    /// Row id.
    pub id: i64,
    pub document: DocumentId,
    /// 1-based, strictly increasing within the document.
    pub sequence: u32,
    pub file_name: String,
    /// Size in bytes.
    pub file_size: u64,
    /// MIME type guessed from the file name.
    pub content_type: String,
    pub notes: String,
    pub uploaded_at: DateTime<Utc>,
    /// Object key when stored remotely.
    pub remote_key: Option<ObjectKey>,
    /// Path below the media root when stored locally.
    pub local_path: Option<ObjectKey>,
    /// Privacy of the owning document.
    pub is_private: bool,
}

impl DocumentVersion {
    /// Record where the bytes were written.
    pub fn set_location(&mut self, location: StorageLocation) {
        match location {
            StorageLocation::Remote(key) => self.remote_key = Some(key),
            StorageLocation::Local(key) => self.local_path = Some(key),
        }
    }

    /// Lower-cased extension of the file name, with its dot.
    pub fn file_extension(&self) -> Option<String> {
        file_extension(&self.file_name)
    }
}

impl VersionedFile for DocumentVersion {
    fn document_id(&self) -> DocumentId {
        self.document
    }

    fn sequence(&self) -> u32 {
        self.sequence
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn is_private(&self) -> bool {
        self.is_private
    }

    fn location(&self) -> Option<StorageLocation> {
        if let Some(key) = &self.remote_key {
            return Some(StorageLocation::Remote(key.clone()));
        }
        self.local_path.clone().map(StorageLocation::Local)
    }
}

/// MIME type for a file name, `application/octet-stream` when unknown.
pub fn guess_content_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Lower-cased extension of a file name, with its dot.
pub fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

/// Final component of an uploaded file name.
///
/// # Errors
/// - `Error::InvalidInput` if nothing usable remains
pub fn base_file_name(name: &str) -> Result<String> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(Error::InvalidInput(format!("Invalid file name '{}'", name)));
    }
    Ok(base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(file_name: &str) -> DocumentVersion {
        DocumentVersion {
            id: 1,
            document: DocumentId::new(),
            sequence: 1,
            file_name: file_name.to_string(),
            file_size: 0,
            content_type: guess_content_type(file_name),
            notes: String::new(),
            uploaded_at: Utc::now(),
            remote_key: None,
            local_path: None,
            is_private: true,
        }
    }

    #[test]
    fn test_tag_list_trims() {
        let doc = Document {
            id: 1,
            uuid: DocumentId::new(),
            title: "Lease".to_string(),
            description: String::new(),
            tags: "contract, lease ,  2024".to_string(),
            status: DocumentStatus::Draft,
            is_private: true,
            version_counter: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(doc.tag_list(), vec!["contract", "lease", "2024"]);

        let untagged = Document {
            tags: String::new(),
            ..doc
        };
        assert!(untagged.tag_list().is_empty());
    }

    #[test]
    fn test_status_strings() {
        for status in [
            DocumentStatus::Draft,
            DocumentStatus::UnderReview,
            DocumentStatus::Approved,
            DocumentStatus::Archived,
        ] {
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("pending".parse::<DocumentStatus>().is_err());
        assert_eq!(DocumentStatus::default(), DocumentStatus::Draft);
    }

    #[test]
    fn test_content_type_guess() {
        assert_eq!(guess_content_type("contract.pdf"), "application/pdf");
        assert_eq!(guess_content_type("notes.txt"), "text/plain");
        assert_eq!(guess_content_type("exhibit"), "application/octet-stream");
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(version("Brief.PDF").file_extension().as_deref(), Some(".pdf"));
        assert_eq!(version("README").file_extension(), None);
    }

    #[test]
    fn test_base_file_name() {
        assert_eq!(base_file_name("/tmp/uploads/contract.pdf").unwrap(), "contract.pdf");
        assert_eq!(base_file_name(r"C:\docs\brief.docx").unwrap(), "brief.docx");
        assert!(base_file_name("uploads/").is_err());
        assert!(base_file_name("..").is_err());
    }

    #[test]
    fn test_location_prefers_remote_key() {
        let mut v = version("contract.pdf");
        assert!(v.location().is_none());

        let key = v.storage_key().unwrap();
        v.set_location(StorageLocation::Local(key.clone()));
        assert_eq!(v.location(), Some(StorageLocation::Local(key.clone())));

        v.set_location(StorageLocation::Remote(key.clone()));
        assert_eq!(v.location(), Some(StorageLocation::Remote(key)));
    }
}
