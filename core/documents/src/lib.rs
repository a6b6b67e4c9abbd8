//! Versioned legal documents for Casefile.
//!
//! Documents own an ordered list of versions. Each version is one uploaded
//! file, numbered from 1 within its document and stored through the
//! [`casefile_storage::DocumentStorage`] façade.

pub mod models;
pub mod store;
pub mod versioning;

pub use models::{
    base_file_name, file_extension, guess_content_type, Document, DocumentStatus, DocumentVersion,
    NewDocument,
};
pub use store::{DocumentStore, VersionDraft};
pub use versioning::DocumentService;
