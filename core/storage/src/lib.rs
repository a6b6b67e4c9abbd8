//! Document storage for Casefile.
//!
//! This crate provides a trait-based interface over storage backends (S3,
//! local filesystem, in-memory) and the façade that picks one of them from
//! the credential store.
//!
//! # Design Principles
//! - Backend isolation: no backend-specific logic outside its module
//! - Async operations: all I/O operations are async
//! - Unified error semantics: every backend failure becomes the common error
//! - Same key layout everywhere: `documents/{document-id}/{sequence}/{file}`

pub mod facade;
pub mod local;
pub mod memory;
pub mod provider;
#[cfg(feature = "s3")]
pub mod s3;
pub mod settings;

pub use facade::{DocumentStorage, StorageLocation, VersionedFile};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use provider::{
    encode_key_path, DeleteOutcome, ObjectMetadata, PutOptions, StorageBackend,
    DEFAULT_CONTENT_TYPE,
};
#[cfg(feature = "s3")]
pub use s3::S3Backend;
pub use settings::StorageSettings;
