//! Common utilities and types shared across Casefile crates.
//!
//! This crate provides the error taxonomy, document identifiers, storage
//! object keys and the secret wrapper used for cloud credentials.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{DocumentId, ObjectKey, SecretString};
