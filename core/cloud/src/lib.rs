//! Cloud credentials for Casefile.
//!
//! This crate provides:
//! - Credential records for S3 storage and Bedrock inference
//! - A SQLite-backed credential store with active-purpose lookups
//! - The session factory that turns a record into an AWS session
//! - Remote credential validation (behind the `sdk` feature)

pub mod credentials;
pub mod session;
pub mod store;
pub mod validate;

pub use credentials::{
    BedrockConfiguration, CredentialFields, CredentialRecord, S3Configuration, AWS_REGIONS,
    BEDROCK_REGIONS, DEFAULT_MODEL_ID, DEFAULT_REGION,
};
pub use session::AwsSession;
pub use store::{CredentialStore, S3Purpose};
pub use validate::{check_bedrock_region, validate_bedrock, validate_s3, validate_session};
