//! Credential configuration records for object storage and model inference.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use casefile_common::{Error, Result, SecretString};

/// Region used when a record does not name one.
pub const DEFAULT_REGION: &str = "us-east-2";

/// Default model for new Bedrock configurations.
pub const DEFAULT_MODEL_ID: &str = "us.anthropic.claude-3-sonnet-20240229-v1:0";

/// AWS regions a configuration may be bound to, with display names.
pub const AWS_REGIONS: &[(&str, &str)] = &[
    ("us-east-1", "US East (N. Virginia)"),
    ("us-east-2", "US East (Ohio)"),
    ("us-west-1", "US West (N. California)"),
    ("us-west-2", "US West (Oregon)"),
    ("af-south-1", "Africa (Cape Town)"),
    ("ap-east-1", "Asia Pacific (Hong Kong)"),
    ("ap-south-1", "Asia Pacific (Mumbai)"),
    ("ap-northeast-1", "Asia Pacific (Tokyo)"),
    ("ap-northeast-2", "Asia Pacific (Seoul)"),
    ("ap-northeast-3", "Asia Pacific (Osaka)"),
    ("ap-southeast-1", "Asia Pacific (Singapore)"),
    ("ap-southeast-2", "Asia Pacific (Sydney)"),
    ("ca-central-1", "Canada (Central)"),
    ("eu-central-1", "Europe (Frankfurt)"),
    ("eu-west-1", "Europe (Ireland)"),
    ("eu-west-2", "Europe (London)"),
    ("eu-west-3", "Europe (Paris)"),
    ("eu-north-1", "Europe (Stockholm)"),
    ("eu-south-1", "Europe (Milan)"),
    ("me-south-1", "Middle East (Bahrain)"),
    ("sa-east-1", "South America (São Paulo)"),
];

/// Regions where the Bedrock runtime is offered.
pub const BEDROCK_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-2",
    "ap-northeast-1",
    "ap-southeast-1",
    "eu-central-1",
    "ca-central-1",
];

static BUCKET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9\-]{1,61}[a-z0-9]$").expect("valid bucket regex"));

/// Check whether a region code is in [`AWS_REGIONS`].
pub fn is_known_region(region: &str) -> bool {
    AWS_REGIONS.iter().any(|(code, _)| *code == region)
}

/// Check a bucket name against S3 naming rules.
pub fn is_valid_bucket_name(name: &str) -> bool {
    BUCKET_NAME.is_match(name)
}

/// Access to the key pair and region of any credential record.
///
/// Implemented by both configuration kinds so the session factory can accept
/// either one.
pub trait CredentialRecord {
    /// Friendly name of the record.
    fn name(&self) -> &str;
    /// AWS access key id.
    fn access_key_id(&self) -> &str;
    /// AWS secret access key.
    fn secret_access_key(&self) -> &SecretString;
    /// Region the credentials are scoped to.
    fn region(&self) -> &str;
}

/// Fields shared by every credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialFields {
    /// A friendly name to identify this configuration.
    pub name: String,
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub region: String,
    /// Whether this configuration is currently active.
    pub is_active: bool,
}

impl CredentialFields {
    /// Create active fields in the default region.
    pub fn new(
        name: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::new(secret_access_key.into()),
            region: DEFAULT_REGION.to_string(),
            is_active: true,
        }
    }

    /// Set the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// Field-level validation shared by both configuration kinds.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Configuration name is required".to_string()));
        }
        if self.access_key_id.trim().is_empty() {
            return Err(Error::Validation("AWS Access Key ID is required".to_string()));
        }
        if self.secret_access_key.is_blank() {
            return Err(Error::Validation("AWS Secret Access Key is required".to_string()));
        }
        if !is_known_region(&self.region) {
            return Err(Error::Validation(format!(
                "Unsupported AWS region '{}'",
                self.region
            )));
        }
        Ok(())
    }
}

/// S3 bucket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Configuration {
    /// Row id; `None` until first saved.
    pub id: Option<i64>,
    #[serde(flatten)]
    pub credentials: CredentialFields,
    pub bucket_name: String,
    /// Use this bucket for serving static files.
    pub use_for_static_files: bool,
    /// Use this bucket for storing media files (documents).
    pub use_for_media_files: bool,
    /// Create the bucket during validation if it does not exist.
    pub create_bucket_if_not_exists: bool,
    /// Optional custom domain for the bucket (e.g. `cdn.example.com`).
    pub custom_domain: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl S3Configuration {
    /// Create an unsaved configuration for a bucket.
    pub fn new(credentials: CredentialFields, bucket_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            credentials,
            bucket_name: bucket_name.into(),
            use_for_static_files: false,
            use_for_media_files: false,
            create_bucket_if_not_exists: false,
            custom_domain: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the bucket for media storage.
    pub fn for_media(mut self) -> Self {
        self.use_for_media_files = true;
        self
    }

    /// Mark the bucket for static files.
    pub fn for_static(mut self) -> Self {
        self.use_for_static_files = true;
        self
    }

    /// Validate the record in isolation.
    ///
    /// The active-purpose rule needs the other stored records and is checked
    /// by the credential store on save.
    pub fn validate(&self) -> Result<()> {
        self.credentials.validate()?;
        if !is_valid_bucket_name(&self.bucket_name) {
            return Err(Error::Validation(
                "Bucket name must be between 3 and 63 characters, contain only lowercase letters, \
                 numbers, and hyphens, and start/end with a letter or number."
                    .to_string(),
            ));
        }
        if let Some(domain) = &self.custom_domain {
            if domain.trim().is_empty() || domain.contains('/') {
                return Err(Error::Validation(format!(
                    "Custom domain '{}' must be a bare host name",
                    domain
                )));
            }
        }
        Ok(())
    }

    /// Host serving the bucket's objects.
    pub fn public_host(&self) -> String {
        match &self.custom_domain {
            Some(domain) => domain.clone(),
            None => format!("{}.s3.amazonaws.com", self.bucket_name),
        }
    }

    /// Whether this record currently serves media files.
    pub fn serves_media(&self) -> bool {
        self.credentials.is_active && self.use_for_media_files
    }

    /// Whether this record currently serves static files.
    pub fn serves_static(&self) -> bool {
        self.credentials.is_active && self.use_for_static_files
    }
}

impl CredentialRecord for S3Configuration {
    fn name(&self) -> &str {
        &self.credentials.name
    }

    fn access_key_id(&self) -> &str {
        &self.credentials.access_key_id
    }

    fn secret_access_key(&self) -> &SecretString {
        &self.credentials.secret_access_key
    }

    fn region(&self) -> &str {
        &self.credentials.region
    }
}

impl fmt::Display for S3Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.credentials.name, self.credentials.region)
    }
}

/// Bedrock model-inference configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockConfiguration {
    /// Row id; `None` until first saved.
    pub id: Option<i64>,
    #[serde(flatten)]
    pub credentials: CredentialFields,
    /// Model used when a call does not name one. Includes the regional
    /// prefix (e.g. `us.`).
    pub default_model_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BedrockConfiguration {
    /// Create an unsaved configuration with the default model.
    pub fn new(credentials: CredentialFields) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            credentials,
            default_model_id: DEFAULT_MODEL_ID.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Override the default model.
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.default_model_id = model_id.into();
        self
    }

    /// Validate the record in isolation.
    pub fn validate(&self) -> Result<()> {
        self.credentials.validate()?;
        if self.default_model_id.trim().is_empty() {
            return Err(Error::Validation("Default model ID is required".to_string()));
        }
        Ok(())
    }

    /// Whether the configured region offers the Bedrock runtime.
    pub fn region_supports_bedrock(&self) -> bool {
        BEDROCK_REGIONS.contains(&self.credentials.region.as_str())
    }
}

impl CredentialRecord for BedrockConfiguration {
    fn name(&self) -> &str {
        &self.credentials.name
    }

    fn access_key_id(&self) -> &str {
        &self.credentials.access_key_id
    }

    fn secret_access_key(&self) -> &SecretString {
        &self.credentials.secret_access_key
    }

    fn region(&self) -> &str {
        &self.credentials.region
    }
}

impl fmt::Display for BedrockConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.credentials.name, self.credentials.region)
    }
}
