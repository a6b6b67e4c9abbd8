//! Session factory: authenticated AWS sessions built from credential records.
//!
//! Building a session never touches the network. Credentials are only
//! exercised when a client built from the session makes its first call.

use std::fmt;

use crate::credentials::{CredentialRecord, DEFAULT_REGION};
use casefile_common::{Error, Result, SecretString};

/// Credentials provider name reported to the AWS SDK.
#[cfg(feature = "sdk")]
const PROVIDER_NAME: &str = "casefile-credential-store";

/// An authenticated session bound to one key pair and region.
#[derive(Clone)]
pub struct AwsSession {
    access_key_id: String,
    secret_access_key: SecretString,
    region: String,
    #[cfg(feature = "sdk")]
    sdk_config: aws_config::SdkConfig,
}

impl AwsSession {
    /// Build a session from a credential record.
    ///
    /// # Errors
    /// - `Error::Configuration` if the access key id or secret is empty
    pub fn from_record(record: &impl CredentialRecord) -> Result<Self> {
        if record.access_key_id().trim().is_empty() || record.secret_access_key().is_blank() {
            return Err(Error::Configuration(format!(
                "Configuration '{}' must have an access key id and a secret access key",
                record.name()
            )));
        }

        let region = if record.region().trim().is_empty() {
            DEFAULT_REGION.to_string()
        } else {
            record.region().to_string()
        };

        Ok(Self::build(
            record.access_key_id().to_string(),
            record.secret_access_key().clone(),
            region,
        ))
    }

    #[cfg(feature = "sdk")]
    fn build(access_key_id: String, secret_access_key: SecretString, region: String) -> Self {
        use aws_config::{BehaviorVersion, Region, SdkConfig};
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let credentials = Credentials::new(
            access_key_id.clone(),
            secret_access_key.expose().to_string(),
            None,
            None,
            PROVIDER_NAME,
        );
        let sdk_config = SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .build();

        Self {
            access_key_id,
            secret_access_key,
            region,
            sdk_config,
        }
    }

    #[cfg(not(feature = "sdk"))]
    fn build(access_key_id: String, secret_access_key: SecretString, region: String) -> Self {
        Self {
            access_key_id,
            secret_access_key,
            region,
        }
    }

    /// Access key id the session signs with.
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Secret the session signs with.
    pub fn secret_access_key(&self) -> &SecretString {
        &self.secret_access_key
    }

    /// Region the session is bound to.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Shared SDK configuration for building service clients.
    #[cfg(feature = "sdk")]
    pub fn sdk_config(&self) -> &aws_config::SdkConfig {
        &self.sdk_config
    }

    /// S3 client bound to this session.
    #[cfg(feature = "sdk")]
    pub fn s3_client(&self) -> aws_sdk_s3::Client {
        aws_sdk_s3::Client::new(&self.sdk_config)
    }

    /// STS client bound to this session.
    #[cfg(feature = "sdk")]
    pub fn sts_client(&self) -> aws_sdk_sts::Client {
        aws_sdk_sts::Client::new(&self.sdk_config)
    }
}

impl fmt::Debug for AwsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSession")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key)
            .field("region", &self.region)
            .finish()
    }
}
