//! Model invocation client.

use tracing::{debug, info, warn};

use crate::family::{InferenceParameters, ModelFamily};
use crate::transport::ModelTransport;
use casefile_cloud::{BedrockConfiguration, CredentialStore};
use casefile_common::{Error, Result};

/// Text generation against a hosted model.
///
/// A client without a transport is valid: every invocation then fails with
/// `Error::Unavailable`, matching a deployment with no active configuration.
pub struct InferenceClient {
    transport: Option<Box<dyn ModelTransport>>,
    default_model: Option<String>,
}

impl InferenceClient {
    /// Client over an explicit transport.
    pub fn new(transport: Box<dyn ModelTransport>, default_model: Option<String>) -> Self {
        Self {
            transport: Some(transport),
            default_model,
        }
    }

    /// Client that cannot reach any model.
    pub fn unavailable() -> Self {
        Self {
            transport: None,
            default_model: None,
        }
    }

    /// Client for one Bedrock configuration.
    ///
    /// # Errors
    /// - `Error::Configuration` if the record lacks its key pair
    #[cfg(feature = "bedrock")]
    pub fn from_config(config: &BedrockConfiguration) -> Result<Self> {
        let transport = crate::transport::BedrockTransport::from_config(config)?;
        Ok(Self::new(
            Box::new(transport),
            Some(config.default_model_id.clone()),
        ))
    }

    /// Client for one Bedrock configuration.
    #[cfg(not(feature = "bedrock"))]
    pub fn from_config(config: &BedrockConfiguration) -> Result<Self> {
        tracing::error!(
            "Bedrock support is not available; configuration '{}' cannot be used",
            config.credentials.name
        );
        Ok(Self::unavailable())
    }

    /// Client for the active Bedrock configuration in `store`.
    pub fn from_store(store: &CredentialStore) -> Result<Self> {
        match store.active_bedrock()? {
            Some(config) => {
                info!(
                    "Using Bedrock configuration '{}' in {}",
                    config.credentials.name, config.credentials.region
                );
                Self::from_config(&config)
            }
            None => {
                warn!("No Bedrock configuration provided or available");
                Ok(Self::unavailable())
            }
        }
    }

    /// Whether a transport is configured.
    pub fn is_available(&self) -> bool {
        self.transport.is_some()
    }

    /// Model used when a call names none.
    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    /// Generate text for `prompt`.
    ///
    /// `model_id` falls back to the configured default and `params` to
    /// [`InferenceParameters::default`]. One remote call, no retries.
    ///
    /// # Errors
    /// - `Error::Unavailable` without a transport
    /// - `Error::Configuration` if no model id is known
    /// - `Error::Inference` for provider failures or unreadable responses
    pub async fn invoke(
        &self,
        prompt: &str,
        model_id: Option<&str>,
        params: Option<&InferenceParameters>,
    ) -> Result<String> {
        let transport = self.transport.as_deref().ok_or_else(|| {
            Error::Unavailable("No Bedrock client available - check configuration".to_string())
        })?;
        let model_id = model_id
            .or(self.default_model.as_deref())
            .ok_or_else(|| Error::Configuration("No model id given and no default model configured".to_string()))?;
        let params = params.copied().unwrap_or_default();

        let family = ModelFamily::detect(model_id);
        let body = serde_json::to_vec(&family.request_body(prompt, &params))?;
        debug!(
            "Invoking {} via {} ({:?} format, max_tokens={})",
            model_id,
            transport.name(),
            family,
            params.max_tokens
        );

        let response = transport.invoke(model_id, body).await?;
        family.parse_response(&response)
    }

    /// Model ids offered to the configured account.
    ///
    /// Empty when no transport is configured or the listing fails; the
    /// failure is logged.
    pub async fn list_available_models(&self) -> Vec<String> {
        let Some(transport) = self.transport.as_deref() else {
            return Vec::new();
        };
        match transport.list_models().await {
            Ok(models) => {
                debug!("{} model(s) available via {}", models.len(), transport.name());
                models
            }
            Err(e) => {
                tracing::error!("Error listing Bedrock models: {}", e);
                Vec::new()
            }
        }
    }
}
