//! Transport carrying one model invocation to the provider.

use async_trait::async_trait;

use casefile_common::Result;

/// One request/response exchange with a hosted model.
///
/// Bodies are opaque JSON bytes; formatting belongs to the model family.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &str;

    /// Send `body` to `model_id` and return the raw response body.
    ///
    /// # Errors
    /// - `Error::Inference` for any provider-side failure
    async fn invoke(&self, model_id: &str, body: Vec<u8>) -> Result<Vec<u8>>;

    /// Identifiers of the models this transport can reach.
    ///
    /// Transports without a catalog report none.
    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(feature = "bedrock")]
pub use bedrock::BedrockTransport;

#[cfg(feature = "bedrock")]
mod bedrock {
    use async_trait::async_trait;
    use aws_sdk_bedrockruntime::error::DisplayErrorContext;
    use aws_sdk_bedrockruntime::primitives::Blob;
    use aws_sdk_bedrockruntime::Client;
    use tracing::{debug, error};

    type CatalogClient = aws_sdk_bedrock::Client;

    use super::ModelTransport;
    use casefile_cloud::{AwsSession, BedrockConfiguration};
    use casefile_common::{Error, Result};

    /// Bedrock runtime `InvokeModel` transport, with the control-plane
    /// client for the model catalog.
    pub struct BedrockTransport {
        client: Client,
        catalog: CatalogClient,
    }

    impl BedrockTransport {
        /// Transport over prebuilt runtime and catalog clients.
        pub fn new(client: Client, catalog: CatalogClient) -> Self {
            Self { client, catalog }
        }

        /// Build a transport from a stored configuration, bound to its region.
        ///
        /// # Errors
        /// - `Error::Configuration` if the record lacks its key pair
        pub fn from_config(config: &BedrockConfiguration) -> Result<Self> {
            let session = AwsSession::from_record(config)?;
            Ok(Self::new(
                Client::new(session.sdk_config()),
                CatalogClient::new(session.sdk_config()),
            ))
        }
    }

    #[async_trait]
    impl ModelTransport for BedrockTransport {
        fn name(&self) -> &str {
            "bedrock"
        }

        async fn invoke(&self, model_id: &str, body: Vec<u8>) -> Result<Vec<u8>> {
            debug!("Invoking Bedrock model {}", model_id);

            let output = self
                .client
                .invoke_model()
                .model_id(model_id)
                .content_type("application/json")
                .accept("application/json")
                .body(Blob::new(body))
                .send()
                .await
                .map_err(|e| {
                    error!("Error invoking Bedrock model: {}", DisplayErrorContext(&e));
                    Error::Inference(DisplayErrorContext(&e).to_string())
                })?;

            Ok(output.body().as_ref().to_vec())
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            let output = self
                .catalog
                .list_foundation_models()
                .send()
                .await
                .map_err(|e| {
                    Error::Inference(format!(
                        "Failed to list foundation models: {}",
                        aws_sdk_bedrock::error::DisplayErrorContext(&e)
                    ))
                })?;

            Ok(output
                .model_summaries()
                .iter()
                .map(|summary| summary.model_id().to_string())
                .collect())
        }
    }
}
