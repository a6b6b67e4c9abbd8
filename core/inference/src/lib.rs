//! Model invocation for Casefile.
//!
//! Formats a prompt for the model family named by the model id, sends it
//! through a [`ModelTransport`] and extracts the generated text. The Bedrock
//! runtime transport is compiled in with the `bedrock` feature.

pub mod client;
pub mod family;
pub mod transport;

pub use client::InferenceClient;
pub use family::{InferenceParameters, ModelFamily, ANTHROPIC_VERSION};
#[cfg(feature = "bedrock")]
pub use transport::BedrockTransport;
pub use transport::ModelTransport;
