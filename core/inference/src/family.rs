//! Per-family request and response formats.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use casefile_common::{Error, Result};

/// API version sent with Anthropic message requests.
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Substring identifying Anthropic Claude model ids, with or without an
/// inference-profile prefix such as `us.`.
const CLAUDE_MARKER: &str = "anthropic.claude";

/// Sampling parameters for one invocation.
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceParameters {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for InferenceParameters {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

/// Request/response schema family of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// Anthropic Claude messages API.
    Claude,
    /// Prompt-in, completion-out fallback.
    Generic,
}

impl ModelFamily {
    /// Family of a model id.
    pub fn detect(model_id: &str) -> Self {
        if model_id.contains(CLAUDE_MARKER) {
            ModelFamily::Claude
        } else {
            ModelFamily::Generic
        }
    }

    /// JSON request body for `prompt`.
    pub fn request_body(&self, prompt: &str, params: &InferenceParameters) -> Value {
        match self {
            ModelFamily::Claude => json!({
                "anthropic_version": ANTHROPIC_VERSION,
                "max_tokens": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
                "messages": [
                    { "role": "user", "content": prompt }
                ],
            }),
            ModelFamily::Generic => json!({
                "prompt": prompt,
                "max_tokens": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
            }),
        }
    }

    /// Generated text from a raw response body.
    ///
    /// A well-formed body without text yields an empty string.
    ///
    /// # Errors
    /// - `Error::Inference` if the body is not JSON
    pub fn parse_response(&self, body: &[u8]) -> Result<String> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| Error::Inference(format!("Invalid model response body: {}", e)))?;

        let text = match self {
            ModelFamily::Claude => value
                .get("content")
                .and_then(|content| content.get(0))
                .and_then(|first| first.get("text"))
                .and_then(Value::as_str),
            ModelFamily::Generic => value
                .get("completion")
                .or_else(|| value.get("generated_text"))
                .and_then(Value::as_str),
        };

        Ok(text.unwrap_or_default().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_detect_family() {
        assert_eq!(
            ModelFamily::detect("us.anthropic.claude-3-sonnet-20240229-v1:0"),
            ModelFamily::Claude
        );
        assert_eq!(
            ModelFamily::detect("anthropic.claude-v2"),
            ModelFamily::Claude
        );
        assert_eq!(
            ModelFamily::detect("amazon.titan-text-express-v1"),
            ModelFamily::Generic
        );
    }

    #[test]
    fn test_claude_request_shape() {
        let body = ModelFamily::Claude.request_body("Summarize the brief", &InferenceParameters::default());
        assert_eq!(body["anthropic_version"], ANTHROPIC_VERSION);
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Summarize the brief");
        assert!(body.get("prompt").is_none());
    }

    #[test]
    fn test_generic_request_shape() {
        let params = InferenceParameters {
            max_tokens: 64,
            ..Default::default()
        };
        let body = ModelFamily::Generic.request_body("Hello", &params);
        assert_eq!(body["prompt"], "Hello");
        assert_eq!(body["max_tokens"], 64);
        assert!(body.get("messages").is_none());
    }

    #[test]
    fn test_partial_parameters_fill_defaults() {
        let params: InferenceParameters = serde_json::from_str(r#"{"max_tokens": 42}"#).unwrap();
        assert_eq!(params.max_tokens, 42);
        assert_eq!(params.temperature, 0.7);
        assert_eq!(params.top_p, 0.9);
    }

    #[test]
    fn test_claude_response_text() {
        let body = br#"{"content": [{"type": "text", "text": "Done."}], "stop_reason": "end_turn"}"#;
        assert_eq!(ModelFamily::Claude.parse_response(body).unwrap(), "Done.");
        assert_eq!(ModelFamily::Claude.parse_response(br#"{"content": []}"#).unwrap(), "");
    }

    #[test]
    fn test_generic_response_text() {
        assert_eq!(
            ModelFamily::Generic.parse_response(br#"{"completion": "a"}"#).unwrap(),
            "a"
        );
        assert_eq!(
            ModelFamily::Generic.parse_response(br#"{"generated_text": "b"}"#).unwrap(),
            "b"
        );
        assert_eq!(ModelFamily::Generic.parse_response(b"{}").unwrap(), "");
    }

    #[test]
    fn test_non_json_response_is_error() {
        assert!(matches!(
            ModelFamily::Claude.parse_response(b"<html>"),
            Err(Error::Inference(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_request_carries_prompt_verbatim(prompt in ".{0,200}", profile in "(us\\.|eu\\.)?") {
            let claude = ModelFamily::Claude.request_body(&prompt, &InferenceParameters::default());
            prop_assert_eq!(claude["messages"][0]["content"].as_str(), Some(prompt.as_str()));

            let model_id = format!("{}anthropic.claude-3-haiku-20240307-v1:0", profile);
            prop_assert_eq!(ModelFamily::detect(&model_id), ModelFamily::Claude);
        }
    }
}
