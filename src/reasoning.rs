//! Reasoning-engine collaborator for the Brain stage.
//!
//! The pipeline talks to a locally hosted text model through the narrow
//! [`ReasoningProvider`] port; orchestration code never sees HTTP. The
//! default implementation speaks the Ollama chat API. Tests substitute a
//! stub provider, so nothing in the crate's test suite needs a live model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Decoding controls for one completion call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    /// Sampling temperature; structured extraction always passes 0.0.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
}

/// Failures at the reasoning-engine boundary.
///
/// These never cross the pipeline surface: the structured extractor
/// recovers every one of them into the empty-schema fallback.
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("reasoning engine request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("reasoning engine returned an unusable response: {0}")]
    Malformed(String),
}

/// Port for a text model that turns a prompt into one completion.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        options: CompletionOptions,
    ) -> Result<String, ReasoningError>;
}

// ── Ollama chat API ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// [`ReasoningProvider`] over an Ollama server's `/api/chat` endpoint.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ReasoningProvider for OllamaProvider {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        options: CompletionOptions,
    ) -> Result<String, ReasoningError> {
        let request = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: ChatOptions {
                temperature: options.temperature,
                num_predict: options.max_output_tokens,
            },
        };

        debug!("Requesting completion from '{model}' ({} prompt chars)", prompt.len());
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReasoningError::Malformed(e.to_string()))?;
        Ok(body.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_wire_shape() {
        let request = ChatRequest {
            model: "qwen2.5:7b",
            messages: [ChatMessage {
                role: "user",
                content: "hello",
            }],
            stream: false,
            options: ChatOptions {
                temperature: 0.0,
                num_predict: 256,
            },
        };
        let body: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&request).unwrap()).unwrap();
        assert_eq!(body["model"], "qwen2.5:7b");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 256);
    }

    #[test]
    fn chat_response_extracts_content() {
        let body = r#"{"model":"m","message":{"role":"assistant","content":"{\"a\":1}"},"done":true}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.message.content, "{\"a\":1}");
    }

    #[test]
    fn base_url_trailing_slash_is_normalised() {
        let provider = OllamaProvider::new("http://localhost:11434/");
        assert_eq!(provider.base_url, "http://localhost:11434");
    }
}
