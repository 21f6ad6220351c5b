//! OpenAI-compatible client implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/v1/chat/completions`.
//!
//! The agent loop carries its tool protocol inside the reply text, so this
//! client only needs plain chat completions. Files attached to a run are
//! sent as multimodal parts on the newest user message: images as base64
//! `data:` URLs, anything else as a short text note.

use apexclaw_core::error::ProviderError;
use apexclaw_core::message::{Message, Role};
use apexclaw_core::provider::{FileAttachment, LlmClient};
use apexclaw_core::run_context::RunContext;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible chat completion client.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new OpenAI-compatible client.
    ///
    /// The HTTP timeout is generous; the session's own deadline is what
    /// normally bounds a call.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15 * 60))
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create an OpenRouter client (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an Ollama client (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Convert our Message types to OpenAI API format.
    ///
    /// When `files` is non-empty they are attached to the last user message.
    fn to_api_messages(messages: &[Message], files: &[FileAttachment]) -> Vec<ApiMessage> {
        let attach_at = if files.is_empty() {
            None
        } else {
            messages.iter().rposition(|m| m.role == Role::User)
        };

        messages
            .iter()
            .enumerate()
            .map(|(i, m)| ApiMessage {
                role: m.role.as_str().to_string(),
                content: if Some(i) == attach_at {
                    ApiContent::Parts(Self::to_parts(&m.content, files))
                } else {
                    ApiContent::Text(m.content.clone())
                },
            })
            .collect()
    }

    fn to_parts(text: &str, files: &[FileAttachment]) -> Vec<ApiContentPart> {
        let mut parts = vec![ApiContentPart::Text {
            text: text.to_string(),
        }];
        for file in files {
            if file.is_image() {
                parts.push(ApiContentPart::ImageUrl {
                    image_url: ApiImageUrl {
                        url: format!(
                            "data:{};base64,{}",
                            file.mime_type,
                            BASE64.encode(&file.data)
                        ),
                    },
                });
            } else {
                parts.push(ApiContentPart::Text {
                    text: format!("[Attached file: {} ({})]", file.name, file.mime_type),
                });
            }
        }
        parts
    }

    async fn complete(
        &self,
        model_id: &str,
        messages: Vec<ApiMessage>,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": model_id,
            "messages": messages,
            "stream": false,
        });

        debug!(client = %self.name, model = %model_id, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::DeadlineExceeded
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::Authentication(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model endpoint returned error");
            return Err(ProviderError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        _ctx: &RunContext,
        model_id: &str,
        history: &[Message],
    ) -> Result<String, ProviderError> {
        self.complete(model_id, Self::to_api_messages(history, &[]))
            .await
    }

    async fn send_with_files(
        &self,
        _ctx: &RunContext,
        model_id: &str,
        history: &[Message],
        files: &[FileAttachment],
    ) -> Result<String, ProviderError> {
        self.complete(model_id, Self::to_api_messages(history, files))
            .await
    }
}

// ── OpenAI API wire types ──

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Serialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
