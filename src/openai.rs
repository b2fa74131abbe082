//! # OpenAI-Compatible Client Module
//!
//! Thin chat-completions client shared by the vision extractor and the
//! reasoning service. It speaks the wire contract only; callers map
//! `OpenAiError` into their own stage error.

use std::time::Duration;

use log::{debug, error};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProviderConfig;

/// Failures of one chat-completions call
#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("rate limited or over quota: {0}")]
    RateLimited(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Text(text.into()),
        }
    }

    /// User message carrying a prompt and an inline image data URL
    pub fn user_with_image(text: impl Into<String>, data_url: String) -> Self {
        Self {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_url,
                        detail: Some("high"),
                    },
                },
            ]),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<JsonSchemaFormat>,
}

/// Named schema the answer must follow
#[derive(Debug, Serialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub schema: serde_json::Value,
    /// Provider-side strict mode rejects schemas using `minimum`/`maximum`
    pub strict: bool,
}

impl ResponseFormat {
    /// Any JSON object
    pub fn json_object() -> Self {
        Self {
            kind: "json_object",
            json_schema: None,
        }
    }

    /// JSON following `schema`
    pub fn json_schema(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            kind: "json_schema",
            json_schema: Some(JsonSchemaFormat {
                name: name.into(),
                schema,
                strict: false,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Text of the first choice plus the model that answered
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, OpenAiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OpenAiError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &ProviderConfig, api_key: &str, timeout: Duration) -> Result<Self, OpenAiError> {
        Self::new(api_key.to_string(), config.base_url.clone(), timeout)
    }

    /// POST one chat-completions request and return the first choice
    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatCompletion, OpenAiError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending chat completion to {} with model {}", url, request.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Chat completion request failed: {}", e);
                OpenAiError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Chat completion returned {}: {}", status, body);
            return Err(classify_status(status, body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| OpenAiError::InvalidResponse(format!("failed to decode response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| OpenAiError::InvalidResponse("response has no choices".to_string()))?;

        Ok(ChatCompletion {
            content,
            model: parsed.model,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
}

/// The `error.code` of a provider error body, when it has one
pub fn error_code(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body).ok()?.error.code
}

fn classify_status(status: StatusCode, body: String) -> OpenAiError {
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("insufficient_quota") {
        OpenAiError::RateLimited(format!("{status}"))
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        OpenAiError::Unavailable(format!("{status}"))
    } else {
        OpenAiError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}
