//! OpenAI-compatible reasoning service.

use log::warn;

use super::{ReasoningRequest, ReasoningResponse, ReasoningService};
use crate::config::AppConfig;
use crate::errors::{PipelineError, Result};
use crate::openai::{ChatMessage, ChatRequest, OpenAiClient, OpenAiError, ResponseFormat};

pub struct OpenAiReasoner {
    client: OpenAiClient,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiReasoner {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.3,
            max_tokens: 2000,
        }
    }

    /// Build from configuration; fails without an API key
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = config.provider.require_api_key()?;
        let client = OpenAiClient::from_config(&config.provider, api_key, config.request_timeout())
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            model: config.provider.analysis_model.clone(),
            temperature: config.provider.temperature,
            max_tokens: config.provider.max_tokens,
        })
    }

    /// Chat request carrying the answer schema as the response format
    fn chat_request(&self, request: ReasoningRequest) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(request.system_prompt),
                ChatMessage::user(request.prompt),
            ],
            // Stricter re-requests run colder
            temperature: if request.strict { 0.0 } else { self.temperature },
            max_tokens: self.max_tokens,
            response_format: Some(ResponseFormat::json_schema(
                RESPONSE_SCHEMA_NAME,
                request.response_schema,
            )),
        }
    }
}

const RESPONSE_SCHEMA_NAME: &str = "risk_report";

impl ReasoningService for OpenAiReasoner {
    async fn complete(&self, request: ReasoningRequest) -> Result<ReasoningResponse> {
        let chat = self.chat_request(request);

        let completion = self.client.chat_completion(&chat).await.map_err(|err| {
            warn!("Reasoning service call failed: {}", err);
            match err {
                OpenAiError::RateLimited(detail) => {
                    PipelineError::AnalysisUnavailable(format!("quota exceeded ({detail})"))
                }
                other => PipelineError::AnalysisUnavailable(other.to_string()),
            }
        })?;

        Ok(ReasoningResponse {
            content: completion.content,
            model: completion.model.or_else(|| Some(self.model.clone())),
        })
    }

    fn model_name(&self) -> Option<String> {
        Some(self.model.clone())
    }
}
