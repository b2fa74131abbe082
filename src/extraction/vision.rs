//! # Vision Extraction Strategy
//!
//! Sends the label image to an OpenAI-compatible vision model and asks for the
//! ingredients list only. Guarded by a circuit breaker so a failing service is
//! not hammered.

use base64::{engine::general_purpose, Engine as _};
use log::{info, warn};

use super::circuit_breaker::CircuitBreaker;
use super::{detect_image_format, mime_type, RawExtraction, TextExtractor};
use crate::config::{AppConfig, RecoveryConfig, FORMAT_DETECTION_BUFFER_SIZE};
use crate::errors::{PipelineError, Result};
use crate::model::ExtractionMethod;
use crate::openai::{error_code, ChatMessage, ChatRequest, OpenAiClient, OpenAiError};

/// Reply the model gives when the label shows no ingredients
pub const NO_INGREDIENTS_SENTINEL: &str = "NO_INGREDIENTS_FOUND";

const VISION_MAX_TOKENS: u32 = 500;

const VISION_PROMPT: &str = "Analyze this product label image and extract the ingredients list.

Instructions:
1. Locate the ingredients section on the label
2. Extract ALL ingredients exactly as written
3. If you see multiple languages, extract the English version
4. Return just the ingredients text, nothing else
5. If no ingredients are visible, return \"NO_INGREDIENTS_FOUND\"

Example output format:
Water, Sugar, Citric Acid, Natural Flavors, Preservative (E202)";

pub struct VisionExtractor {
    client: OpenAiClient,
    model: String,
    breaker: CircuitBreaker,
}

impl VisionExtractor {
    pub fn new(client: OpenAiClient, model: impl Into<String>, recovery: RecoveryConfig) -> Self {
        Self {
            client,
            model: model.into(),
            breaker: CircuitBreaker::new(recovery),
        }
    }

    /// Build from configuration; fails without an API key
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = config.provider.require_api_key()?;
        let client = OpenAiClient::from_config(&config.provider, api_key, config.request_timeout())
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        Ok(Self::new(
            client,
            config.extraction.vision_model.clone(),
            config.extraction.recovery.clone(),
        ))
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl TextExtractor for VisionExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Vision
    }

    async fn extract_text(&self, image: Vec<u8>) -> Result<RawExtraction> {
        if self.breaker.is_open() {
            warn!("Vision circuit breaker is open, failing fast");
            return Err(PipelineError::ExtractionUnavailable(
                "vision service is failing repeatedly, try the local method".to_string(),
            ));
        }

        let format = detect_image_format(&image, FORMAT_DETECTION_BUFFER_SIZE);
        let data_url = format!(
            "data:{};base64,{}",
            mime_type(format),
            general_purpose::STANDARD.encode(&image)
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user_with_image(VISION_PROMPT, data_url)],
            temperature: 0.0,
            max_tokens: VISION_MAX_TOKENS,
            response_format: None,
        };

        match self.client.chat_completion(&request).await {
            Ok(completion) => {
                self.breaker.record_success();
                let text = interpret_reply(&completion.content);
                info!("Vision model returned {} characters", text.len());
                Ok(RawExtraction {
                    text,
                    confidence: 1.0,
                })
            }
            Err(OpenAiError::Rejected { status: 400, body }) if is_unreadable_image(&body) => {
                Err(PipelineError::InvalidInput(format!(
                    "the vision service could not read the image: {}",
                    body.chars().take(200).collect::<String>()
                )))
            }
            Err(err) => {
                self.breaker.record_failure();
                Err(PipelineError::ExtractionUnavailable(err.to_string()))
            }
        }
    }
}

/// The extracted text, or empty when the model reports no ingredients
fn interpret_reply(reply: &str) -> String {
    let reply = reply.trim();
    if reply.is_empty() || reply.trim_matches('"') == NO_INGREDIENTS_SENTINEL {
        String::new()
    } else {
        reply.to_string()
    }
}

/// Provider error codes for image payloads it cannot decode
const UNREADABLE_IMAGE_CODES: &[&str] = &[
    "invalid_image",
    "invalid_image_format",
    "image_parse_error",
    "invalid_base64",
];

fn is_unreadable_image(body: &str) -> bool {
    error_code(body).map_or(false, |code| UNREADABLE_IMAGE_CODES.contains(&code.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_becomes_empty_text() {
        assert_eq!(interpret_reply("NO_INGREDIENTS_FOUND"), "");
        assert_eq!(interpret_reply("  \"NO_INGREDIENTS_FOUND\"\n"), "");
        assert_eq!(interpret_reply(""), "");
        assert_eq!(interpret_reply(" Water, Sugar "), "Water, Sugar");
    }

    #[test]
    fn test_unreadable_image_is_decided_by_error_code() {
        assert!(is_unreadable_image(
            r#"{"error":{"message":"You uploaded an unsupported image.","code":"invalid_image_format"}}"#
        ));
        assert!(is_unreadable_image(r#"{"error":{"message":"Invalid image.","code":"image_parse_error"}}"#));
        assert!(!is_unreadable_image(
            r#"{"error":{"message":"image_url is not supported by this model.","type":"invalid_request_error","code":null}}"#
        ));
        assert!(!is_unreadable_image(r#"{"error":{"message":"Invalid image data"}}"#));
        assert!(!is_unreadable_image("Bad Request: image"));
    }
}
