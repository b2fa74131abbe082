//! Scripted in-memory stand-ins for the extraction and reasoning services.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;

use ingredient_intel::analyzer::{ReasoningRequest, ReasoningResponse, ReasoningService};
use ingredient_intel::errors::{PipelineError, Result};
use ingredient_intel::extraction::{RawExtraction, TextExtractor};
use ingredient_intel::model::{AnalysisResult, ExtractionMethod, FdaApproval, ProductCategory};

/// Blank PNG of the given size
pub fn png_image(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::new_rgb8(width, height)
        .write_to(&mut bytes, image::ImageOutputFormat::Png)
        .unwrap();
    bytes.into_inner()
}

/// Small label photo, well within every size cap
pub fn label_png() -> Vec<u8> {
    png_image(32, 24)
}

pub const SODA_LABEL: &str = "Carbonated water, Sugar, Citric acid, Natural flavors, Yellow 5";

#[derive(Default)]
struct ExtractorState {
    replies: VecDeque<Result<RawExtraction>>,
    images: Vec<Vec<u8>>,
}

/// Extractor that replays queued results; clones share the script
#[derive(Clone)]
pub struct ScriptedExtractor {
    method: ExtractionMethod,
    delay: Option<Duration>,
    state: Arc<Mutex<ExtractorState>>,
}

impl ScriptedExtractor {
    pub fn new(method: ExtractionMethod) -> Self {
        Self {
            method,
            delay: None,
            state: Arc::default(),
        }
    }

    pub fn returning_text(method: ExtractionMethod, text: &str) -> Self {
        Self::new(method).then_text(text)
    }

    pub fn then_text(self, text: &str) -> Self {
        self.then(Ok(RawExtraction {
            text: text.to_string(),
            confidence: 0.9,
        }))
    }

    pub fn then(self, reply: Result<RawExtraction>) -> Self {
        self.state.lock().unwrap().replies.push_back(reply);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().images.len()
    }

    /// Image bytes handed to the strategy, in call order
    pub fn images(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().images.clone()
    }
}

impl TextExtractor for ScriptedExtractor {
    fn method(&self) -> ExtractionMethod {
        self.method
    }

    async fn extract_text(&self, image: Vec<u8>) -> Result<RawExtraction> {
        let reply = {
            let mut state = self.state.lock().unwrap();
            state.images.push(image);
            state.replies.pop_front()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        reply.unwrap_or_else(|| Err(PipelineError::ExtractionUnavailable("script exhausted".to_string())))
    }
}

#[derive(Default)]
struct ReasonerState {
    replies: VecDeque<Result<String>>,
    requests: Vec<ReasoningRequest>,
}

/// Reasoning service that replays queued answers and records every request
#[derive(Clone, Default)]
pub struct ScriptedReasoner {
    delay: Option<Duration>,
    state: Arc<Mutex<ReasonerState>>,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answering(content: &str) -> Self {
        Self::new().then_answer(content)
    }

    pub fn then_answer(self, content: &str) -> Self {
        self.then(Ok(content.to_string()))
    }

    pub fn then(self, reply: Result<String>) -> Self {
        self.state.lock().unwrap().replies.push_back(reply);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }
}

impl ReasoningService for ScriptedReasoner {
    async fn complete(&self, request: ReasoningRequest) -> Result<ReasoningResponse> {
        let reply = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request);
            state.replies.pop_front()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let content = reply.unwrap_or_else(|| Err(PipelineError::AnalysisUnavailable("script exhausted".to_string())))?;
        Ok(ReasoningResponse {
            content,
            model: Some("scripted-model".to_string()),
        })
    }
}

/// Provider answer for the soda label
pub fn soda_report() -> String {
    json!({
        "harmful_ingredients": ["Yellow 5"],
        "additives": ["Yellow 5", "Citric acid"],
        "preservatives": [],
        "chemicals": [],
        "allergens": [],
        "irritants": [],
        "certifications": [],
        "fda_approval": "Approved",
        "healthiness_rating": 3,
        "recommendation": "Limit consumption; high sugar and artificial coloring.",
        "health_suggestion": "Choose sparkling water with fruit instead."
    })
    .to_string()
}

/// Provider answer listing milk as an allergen
pub fn milk_report(rating: u8) -> String {
    json!({
        "harmful_ingredients": [],
        "additives": [],
        "preservatives": [],
        "chemicals": [],
        "allergens": ["milk"],
        "irritants": [],
        "certifications": [],
        "fda_approval": "Approved",
        "healthiness_rating": rating,
        "recommendation": "Fine in moderation.",
        "health_suggestion": ""
    })
    .to_string()
}

/// Analysis built directly, for tracker and personalization tests
pub fn sample_analysis(name: &str, rating: u8) -> AnalysisResult {
    AnalysisResult {
        product_name: Some(name.to_string()),
        product_type: ProductCategory::Food,
        classification_confidence: 0.75,
        ingredients_text: "Wheat flour, sugar, milk, salt".to_string(),
        expiration_date: NaiveDate::from_ymd_opt(2030, 1, 1),
        harmful_ingredients: Vec::new(),
        additives: Vec::new(),
        preservatives: Vec::new(),
        chemicals: Vec::new(),
        allergens: vec!["milk".to_string(), "wheat".to_string()],
        irritants: Vec::new(),
        certifications: Vec::new(),
        fda_approval: FdaApproval::Approved,
        healthiness_rating: rating,
        expiration_valid: true,
        recommendation: "Fine in moderation.".to_string(),
        health_suggestion: "Pair with fruit.".to_string(),
        model_used: Some("scripted-model".to_string()),
    }
}
