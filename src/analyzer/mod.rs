//! # Risk Analyzer Module
//!
//! Delegates ingredient-risk judgment to an external reasoning service and
//! validates its answer into an [`AnalysisResult`].
//!
//! The service is untrusted: every response goes through the strict decoder in
//! [`schema`]. A malformed answer earns exactly one re-request with a stricter
//! instruction; a second malformed answer is reported, never guessed around.

pub mod openai;
pub mod prompt;
pub mod schema;

use std::future::Future;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use log::{debug, info, warn};

use crate::errors::{PipelineError, Result};
use crate::model::{AnalysisResult, ClassificationResult, LabelText};
use schema::{parse_risk_report, risk_report_schema, RiskReport};

pub use openai::OpenAiReasoner;

/// One request to the reasoning service
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub system_prompt: String,
    pub prompt: String,
    /// JSON schema of the expected answer
    pub response_schema: serde_json::Value,
    /// Set on the re-request after a malformed answer
    pub strict: bool,
}

/// Raw answer of the reasoning service
#[derive(Debug, Clone)]
pub struct ReasoningResponse {
    pub content: String,
    pub model: Option<String>,
}

/// Natural-language reasoning capability
pub trait ReasoningService: Send + Sync {
    /// Answer one request
    ///
    /// Unreachable or over-quota services map to `AnalysisUnavailable`.
    fn complete(&self, request: ReasoningRequest) -> impl Future<Output = Result<ReasoningResponse>> + Send;

    /// Model name reported when the answer does not carry one
    fn model_name(&self) -> Option<String> {
        None
    }
}

/// Builds requests, calls the reasoning service and validates answers
pub struct RiskAnalyzer<R> {
    reasoner: R,
}

impl<R: ReasoningService> RiskAnalyzer<R> {
    pub fn new(reasoner: R) -> Self {
        Self { reasoner }
    }

    pub fn reasoner(&self) -> &R {
        &self.reasoner
    }

    /// Analyze a label, judging expiration against today's UTC date
    pub async fn analyze(
        &self,
        label: &LabelText,
        classification: &ClassificationResult,
        timeout: Duration,
    ) -> Result<AnalysisResult> {
        self.analyze_on(label, classification, timeout, Utc::now().date_naive())
            .await
    }

    /// Analyze a label as of a given date
    pub async fn analyze_on(
        &self,
        label: &LabelText,
        classification: &ClassificationResult,
        timeout: Duration,
        today: NaiveDate,
    ) -> Result<AnalysisResult> {
        if label.ingredients_text.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "no ingredients text to analyze".to_string(),
            ));
        }

        let (report, model) = match self.request_report(label, classification, timeout, false).await? {
            Ok(answer) => answer,
            Err(first_error) => {
                warn!("Reasoning answer malformed ({}), retrying with strict instructions", first_error);
                self.request_report(label, classification, timeout, true)
                    .await?
                    .map_err(|second_error| {
                        warn!("Reasoning answer malformed twice: {}", second_error);
                        PipelineError::AnalysisMalformed(second_error.to_string())
                    })?
            }
        };

        let result = build_result(label, classification, report, model, today);
        info!(
            "Analysis complete: {} rated {}/10 with {} harmful ingredients",
            result.history_key(),
            result.healthiness_rating,
            result.harmful_ingredients.len()
        );
        Ok(result)
    }

    /// Outer error: service failure. Inner error: schema failure.
    async fn request_report(
        &self,
        label: &LabelText,
        classification: &ClassificationResult,
        timeout: Duration,
        strict: bool,
    ) -> Result<std::result::Result<(RiskReport, Option<String>), schema::SchemaError>> {
        let request = ReasoningRequest {
            system_prompt: prompt::SYSTEM_PROMPT.to_string(),
            prompt: prompt::build_prompt(label, classification, strict),
            response_schema: risk_report_schema(),
            strict,
        };
        debug!("Requesting risk analysis (strict: {})", strict);

        let response = tokio::time::timeout(timeout, self.reasoner.complete(request))
            .await
            .map_err(|_| PipelineError::AnalysisUnavailable("analysis timed out".to_string()))??;

        let model = response.model.or_else(|| self.reasoner.model_name());
        Ok(parse_risk_report(&response.content).map(|report| (report, model)))
    }
}

/// False only when the expiration date is strictly before `today`
pub fn expiration_is_valid(expiration_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    expiration_date.map_or(true, |date| date >= today)
}

fn build_result(
    label: &LabelText,
    classification: &ClassificationResult,
    report: RiskReport,
    model_used: Option<String>,
    today: NaiveDate,
) -> AnalysisResult {
    AnalysisResult {
        product_name: label.product_name.clone(),
        product_type: classification.category,
        classification_confidence: classification.confidence.clamp(0.0, 1.0),
        ingredients_text: label.ingredients_text.clone(),
        expiration_date: label.expiration_date,
        harmful_ingredients: report.harmful_ingredients,
        additives: report.additives,
        preservatives: report.preservatives,
        chemicals: report.chemicals,
        allergens: report.allergens,
        irritants: report.irritants,
        certifications: report.certifications,
        fda_approval: report.fda_approval,
        healthiness_rating: report.healthiness_rating.clamp(1, 10),
        expiration_valid: expiration_is_valid(label.expiration_date, today),
        recommendation: report.recommendation,
        health_suggestion: report.health_suggestion,
        model_used,
    }
}
