//! # Pipeline Orchestrator Module
//!
//! Sequences extraction, classification, risk analysis and the optional
//! personalization and logging stages for one label.
//!
//! ## Failure policy
//!
//! - Stages run strictly in order; each network call is bounded by the run timeout
//! - Every stage boundary checks the run's cancel flag
//! - A failure returns the typed error together with everything computed so far
//! - Switching to the fallback extractor happens only on `ExtractionUnavailable`
//!
//! Runs share nothing mutable except the intake tracker, so independent runs
//! can be processed concurrently with [`AnalysisPipeline::run_batch`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::analyzer::{ReasoningService, RiskAnalyzer};
use crate::classifier::ProductClassifier;
use crate::config::DEFAULT_TIMEOUT_SECS;
use crate::errors::{PipelineError, Result};
use crate::extraction::{ExtractionAdapter, LabelSource, TextExtractor};
use crate::model::{
    AnalysisResult, ClassificationResult, LabelText, PersonalizedResult, UserHealthPreferences,
};
use crate::personalization::PersonalizationEngine;
use crate::tracker::{IntakeId, IntakeTracker};

/// Cooperative cancellation shared between a caller and its runs
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run settings threaded through every stage
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Personalize against these preferences
    pub preferences: Option<UserHealthPreferences>,
    /// Append the result to the intake history
    pub log_intake: bool,
    /// Bound on each network call
    pub timeout: Duration,
    pub cancel: CancelFlag,
    /// Language of user-facing warnings
    pub language: Option<String>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            preferences: None,
            log_intake: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cancel: CancelFlag::new(),
            language: None,
        }
    }
}

impl RunContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_preferences(mut self, preferences: UserHealthPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_logging(mut self, log_intake: bool) -> Self {
        self.log_intake = log_intake;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    fn checkpoint(&self, next_stage: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!(stage = next_stage, "run cancelled");
            return Err(PipelineError::Cancelled(next_stage.to_string()));
        }
        Ok(())
    }
}

/// One label to analyze
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub source: LabelSource,
    /// Name to use when the label does not show one
    pub product_name: Option<String>,
}

impl PipelineInput {
    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            source: LabelSource::Image(bytes),
            product_name: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            source: LabelSource::Text(text.into()),
            product_name: None,
        }
    }

    pub fn named(mut self, product_name: impl Into<String>) -> Self {
        self.product_name = Some(product_name.into());
        self
    }
}

/// Everything computed before a run stopped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialResult {
    pub label: Option<LabelText>,
    pub classification: Option<ClassificationResult>,
    pub analysis: Option<AnalysisResult>,
    pub personalized: Option<PersonalizedResult>,
}

/// A completed run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub label: LabelText,
    pub classification: ClassificationResult,
    pub analysis: AnalysisResult,
    pub personalized: Option<PersonalizedResult>,
    pub intake_id: Option<IntakeId>,
    pub processing_time_ms: u64,
}

/// A failed run: the error plus the partial result
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineFailure {
    pub error: PipelineError,
    pub partial: PartialResult,
    pub processing_time_ms: u64,
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for PipelineFailure {}

pub type RunResult = std::result::Result<PipelineOutcome, PipelineFailure>;

/// The analysis pipeline with its injected capabilities
pub struct AnalysisPipeline<E, R> {
    extraction: ExtractionAdapter<E>,
    fallback: Option<ExtractionAdapter<E>>,
    classifier: ProductClassifier,
    analyzer: RiskAnalyzer<R>,
    tracker: Option<Arc<IntakeTracker>>,
}

impl<E, R> AnalysisPipeline<E, R>
where
    E: TextExtractor,
    R: ReasoningService,
{
    pub fn new(extraction: ExtractionAdapter<E>, analyzer: RiskAnalyzer<R>) -> Self {
        Self {
            extraction,
            fallback: None,
            classifier: ProductClassifier::new(),
            analyzer,
            tracker: None,
        }
    }

    /// Alternate strategy tried once when the primary is unavailable
    pub fn with_fallback(mut self, fallback: ExtractionAdapter<E>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_classifier(mut self, classifier: ProductClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<IntakeTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn tracker(&self) -> Option<&Arc<IntakeTracker>> {
        self.tracker.as_ref()
    }

    /// Run every stage for one input
    pub async fn run(&self, input: PipelineInput, ctx: &RunContext) -> RunResult {
        let start = Instant::now();
        let span = info_span!(
            "analysis_run",
            source = source_kind(&input.source),
            personalized = ctx.preferences.is_some(),
            log_intake = ctx.log_intake
        );

        let mut partial = PartialResult::default();
        let result = self
            .run_stages(input, ctx, &mut partial)
            .instrument(span)
            .await;
        let processing_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(mut outcome) => {
                outcome.processing_time_ms = processing_time_ms;
                info!(
                    product = outcome.analysis.history_key(),
                    rating = outcome.analysis.healthiness_rating,
                    processing_time_ms,
                    "analysis run completed"
                );
                Ok(outcome)
            }
            Err(error) => {
                warn!(code = error.code(), %error, processing_time_ms, "analysis run failed");
                Err(PipelineFailure {
                    error,
                    partial,
                    processing_time_ms,
                })
            }
        }
    }

    async fn run_stages(
        &self,
        input: PipelineInput,
        ctx: &RunContext,
        partial: &mut PartialResult,
    ) -> Result<PipelineOutcome> {
        ctx.checkpoint("extraction")?;
        let mut label = self.extract(&input.source, ctx.timeout).await?;
        if label.product_name.is_none() {
            label.product_name = input.product_name.filter(|name| !name.trim().is_empty());
        }
        partial.label = Some(label.clone());

        ctx.checkpoint("classification")?;
        let classification = self.classifier.classify(&label);
        debug!(
            category = classification.category.as_str(),
            confidence = classification.confidence,
            "classified label"
        );
        partial.classification = Some(classification.clone());

        ctx.checkpoint("analysis")?;
        let analysis = self
            .analyzer
            .analyze(&label, &classification, ctx.timeout)
            .await?;
        partial.analysis = Some(analysis.clone());

        let personalized = match &ctx.preferences {
            Some(preferences) => {
                ctx.checkpoint("personalization")?;
                let engine = match &ctx.language {
                    Some(language) => PersonalizationEngine::with_language(language.clone()),
                    None => PersonalizationEngine::new(),
                };
                Some(engine.personalize(&analysis, preferences))
            }
            None => None,
        };
        partial.personalized = personalized.clone();

        let intake_id = if ctx.log_intake {
            ctx.checkpoint("logging")?;
            Some(self.log_intake(&analysis, personalized.as_ref()).await?)
        } else {
            None
        };

        Ok(PipelineOutcome {
            label,
            classification,
            analysis,
            personalized,
            intake_id,
            processing_time_ms: 0,
        })
    }

    async fn extract(&self, source: &LabelSource, timeout: Duration) -> Result<LabelText> {
        match self.extraction.extract(source, timeout).await {
            Err(PipelineError::ExtractionUnavailable(reason)) => match &self.fallback {
                Some(fallback) => {
                    warn!(
                        primary = self.extraction.method().as_str(),
                        fallback = fallback.method().as_str(),
                        %reason,
                        "primary extraction unavailable, switching to fallback"
                    );
                    fallback.extract(source, timeout).await
                }
                None => Err(PipelineError::ExtractionUnavailable(reason)),
            },
            other => other,
        }
    }

    async fn log_intake(
        &self,
        analysis: &AnalysisResult,
        personalized: Option<&PersonalizedResult>,
    ) -> Result<IntakeId> {
        let tracker = self.tracker.clone().ok_or_else(|| {
            PipelineError::Configuration("intake logging requested without a tracker".to_string())
        })?;
        let analysis = analysis.clone();
        let personalized = personalized.cloned();

        tokio::task::spawn_blocking(move || tracker.log(&analysis, personalized.as_ref()))
            .await
            .map_err(|e| PipelineError::PersistenceFailure(format!("logging task failed: {e}")))?
    }
}

impl<E, R> AnalysisPipeline<E, R>
where
    E: TextExtractor + 'static,
    R: ReasoningService + 'static,
{
    /// Run many inputs concurrently; results keep the input order
    pub async fn run_batch(self: Arc<Self>, inputs: Vec<PipelineInput>, ctx: RunContext) -> Vec<RunResult> {
        let total = inputs.len();
        info!(total, "starting batch run");

        let mut tasks = JoinSet::new();
        for (index, input) in inputs.into_iter().enumerate() {
            let pipeline = Arc::clone(&self);
            let ctx = ctx.clone();
            tasks.spawn(async move { (index, pipeline.run(input, &ctx).await) });
        }

        let mut slots: Vec<Option<RunResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "batch task aborted"),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(PipelineFailure {
                        error: PipelineError::Cancelled("batch task completion".to_string()),
                        partial: PartialResult::default(),
                        processing_time_ms: 0,
                    })
                })
            })
            .collect()
    }
}

fn source_kind(source: &LabelSource) -> &'static str {
    match source {
        LabelSource::Image(_) => "image",
        LabelSource::Text(_) => "text",
    }
}

/// Label fields reported when the run stopped before analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_type: Option<crate::model::ProductCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_confidence: Option<f64>,
    pub ingredients_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<chrono::NaiveDate>,
}

/// Personal fields of a personalized report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalFields {
    pub safety_score_for_user: u8,
    pub matches_preferences: bool,
    pub warnings_for_user: Vec<String>,
    pub personalized_recommendation: String,
}

impl From<&PersonalizedResult> for PersonalFields {
    fn from(personalized: &PersonalizedResult) -> Self {
        Self {
            safety_score_for_user: personalized.safety_score_for_user,
            matches_preferences: personalized.matches_preferences,
            warnings_for_user: personalized.warnings_for_user.clone(),
            personalized_recommendation: personalized.personalized_recommendation.clone(),
        }
    }
}

/// Flat JSON report of a run, successful or not
///
/// At most one of `analysis` and `label` is set, so flattened keys never clash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub analysis: Option<AnalysisResult>,
    #[serde(flatten)]
    pub label: Option<LabelFields>,
    #[serde(flatten)]
    pub personal: Option<PersonalFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intake_id: Option<IntakeId>,
    pub processing_time: u64,
}

impl AnalysisReport {
    pub fn from_outcome(outcome: &PipelineOutcome) -> Self {
        Self {
            success: true,
            error: None,
            message: None,
            analysis: Some(outcome.analysis.clone()),
            label: None,
            personal: outcome.personalized.as_ref().map(PersonalFields::from),
            intake_id: outcome.intake_id,
            processing_time: outcome.processing_time_ms,
        }
    }

    pub fn from_failure(failure: &PipelineFailure, language: Option<&str>) -> Self {
        let partial = &failure.partial;
        let label = match (&partial.analysis, &partial.label) {
            (None, Some(label)) => Some(LabelFields {
                product_name: label.product_name.clone(),
                product_type: partial.classification.as_ref().map(|c| c.category),
                classification_confidence: partial.classification.as_ref().map(|c| c.confidence),
                ingredients_text: label.ingredients_text.clone(),
                expiration_date: label.expiration_date,
            }),
            _ => None,
        };

        Self {
            success: false,
            error: Some(failure.error.code().to_string()),
            message: Some(failure.error.user_message(language)),
            analysis: partial.analysis.clone(),
            label,
            personal: partial.personalized.as_ref().map(PersonalFields::from),
            intake_id: None,
            processing_time: failure.processing_time_ms,
        }
    }

    pub fn from_result(result: &RunResult, language: Option<&str>) -> Self {
        match result {
            Ok(outcome) => Self::from_outcome(outcome),
            Err(failure) => Self::from_failure(failure, language),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
