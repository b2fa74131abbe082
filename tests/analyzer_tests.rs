//! # Risk Analyzer Tests
//!
//! Validation of reasoning-service answers: the single strict retry, clamping
//! of out-of-range values, timeouts and expiration checks.

mod common;

use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;

use common::*;
use ingredient_intel::analyzer::RiskAnalyzer;
use ingredient_intel::classifier::ProductClassifier;
use ingredient_intel::errors::PipelineError;
use ingredient_intel::label_parsing::parse_label;
use ingredient_intel::model::{ClassificationResult, ExtractionMethod, FdaApproval, LabelText, ProductCategory};

const TIMEOUT: Duration = Duration::from_secs(5);

fn soda_label() -> (LabelText, ClassificationResult) {
    let label = parse_label(SODA_LABEL, ExtractionMethod::Text, 1.0, 0);
    let classification = ProductClassifier::new().classify(&label);
    (label, classification)
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()
}

#[tokio::test]
async fn test_valid_answer_is_used_directly() {
    let reasoner = ScriptedReasoner::answering(&soda_report());
    let analyzer = RiskAnalyzer::new(reasoner.clone());
    let (label, classification) = soda_label();

    let result = analyzer.analyze_on(&label, &classification, TIMEOUT, today()).await.unwrap();

    assert_eq!(result.harmful_ingredients, vec!["Yellow 5"]);
    assert_eq!(result.healthiness_rating, 3);
    assert_eq!(result.fda_approval, FdaApproval::Approved);
    assert_eq!(result.product_type, ProductCategory::Drink);
    assert_eq!(result.model_used.as_deref(), Some("scripted-model"));
    assert!(result.expiration_valid);

    let requests = reasoner.requests();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].strict);
    assert!(requests[0].prompt.contains("Yellow 5"));
    assert!(requests[0].response_schema["required"].is_array());
}

#[tokio::test]
async fn test_malformed_answer_gets_one_strict_retry() {
    let reasoner = ScriptedReasoner::answering("Sure! Here is my analysis: it's fine.").then_answer(&soda_report());
    let analyzer = RiskAnalyzer::new(reasoner.clone());
    let (label, classification) = soda_label();

    let result = analyzer.analyze_on(&label, &classification, TIMEOUT, today()).await.unwrap();

    assert_eq!(result.healthiness_rating, 3);
    let requests = reasoner.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].strict);
    assert!(requests[1].strict);
    assert_ne!(requests[0].prompt, requests[1].prompt);
}

#[tokio::test]
async fn test_two_malformed_answers_fail() {
    let wrong_types = json!({ "recommendation": "ok", "allergens": "milk" }).to_string();
    let reasoner = ScriptedReasoner::answering("[]").then_answer(&wrong_types).then_answer(&soda_report());
    let analyzer = RiskAnalyzer::new(reasoner.clone());
    let (label, classification) = soda_label();

    let error = analyzer
        .analyze_on(&label, &classification, TIMEOUT, today())
        .await
        .unwrap_err();

    assert!(matches!(error, PipelineError::AnalysisMalformed(_)));
    assert_eq!(reasoner.calls(), 2);
}

#[tokio::test]
async fn test_service_failure_is_not_retried() {
    let reasoner = ScriptedReasoner::new()
        .then(Err(PipelineError::AnalysisUnavailable("quota exceeded".to_string())))
        .then_answer(&soda_report());
    let analyzer = RiskAnalyzer::new(reasoner.clone());
    let (label, classification) = soda_label();

    let error = analyzer
        .analyze_on(&label, &classification, TIMEOUT, today())
        .await
        .unwrap_err();

    assert_eq!(error, PipelineError::AnalysisUnavailable("quota exceeded".to_string()));
    assert_eq!(reasoner.calls(), 1);
}

#[tokio::test]
async fn test_timeout_is_analysis_unavailable() {
    let reasoner = ScriptedReasoner::answering(&soda_report()).with_delay(Duration::from_millis(200));
    let analyzer = RiskAnalyzer::new(reasoner);
    let (label, classification) = soda_label();

    let error = analyzer
        .analyze_on(&label, &classification, Duration::from_millis(20), today())
        .await
        .unwrap_err();

    assert!(matches!(error, PipelineError::AnalysisUnavailable(_)));
}

#[tokio::test]
async fn test_out_of_range_values_are_clamped() {
    let answer = json!({
        "harmful_ingredients": [],
        "allergens": [],
        "fda_approval": "definitely maybe",
        "healthiness_rating": 14,
        "recommendation": "Enjoy.",
    })
    .to_string();
    let analyzer = RiskAnalyzer::new(ScriptedReasoner::answering(&answer));
    let (label, mut classification) = soda_label();
    classification.confidence = 1.7;

    let result = analyzer.analyze_on(&label, &classification, TIMEOUT, today()).await.unwrap();

    assert_eq!(result.healthiness_rating, 10);
    assert_eq!(result.classification_confidence, 1.0);
    assert_eq!(result.fda_approval, FdaApproval::Unverified);
}

#[tokio::test]
async fn test_fenced_answer_is_accepted() {
    let answer = format!("```json\n{}\n```", soda_report());
    let reasoner = ScriptedReasoner::answering(&answer);
    let analyzer = RiskAnalyzer::new(reasoner.clone());
    let (label, classification) = soda_label();

    assert!(analyzer.analyze_on(&label, &classification, TIMEOUT, today()).await.is_ok());
    assert_eq!(reasoner.calls(), 1);
}

#[tokio::test]
async fn test_expired_label_is_flagged() {
    let label = parse_label(
        "Ingredients: milk, sugar, cocoa. Best before 2026-06-14",
        ExtractionMethod::Text,
        1.0,
        0,
    );
    let classification = ProductClassifier::new().classify(&label);
    let analyzer = RiskAnalyzer::new(ScriptedReasoner::answering(&milk_report(6)));

    let result = analyzer.analyze_on(&label, &classification, TIMEOUT, today()).await.unwrap();

    assert_eq!(result.expiration_date, NaiveDate::from_ymd_opt(2026, 6, 14));
    assert!(!result.expiration_valid);
}

#[tokio::test]
async fn test_empty_ingredients_are_rejected_without_a_call() {
    let reasoner = ScriptedReasoner::answering(&soda_report());
    let analyzer = RiskAnalyzer::new(reasoner.clone());
    let (mut label, classification) = soda_label();
    label.ingredients_text = "  ".to_string();

    let error = analyzer
        .analyze_on(&label, &classification, TIMEOUT, today())
        .await
        .unwrap_err();

    assert!(matches!(error, PipelineError::InvalidInput(_)));
    assert_eq!(reasoner.calls(), 0);
}
