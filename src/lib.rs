//! # Ingredient Intelligence
//!
//! Reads ingredient labels (photos or pasted text), classifies the product,
//! asks a reasoning service for an ingredient-risk report, personalizes it
//! against a user's health preferences and keeps a consumption history with
//! daily and weekly aggregates.

pub mod analyzer;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod errors;
pub mod extraction;
pub mod label_parsing;
pub mod localization;
pub mod model;
pub mod openai;
pub mod personalization;
pub mod pipeline;
pub mod summary;
pub mod tracker;

pub use errors::{PipelineError, Result};
pub use pipeline::{AnalysisPipeline, AnalysisReport, PipelineInput, RunContext};
