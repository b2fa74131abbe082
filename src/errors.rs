//! # Pipeline Error Types Module
//!
//! This module defines the error taxonomy shared by every pipeline stage.
//! Each variant is a distinct, user-actionable failure; the orchestrator never
//! collapses them into a generic error.

use thiserror::Error;

/// Failure conditions of the analysis pipeline and intake tracker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Caller error: unreadable image, unsupported format, empty text
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Extraction service unreachable, over quota or timed out
    #[error("Extraction unavailable: {0}")]
    ExtractionUnavailable(String),
    /// Extraction succeeded but produced no text
    #[error("No text found: {0}")]
    NoTextFound(String),
    /// Reasoning service unreachable, over quota or timed out
    #[error("Analysis unavailable: {0}")]
    AnalysisUnavailable(String),
    /// Reasoning service answered twice with something that fails validation
    #[error("Analysis malformed: {0}")]
    AnalysisMalformed(String),
    /// History store rejected a read or write
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
    /// Run cancelled at a stage boundary
    #[error("Cancelled before {0}")]
    Cancelled(String),
    /// Missing credentials or invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Stable machine-readable code, used in JSON reports
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::ExtractionUnavailable(_) => "extraction_unavailable",
            PipelineError::NoTextFound(_) => "no_text_found",
            PipelineError::AnalysisUnavailable(_) => "analysis_unavailable",
            PipelineError::AnalysisMalformed(_) => "analysis_malformed",
            PipelineError::PersistenceFailure(_) => "persistence_failure",
            PipelineError::Cancelled(_) => "cancelled",
            PipelineError::Configuration(_) => "configuration",
        }
    }

    /// Message catalogue key for the user-facing explanation
    pub fn message_key(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "error-invalid-input",
            PipelineError::ExtractionUnavailable(_) => "error-extraction-unavailable",
            PipelineError::NoTextFound(_) => "error-no-text-found",
            PipelineError::AnalysisUnavailable(_) => "error-analysis-unavailable",
            PipelineError::AnalysisMalformed(_) => "error-analysis-malformed",
            PipelineError::PersistenceFailure(_) => "error-persistence-failure",
            PipelineError::Cancelled(_) => "error-cancelled",
            PipelineError::Configuration(_) => "error-configuration",
        }
    }

    /// Detail text carried by the variant
    pub fn detail(&self) -> &str {
        match self {
            PipelineError::InvalidInput(msg)
            | PipelineError::ExtractionUnavailable(msg)
            | PipelineError::NoTextFound(msg)
            | PipelineError::AnalysisUnavailable(msg)
            | PipelineError::AnalysisMalformed(msg)
            | PipelineError::PersistenceFailure(msg)
            | PipelineError::Cancelled(msg)
            | PipelineError::Configuration(msg) => msg,
        }
    }

    /// Whether the same request could succeed later or with another strategy
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::ExtractionUnavailable(_)
                | PipelineError::AnalysisUnavailable(_)
                | PipelineError::PersistenceFailure(_)
        )
    }

    /// User-facing explanation in the requested language
    pub fn user_message(&self, language: Option<&str>) -> String {
        crate::localization::t_args_lang(
            self.message_key(),
            &[("detail", self.detail()), ("stage", self.detail())],
            language,
        )
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::PersistenceFailure(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::PersistenceFailure(format!("snapshot serialization failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let error = PipelineError::InvalidInput("empty image".to_string());
        assert_eq!(format!("{error}"), "Invalid input: empty image");
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            PipelineError::InvalidInput(String::new()),
            PipelineError::ExtractionUnavailable(String::new()),
            PipelineError::NoTextFound(String::new()),
            PipelineError::AnalysisUnavailable(String::new()),
            PipelineError::AnalysisMalformed(String::new()),
            PipelineError::PersistenceFailure(String::new()),
            PipelineError::Cancelled(String::new()),
            PipelineError::Configuration(String::new()),
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_recoverability() {
        assert!(PipelineError::ExtractionUnavailable("quota".into()).is_recoverable());
        assert!(PipelineError::AnalysisUnavailable("down".into()).is_recoverable());
        assert!(!PipelineError::InvalidInput("bad".into()).is_recoverable());
        assert!(!PipelineError::NoTextFound("blank".into()).is_recoverable());
        assert!(!PipelineError::AnalysisMalformed("junk".into()).is_recoverable());
    }

    #[test]
    fn test_sqlite_errors_become_persistence_failures() {
        let error: PipelineError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(error.code(), "persistence_failure");
    }
}
