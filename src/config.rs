//! # Configuration Module
//!
//! This module defines the configuration structures for the analysis pipeline:
//! extraction strategy selection, image size caps, provider credentials and
//! endpoints, timeouts and the intake database location.
//!
//! Everything is supplied from the environment (optionally through a `.env`
//! file); the defaults below never include credentials.

use std::path::PathBuf;
use std::time::Duration;

use log::{debug, warn};

use crate::errors::{PipelineError, Result};
use crate::model::ExtractionMethod;

// Constants for extraction configuration
pub const DEFAULT_OCR_LANGUAGES: &str = "eng+fra";
pub const FORMAT_DETECTION_BUFFER_SIZE: usize = 32;
pub const MIN_FORMAT_BYTES: usize = 8;
pub const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024; // 20MB, the largest per-format limit
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 1920;

// Constants for provider configuration
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DATABASE_PATH: &str = "intake_history.db";
pub const DEFAULT_LANGUAGE: &str = "en";

/// Failure handling for the networked extraction service
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Timeout for a single extraction or analysis call in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: DEFAULT_TIMEOUT_SECS,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

/// Format-specific size limits for label images
#[derive(Debug, Clone)]
pub struct FormatSizeLimits {
    /// PNG format limit (higher due to better compression)
    pub png_max: u64,
    /// JPEG format limit
    pub jpeg_max: u64,
    /// BMP format limit (lower due to uncompressed nature)
    pub bmp_max: u64,
    /// TIFF format limit
    pub tiff_max: u64,
}

impl Default for FormatSizeLimits {
    fn default() -> Self {
        Self {
            png_max: 15 * 1024 * 1024,  // 15MB for PNG
            jpeg_max: 10 * 1024 * 1024, // 10MB for JPEG
            bmp_max: 5 * 1024 * 1024,   // 5MB for BMP
            tiff_max: 20 * 1024 * 1024, // 20MB for TIFF
        }
    }
}

impl FormatSizeLimits {
    /// Limit for a detected format, capped by the general limit
    pub fn limit_for(&self, format: &image::ImageFormat, general_max: u64) -> u64 {
        let format_max = match format {
            image::ImageFormat::Png => self.png_max,
            image::ImageFormat::Jpeg => self.jpeg_max,
            image::ImageFormat::Bmp => self.bmp_max,
            image::ImageFormat::Tiff => self.tiff_max,
            _ => general_max,
        };
        format_max.min(general_max)
    }
}

/// Configuration for the extraction stage
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Strategy selected for image input
    pub method: ExtractionMethod,
    /// Tesseract language codes (e.g., "eng", "eng+fra")
    pub languages: String,
    /// Buffer size for format detection in bytes
    pub buffer_size: usize,
    /// Minimum bytes required for format detection
    pub min_format_bytes: usize,
    /// General image size cap in bytes
    pub max_image_bytes: u64,
    /// Longest side in pixels; larger images are downscaled before extraction
    pub max_image_dimension: u32,
    /// Format-specific size limits
    pub format_limits: FormatSizeLimits,
    /// Timeout and circuit breaker settings
    pub recovery: RecoveryConfig,
    /// Model used by the vision strategy
    pub vision_model: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            method: ExtractionMethod::Vision,
            languages: DEFAULT_OCR_LANGUAGES.to_string(),
            buffer_size: FORMAT_DETECTION_BUFFER_SIZE,
            min_format_bytes: MIN_FORMAT_BYTES,
            max_image_bytes: MAX_IMAGE_BYTES,
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            format_limits: FormatSizeLimits::default(),
            recovery: RecoveryConfig::default(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
        }
    }
}

/// Credentials and endpoint of the OpenAI-compatible provider
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub analysis_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("analysis_model", &self.analysis_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            analysis_model: DEFAULT_ANALYSIS_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

impl ProviderConfig {
    /// The API key, or a configuration error naming the variable to set
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Configuration("OPENAI_API_KEY must be set".to_string())
            })
    }
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub extraction: ExtractionConfig,
    pub provider: ProviderConfig,
    pub database_path: PathBuf,
    /// Language for user-facing messages ("en", "fr")
    pub language: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig::default(),
            provider: ProviderConfig::default(),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl AppConfig {
    /// Build the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(method) = lookup("EXTRACTION_METHOD") {
            config.extraction.method = method
                .parse::<ExtractionMethod>()
                .map_err(PipelineError::Configuration)?;
            if config.extraction.method == ExtractionMethod::Text {
                return Err(PipelineError::Configuration(
                    "EXTRACTION_METHOD must be 'vision' or 'tesseract'".to_string(),
                ));
            }
        }
        if let Some(languages) = lookup("OCR_LANGUAGES") {
            config.extraction.languages = languages;
        }
        if let Some(model) = lookup("VISION_MODEL") {
            config.extraction.vision_model = model;
        }
        if let Some(raw) = lookup("MAX_IMAGE_BYTES") {
            config.extraction.max_image_bytes = parse_number("MAX_IMAGE_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("MAX_IMAGE_DIMENSION") {
            let dimension: u32 = parse_number("MAX_IMAGE_DIMENSION", &raw)?;
            if dimension == 0 {
                return Err(PipelineError::Configuration(
                    "MAX_IMAGE_DIMENSION must be greater than zero".to_string(),
                ));
            }
            config.extraction.max_image_dimension = dimension;
        }
        if let Some(raw) = lookup("REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_number("REQUEST_TIMEOUT_SECS", &raw)?;
            if secs == 0 {
                return Err(PipelineError::Configuration(
                    "REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
                ));
            }
            config.extraction.recovery.operation_timeout_secs = secs;
        }

        config.provider.api_key = lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty());
        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            config.provider.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            config.provider.analysis_model = model;
        }

        if let Some(path) = lookup("INTAKE_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(language) = lookup("APP_LANGUAGE") {
            config.language = language;
        }

        if config.provider.api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; vision extraction and analysis will be unavailable");
        }
        debug!("Loaded configuration: {:?}", config);

        Ok(config)
    }

    /// Per-call network timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction.recovery.operation_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| PipelineError::Configuration(format!("{key} must be a number, got '{raw}'")))
}
