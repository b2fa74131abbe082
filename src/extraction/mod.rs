//! # Extraction Module
//!
//! Normalizes a label image or literal label text into [`LabelText`].
//!
//! Image input is validated (magic-byte format sniffing, size caps), decoded
//! and downscaled to the configured longest side before any strategy runs,
//! then handed to the injected [`TextExtractor`]. Two strategies
//! ship with the crate:
//!
//! - [`vision::VisionExtractor`]: networked vision model, high accuracy
//! - [`tesseract::TesseractExtractor`]: local Tesseract engine, free
//!
//! Literal text bypasses the strategy entirely.

pub mod circuit_breaker;
pub mod instance_manager;
pub mod tesseract;
pub mod vision;

use std::future::Future;
use std::io::Cursor;
use std::time::{Duration, Instant};

use image::imageops::FilterType;
use image::{GenericImageView, ImageOutputFormat};

use log::{debug, info, warn};

use crate::config::{AppConfig, ExtractionConfig};
use crate::errors::{PipelineError, Result};
use crate::label_parsing::{clean_lines, parse_label};
use crate::model::{ExtractionMethod, LabelText};

pub use tesseract::TesseractExtractor;
pub use vision::VisionExtractor;

/// What the caller hands to the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSource {
    /// Encoded image bytes (JPEG, PNG, BMP or TIFF)
    Image(Vec<u8>),
    /// Label text typed or pasted by the user
    Text(String),
}

/// Strategy output before label parsing
#[derive(Debug, Clone, PartialEq)]
pub struct RawExtraction {
    pub text: String,
    /// Strategy confidence (0.0 to 1.0)
    pub confidence: f64,
}

/// Capability shared by every extraction strategy: image bytes in, label text out
pub trait TextExtractor: Send + Sync {
    fn method(&self) -> ExtractionMethod;

    /// Read the label text from encoded image bytes
    ///
    /// Unreachable services map to `ExtractionUnavailable`, unreadable images to
    /// `InvalidInput`. An empty `text` is a valid outcome.
    fn extract_text(&self, image: Vec<u8>) -> impl Future<Output = Result<RawExtraction>> + Send;
}

/// Strategy chosen from configuration
pub enum ConfiguredExtractor {
    Vision(VisionExtractor),
    Tesseract(TesseractExtractor),
}

impl ConfiguredExtractor {
    /// Build the strategy named by `method`
    pub fn for_method(config: &AppConfig, method: ExtractionMethod) -> Result<Self> {
        match method {
            ExtractionMethod::Vision => Ok(Self::Vision(VisionExtractor::from_config(config)?)),
            ExtractionMethod::Tesseract => Ok(Self::Tesseract(TesseractExtractor::from_config(config))),
            ExtractionMethod::Text => Err(PipelineError::Configuration(
                "text input does not use an extraction strategy".to_string(),
            )),
        }
    }

    /// Build the strategy named by `EXTRACTION_METHOD`
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::for_method(config, config.extraction.method)
    }
}

impl TextExtractor for ConfiguredExtractor {
    fn method(&self) -> ExtractionMethod {
        match self {
            Self::Vision(extractor) => extractor.method(),
            Self::Tesseract(extractor) => extractor.method(),
        }
    }

    async fn extract_text(&self, image: Vec<u8>) -> Result<RawExtraction> {
        match self {
            Self::Vision(extractor) => extractor.extract_text(image).await,
            Self::Tesseract(extractor) => extractor.extract_text(image).await,
        }
    }
}

/// Validates input and runs the injected strategy
pub struct ExtractionAdapter<E> {
    extractor: E,
    config: ExtractionConfig,
}

impl<E: TextExtractor> ExtractionAdapter<E> {
    pub fn new(extractor: E, config: ExtractionConfig) -> Self {
        Self { extractor, config }
    }

    pub fn method(&self) -> ExtractionMethod {
        self.extractor.method()
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Turn an image or literal text into label text
    ///
    /// The strategy call is bounded by `timeout`; expiry is reported as
    /// `ExtractionUnavailable`.
    pub async fn extract(&self, source: &LabelSource, timeout: Duration) -> Result<LabelText> {
        match source {
            LabelSource::Text(text) => extract_from_text(text),
            LabelSource::Image(bytes) => self.extract_from_image(bytes, timeout).await,
        }
    }

    async fn extract_from_image(&self, bytes: &[u8], timeout: Duration) -> Result<LabelText> {
        let format = validate_image_bytes(bytes, &self.config)?;
        let method = self.extractor.method();
        info!(
            "Starting {} extraction of {:?} image ({} bytes, ~{} bytes decoded)",
            method,
            format,
            bytes.len(),
            estimate_memory_usage(bytes.len() as u64, &format)
        );

        let image = prepare_image(bytes, format, self.config.max_image_dimension)?;
        let start = Instant::now();
        let raw = tokio::time::timeout(timeout, self.extractor.extract_text(image))
            .await
            .map_err(|_| {
                warn!("{} extraction timed out after {:?}", method, timeout);
                PipelineError::ExtractionUnavailable(format!("{method} extraction timed out"))
            })??;
        let duration_ms = start.elapsed().as_millis() as u64;

        let text = clean_lines(&raw.text);
        if text.is_empty() {
            warn!("{} extraction returned no text", method);
            return Err(PipelineError::NoTextFound(format!(
                "{method} extraction returned no text"
            )));
        }

        info!(
            "{} extraction completed in {}ms: {} characters",
            method,
            duration_ms,
            text.len()
        );
        Ok(parse_label(&text, method, raw.confidence, duration_ms))
    }
}

fn extract_from_text(text: &str) -> Result<LabelText> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidInput("label text is empty".to_string()));
    }
    debug!("Using literal label text ({} characters)", trimmed.len());
    Ok(parse_label(trimmed, ExtractionMethod::Text, 1.0, 0))
}

/// Sniff the image format from the leading bytes
pub fn detect_image_format(bytes: &[u8], buffer_size: usize) -> Option<image::ImageFormat> {
    let header = &bytes[..bytes.len().min(buffer_size)];
    image::guess_format(header).ok()
}

/// Formats every strategy can read: PNG, JPEG, BMP, TIFF
pub fn is_supported_image_format(format: &image::ImageFormat) -> bool {
    matches!(
        format,
        image::ImageFormat::Png
            | image::ImageFormat::Jpeg
            | image::ImageFormat::Bmp
            | image::ImageFormat::Tiff
    )
}

/// Reject empty, unidentifiable, unsupported and oversized images
pub fn validate_image_bytes(bytes: &[u8], config: &ExtractionConfig) -> Result<image::ImageFormat> {
    if bytes.is_empty() {
        return Err(PipelineError::InvalidInput("image is empty".to_string()));
    }
    if bytes.len() < config.min_format_bytes {
        return Err(PipelineError::InvalidInput(format!(
            "image is too small to identify ({} bytes, need at least {})",
            bytes.len(),
            config.min_format_bytes
        )));
    }

    let format = detect_image_format(bytes, config.buffer_size).ok_or_else(|| {
        PipelineError::InvalidInput("image format could not be recognised".to_string())
    })?;
    if !is_supported_image_format(&format) {
        return Err(PipelineError::InvalidInput(format!(
            "unsupported image format {format:?}"
        )));
    }

    let limit = config.format_limits.limit_for(&format, config.max_image_bytes);
    if bytes.len() as u64 > limit {
        return Err(PipelineError::InvalidInput(format!(
            "image is too large ({} bytes, limit {} bytes)",
            bytes.len(),
            limit
        )));
    }

    debug!("Validated {:?} image of {} bytes", format, bytes.len());
    Ok(format)
}

/// Decode the image and shrink it so its longest side fits `max_dimension`
///
/// Images already within bounds are passed through untouched. Downscaled
/// JPEGs stay JPEG; every other format is re-encoded as PNG.
pub fn prepare_image(bytes: &[u8], format: image::ImageFormat, max_dimension: u32) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| PipelineError::InvalidInput(format!("image could not be decoded: {e}")))?;
    let (width, height) = decoded.dimensions();
    if width.max(height) <= max_dimension {
        return Ok(bytes.to_vec());
    }

    let resized = decoded.resize(max_dimension, max_dimension, FilterType::Triangle);
    let output = match format {
        image::ImageFormat::Jpeg => ImageOutputFormat::Jpeg(90),
        _ => ImageOutputFormat::Png,
    };
    let mut encoded = Cursor::new(Vec::new());
    resized
        .write_to(&mut encoded, output)
        .map_err(|e| PipelineError::InvalidInput(format!("resized image could not be encoded: {e}")))?;

    info!(
        "Downscaled {:?} image from {}x{} to {}x{}",
        format,
        width,
        height,
        resized.width(),
        resized.height()
    );
    Ok(encoded.into_inner())
}

/// Rough decoded size of an image, for logging
pub fn estimate_memory_usage(file_size: u64, format: &image::ImageFormat) -> u64 {
    let factor = match format {
        image::ImageFormat::Png => 3.0,
        image::ImageFormat::Jpeg => 2.5,
        image::ImageFormat::Bmp => 1.2,
        image::ImageFormat::Tiff => 4.0,
        _ => 3.0,
    };
    (file_size as f64 * factor) as u64
}

/// MIME type for a data URL
pub fn mime_type(format: Option<image::ImageFormat>) -> &'static str {
    match format {
        Some(image::ImageFormat::Png) => "image/png",
        Some(image::ImageFormat::Bmp) => "image/bmp",
        Some(image::ImageFormat::Tiff) => "image/tiff",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
    const GIF_HEADER: &[u8] = b"GIF89a\x01\x00\x01\x00\x00\x00";

    #[test]
    fn test_validate_rejects_empty_and_short() {
        let config = ExtractionConfig::default();
        assert!(matches!(
            validate_image_bytes(&[], &config),
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_image_bytes(&[0x89, 0x50], &config),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_accepts_png_and_rejects_gif() {
        let config = ExtractionConfig::default();
        assert_eq!(validate_image_bytes(PNG_HEADER, &config), Ok(image::ImageFormat::Png));
        assert!(matches!(
            validate_image_bytes(GIF_HEADER, &config),
            Err(PipelineError::InvalidInput(msg)) if msg.contains("unsupported")
        ));
    }

    #[test]
    fn test_validate_enforces_size_cap() {
        let config = ExtractionConfig {
            max_image_bytes: 10,
            ..ExtractionConfig::default()
        };
        assert!(matches!(
            validate_image_bytes(PNG_HEADER, &config),
            Err(PipelineError::InvalidInput(msg)) if msg.contains("too large")
        ));
    }

    fn encoded_png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        image::DynamicImage::new_rgb8(width, height)
            .write_to(&mut bytes, ImageOutputFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_prepare_image_downscales_longest_side() {
        let original = encoded_png(400, 100);
        let prepared = prepare_image(&original, image::ImageFormat::Png, 200).unwrap();

        let resized = image::load_from_memory(&prepared).unwrap();
        assert_eq!(resized.dimensions(), (200, 50));
    }

    #[test]
    fn test_prepare_image_keeps_small_images() {
        let original = encoded_png(40, 30);
        assert_eq!(prepare_image(&original, image::ImageFormat::Png, 200).unwrap(), original);
    }

    #[test]
    fn test_prepare_image_rejects_corrupt_data() {
        assert!(matches!(
            prepare_image(PNG_HEADER, image::ImageFormat::Png, 200),
            Err(PipelineError::InvalidInput(msg)) if msg.contains("decoded")
        ));
    }

    #[test]
    fn test_literal_text() {
        let label = extract_from_text("  Water, Sugar, Salt  ").unwrap();
        assert_eq!(label.method, ExtractionMethod::Text);
        assert_eq!(label.confidence, 1.0);
        assert_eq!(label.full_text, "Water, Sugar, Salt");

        assert!(matches!(extract_from_text("   "), Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn test_estimate_memory_usage() {
        assert_eq!(estimate_memory_usage(1000, &image::ImageFormat::Jpeg), 2500);
        assert_eq!(estimate_memory_usage(1000, &image::ImageFormat::Bmp), 1200);
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type(Some(image::ImageFormat::Png)), "image/png");
        assert_eq!(mime_type(None), "image/jpeg");
    }
}
