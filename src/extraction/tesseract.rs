//! # Tesseract Extraction Strategy
//!
//! Local OCR through Leptonica/Tesseract. Free and offline, lower accuracy than
//! the vision service. Work runs on the blocking thread pool since the engine
//! is synchronous.

use std::io::Write;
use std::sync::Arc;

use log::{debug, info};

use super::instance_manager::OcrInstanceManager;
use super::{detect_image_format, RawExtraction, TextExtractor};
use crate::config::{AppConfig, FORMAT_DETECTION_BUFFER_SIZE};
use crate::errors::{PipelineError, Result};
use crate::model::ExtractionMethod;

pub struct TesseractExtractor {
    instances: Arc<OcrInstanceManager>,
    languages: String,
}

impl TesseractExtractor {
    pub fn new(instances: Arc<OcrInstanceManager>, languages: impl Into<String>) -> Self {
        Self {
            instances,
            languages: languages.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(OcrInstanceManager::new()),
            config.extraction.languages.clone(),
        )
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }
}

impl TextExtractor for TesseractExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Tesseract
    }

    async fn extract_text(&self, image: Vec<u8>) -> Result<RawExtraction> {
        let instances = Arc::clone(&self.instances);
        let languages = self.languages.clone();

        tokio::task::spawn_blocking(move || run_tesseract(&instances, &languages, &image))
            .await
            .map_err(|e| PipelineError::ExtractionUnavailable(format!("OCR task failed: {e}")))?
    }
}

fn run_tesseract(instances: &OcrInstanceManager, languages: &str, image: &[u8]) -> Result<RawExtraction> {
    let instance = instances.get_instance(languages)?;

    let suffix = match detect_image_format(image, FORMAT_DETECTION_BUFFER_SIZE) {
        Some(image::ImageFormat::Png) => ".png",
        Some(image::ImageFormat::Bmp) => ".bmp",
        Some(image::ImageFormat::Tiff) => ".tiff",
        _ => ".jpg",
    };
    let mut temp_file = tempfile::Builder::new()
        .prefix("label-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| PipelineError::ExtractionUnavailable(format!("failed to create temp file: {e}")))?;
    temp_file
        .write_all(image)
        .and_then(|_| temp_file.flush())
        .map_err(|e| PipelineError::ExtractionUnavailable(format!("failed to write temp file: {e}")))?;

    let path = temp_file
        .path()
        .to_str()
        .ok_or_else(|| PipelineError::ExtractionUnavailable("temp file path is not UTF-8".to_string()))?;
    debug!("Running Tesseract ({}) on {}", languages, path);

    let mut tess = instance
        .lock()
        .map_err(|_| PipelineError::ExtractionUnavailable("OCR instance lock poisoned".to_string()))?;

    tess.set_image(path)
        .map_err(|e| PipelineError::InvalidInput(format!("failed to load image for OCR: {e}")))?;

    let text = tess
        .get_utf8_text()
        .map_err(|e| PipelineError::ExtractionUnavailable(format!("failed to extract text: {e}")))?;
    let confidence = f64::from(tess.mean_text_conf().clamp(0, 100)) / 100.0;

    info!(
        "Tesseract extracted {} characters (confidence {:.2})",
        text.trim().len(),
        confidence
    );

    Ok(RawExtraction { text, confidence })
}
