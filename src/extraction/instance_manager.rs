//! # Tesseract Instance Manager Module
//!
//! Thread-safe pool of Tesseract engines keyed by language combination.
//! Engine initialization costs hundreds of milliseconds, so each language
//! combination is initialized once and then shared.

use leptess::LepTess;
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::errors::{PipelineError, Result};

/// Pool of Tesseract instances keyed by language codes (e.g. "eng+fra")
///
/// Instances are created on first request and persist until removed or the
/// manager is dropped. Each instance sits behind its own mutex so concurrent
/// extractions in different languages do not block each other.
pub struct OcrInstanceManager {
    instances: Mutex<HashMap<String, Arc<Mutex<LepTess>>>>,
}

impl OcrInstanceManager {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the engine for a language combination
    ///
    /// # Errors
    ///
    /// `ExtractionUnavailable` when Tesseract cannot be initialized (missing
    /// traineddata, invalid language codes).
    pub fn get_instance(&self, languages: &str) -> Result<Arc<Mutex<LepTess>>> {
        {
            let instances = self.instances.lock().unwrap();
            if let Some(instance) = instances.get(languages) {
                return Ok(Arc::clone(instance));
            }
        }

        info!("Creating new OCR instance for languages: {languages}");
        let tess = LepTess::new(None, languages).map_err(|e| {
            PipelineError::ExtractionUnavailable(format!(
                "failed to initialize Tesseract for '{languages}': {e}"
            ))
        })?;

        let instance = Arc::new(Mutex::new(tess));
        let mut instances = self.instances.lock().unwrap();
        // Another thread may have raced us; keep whichever landed first
        let stored = instances
            .entry(languages.to_string())
            .or_insert_with(|| Arc::clone(&instance));

        Ok(Arc::clone(stored))
    }

    /// Drop the engine for a language combination
    pub fn remove_instance(&self, languages: &str) {
        let mut instances = self.instances.lock().unwrap();
        if instances.remove(languages).is_some() {
            info!("Removed OCR instance for languages: {languages}");
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.lock().unwrap().len()
    }
}

impl Default for OcrInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}
