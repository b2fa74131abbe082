//! # Extraction Tests
//!
//! Input validation, strategy dispatch and failure mapping of the extraction
//! adapter, plus the vision strategy's circuit breaker.

mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use std::io::Write;
    use std::time::Duration;

    use image::GenericImageView;

    use ingredient_intel::config::{AppConfig, ExtractionConfig, RecoveryConfig};
    use ingredient_intel::errors::PipelineError;
    use ingredient_intel::extraction::circuit_breaker::CircuitState;
    use ingredient_intel::extraction::instance_manager::OcrInstanceManager;
    use ingredient_intel::extraction::{
        ConfiguredExtractor, ExtractionAdapter, LabelSource, RawExtraction, TextExtractor, VisionExtractor,
    };
    use ingredient_intel::model::ExtractionMethod;
    use ingredient_intel::openai::OpenAiClient;
    use tempfile::NamedTempFile;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn adapter(extractor: ScriptedExtractor) -> ExtractionAdapter<ScriptedExtractor> {
        ExtractionAdapter::new(extractor, ExtractionConfig::default())
    }

    /// Image bytes read back from disk go through the strategy
    #[tokio::test]
    async fn test_image_from_file_is_extracted() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&label_png()).unwrap();
        let bytes = std::fs::read(file.path()).unwrap();

        let extractor = ScriptedExtractor::returning_text(
            ExtractionMethod::Vision,
            "  FRESH OJ \n\n Ingredients: orange juice, vitamin C.  \n Best before 03/15/2027 ",
        );
        let label = adapter(extractor.clone())
            .extract(&LabelSource::Image(bytes), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(extractor.calls(), 1);
        assert_eq!(label.method, ExtractionMethod::Vision);
        assert_eq!(label.confidence, 0.9);
        assert_eq!(label.product_name.as_deref(), Some("FRESH OJ"));
        assert_eq!(label.ingredients_text, "orange juice, vitamin C");
        assert_eq!(label.expiration_date, chrono::NaiveDate::from_ymd_opt(2027, 3, 15));
        assert!(!label.full_text.contains("\n\n"));
    }

    /// Whitespace-only output is "no text", not an empty success
    #[tokio::test]
    async fn test_blank_output_is_no_text_found() {
        let extractor = ScriptedExtractor::returning_text(ExtractionMethod::Tesseract, " \n\t ");
        let result = adapter(extractor)
            .extract(&LabelSource::Image(label_png()), TIMEOUT)
            .await;

        assert!(matches!(result, Err(PipelineError::NoTextFound(_))));
    }

    /// Literal text never touches the strategy
    #[tokio::test]
    async fn test_literal_text_bypasses_strategy() {
        let extractor = ScriptedExtractor::new(ExtractionMethod::Vision);
        let adapter = adapter(extractor.clone());

        let label = adapter
            .extract(&LabelSource::Text(SODA_LABEL.to_string()), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(label.method, ExtractionMethod::Text);
        assert_eq!(label.confidence, 1.0);

        let empty = adapter.extract(&LabelSource::Text("  ".to_string()), TIMEOUT).await;
        assert!(matches!(empty, Err(PipelineError::InvalidInput(_))));
        assert_eq!(extractor.calls(), 0);
    }

    /// Photos larger than the dimension cap are shrunk, not refused
    #[tokio::test]
    async fn test_oversized_photo_is_downscaled() {
        let extractor = ScriptedExtractor::returning_text(ExtractionMethod::Tesseract, "Ingredients: water, salt");
        let adapter = ExtractionAdapter::new(
            extractor.clone(),
            ExtractionConfig {
                max_image_dimension: 640,
                ..ExtractionConfig::default()
            },
        );

        let label = adapter
            .extract(&LabelSource::Image(png_image(2400, 1200)), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(label.ingredients_text, "water, salt");

        let images = extractor.images();
        assert_eq!(images.len(), 1);
        let received = image::load_from_memory(&images[0]).unwrap();
        assert_eq!(received.dimensions(), (640, 320));
    }

    /// Images within the cap reach the strategy byte for byte
    #[tokio::test]
    async fn test_small_photo_is_passed_through() {
        let extractor = ScriptedExtractor::returning_text(ExtractionMethod::Vision, "Water");
        let original = label_png();

        adapter(extractor.clone())
            .extract(&LabelSource::Image(original.clone()), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(extractor.images(), vec![original]);
    }

    /// A recognised header over a corrupt body never reaches the strategy
    #[tokio::test]
    async fn test_corrupt_image_is_invalid_input() {
        let extractor = ScriptedExtractor::returning_text(ExtractionMethod::Vision, "never");
        let mut corrupt = label_png();
        corrupt.truncate(20);
        corrupt.extend_from_slice(&[0xAB; 64]);

        let result = adapter(extractor.clone())
            .extract(&LabelSource::Image(corrupt), TIMEOUT)
            .await;

        assert!(matches!(result, Err(PipelineError::InvalidInput(msg)) if msg.contains("decoded")));
        assert_eq!(extractor.calls(), 0);
    }

    /// Strategy errors pass through unchanged
    #[tokio::test]
    async fn test_strategy_errors_propagate() {
        let extractor = ScriptedExtractor::new(ExtractionMethod::Vision)
            .then(Err(PipelineError::ExtractionUnavailable("quota exceeded".to_string())));
        let result = adapter(extractor)
            .extract(&LabelSource::Image(label_png()), TIMEOUT)
            .await;

        assert_eq!(
            result,
            Err(PipelineError::ExtractionUnavailable("quota exceeded".to_string()))
        );
    }

    /// Confidence outside 0..1 is clamped
    #[tokio::test]
    async fn test_confidence_is_clamped() {
        let extractor = ScriptedExtractor::new(ExtractionMethod::Tesseract).then(Ok(RawExtraction {
            text: "Water, salt, sugar".to_string(),
            confidence: 1.4,
        }));
        let label = adapter(extractor)
            .extract(&LabelSource::Image(label_png()), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(label.confidence, 1.0);
    }

    /// Oversized images are refused before any strategy runs
    #[tokio::test]
    async fn test_size_cap_applies_before_strategy() {
        let extractor = ScriptedExtractor::returning_text(ExtractionMethod::Vision, "never");
        let adapter = ExtractionAdapter::new(
            extractor.clone(),
            ExtractionConfig {
                max_image_bytes: 8,
                ..ExtractionConfig::default()
            },
        );

        let result = adapter
            .extract(&LabelSource::Image(label_png()), TIMEOUT)
            .await;

        assert!(matches!(result, Err(PipelineError::InvalidInput(msg)) if msg.contains("too large")));
        assert_eq!(extractor.calls(), 0);
    }

    /// An open breaker fails fast without a network call
    #[tokio::test]
    async fn test_vision_breaker_fails_fast() {
        let client = OpenAiClient::new(
            "sk-test".to_string(),
            "http://127.0.0.1:9".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();
        let vision = VisionExtractor::new(
            client,
            "gpt-4o-mini",
            RecoveryConfig {
                circuit_breaker_threshold: 1,
                ..Default::default()
            },
        );
        vision.breaker().record_failure();
        assert_eq!(vision.breaker().state(), CircuitState::Open);

        let result = vision.extract_text(label_png()).await;
        assert!(matches!(result, Err(PipelineError::ExtractionUnavailable(msg)) if msg.contains("local method")));
    }

    /// Strategy selection follows configuration
    #[test]
    fn test_configured_extractor_selection() {
        let config = AppConfig::default();

        let tesseract = ConfiguredExtractor::for_method(&config, ExtractionMethod::Tesseract).unwrap();
        assert_eq!(tesseract.method(), ExtractionMethod::Tesseract);

        // Vision needs credentials
        assert!(matches!(
            ConfiguredExtractor::for_method(&config, ExtractionMethod::Vision),
            Err(PipelineError::Configuration(_))
        ));
        assert!(ConfiguredExtractor::for_method(&config, ExtractionMethod::Text).is_err());

        let config = AppConfig {
            provider: ingredient_intel::config::ProviderConfig {
                api_key: Some("sk-test".to_string()),
                ..Default::default()
            },
            ..AppConfig::default()
        };
        let vision = ConfiguredExtractor::from_config(&config).unwrap();
        assert_eq!(vision.method(), ExtractionMethod::Vision);
    }

    /// Instance manager starts empty and tolerates removing unknown languages
    #[test]
    fn test_instance_manager_bookkeeping() {
        let manager = OcrInstanceManager::new();
        assert_eq!(manager.instance_count(), 0);
        manager.remove_instance("eng");
        assert_eq!(manager.instance_count(), 0);
    }
}
