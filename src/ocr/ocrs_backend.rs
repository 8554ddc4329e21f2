//! Pure-Rust recognition through the ocrs crate.
//!
//! Detection and recognition models are fetched on first use.

use std::sync::OnceLock;
use std::time::Instant;

use image::{DynamicImage, GrayImage};

use super::backend::{CallLimit, OcrBackend, OcrBackendType, OcrConfig, OcrError, OcrResult};
use super::model_utils::{ModelFile, ModelStore};

const DETECTION: &str = "text-detection.rten";
const RECOGNITION: &str = "text-recognition.rten";

const MODELS: ModelStore = ModelStore {
    engine: "ocrs",
    files: &[
        ModelFile {
            name: DETECTION,
            url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten",
            approx_size: "2.5 MB",
        },
        ModelFile {
            name: RECOGNITION,
            url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten",
            approx_size: "10 MB",
        },
    ],
};

/// ocrs engine, loaded lazily and owned by this instance.
pub struct OcrsBackend {
    config: OcrConfig,
    engine: OnceLock<ocrs::OcrEngine>,
}

impl OcrsBackend {
    pub fn new() -> Self {
        Self::with_config(OcrConfig::default())
    }

    pub fn with_config(config: OcrConfig) -> Self {
        Self {
            config,
            engine: OnceLock::new(),
        }
    }

    fn build_engine(&self) -> Result<ocrs::OcrEngine, OcrError> {
        let dir = MODELS.fetch(self.config.model_path.as_deref())?;

        let load = |name: &str| {
            rten::Model::load_file(dir.join(name))
                .map_err(|e| OcrError::ModelNotFound(format!("{}: {}", name, e)))
        };

        ocrs::OcrEngine::new(ocrs::OcrEngineParams {
            detection_model: Some(load(DETECTION)?),
            recognition_model: Some(load(RECOGNITION)?),
            ..Default::default()
        })
        .map_err(|e| OcrError::OcrFailed(format!("ocrs engine init: {}", e)))
    }

    fn engine(&self) -> Result<&ocrs::OcrEngine, OcrError> {
        if let Some(engine) = self.engine.get() {
            return Ok(engine);
        }
        // Concurrent first calls may both build; the loser's engine is dropped
        let _ = self.engine.set(self.build_engine()?);
        self.engine
            .get()
            .ok_or_else(|| OcrError::OcrFailed("ocrs engine unavailable".to_string()))
    }
}

impl Default for OcrsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrBackend for OcrsBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Ocrs
    }

    fn is_available(&self) -> bool {
        true
    }

    fn availability_hint(&self) -> String {
        match MODELS.locate(self.config.model_path.as_deref()) {
            Some(dir) => format!("models in {}", dir.display()),
            None => format!(
                "models (~12 MB) will be downloaded to {} on first use",
                MODELS.home().display()
            ),
        }
    }

    fn ocr_image(&self, image: &GrayImage, limit: &CallLimit) -> Result<OcrResult, OcrError> {
        let start = Instant::now();
        let engine = self.engine()?;
        // Recognition itself cannot be interrupted, so only check before it starts
        if limit.is_exceeded() {
            return Err(OcrError::Timeout(limit.timeout()));
        }

        let rgb = DynamicImage::ImageLuma8(image.clone()).into_rgb8();
        let source = ocrs::ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())
            .map_err(|e| OcrError::ImageError(e.to_string()))?;
        let input = engine
            .prepare_input(source)
            .map_err(|e| OcrError::OcrFailed(format!("prepare input: {}", e)))?;
        let text = engine
            .get_text(&input)
            .map_err(|e| OcrError::OcrFailed(format!("recognize: {}", e)))?;

        Ok(OcrResult::new(text, OcrBackendType::Ocrs, start))
    }
}
