//! OCR backend abstraction.
//!
//! Backends are constructed once and handed to the engine chain as
//! `Arc<dyn OcrBackend>`; nothing here holds global engine state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tesseract::TesseractBackend;

#[cfg(feature = "ocr-ocrs")]
use super::ocrs_backend::OcrsBackend;

/// Errors from OCR backends.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("OCR stopped after {0:?}")]
    Timeout(Duration),
}

/// Result of OCR processing.
#[derive(Debug, Clone)]
pub struct OcrResult {
    /// Extracted text content.
    pub text: String,
    /// Which backend produced this result.
    pub backend: OcrBackendType,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

impl OcrResult {
    pub fn new(text: String, backend: OcrBackendType, start: Instant) -> Self {
        Self {
            text,
            backend,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Available OCR backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcrBackendType {
    /// Tesseract with automatic page segmentation.
    Tesseract,
    /// Tesseract in sparse-text mode: finds as much text as possible in no
    /// particular order. Slower, catches text the layout pass misses.
    TesseractSparse,
    /// Pure Rust OCR engine (ocrs crate).
    Ocrs,
}

impl OcrBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackendType::Tesseract => "tesseract",
            OcrBackendType::TesseractSparse => "tesseract-sparse",
            OcrBackendType::Ocrs => "ocrs",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tesseract" => Some(OcrBackendType::Tesseract),
            "tesseract-sparse" | "sparse" => Some(OcrBackendType::TesseractSparse),
            "ocrs" => Some(OcrBackendType::Ocrs),
            _ => None,
        }
    }

    /// All backend types known to this build.
    pub fn all() -> &'static [OcrBackendType] {
        &[
            OcrBackendType::Tesseract,
            OcrBackendType::TesseractSparse,
            OcrBackendType::Ocrs,
        ]
    }
}

impl std::fmt::Display for OcrBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bounds one engine call: a wall-clock deadline plus a cancel flag.
///
/// Backends that run work they can interrupt (such as a child process) poll
/// [`is_exceeded`](Self::is_exceeded) and stop as soon as it turns true.
#[derive(Debug, Clone)]
pub struct CallLimit {
    timeout: Duration,
    deadline: Instant,
    cancelled: Arc<AtomicBool>,
}

impl CallLimit {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask the call to stop early.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True once the deadline has passed or the call was cancelled.
    pub fn is_exceeded(&self) -> bool {
        self.is_cancelled() || Instant::now() >= self.deadline
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Trait for OCR backends.
pub trait OcrBackend: Send + Sync {
    /// Get the backend type.
    fn backend_type(&self) -> OcrBackendType;

    /// Check if this backend is available (dependencies installed, models present).
    fn is_available(&self) -> bool;

    /// Get a description of what's needed to make this backend available.
    fn availability_hint(&self) -> String;

    /// Run OCR on a preprocessed page image, giving up once `limit` is exceeded.
    fn ocr_image(&self, image: &GrayImage, limit: &CallLimit) -> Result<OcrResult, OcrError>;
}

/// Configuration shared by OCR backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Language for OCR (e.g., "eng", "chi_sim").
    pub language: String,
    /// Path to model files (for backends that need them).
    pub model_path: Option<std::path::PathBuf>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            model_path: None,
        }
    }
}

/// Create a backend by name.
///
/// Returns `None` for unknown names and for backends not compiled into this
/// build.
pub fn create_backend(name: &str, config: &OcrConfig) -> Option<Arc<dyn OcrBackend>> {
    match OcrBackendType::from_str(name)? {
        OcrBackendType::Tesseract => Some(Arc::new(TesseractBackend::with_config(config.clone()))),
        OcrBackendType::TesseractSparse => {
            Some(Arc::new(TesseractBackend::sparse(config.clone())))
        }
        #[cfg(feature = "ocr-ocrs")]
        OcrBackendType::Ocrs => Some(Arc::new(OcrsBackend::with_config(config.clone()))),
        #[cfg(not(feature = "ocr-ocrs"))]
        OcrBackendType::Ocrs => {
            tracing::warn!("ocrs backend requested but this build lacks the ocr-ocrs feature");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_round_trips_names() {
        for backend in OcrBackendType::all() {
            assert_eq!(OcrBackendType::from_str(backend.as_str()), Some(*backend));
        }
        assert_eq!(
            OcrBackendType::from_str("SPARSE"),
            Some(OcrBackendType::TesseractSparse)
        );
        assert_eq!(OcrBackendType::from_str("easyocr"), None);
    }

    #[test]
    fn test_call_limit_expires_and_cancels() {
        let limit = CallLimit::new(Duration::from_millis(20));
        assert!(!limit.is_exceeded());
        std::thread::sleep(Duration::from_millis(40));
        assert!(limit.is_exceeded());

        let limit = CallLimit::new(Duration::from_secs(60));
        let shared = limit.clone();
        shared.cancel();
        assert!(limit.is_cancelled());
        assert!(limit.is_exceeded());
    }

    #[test]
    fn test_create_backend_unknown_name() {
        assert!(create_backend("nonexistent", &OcrConfig::default()).is_none());
    }

    #[test]
    fn test_create_tesseract_variants() {
        let config = OcrConfig::default();
        let fast = create_backend("tesseract", &config).unwrap();
        let sparse = create_backend("tesseract-sparse", &config).unwrap();
        assert_eq!(fast.backend_type(), OcrBackendType::Tesseract);
        assert_eq!(sparse.backend_type(), OcrBackendType::TesseractSparse);
    }
}
