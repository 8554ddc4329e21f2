//! OCR engines and the recognition path for pages without a usable text layer.
//!
//! ## OCR Backends
//!
//! - **Tesseract**: Traditional OCR, widely available, CPU-based (default primary)
//! - **Tesseract sparse**: Tesseract hunting for scattered text (default secondary)
//! - **OCRS**: Pure Rust OCR, no external binaries (feature: ocr-ocrs)
//!
//! Backends are combined in an [`EngineChain`]: a fast primary and a slower,
//! more thorough secondary that only runs when the primary comes back short.

mod backend;
mod chain;
mod model_utils;
mod preprocess;
mod tesseract;

#[cfg(feature = "ocr-ocrs")]
mod ocrs_backend;

pub use backend::{
    create_backend, CallLimit, OcrBackend, OcrBackendType, OcrConfig, OcrError, OcrResult,
};
pub use chain::{
    EngineChain, Recognition, StageOutcome, DEFAULT_CONFIDENCE_MIN_CHARS, DEFAULT_ENGINE_TIMEOUT,
};
pub use model_utils::check_binary;
pub use preprocess::{Binarize, Grayscale, Preprocessor, DEFAULT_BINARIZE_CUTOFF};
pub use tesseract::TesseractBackend;

#[cfg(feature = "ocr-ocrs")]
pub use ocrs_backend::OcrsBackend;
