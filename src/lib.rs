//! scanlayer - hybrid text extraction for digital, scanned and mixed documents.
//!
//! Pages with a usable text layer are read directly. Pages without one are
//! rendered, preprocessed and passed through a two-engine OCR chain. The
//! per-page results are assembled in page order into one
//! [`DocumentResult`](document::DocumentResult).

pub mod config;
pub mod document;
pub mod ocr;
pub mod pipeline;
pub mod services;

pub use config::{ConfigError, Settings};
pub use document::{DocumentResult, ExtractionMethod};
pub use pipeline::{ExtractError, HybridExtractor};
