//! Page and document model for hybrid extraction.
//!
//! A document is seen through two views of the same page set: the structural
//! view ([`PageDescriptor`]) and the raster view ([`RasterPage`]). Both carry
//! an explicit page index and are joined on it, never on position.

mod assemble;
mod classify;
mod loader;

pub use assemble::assemble;
pub use classify::{classify, Thresholds};
pub use loader::{DocumentLoader, LoadError, LoadedDocument, PopplerLoader};

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Structural view of a single page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor {
    /// Zero-based page index.
    pub index: usize,
    /// Text carried by the page's own text layer.
    pub embedded_text: String,
    /// Number of images placed on the page.
    pub embedded_image_count: usize,
}

impl PageDescriptor {
    pub fn new(index: usize, embedded_text: impl Into<String>, embedded_image_count: usize) -> Self {
        Self {
            index,
            embedded_text: embedded_text.into(),
            embedded_image_count,
        }
    }

    /// Length of the trimmed text layer, in characters.
    pub fn text_len(&self) -> usize {
        self.embedded_text.trim().chars().count()
    }
}

/// Raster view of a single page.
#[derive(Debug, Clone)]
pub struct RasterPage {
    pub index: usize,
    pub image: DynamicImage,
}

impl RasterPage {
    pub fn new(index: usize, image: DynamicImage) -> Self {
        Self { index, image }
    }
}

/// How a page's text should be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageClassification {
    /// The text layer alone is sufficient.
    Digital,
    /// Little or no text layer, but image content.
    Scanned,
    /// Partial text layer alongside images; recognition is appended.
    Mixed,
}

impl PageClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageClassification::Digital => "digital",
            PageClassification::Scanned => "scanned",
            PageClassification::Mixed => "mixed",
        }
    }

    /// Whether pages of this kind go through the recognition path.
    pub fn needs_recognition(&self) -> bool {
        !matches!(self, PageClassification::Digital)
    }
}

impl std::fmt::Display for PageClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final text for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    pub index: usize,
    pub text: String,
    pub used_recognition: bool,
}

impl PageResult {
    pub fn new(index: usize, text: impl Into<String>, used_recognition: bool) -> Self {
        Self {
            index,
            text: text.into(),
            used_recognition,
        }
    }

    /// A page that contributes nothing and never reached recognition.
    pub fn empty(index: usize) -> Self {
        Self::new(index, String::new(), false)
    }
}

/// Document-level summary of how the text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    /// Every page was served by its text layer.
    EmbeddedOnly,
    /// At least one page went through recognition.
    HybridRecognition,
    /// Nothing usable was extracted.
    Empty,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::EmbeddedOnly => "embedded-only",
            ExtractionMethod::HybridRecognition => "hybrid-recognition",
            ExtractionMethod::Empty => "empty",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The sole output of a document extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub full_text: String,
    pub method: ExtractionMethod,
}

impl DocumentResult {
    pub fn empty() -> Self {
        Self {
            full_text: String::new(),
            method: ExtractionMethod::Empty,
        }
    }

    /// Split into the `(text, method)` pair handed to downstream stages.
    pub fn into_parts(self) -> (String, &'static str) {
        (self.full_text, self.method.as_str())
    }
}
