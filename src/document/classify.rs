//! Page classification from the structural view.

use serde::{Deserialize, Serialize};

use super::{PageClassification, PageDescriptor};

/// Cutoffs used to decide whether a page needs recognition.
///
/// The defaults are uncalibrated heuristics; override them in config rather
/// than changing them here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// A page with no images and more trimmed characters than this is digital.
    pub digital_min_chars: usize,
    /// A page with images and fewer trimmed characters than this is scanned.
    pub scanned_max_chars: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            digital_min_chars: 150,
            scanned_max_chars: 30,
        }
    }
}

/// Classify a page from its text layer length and image count.
pub fn classify(page: &PageDescriptor, thresholds: &Thresholds) -> PageClassification {
    let text_len = page.text_len();
    let images = page.embedded_image_count;

    if text_len > thresholds.digital_min_chars && images == 0 {
        PageClassification::Digital
    } else if text_len < thresholds.scanned_max_chars && images > 0 {
        PageClassification::Scanned
    } else {
        PageClassification::Mixed
    }
}
