//! Input checks applied to extracted text before it is handed downstream.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum accepted input length, in characters.
pub const DEFAULT_MAX_CHARS: usize = 6000;

/// Why a piece of text was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter some text or upload a file.")]
    Empty,

    #[error("Your input is too long ({length} characters). Please reduce it below {max} characters.")]
    TooLong { length: usize, max: usize },

    #[error("Your input contains unsafe prompt-injection patterns.")]
    DisallowedContent { pattern: String },
}

/// Limits applied by [`validate_input`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub max_chars: usize,
    /// Matched case-insensitively anywhere in the text.
    pub banned_patterns: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            banned_patterns: [
                "ignore previous instructions",
                "jailbreak",
                "system override",
                "forget the above",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Check that `text` is non-blank, short enough and free of banned patterns.
pub fn validate_input(text: &str, config: &ValidationConfig) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::Empty);
    }

    let length = text.chars().count();
    if length > config.max_chars {
        return Err(ValidationError::TooLong {
            length,
            max: config.max_chars,
        });
    }

    let lowered = text.to_lowercase();
    if let Some(pattern) = config
        .banned_patterns
        .iter()
        .find(|p| !p.is_empty() && lowered.contains(&p.to_lowercase()))
    {
        return Err(ValidationError::DisallowedContent {
            pattern: pattern.clone(),
        });
    }

    Ok(())
}
