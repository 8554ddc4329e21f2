//! Tesseract OCR backend implementation.
//!
//! Uses Tesseract OCR via command-line for text extraction. The page image is
//! written to a temporary PNG for each call, and Tesseract writes its text
//! next to it. The child is killed as soon as the call limit is exceeded.

use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use image::{GrayImage, ImageFormat};
use tempfile::TempDir;
use tracing::debug;

use super::backend::{CallLimit, OcrBackend, OcrBackendType, OcrConfig, OcrError, OcrResult};
use super::model_utils::check_binary;

/// Tesseract page segmentation mode for fully automatic layout analysis.
const PSM_AUTO: &str = "3";
/// Tesseract page segmentation mode for sparse text.
const PSM_SPARSE: &str = "11";

/// How often a running child is checked against the call limit.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Tesseract OCR backend.
pub struct TesseractBackend {
    config: OcrConfig,
    backend_type: OcrBackendType,
    binary: String,
}

impl TesseractBackend {
    /// Create a new Tesseract backend with default configuration.
    pub fn new() -> Self {
        Self::with_config(OcrConfig::default())
    }

    /// Create a new Tesseract backend with custom configuration.
    pub fn with_config(config: OcrConfig) -> Self {
        Self {
            config,
            backend_type: OcrBackendType::Tesseract,
            binary: "tesseract".to_string(),
        }
    }

    /// Create a Tesseract backend that searches for sparse text.
    pub fn sparse(config: OcrConfig) -> Self {
        Self {
            backend_type: OcrBackendType::TesseractSparse,
            ..Self::with_config(config)
        }
    }

    /// Use a specific tesseract executable instead of the one on PATH.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn page_seg_mode(&self) -> &'static str {
        match self.backend_type {
            OcrBackendType::TesseractSparse => PSM_SPARSE,
            _ => PSM_AUTO,
        }
    }

    /// Run Tesseract on an image file, writing into `work_dir`.
    fn run_tesseract(
        &self,
        image_path: &Path,
        work_dir: &Path,
        limit: &CallLimit,
    ) -> Result<String, OcrError> {
        let out_base = work_dir.join("out");
        let stderr_path = work_dir.join("stderr.log");

        let mut child = Command::new(&self.binary)
            .arg(image_path)
            .arg(&out_base)
            .args(["-l", &self.config.language])
            .args(["--psm", self.page_seg_mode()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(File::create(&stderr_path)?)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OcrError::BackendNotAvailable(
                        "tesseract not found (install tesseract-ocr)".to_string(),
                    )
                } else {
                    OcrError::Io(e)
                }
            })?;

        let status: ExitStatus = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if limit.is_exceeded() {
                let _ = child.kill();
                let _ = child.wait();
                debug!(
                    "Killed {} (pid {}) after call limit was exceeded",
                    self.binary,
                    child.id()
                );
                return Err(OcrError::Timeout(limit.timeout()));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(OcrError::OcrFailed(format!(
                "tesseract failed: {}",
                stderr.trim()
            )));
        }

        Ok(fs::read_to_string(out_base.with_extension("txt"))?)
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrBackend for TesseractBackend {
    fn backend_type(&self) -> OcrBackendType {
        self.backend_type
    }

    fn is_available(&self) -> bool {
        check_binary(&self.binary)
    }

    fn availability_hint(&self) -> String {
        if !check_binary(&self.binary) {
            "Tesseract not installed. Install with: apt install tesseract-ocr".to_string()
        } else {
            "Tesseract is available".to_string()
        }
    }

    fn ocr_image(&self, image: &GrayImage, limit: &CallLimit) -> Result<OcrResult, OcrError> {
        let start = Instant::now();

        let temp_dir = TempDir::new()?;
        let image_path = temp_dir.path().join("page.png");
        image
            .save_with_format(&image_path, ImageFormat::Png)
            .map_err(|e| OcrError::ImageError(format!("Failed to write page image: {}", e)))?;

        let text = self.run_tesseract(&image_path, temp_dir.path(), limit)?;
        Ok(OcrResult::new(text, self.backend_type, start))
    }
}
