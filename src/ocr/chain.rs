//! Two-engine recognition chain.
//!
//! The primary engine runs first. When its trimmed output is no longer than
//! the confidence threshold, the secondary engine runs on the same image and
//! its output is accepted whatever it is. Engine errors and timeouts count as
//! "found nothing" and never escape the chain.

use std::sync::Arc;
use std::time::Duration;

use image::GrayImage;
use tracing::{debug, warn};

use super::backend::{create_backend, CallLimit, OcrBackend, OcrConfig, OcrError};

/// Default minimum trimmed length for accepting primary output.
pub const DEFAULT_CONFIDENCE_MIN_CHARS: usize = 30;

/// Default per-call engine timeout.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(60);

/// What a single engine attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Non-blank text.
    Text(String),
    /// Engine ran and found nothing.
    Empty,
    /// Engine returned an error.
    Failed(String),
    /// Engine exceeded the per-call timeout.
    TimedOut,
}

impl StageOutcome {
    /// Text produced by this stage, empty for every non-`Text` outcome.
    pub fn text(&self) -> &str {
        match self {
            StageOutcome::Text(text) => text,
            _ => "",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Text(_) => "text",
            StageOutcome::Empty => "empty",
            StageOutcome::Failed(_) => "failed",
            StageOutcome::TimedOut => "timed-out",
        }
    }
}

/// Outcome of running the chain on one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    /// Accepted text, possibly empty.
    pub text: String,
    /// Whether the secondary engine ran.
    pub used_secondary: bool,
    pub primary: StageOutcome,
    pub secondary: Option<StageOutcome>,
}

/// Primary/secondary OCR escalation.
pub struct EngineChain {
    primary: Arc<dyn OcrBackend>,
    secondary: Arc<dyn OcrBackend>,
    confidence_min_chars: usize,
    timeout: Duration,
}

impl EngineChain {
    /// Create a chain from two constructed backends.
    pub fn new(primary: Arc<dyn OcrBackend>, secondary: Arc<dyn OcrBackend>) -> Self {
        Self {
            primary,
            secondary,
            confidence_min_chars: DEFAULT_CONFIDENCE_MIN_CHARS,
            timeout: DEFAULT_ENGINE_TIMEOUT,
        }
    }

    /// Create a chain from backend names (e.g. "tesseract", "ocrs").
    pub fn from_names(primary: &str, secondary: &str, config: &OcrConfig) -> Result<Self, OcrError> {
        let build = |name: &str| {
            let backend = create_backend(name, config).ok_or_else(|| {
                OcrError::BackendNotAvailable(format!("Unknown or disabled OCR backend '{}'", name))
            })?;
            if !backend.is_available() {
                warn!(
                    "OCR backend {} is not available: {}",
                    name,
                    backend.availability_hint()
                );
            }
            Ok::<_, OcrError>(backend)
        };
        Ok(Self::new(build(primary)?, build(secondary)?))
    }

    /// Set the minimum trimmed length at which primary output is accepted.
    pub fn with_confidence_threshold(mut self, min_chars: usize) -> Self {
        self.confidence_min_chars = min_chars;
        self
    }

    /// Set the per-call engine timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn primary(&self) -> &dyn OcrBackend {
        self.primary.as_ref()
    }

    pub fn secondary(&self) -> &dyn OcrBackend {
        self.secondary.as_ref()
    }

    /// Recognize text on a preprocessed page image.
    pub async fn recognize(&self, image: Arc<GrayImage>) -> Recognition {
        let primary = self.attempt(&self.primary, &image).await;
        let primary_len = primary.text().trim().chars().count();

        if primary_len > self.confidence_min_chars {
            return Recognition {
                text: primary.text().to_string(),
                used_secondary: false,
                primary,
                secondary: None,
            };
        }

        debug!(
            "Primary {} result {} ({} chars), escalating to {}",
            self.primary.backend_type(),
            primary.label(),
            primary_len,
            self.secondary.backend_type()
        );

        let secondary = self.attempt(&self.secondary, &image).await;
        Recognition {
            text: secondary.text().to_string(),
            used_secondary: true,
            primary,
            secondary: Some(secondary),
        }
    }

    /// Run one engine on the blocking pool under the per-call timeout.
    ///
    /// The backend receives the same limit and stops its own work once it is
    /// exceeded. Dropping this future (an outer deadline) cancels the limit.
    async fn attempt(&self, backend: &Arc<dyn OcrBackend>, image: &Arc<GrayImage>) -> StageOutcome {
        let limit = CallLimit::new(self.timeout);
        let _guard = CancelOnDrop(limit.clone());

        let engine = Arc::clone(backend);
        let page = Arc::clone(image);
        let task = tokio::task::spawn_blocking(move || engine.ocr_image(&page, &limit));

        let outcome = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(result))) if result.text.trim().is_empty() => StageOutcome::Empty,
            Ok(Ok(Ok(result))) => StageOutcome::Text(result.text),
            Ok(Ok(Err(OcrError::Timeout(_)))) => StageOutcome::TimedOut,
            Ok(Ok(Err(e))) => StageOutcome::Failed(e.to_string()),
            Ok(Err(e)) => StageOutcome::Failed(format!("engine task aborted: {}", e)),
            Err(_) => StageOutcome::TimedOut,
        };

        match &outcome {
            StageOutcome::Failed(reason) => {
                warn!("OCR backend {} failed: {}", backend.backend_type(), reason)
            }
            StageOutcome::TimedOut => warn!(
                "OCR backend {} timed out after {:?}",
                backend.backend_type(),
                self.timeout
            ),
            _ => {}
        }
        outcome
    }
}

/// Cancels the limit when an attempt finishes or is dropped mid-flight.
struct CancelOnDrop(CallLimit);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{OcrBackendType, OcrResult};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    enum Script {
        Text(&'static str),
        Fail,
        Sleep(Duration),
        /// Busy until the call limit says stop.
        UntilStopped,
    }

    struct Scripted {
        kind: OcrBackendType,
        script: Script,
        calls: AtomicUsize,
        stopped: AtomicBool,
    }

    impl Scripted {
        fn arc(kind: OcrBackendType, script: Script) -> Arc<Self> {
            Arc::new(Self {
                kind,
                script,
                calls: AtomicUsize::new(0),
                stopped: AtomicBool::new(false),
            })
        }
    }

    impl OcrBackend for Scripted {
        fn backend_type(&self) -> OcrBackendType {
            self.kind
        }
        fn is_available(&self) -> bool {
            true
        }
        fn availability_hint(&self) -> String {
            "scripted".to_string()
        }
        fn ocr_image(&self, _image: &GrayImage, limit: &CallLimit) -> Result<OcrResult, OcrError> {
            let start = Instant::now();
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Text(t) => Ok(OcrResult::new(t.to_string(), self.kind, start)),
                Script::Fail => Err(OcrError::OcrFailed("scripted failure".to_string())),
                Script::Sleep(d) => {
                    std::thread::sleep(*d);
                    Ok(OcrResult::new(
                        "late but long enough to be accepted as text".to_string(),
                        self.kind,
                        start,
                    ))
                }
                Script::UntilStopped => {
                    while !limit.is_exceeded() {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    self.stopped.store(true, Ordering::SeqCst);
                    Err(OcrError::Timeout(limit.timeout()))
                }
            }
        }
    }

    async fn wait_until_stopped(engine: &Scripted) {
        let waited = Instant::now();
        while !engine.stopped.load(Ordering::SeqCst) {
            assert!(
                waited.elapsed() < Duration::from_secs(2),
                "engine kept running after its limit"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn page() -> Arc<GrayImage> {
        Arc::new(GrayImage::new(4, 4))
    }

    const LONG: &str = "This line is comfortably longer than thirty characters.";

    #[tokio::test]
    async fn test_confident_primary_skips_secondary() {
        let primary = Scripted::arc(OcrBackendType::Tesseract, Script::Text(LONG));
        let secondary = Scripted::arc(OcrBackendType::Ocrs, Script::Text("unused"));
        let chain = EngineChain::new(primary.clone(), secondary.clone());

        let r = chain.recognize(page()).await;
        assert_eq!(r.text, LONG);
        assert!(!r.used_secondary);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_short_primary_escalates_once() {
        // Exactly 30 trimmed characters is not enough
        let primary = Scripted::arc(
            OcrBackendType::Tesseract,
            Script::Text("  aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa \n"),
        );
        let secondary = Scripted::arc(OcrBackendType::Ocrs, Script::Text("short"));
        let chain = EngineChain::new(primary.clone(), secondary.clone());

        let r = chain.recognize(page()).await;
        assert_eq!(r.text, "short");
        assert!(r.used_secondary);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_primary_failure_escalates() {
        let primary = Scripted::arc(OcrBackendType::Tesseract, Script::Fail);
        let secondary = Scripted::arc(OcrBackendType::Ocrs, Script::Text(LONG));
        let chain = EngineChain::new(primary, secondary);

        let r = chain.recognize(page()).await;
        assert!(matches!(r.primary, StageOutcome::Failed(_)));
        assert_eq!(r.secondary, Some(StageOutcome::Text(LONG.to_string())));
        assert_eq!(r.text, LONG);
    }

    #[tokio::test]
    async fn test_both_failing_yields_empty_text() {
        let chain = EngineChain::new(
            Scripted::arc(OcrBackendType::Tesseract, Script::Fail),
            Scripted::arc(OcrBackendType::Ocrs, Script::Fail),
        );
        let r = chain.recognize(page()).await;
        assert_eq!(r.text, "");
        assert!(r.used_secondary);
    }

    #[tokio::test]
    async fn test_primary_timeout_escalates() {
        let primary = Scripted::arc(
            OcrBackendType::Tesseract,
            Script::Sleep(Duration::from_millis(500)),
        );
        let secondary = Scripted::arc(OcrBackendType::Ocrs, Script::Text("rescued"));
        let chain = EngineChain::new(primary, secondary).with_timeout(Duration::from_millis(50));

        let r = chain.recognize(page()).await;
        assert_eq!(r.primary, StageOutcome::TimedOut);
        assert_eq!(r.text, "rescued");
    }

    #[tokio::test]
    async fn test_engine_sees_its_own_deadline() {
        let primary = Scripted::arc(OcrBackendType::Tesseract, Script::UntilStopped);
        let secondary = Scripted::arc(OcrBackendType::Ocrs, Script::Text("rescued"));
        let chain = EngineChain::new(primary.clone(), secondary)
            .with_timeout(Duration::from_millis(100));

        let r = chain.recognize(page()).await;
        assert_eq!(r.primary, StageOutcome::TimedOut);
        assert_eq!(r.text, "rescued");
        wait_until_stopped(&primary).await;
    }

    #[tokio::test]
    async fn test_dropped_recognition_stops_engine() {
        let primary = Scripted::arc(OcrBackendType::Tesseract, Script::UntilStopped);
        let secondary = Scripted::arc(OcrBackendType::Ocrs, Script::Text("unused"));
        let chain = EngineChain::new(primary.clone(), secondary)
            .with_timeout(Duration::from_secs(60));

        let outer = tokio::time::timeout(Duration::from_millis(50), chain.recognize(page())).await;
        assert!(outer.is_err());
        wait_until_stopped(&primary).await;
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_hung_tesseract_times_out_and_exits() {
        use crate::ocr::TesseractBackend;
        use std::os::unix::fs::PermissionsExt;

        let bin_dir = tempfile::TempDir::new().unwrap();
        let pid_file = bin_dir.path().join("pid");
        let script = bin_dir.path().join("tesseract");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho $$ > {}\nexec sleep 30\n", pid_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let hung = Arc::new(
            TesseractBackend::new().with_binary(script.to_string_lossy().into_owned()),
        );
        let secondary = Scripted::arc(OcrBackendType::Ocrs, Script::Text("rescued"));
        let chain = EngineChain::new(hung, secondary).with_timeout(Duration::from_millis(300));

        let start = Instant::now();
        let r = chain.recognize(page()).await;
        assert_eq!(r.primary, StageOutcome::TimedOut);
        assert_eq!(r.text, "rescued");
        assert!(start.elapsed() < Duration::from_secs(3));

        // The child is reaped before the blocking task returns
        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let waited = Instant::now();
        while std::path::Path::new(&format!("/proc/{}", pid.trim())).exists() {
            assert!(waited.elapsed() < Duration::from_secs(2), "tesseract child still running");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_blank_output_is_empty_outcome() {
        let chain = EngineChain::new(
            Scripted::arc(OcrBackendType::Tesseract, Script::Text(" \n\x0c")),
            Scripted::arc(OcrBackendType::Ocrs, Script::Text("")),
        );
        let r = chain.recognize(page()).await;
        assert_eq!(r.primary, StageOutcome::Empty);
        assert_eq!(r.secondary, Some(StageOutcome::Empty));
    }

    #[tokio::test]
    async fn test_custom_threshold() {
        let chain = EngineChain::new(
            Scripted::arc(OcrBackendType::Tesseract, Script::Text("tiny")),
            Scripted::arc(OcrBackendType::Ocrs, Script::Fail),
        )
        .with_confidence_threshold(3);
        let r = chain.recognize(page()).await;
        assert_eq!(r.text, "tiny");
        assert!(!r.used_secondary);
    }

    #[test]
    fn test_from_names_rejects_unknown() {
        let result = EngineChain::from_names("tesseract", "easyocr", &OcrConfig::default());
        assert!(result.is_err());
    }
}
