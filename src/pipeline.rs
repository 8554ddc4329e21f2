//! Document-level hybrid extraction.
//!
//! Loads both views of a document, classifies each page, sends the pages that
//! need it through preprocessing and the engine chain on a bounded worker
//! pool, then assembles the per-page results in index order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::document::{
    assemble, classify, DocumentLoader, DocumentResult, LoadError, LoadedDocument,
    PageClassification, PageDescriptor, PageResult, PopplerLoader, RasterPage, Thresholds,
};
use crate::ocr::{Binarize, EngineChain, OcrError, Preprocessor};

/// Hard failures of a document-level call.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Extraction timed out after {0:?}")]
    TimedOut(Duration),

    #[error("OCR setup failed: {0}")]
    Ocr(#[from] OcrError),
}

/// Default worker count: one per available core.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// One page's inputs, joined by index.
struct PageWork {
    index: usize,
    descriptor: Option<PageDescriptor>,
    raster: Option<RasterPage>,
}

/// Immutable state shared by every page task of one call.
struct PageContext {
    preprocessor: Arc<dyn Preprocessor>,
    chain: Arc<EngineChain>,
    thresholds: Thresholds,
}

/// Turns raw document bytes into text, recognizing only the pages that need it.
pub struct HybridExtractor {
    loader: Arc<dyn DocumentLoader>,
    preprocessor: Arc<dyn Preprocessor>,
    chain: Arc<EngineChain>,
    thresholds: Thresholds,
    workers: usize,
}

impl HybridExtractor {
    /// Create an extractor with default preprocessing, thresholds and workers.
    pub fn new(loader: Arc<dyn DocumentLoader>, chain: EngineChain) -> Self {
        Self {
            loader,
            preprocessor: Arc::new(Binarize::default()),
            chain: Arc::new(chain),
            thresholds: Thresholds::default(),
            workers: default_workers(),
        }
    }

    /// Build the Poppler-backed extractor described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, ExtractError> {
        let extraction = &settings.extraction;
        let chain = EngineChain::from_names(
            &settings.ocr.primary,
            &settings.ocr.secondary,
            &settings.ocr.backend_config(),
        )?
        .with_confidence_threshold(extraction.confidence_min_chars)
        .with_timeout(extraction.engine_timeout());

        let loader = PopplerLoader::new().with_dpi(extraction.render_dpi);

        Ok(Self::new(Arc::new(loader), chain)
            .with_preprocessor(Arc::new(Binarize::new(extraction.binarize_cutoff)))
            .with_thresholds(extraction.thresholds)
            .with_workers(extraction.effective_workers()))
    }

    pub fn with_preprocessor(mut self, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Set the worker pool size (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn chain(&self) -> &EngineChain {
        &self.chain
    }

    /// Extract text from a document, bounded by an overall deadline.
    pub async fn extract_with_timeout(
        &self,
        bytes: &[u8],
        deadline: Duration,
    ) -> Result<DocumentResult, ExtractError> {
        tokio::time::timeout(deadline, self.extract(bytes))
            .await
            .map_err(|_| ExtractError::TimedOut(deadline))?
    }

    /// Extract text from a document.
    ///
    /// Only an unreadable input format fails the call. Every per-page problem
    /// degrades that page to no contribution.
    pub async fn extract(&self, bytes: &[u8]) -> Result<DocumentResult, ExtractError> {
        let start = Instant::now();

        self.loader.validate(bytes).map_err(|e| match e {
            LoadError::UnsupportedFormat(kind) => ExtractError::UnsupportedFormat(kind),
            other => ExtractError::UnsupportedFormat(other.to_string()),
        })?;

        let document = self.load(bytes).await;
        let page_count = document.page_count();
        debug!(
            "Loaded {} pages ({} descriptors, {} rasters)",
            page_count,
            document.descriptors.len(),
            document.rasters.len()
        );

        let pages = self.process_pages(join_views(document, page_count)).await;
        let result = assemble(&pages);

        info!(
            "Extracted {} pages ({} recognized) via {} in {}ms",
            page_count,
            pages.iter().filter(|p| p.used_recognition).count(),
            result.method,
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    async fn load(&self, bytes: &[u8]) -> LoadedDocument {
        let loader = Arc::clone(&self.loader);
        let bytes = bytes.to_vec();
        match tokio::task::spawn_blocking(move || loader.load(&bytes)).await {
            Ok(document) => document,
            Err(e) => {
                warn!("Document loader aborted: {}", e);
                LoadedDocument::default()
            }
        }
    }

    /// Run every page on the worker pool and return results in index order.
    async fn process_pages(&self, work: Vec<PageWork>) -> Vec<PageResult> {
        let page_count = work.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let context = Arc::new(PageContext {
            preprocessor: Arc::clone(&self.preprocessor),
            chain: Arc::clone(&self.chain),
            thresholds: self.thresholds,
        });

        let mut tasks = JoinSet::new();
        for item in work {
            let semaphore = Arc::clone(&semaphore);
            let context = Arc::clone(&context);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                process_page(&context, item).await
            });
        }

        let mut results: BTreeMap<usize, PageResult> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(page) => {
                    results.insert(page.index, page);
                }
                Err(e) => warn!("Page task aborted: {}", e),
            }
        }

        (0..page_count)
            .map(|index| {
                results
                    .remove(&index)
                    .unwrap_or_else(|| PageResult::empty(index))
            })
            .collect()
    }
}

/// Pair descriptors and rasters by their index.
fn join_views(document: LoadedDocument, page_count: usize) -> Vec<PageWork> {
    let mut descriptors: BTreeMap<usize, PageDescriptor> = document
        .descriptors
        .into_iter()
        .map(|d| (d.index, d))
        .collect();
    let mut rasters: BTreeMap<usize, RasterPage> = document
        .rasters
        .into_iter()
        .map(|r| (r.index, r))
        .collect();

    (0..page_count)
        .map(|index| PageWork {
            index,
            descriptor: descriptors.remove(&index),
            raster: rasters.remove(&index),
        })
        .collect()
}

async fn process_page(context: &PageContext, work: PageWork) -> PageResult {
    let PageWork {
        index,
        descriptor,
        raster,
    } = work;

    let Some(descriptor) = descriptor else {
        if raster.is_none() {
            debug!("Page {}: no text layer and no render", index + 1);
            return PageResult::empty(index);
        }
        // Raster-only page: nothing to classify, treat as scanned
        debug!("Page {}: raster only, treating as scanned", index + 1);
        let text = recognize(context, index, raster).await;
        return PageResult::new(index, text.trim(), true);
    };

    let classification = classify(&descriptor, &context.thresholds);
    debug!(
        "Page {}: type={}, len(text)={}, images={}",
        index + 1,
        classification,
        descriptor.text_len(),
        descriptor.embedded_image_count
    );

    match classification {
        PageClassification::Digital => PageResult::new(index, descriptor.embedded_text, false),
        PageClassification::Scanned => {
            let text = recognize(context, index, raster).await;
            PageResult::new(index, text.trim(), true)
        }
        PageClassification::Mixed => {
            let recognized = recognize(context, index, raster).await;
            PageResult::new(index, join_mixed(&descriptor.embedded_text, &recognized), true)
        }
    }
}

/// Embedded text followed by recognized text, newline-joined and trimmed.
///
/// The two are not deduplicated against each other.
fn join_mixed(embedded: &str, recognized: &str) -> String {
    format!("{}\n{}", embedded.trim(), recognized)
        .trim()
        .to_string()
}

/// Preprocess a page render and run the engine chain on it.
async fn recognize(context: &PageContext, index: usize, raster: Option<RasterPage>) -> String {
    let Some(raster) = raster else {
        debug!("Page {}: no render available for recognition", index + 1);
        return String::new();
    };

    let preprocessor = Arc::clone(&context.preprocessor);
    let prepared =
        match tokio::task::spawn_blocking(move || preprocessor.prepare(&raster.image)).await {
            Ok(image) => Arc::new(image),
            Err(e) => {
                warn!("Page {}: preprocessing aborted: {}", index + 1, e);
                return String::new();
            }
        };

    let recognition = context.chain.recognize(prepared).await;
    debug!(
        "Page {}: primary={}, secondary={}, {} chars",
        index + 1,
        recognition.primary.label(),
        recognition
            .secondary
            .as_ref()
            .map(|s| s.label())
            .unwrap_or("skipped"),
        recognition.text.trim().chars().count()
    );
    recognition.text
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn raster(index: usize) -> RasterPage {
        RasterPage::new(index, DynamicImage::new_luma8(2, 2))
    }

    #[test]
    fn test_join_mixed() {
        assert_eq!(join_mixed("intro", "body"), "intro\nbody");
        assert_eq!(join_mixed("  intro \n", ""), "intro");
        assert_eq!(join_mixed("", "  body\n"), "body");
        assert_eq!(join_mixed("", ""), "");
    }

    #[test]
    fn test_join_views_by_index() {
        let document = LoadedDocument {
            descriptors: vec![
                PageDescriptor::new(2, "third", 0),
                PageDescriptor::new(0, "first", 0),
            ],
            rasters: vec![raster(1), raster(0)],
        };
        let page_count = document.page_count();
        let work = join_views(document, page_count);

        assert_eq!(work.len(), 3);
        assert_eq!(work[0].descriptor.as_ref().unwrap().embedded_text, "first");
        assert!(work[0].raster.is_some());
        assert!(work[1].descriptor.is_none());
        assert_eq!(work[1].raster.as_ref().unwrap().index, 1);
        assert_eq!(work[2].descriptor.as_ref().unwrap().embedded_text, "third");
        assert!(work[2].raster.is_none());
    }

    #[test]
    fn test_default_workers_positive() {
        assert!(default_workers() >= 1);
    }
}
