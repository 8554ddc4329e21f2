//! Document loading: structural parse and raster render.
//!
//! The two passes are independent failure domains. A failed parse leaves the
//! raster pages usable and a failed render leaves the text layer usable.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::{NamedTempFile, TempDir};
use thiserror::Error;
use tracing::{debug, warn};

use super::{PageDescriptor, RasterPage};

const PDF_MIME: &str = "application/pdf";

/// Errors from loading a document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Both views of a document, each possibly incomplete.
#[derive(Debug, Default)]
pub struct LoadedDocument {
    pub descriptors: Vec<PageDescriptor>,
    pub rasters: Vec<RasterPage>,
}

impl LoadedDocument {
    /// Number of pages to process: covers every index either view produced.
    pub fn page_count(&self) -> usize {
        let max_index = self
            .descriptors
            .iter()
            .map(|d| d.index + 1)
            .chain(self.rasters.iter().map(|r| r.index + 1))
            .max()
            .unwrap_or(0);
        self.descriptors
            .len()
            .max(self.rasters.len())
            .max(max_index)
    }
}

/// Source of page descriptors and page rasters for a raw document.
pub trait DocumentLoader: Send + Sync {
    /// Reject buffers this loader cannot interpret at all.
    fn validate(&self, _bytes: &[u8]) -> Result<(), LoadError> {
        Ok(())
    }

    /// Parse the text layer and image counts, one descriptor per page.
    fn load_pages(&self, bytes: &[u8]) -> Result<Vec<PageDescriptor>, LoadError>;

    /// Render pages to images. May return fewer pages than exist.
    fn render_pages(&self, bytes: &[u8]) -> Result<Vec<RasterPage>, LoadError>;

    /// Run both passes, degrading each failure to an empty view.
    fn load(&self, bytes: &[u8]) -> LoadedDocument {
        let descriptors = self.load_pages(bytes).unwrap_or_else(|e| {
            warn!("Document parse failed, continuing with raster view only: {}", e);
            Vec::new()
        });
        let rasters = self.render_pages(bytes).unwrap_or_else(|e| {
            warn!("Document render failed, continuing with text layer only: {}", e);
            Vec::new()
        });
        LoadedDocument {
            descriptors,
            rasters,
        }
    }
}

/// Handle command output, extracting stdout on success or returning appropriate error.
fn handle_cmd_output(
    result: std::io::Result<std::process::Output>,
    tool_name: &str,
    error_prefix: &str,
) -> Result<String, LoadError> {
    match result {
        Ok(output) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(LoadError::ExtractionFailed(format!(
                    "{}: {}",
                    error_prefix,
                    stderr.trim()
                )))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(LoadError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(LoadError::Io(e)),
    }
}

/// PDF loader backed by the Poppler command-line tools.
pub struct PopplerLoader {
    /// Render resolution for the raster view, 200 by default.
    dpi: u32,
}

impl Default for PopplerLoader {
    fn default() -> Self {
        Self { dpi: 200 }
    }
}

impl PopplerLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set render resolution.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    /// Tools this loader shells out to.
    pub const TOOLS: [&'static str; 4] = ["pdfinfo", "pdftotext", "pdfimages", "pdftoppm"];

    fn spill(bytes: &[u8]) -> Result<NamedTempFile, LoadError> {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(file)
    }

    /// Get the page count of a PDF.
    fn page_count(&self, pdf_path: &Path) -> Result<usize, LoadError> {
        let output = Command::new("pdfinfo").arg(pdf_path).output();
        let stdout = handle_cmd_output(output, "pdfinfo (install poppler-utils)", "pdfinfo failed")?;
        parse_page_count(&stdout)
            .ok_or_else(|| LoadError::ExtractionFailed("pdfinfo reported no page count".to_string()))
    }

    /// Run pdftotext on a single page (1-based).
    fn page_text(&self, pdf_path: &Path, page: usize) -> Result<String, LoadError> {
        let page_str = page.to_string();
        let output = Command::new("pdftotext")
            .args(["-enc", "UTF-8", "-f", &page_str, "-l", &page_str])
            .arg(pdf_path)
            .arg("-")
            .output();

        let text = handle_cmd_output(
            output,
            "pdftotext (install poppler-utils)",
            &format!("pdftotext failed on page {}", page),
        )?;
        Ok(text.trim_end_matches('\x0c').to_string())
    }

    /// Count images per page, indexed from zero.
    fn image_counts(&self, pdf_path: &Path, page_count: usize) -> Result<Vec<usize>, LoadError> {
        let output = Command::new("pdfimages").arg("-list").arg(pdf_path).output();
        let listing = handle_cmd_output(
            output,
            "pdfimages (install poppler-utils)",
            "pdfimages failed",
        )?;
        Ok(parse_image_listing(&listing, page_count))
    }

    fn load_pages_from_path(&self, pdf_path: &Path) -> Result<Vec<PageDescriptor>, LoadError> {
        let page_count = self.page_count(pdf_path)?;

        let image_counts = self.image_counts(pdf_path, page_count).unwrap_or_else(|e| {
            warn!("Could not list page images, assuming none: {}", e);
            vec![0; page_count]
        });

        let mut pages = Vec::with_capacity(page_count);
        for index in 0..page_count {
            match self.page_text(pdf_path, index + 1) {
                Ok(text) => {
                    let images = image_counts.get(index).copied().unwrap_or(0);
                    pages.push(PageDescriptor::new(index, text, images));
                }
                Err(e) => {
                    // Page falls back to its raster view alone
                    warn!("Text layer unavailable for page {}: {}", index + 1, e);
                }
            }
        }

        debug!(
            "Parsed {} of {} pages from text layer",
            pages.len(),
            page_count
        );
        Ok(pages)
    }

    fn render_pages_from_path(&self, pdf_path: &Path) -> Result<Vec<RasterPage>, LoadError> {
        let temp_dir = TempDir::new()?;
        let dpi = self.dpi.to_string();

        let status = Command::new("pdftoppm")
            .args(["-png", "-r", &dpi])
            .arg(pdf_path)
            .arg(temp_dir.path().join("page"))
            .status();

        match status {
            Ok(s) if s.success() => {}
            Ok(_) => {
                return Err(LoadError::RenderFailed(
                    "pdftoppm failed to convert PDF".to_string(),
                ))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::ToolNotFound(
                    "pdftoppm (install poppler-utils)".to_string(),
                ))
            }
            Err(e) => return Err(LoadError::Io(e)),
        }

        let mut rasters = Vec::new();
        for (index, path) in find_page_images(temp_dir.path())? {
            match image::open(&path) {
                Ok(image) => rasters.push(RasterPage::new(index, image)),
                Err(e) => warn!("Failed to decode render of page {}: {}", index + 1, e),
            }
        }

        debug!("Rendered {} pages at {} dpi", rasters.len(), self.dpi);
        Ok(rasters)
    }
}

impl DocumentLoader for PopplerLoader {
    fn validate(&self, bytes: &[u8]) -> Result<(), LoadError> {
        if bytes.is_empty() {
            return Ok(());
        }
        match infer::get(bytes) {
            Some(kind) if kind.mime_type() == PDF_MIME => Ok(()),
            Some(kind) => Err(LoadError::UnsupportedFormat(kind.mime_type().to_string())),
            None => Err(LoadError::UnsupportedFormat("unknown".to_string())),
        }
    }

    fn load_pages(&self, bytes: &[u8]) -> Result<Vec<PageDescriptor>, LoadError> {
        let file = Self::spill(bytes)?;
        self.load_pages_from_path(file.path())
    }

    fn render_pages(&self, bytes: &[u8]) -> Result<Vec<RasterPage>, LoadError> {
        let file = Self::spill(bytes)?;
        self.render_pages_from_path(file.path())
    }

    fn load(&self, bytes: &[u8]) -> LoadedDocument {
        if bytes.is_empty() {
            return LoadedDocument::default();
        }

        let file = match Self::spill(bytes) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not stage document for loading: {}", e);
                return LoadedDocument::default();
            }
        };

        let descriptors = self.load_pages_from_path(file.path()).unwrap_or_else(|e| {
            warn!("Document parse failed, continuing with raster view only: {}", e);
            Vec::new()
        });
        let rasters = self.render_pages_from_path(file.path()).unwrap_or_else(|e| {
            warn!("Document render failed, continuing with text layer only: {}", e);
            Vec::new()
        });

        LoadedDocument {
            descriptors,
            rasters,
        }
    }
}

/// Extract `Pages:` from pdfinfo output.
fn parse_page_count(pdfinfo: &str) -> Option<usize> {
    pdfinfo
        .lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
}

/// Tally `pdfimages -list` rows per page.
///
/// Soft masks and masks are alpha channels of another image and are not
/// counted on their own.
fn parse_image_listing(listing: &str, page_count: usize) -> Vec<usize> {
    let mut counts = vec![0; page_count];
    for line in listing.lines().skip(2) {
        let mut cols = line.split_whitespace();
        let page = cols.next().and_then(|p| p.parse::<usize>().ok());
        let kind = cols.nth(1);
        if let (Some(page), Some(kind)) = (page, kind) {
            if matches!(kind, "image" | "stencil") && page >= 1 && page <= page_count {
                counts[page - 1] += 1;
            }
        }
    }
    counts
}

/// List `page-N.png` files written by pdftoppm as `(index, path)`, ordered.
///
/// pdftoppm pads the page number to the width of the page count, so the
/// number is parsed rather than formatted.
fn find_page_images(dir: &Path) -> Result<Vec<(usize, PathBuf)>, LoadError> {
    let mut images: Vec<(usize, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?;
            let is_png = path.extension().is_some_and(|ext| ext == "png");
            let number: usize = stem.strip_prefix("page-")?.parse().ok()?;
            (is_png && number >= 1).then_some((number - 1, path))
        })
        .collect();
    images.sort_by_key(|(index, _)| *index);
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_count() {
        let info = "Title:          notes\nProducer:       x\nPages:          12\nEncrypted:      no\n";
        assert_eq!(parse_page_count(info), Some(12));
        assert_eq!(parse_page_count("Title: none\n"), None);
    }

    #[test]
    fn test_parse_image_listing() {
        let listing = "\
page   num  type   width height color comp bpc  enc interp  object ID x-ppi y-ppi size ratio
--------------------------------------------------------------------------------------------
   1     0 image    2480  3508  gray    1   8  jpeg   no         9  0   300   300  432K 5.1%
   1     1 smask    2480  3508  gray    1   8  image  no        10  0   300   300  1.2K 0.0%
   3     2 image     640   480  rgb     3   8  jpeg   no        21  0    72    72   40K 4.4%
   3     3 stencil   100   100  -       1   1  image  no        22  0    72    72   10B 0.1%
   9     4 image     640   480  rgb     3   8  jpeg   no        30  0    72    72   40K 4.4%
";
        assert_eq!(parse_image_listing(listing, 3), vec![1, 0, 2]);
    }

    #[test]
    fn test_find_page_images_parses_padding() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("page-010.png"), b"fake").unwrap();
        std::fs::write(temp.path().join("page-002.png"), b"fake").unwrap();
        std::fs::write(temp.path().join("notes.txt"), b"fake").unwrap();

        let found = find_page_images(temp.path()).unwrap();
        let indices: Vec<usize> = found.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 9]);
    }

    #[test]
    fn test_page_count_covers_both_views() {
        let doc = LoadedDocument {
            descriptors: vec![PageDescriptor::new(0, "a", 0)],
            rasters: vec![
                RasterPage::new(0, image::DynamicImage::new_luma8(1, 1)),
                RasterPage::new(3, image::DynamicImage::new_luma8(1, 1)),
            ],
        };
        assert_eq!(doc.page_count(), 4);
        assert_eq!(LoadedDocument::default().page_count(), 0);
    }

    #[test]
    fn test_validate_rejects_non_pdf() {
        let loader = PopplerLoader::new();
        let png_magic = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert!(matches!(
            loader.validate(&png_magic),
            Err(LoadError::UnsupportedFormat(_))
        ));
        assert!(loader.validate(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n").is_ok());
        assert!(loader.validate(b"").is_ok());
    }

    #[test]
    fn test_empty_buffer_loads_nothing() {
        let doc = PopplerLoader::new().load(b"");
        assert!(doc.descriptors.is_empty());
        assert!(doc.rasters.is_empty());
    }
}
