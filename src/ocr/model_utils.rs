//! Locating external binaries and engine model files.

#![cfg_attr(not(feature = "ocr-ocrs"), allow(dead_code))]

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use super::backend::OcrError;

/// Whether `name` resolves to an executable on PATH.
pub fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// A model file fetched on first use.
pub struct ModelFile {
    pub name: &'static str,
    pub url: &'static str,
    /// Shown in the download log line.
    pub approx_size: &'static str,
}

/// The set of model files one engine needs, and where they live.
pub struct ModelStore {
    pub engine: &'static str,
    pub files: &'static [ModelFile],
}

impl ModelStore {
    /// Download target: `<data_dir>/scanlayer/models/<engine>`.
    pub fn home(&self) -> PathBuf {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scanlayer")
            .join("models")
            .join(self.engine)
    }

    fn search_dirs(&self, configured: Option<&Path>) -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(3);
        candidates.extend(configured.map(Path::to_path_buf));
        candidates.push(self.home());
        candidates.push(Path::new("models").join(self.engine));
        candidates
    }

    fn is_complete(&self, dir: &Path) -> bool {
        self.files.iter().all(|f| dir.join(f.name).is_file())
    }

    /// First directory holding every model file, trying `configured` first.
    pub fn locate(&self, configured: Option<&Path>) -> Option<PathBuf> {
        self.search_dirs(configured)
            .into_iter()
            .find(|dir| self.is_complete(dir))
    }

    /// Locate the models, downloading whatever is missing into [`home`](Self::home).
    pub fn fetch(&self, configured: Option<&Path>) -> Result<PathBuf, OcrError> {
        if let Some(dir) = self.locate(configured) {
            return Ok(dir);
        }

        let home = self.home();
        std::fs::create_dir_all(&home)?;
        for file in self.files {
            let dest = home.join(file.name);
            if dest.is_file() {
                continue;
            }
            info!("Downloading {} model {} (~{})", self.engine, file.name, file.approx_size);
            download(file.url, &dest)?;
        }
        Ok(home)
    }
}

/// Fetch `url` with curl into a sibling temp name, then move it into place.
fn download(url: &str, dest: &Path) -> Result<(), OcrError> {
    let partial = dest.with_extension("part");
    let status = Command::new("curl")
        .args(["-fsSL", "-o"])
        .arg(&partial)
        .arg(url)
        .status();

    match status {
        Ok(s) if s.success() => Ok(std::fs::rename(&partial, dest)?),
        Ok(s) => {
            let _ = std::fs::remove_file(&partial);
            Err(OcrError::ModelNotFound(format!(
                "download of {} failed ({})",
                url, s
            )))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OcrError::BackendNotAvailable(
            "curl is required to download OCR models".to_string(),
        )),
        Err(e) => Err(OcrError::Io(e)),
    }
}
