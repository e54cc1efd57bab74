//! Scoped temporary workspace for the codec pipeline.
//!
//! Every intermediate file of one codec run lives in a single private
//! directory. The directory is owned by exactly one [`CodecWorkspace`] and is
//! removed when that value is dropped, whichever way the pipeline exits.
//! Removal failures are logged and otherwise ignored so they never mask the
//! error that ended the run.

use crate::error::SearchablePdfError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

const PREFIX: &str = "searchpdf-";

/// Owned temporary directory plus the fixed intermediate file names.
#[derive(Debug)]
pub struct CodecWorkspace {
    // `None` only after `close`.
    dir: Option<TempDir>,
    path: PathBuf,
}

impl CodecWorkspace {
    /// Create a fresh directory under `root`, or the system temp dir.
    pub fn create(root: Option<&Path>) -> Result<Self, SearchablePdfError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|source| SearchablePdfError::Workspace { source })?;

        let path = dir.path().to_path_buf();
        debug!("Created workspace {}", path.display());
        Ok(Self { dir: Some(dir), path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Uncompressed bilevel container.
    pub fn container(&self) -> PathBuf {
        self.path.join("page.tif")
    }

    /// G4-compressed container.
    pub fn compressed(&self) -> PathBuf {
        self.path.join("page-g4.tif")
    }

    /// Base document holding the compressed image.
    pub fn base_document(&self) -> PathBuf {
        self.path.join("base.pdf")
    }

    /// Text-only overlay document.
    pub fn text_document(&self) -> PathBuf {
        self.path.join("text.pdf")
    }

    /// Merged result, before it is moved to its destination.
    pub fn merged_document(&self) -> PathBuf {
        self.path.join("merged.pdf")
    }

    /// Remove the directory now. Also happens on drop.
    pub fn close(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!("Removed workspace {}", self.path.display()),
                Err(e) => warn!("Failed to remove workspace {}: {}", self.path.display(), e),
            }
        }
    }
}

impl Drop for CodecWorkspace {
    fn drop(&mut self) {
        self.close();
    }
}
