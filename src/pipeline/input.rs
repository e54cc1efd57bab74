//! Input resolution: validate a user-supplied path and decide what it is.
//!
//! ## Why sniff instead of trusting the extension?
//!
//! Scanned pages arrive as `.pdf`, `.png`, `.tif`, `.jpg` and, often enough,
//! with the wrong extension or none at all. Reading the first bytes tells us
//! whether to hand the file to pdfium (paginated) or to `image` (single
//! page), and an unknown format fails here with a clear message rather than
//! deep inside a decoder.

use crate::error::SearchablePdfError;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bytes read from the start of the file for sniffing.
const SNIFF_LEN: usize = 32;

/// Kind of source behind a resolved input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// A paginated document; a page number is required.
    Pdf,
    /// A single raster image.
    Image,
}

/// A validated local input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    pub path: PathBuf,
    pub kind: InputKind,
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_paginated(&self) -> bool {
        self.kind == InputKind::Pdf
    }
}

/// Check that `path` exists and is readable, and sniff its format.
pub fn resolve_input(path: impl AsRef<Path>) -> Result<ResolvedInput, SearchablePdfError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(SearchablePdfError::FileNotFound { path });
    }
    if path.is_dir() {
        return Err(SearchablePdfError::SourceLoad {
            path,
            detail: "is a directory".into(),
        });
    }

    let mut head = Vec::with_capacity(SNIFF_LEN);
    match std::fs::File::open(&path) {
        Ok(f) => {
            f.take(SNIFF_LEN as u64)
                .read_to_end(&mut head)
                .map_err(|e| SearchablePdfError::SourceLoad {
                    path: path.clone(),
                    detail: e.to_string(),
                })?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(SearchablePdfError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(SearchablePdfError::FileNotFound { path });
        }
    }

    let kind = sniff(&head).ok_or_else(|| SearchablePdfError::SourceLoad {
        path: path.clone(),
        detail: "not a PDF or a supported image format".into(),
    })?;

    debug!("Resolved {:?} input: {}", kind, path.display());
    Ok(ResolvedInput { path, kind })
}

/// Classify a file by its leading bytes.
pub fn sniff(head: &[u8]) -> Option<InputKind> {
    if head.starts_with(b"%PDF") {
        return Some(InputKind::Pdf);
    }
    image::guess_format(head).ok().map(|_| InputKind::Image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_pdf_and_images() {
        assert_eq!(sniff(b"%PDF-1.7\n"), Some(InputKind::Pdf));
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), Some(InputKind::Image));
        assert_eq!(sniff(b"II*\0\x08\0\0\0"), Some(InputKind::Image));
        assert_eq!(sniff(b"\xFF\xD8\xFF\xE0"), Some(InputKind::Image));
        assert_eq!(sniff(b"hello world"), None);
        assert_eq!(sniff(b""), None);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = resolve_input("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, SearchablePdfError::FileNotFound { .. }));
    }

    #[test]
    fn unknown_format_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "just text").unwrap();
        let err = resolve_input(&path).unwrap_err();
        assert!(matches!(err, SearchablePdfError::SourceLoad { .. }));
    }

    #[test]
    fn extension_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"%PDF-1.4\n%%EOF\n").unwrap();
        let input = resolve_input(&path).unwrap();
        assert_eq!(input.kind, InputKind::Pdf);
        assert!(input.is_paginated());
    }

    #[test]
    fn directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_input(dir.path()),
            Err(SearchablePdfError::SourceLoad { .. })
        ));
    }
}
