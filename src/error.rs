//! Error types for the searchable-pdf library.
//!
//! Every failure in this crate is fatal to the run that produced it: there is
//! no partial-output recovery and nothing is retried. A single enum,
//! [`SearchablePdfError`], covers the whole taxonomy.
//!
//! Failures inside the codec pipeline are wrapped in
//! [`SearchablePdfError::Pipeline`] so the caller always learns *which* stage
//! aborted the run. Use [`SearchablePdfError::root_cause`] to look through the
//! wrapper and [`SearchablePdfError::stage`] to read the stage back.

use crate::pipeline::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the searchable-pdf library.
#[derive(Debug, Error)]
pub enum SearchablePdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The source exists but cannot be opened or decoded.
    #[error("Cannot load source '{path}': {detail}")]
    SourceLoad { path: PathBuf, detail: String },

    // ── Raster errors ─────────────────────────────────────────────────────
    /// Requested page is outside the document (1-indexed).
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// A paginated source was given without a page number.
    #[error("A page number is required for paginated sources ({total} pages)")]
    PageNumberRequired { total: usize },

    /// A page number was given for a single-image source.
    #[error("Page {page} was requested but '{path}' is a single image, not a paginated document")]
    PageNumberNotApplicable { page: usize, path: PathBuf },

    /// The pixel buffer for a rendered page could not be allocated.
    #[error("Cannot allocate a {width}x{height} raster")]
    RasterAllocation { width: u32, height: u32 },

    /// A working buffer could not be allocated.
    #[error("Cannot allocate {bytes} bytes for an image buffer")]
    Allocation { bytes: usize },

    /// A pixel buffer does not satisfy its stride/length invariants.
    #[error("Invalid raster: {0}")]
    InvalidRaster(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be assembled or serialised.
    #[error("Failed to build PDF document: {0}")]
    DocumentBuild(String),

    // ── External tools ────────────────────────────────────────────────────
    /// An external codec/merge tool could not be spawned, exited non-zero,
    /// or timed out. `exit_code` is `None` when no exit status exists.
    #[error("External tool '{tool}' failed ({}): {detail}", exit_label(.exit_code))]
    ExternalToolFailure {
        tool: String,
        exit_code: Option<i32>,
        detail: String,
    },

    /// The codec workspace directory could not be created.
    #[error("Failed to create codec workspace: {source}")]
    Workspace {
        #[source]
        source: std::io::Error,
    },

    /// A codec pipeline stage failed. `source` holds the underlying error.
    #[error("Stage '{stage}' failed: {source}")]
    Pipeline {
        stage: Stage,
        #[source]
        source: Box<SearchablePdfError>,
    },

    // ── Recognition ───────────────────────────────────────────────────────
    /// The recognition engine reported an error.
    #[error("Recognition engine '{engine}' failed: {detail}")]
    RecognitionEngine { engine: String, detail: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF pages are rasterised with pdfium. You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory).\n\
  • Pass --pdfium-lib /path/to/libpdfium.\n\
  • Install libpdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "no exit code".to_string(),
    }
}

impl SearchablePdfError {
    /// Wrap `self` as the failure of `stage`.
    pub fn at_stage(self, stage: Stage) -> Self {
        SearchablePdfError::Pipeline {
            stage,
            source: Box::new(self),
        }
    }

    /// The stage that failed, when the error came out of the codec pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SearchablePdfError::Pipeline { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost error, looking through any [`SearchablePdfError::Pipeline`] wrapper.
    pub fn root_cause(&self) -> &SearchablePdfError {
        match self {
            SearchablePdfError::Pipeline { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
