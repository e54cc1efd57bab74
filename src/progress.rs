//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to be told
//! when each [`Stage`] starts, finishes or fails.
//!
//! # Why callbacks instead of log scraping?
//!
//! A host (the CLI spinner, a GUI, a job queue) wants to show "compressing…"
//! or "merging…" without parsing log lines. The callback is the narrowest
//! seam: the library reports stage names and timings, the host decides how
//! to display them.
//!
//! # Example
//!
//! ```rust
//! use searchable_pdf::{ConversionConfig, ConversionProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ConversionProgressCallback for Printer {
//!     fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
//!         eprintln!("{stage} took {elapsed_ms} ms");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::Stage;
use std::sync::Arc;
use std::time::Instant;

/// Receives stage events from the pipeline.
///
/// All methods default to no-ops. The pipeline is synchronous, so events
/// arrive in order on the calling thread, but the trait is `Send + Sync` so
/// a config can be shared across threads.
pub trait ConversionProgressCallback: Send + Sync {
    /// A stage is about to run.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// A stage finished successfully.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// A stage failed; the run ends after this call.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

/// Run `f` as `stage`, reporting start, completion or failure to `callback`.
pub(crate) fn track<T, E: std::fmt::Display>(
    callback: Option<&ProgressCallback>,
    stage: Stage,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    if let Some(cb) = callback {
        cb.on_stage_start(stage);
    }
    let started = Instant::now();
    let result = f();
    if let Some(cb) = callback {
        match &result {
            Ok(_) => cb.on_stage_complete(stage, started.elapsed().as_millis() as u64),
            Err(e) => cb.on_stage_error(stage, &e.to_string()),
        }
    }
    result
}
