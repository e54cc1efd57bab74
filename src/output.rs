//! Result types returned by the conversion entry points.
//!
//! The structured-output format is the bare fragment array from
//! [`RecognizedPage::structured_json`], the same shape
//! [`crate::recognize::FragmentFileRecognizer`] reads, so `--json` output
//! can be replayed unchanged.

use crate::error::SearchablePdfError;
use crate::pipeline::codec::CodecReport;
use crate::raster::{PageGeometry, PixelImage};
use crate::recognize::RecognizedFragment;
use serde::Serialize;
use std::path::PathBuf;

/// One rasterised page and what the recognizer found on it.
#[derive(Debug, Clone, Serialize)]
pub struct RecognizedPage {
    /// Input path as given.
    pub source: PathBuf,
    /// 1-based page number; `None` for single images.
    pub page: Option<usize>,
    pub geometry: PageGeometry,
    /// Fragments in the recognizer's order.
    pub fragments: Vec<RecognizedFragment>,
    /// The raster the recognizer saw. Not serialised.
    #[serde(skip)]
    pub image: PixelImage,
}

impl RecognizedPage {
    /// Pretty-printed `[{"text", "confidence", "box"}]`, in recognizer order.
    pub fn structured_json(&self) -> Result<Vec<u8>, SearchablePdfError> {
        serde_json::to_vec_pretty(&self.fragments)
            .map_err(|e| SearchablePdfError::Internal(format!("JSON serialisation failed: {e}")))
    }
}

/// Counts and timings for one conversion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    pub page: Option<usize>,
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Output page size in points.
    pub page_width: f64,
    pub page_height: f64,
    pub fragment_count: usize,
    /// Fragments that made it into the text layer.
    pub glyph_run_count: usize,
    /// Whether the background was embedded as a 1-bit image.
    pub bilevel: bool,
    /// Bytes written (or returned) as the final output.
    pub output_bytes: u64,
    pub rasterize_duration_ms: u64,
    pub recognize_duration_ms: u64,
    pub emit_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Present when the codec pipeline produced the output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<CodecReport>,
}

/// In-memory conversion result.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    pub page: RecognizedPage,
    /// The one-page document, in document output mode.
    #[serde(skip)]
    pub document: Option<Vec<u8>>,
    pub stats: ConversionStats,
}
