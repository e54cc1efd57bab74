//! Invisible text layer: recognized fragments → positioned glyph runs.
//!
//! Recognition boxes arrive as page fractions with a bottom-left origin,
//! which is also the PDF user-space convention, so the mapping to page
//! points is a plain multiplication by the page size. The page size used is
//! always the *true* page size from [`PageGeometry`], never the raster size,
//! which lets a page be recognised at 2× or 3× and still produce a document
//! with the source's dimensions.
//!
//! Runs are emitted in the recognizer's order; that order becomes the
//! extracted text's reading order.

use crate::raster::PageGeometry;
use crate::recognize::RecognizedFragment;
use serde::Serialize;
use tracing::debug;

/// Width of one glyph in the text font, as a fraction of the font size.
/// Matches the font's default advance width of 500/1000 em.
pub const GLYPH_ADVANCE_EM: f64 = 0.5;

/// One positioned, invisible run of text in page points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlyphRun {
    pub text: String,
    /// Left edge of the run (baseline anchor x).
    pub x: f64,
    /// Bottom edge of the run (baseline anchor y).
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
    /// Horizontal scaling in percent, stretching the text to span `width`.
    pub horizontal_scale: f64,
}

/// Map recognized fragments onto `geometry`'s page, skipping malformed ones.
pub fn composite(fragments: &[RecognizedFragment], geometry: &PageGeometry) -> Vec<GlyphRun> {
    let runs: Vec<GlyphRun> = fragments
        .iter()
        .filter_map(|f| glyph_run(f, geometry))
        .collect();

    let skipped = fragments.len() - runs.len();
    if skipped > 0 {
        debug!("Skipped {} malformed fragment(s) of {}", skipped, fragments.len());
    }
    runs
}

fn glyph_run(fragment: &RecognizedFragment, geometry: &PageGeometry) -> Option<GlyphRun> {
    if fragment.text.is_empty() {
        return None;
    }
    let bbox = fragment.bbox.filter(|b| b.is_well_formed())?;

    let x = bbox.x * geometry.page_width;
    let y = bbox.y * geometry.page_height;
    let width = (bbox.width * geometry.page_width).max(1.0);
    let height = (bbox.height * geometry.page_height).max(1.0);
    let font_size = height.max(1.0);

    let chars = fragment.text.chars().count() as f64;
    let natural_width = chars * GLYPH_ADVANCE_EM * font_size;
    let horizontal_scale = 100.0 * width / natural_width;

    Some(GlyphRun {
        text: fragment.text.clone(),
        x,
        y,
        width,
        height,
        font_size,
        horizontal_scale,
    })
}
