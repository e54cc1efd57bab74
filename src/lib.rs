//! # searchable-pdf
//!
//! Turn a scanned page into a searchable PDF: the original pixels with an
//! invisible, selectable text layer on top.
//!
//! ## Why this crate?
//!
//! Recognition engines return text plus boxes; viewers want a PDF whose text
//! can be searched, selected and copied exactly where it appears on the scan.
//! This crate does the assembly in between: it rasterises the page, maps each
//! fragment's normalized box onto the real page size, paints the text in
//! invisible mode over the image and, optionally, recompresses the page as a
//! 1-bit CCITT G4 image through `tiffcp`, `tiff2pdf` and `qpdf`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF page / image
//!  │
//!  ├─ 1. Input      sniff PDF vs image from magic bytes
//!  ├─ 2. Render     rasterise via pdfium (or decode the image), flatten onto white
//!  ├─ 3. Recognize  injected Recognizer → fragments with normalized boxes
//!  ├─ 4. Text layer normalized boxes → page points, invisible glyph runs
//!  └─ 5. Output     JSON, plain PDF (lopdf), or the G4 codec pipeline:
//!                    binarize → TIFF → tiffcp → tiff2pdf → overlay text → qpdf
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use searchable_pdf::{convert_to_file, ConversionConfig, FragmentFileRecognizer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder().page(1).build()?;
//!     let recognizer = FragmentFileRecognizer::new("scan.fragments.json");
//!     let stats = convert_to_file("scan.pdf", "scan.searchable.pdf", &recognizer, &config)?;
//!     eprintln!("{} text runs, {} bytes", stats.glyph_run_count, stats.output_bytes);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `searchpdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `ocr`   | off     | Adds [`recognize::OcrsRecognizer`] backed by the `ocrs` engine |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! searchable-pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod raster;
pub mod recognize;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, DocumentMetadata, OutputMode, ToolConfig,
};
pub use convert::{build_document, convert, convert_to_file, recognize_page};
pub use error::SearchablePdfError;
pub use output::{ConversionOutput, ConversionStats, RecognizedPage};
pub use pipeline::codec::{run_codec_pipeline, CodecReport, CodecState};
pub use pipeline::Stage;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use raster::{PageGeometry, PixelFormat, PixelImage};
pub use recognize::{
    FragmentFileRecognizer, NormalizedBox, RecognitionRequest, RecognizedFragment, Recognizer,
};
