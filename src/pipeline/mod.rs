//! Pipeline stages for turning a page image into a searchable PDF.
//!
//! Each submodule implements exactly one transformation step so each can be
//! tested on its own and swapped out (e.g. a different page renderer)
//! without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ [binarize] ──▶ emit ◀── text_layer ◀── recognizer
//! (sniff)   (pdfium)    (1 bpp)       (lopdf)   (invisible)   (external)
//! ```
//!
//! 1. [`input`]: validate the user-supplied path and sniff PDF vs image
//! 2. [`render`]: rasterise one page (or load the image) with its page geometry
//! 3. [`binarize`]: grayscale + fixed-threshold 1-bit packing
//! 4. [`text_layer`]: map normalized fragment boxes into page points
//! 5. [`emit`]: assemble the one-page PDF with an invisible text layer
//!
//! The codec path wraps steps 3 and 5 with three external tools inside a
//! scoped temporary [`workspace`]; see [`codec`] for the state machine,
//! [`container`] for the uncompressed TIFF and [`tools`] for process handling.

pub mod binarize;
pub mod codec;
pub mod container;
pub mod emit;
pub mod input;
pub mod render;
pub mod text_layer;
pub mod tools;
pub mod workspace;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named unit of work, reported in progress events and stage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Rasterise the page or load the image.
    Rasterize,
    /// Run the recognition engine.
    Recognize,
    /// Produce the packed 1-bit buffer.
    Binarize,
    /// Serialise the uncompressed bilevel container.
    WriteContainer,
    /// External G4 compressor.
    Compress,
    /// External container-to-PDF converter.
    BuildBaseDocument,
    /// Emit the text-only overlay document.
    BuildTextDocument,
    /// External overlay/merge tool.
    Merge,
    /// Emit the plain (non-codec) document.
    Emit,
    /// Persist the final output.
    WriteOutput,
}

impl Stage {
    /// Short, stable identifier used in logs and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Rasterize => "rasterize",
            Stage::Recognize => "recognize",
            Stage::Binarize => "binarize",
            Stage::WriteContainer => "write_container",
            Stage::Compress => "compress",
            Stage::BuildBaseDocument => "build_base_document",
            Stage::BuildTextDocument => "build_text_document",
            Stage::Merge => "merge",
            Stage::Emit => "emit",
            Stage::WriteOutput => "write_output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
