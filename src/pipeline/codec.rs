//! Bilevel codec pipeline: 1-bit raster → G4 base PDF + invisible text overlay.
//!
//! ## States
//!
//! ```text
//! Init ─▶ BinarizeDone ─▶ ContainerWritten ─▶ Compressed ─▶ BaseDocumentBuilt
//!                                                                  │
//!              Done ◀── Merged ◀── TextDocumentBuilt ◀─────────────┘
//! ```
//!
//! Each arrow is one [`Stage`]. The first stage to fail ends the run with
//! that error wrapped as [`SearchablePdfError::Pipeline`]; nothing is
//! retried and there is no fallback to plain Flate embedding.
//!
//! ## Workspace
//!
//! All intermediates live in a [`CodecWorkspace`] created right before the
//! container is written. The workspace is owned by the run, so it is removed
//! on every exit path, including `?` early returns. The final merge is
//! written inside the workspace and only then copied to the destination, so
//! a failed merge never leaves a partial output file.

use crate::config::ConversionConfig;
use crate::error::SearchablePdfError;
use crate::pipeline::binarize::binarize;
use crate::pipeline::container::write_container;
use crate::pipeline::emit::{emit_document, write_document};
use crate::pipeline::text_layer::GlyphRun;
use crate::pipeline::tools::{self, ToolKind};
use crate::pipeline::workspace::CodecWorkspace;
use crate::pipeline::Stage;
use crate::progress;
use crate::raster::{PageGeometry, PixelImage};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Where a codec run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    Init,
    BinarizeDone,
    ContainerWritten,
    Compressed,
    BaseDocumentBuilt,
    TextDocumentBuilt,
    Merged,
    Done,
}

impl CodecState {
    /// The stage that leaves this state, or `None` once done.
    pub fn next_stage(self) -> Option<Stage> {
        match self {
            CodecState::Init => Some(Stage::Binarize),
            CodecState::BinarizeDone => Some(Stage::WriteContainer),
            CodecState::ContainerWritten => Some(Stage::Compress),
            CodecState::Compressed => Some(Stage::BuildBaseDocument),
            CodecState::BaseDocumentBuilt => Some(Stage::BuildTextDocument),
            CodecState::TextDocumentBuilt => Some(Stage::Merge),
            CodecState::Merged => Some(Stage::WriteOutput),
            CodecState::Done => None,
        }
    }
}

/// Sizes and timings of a successful codec run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodecReport {
    pub container_bytes: u64,
    pub compressed_bytes: u64,
    pub base_document_bytes: u64,
    pub text_document_bytes: u64,
    pub output_bytes: u64,
    /// Wall-clock time per stage, in execution order.
    pub stage_durations_ms: Vec<(Stage, u64)>,
}

/// Run the whole codec pipeline and write the merged document to `output`.
pub fn run_codec_pipeline(
    image: PixelImage,
    geometry: &PageGeometry,
    runs: &[GlyphRun],
    output: &Path,
    config: &ConversionConfig,
) -> Result<CodecReport, SearchablePdfError> {
    info!(
        "Codec pipeline: {}x{} px at {} dpi, {} text runs → {}",
        geometry.pixel_width,
        geometry.pixel_height,
        geometry.resolution_dpi(),
        runs.len(),
        output.display()
    );

    let mut run = CodecRun {
        config,
        geometry,
        runs,
        output,
        source: Some(image),
        bilevel: None,
        workspace: None,
        report: CodecReport::default(),
    };

    let mut state = CodecState::Init;
    while let Some(stage) = state.next_stage() {
        let started = Instant::now();
        state = progress::track(config.progress_callback.as_ref(), stage, || run.step(state))
            .map_err(|e| e.at_stage(stage))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(%stage, elapsed_ms, ?state, "Stage complete");
        run.report.stage_durations_ms.push((stage, elapsed_ms));
    }

    if let Some(mut ws) = run.workspace.take() {
        ws.close();
    }
    info!("Codec pipeline done: {} bytes", run.report.output_bytes);
    Ok(run.report)
}

/// Everything one run owns. Dropping it removes the workspace.
struct CodecRun<'a> {
    config: &'a ConversionConfig,
    geometry: &'a PageGeometry,
    runs: &'a [GlyphRun],
    output: &'a Path,
    source: Option<PixelImage>,
    bilevel: Option<PixelImage>,
    workspace: Option<CodecWorkspace>,
    report: CodecReport,
}

impl CodecRun<'_> {
    fn step(&mut self, state: CodecState) -> Result<CodecState, SearchablePdfError> {
        match state {
            CodecState::Init => {
                let source =
                    self.source.take().ok_or_else(|| internal("source raster already consumed"))?;
                self.bilevel = Some(binarize(source, self.config.force_bilevel)?);
                Ok(CodecState::BinarizeDone)
            }
            CodecState::BinarizeDone => {
                let ws = CodecWorkspace::create(self.config.workspace_root.as_deref())?;
                let bilevel = self.bilevel.as_ref().ok_or_else(|| internal("no bilevel raster"))?;
                let path = ws.container();
                write_container(
                    &path,
                    bilevel,
                    self.geometry.resolution_dpi(),
                    &self.config.metadata.creator,
                )?;
                self.report.container_bytes = file_len(&path);
                self.workspace = Some(ws);
                Ok(CodecState::ContainerWritten)
            }
            CodecState::ContainerWritten => {
                let ws = self.workspace()?;
                let rows = self
                    .config
                    .rows_per_strip
                    .unwrap_or(self.geometry.pixel_height)
                    .max(1);
                let (input, out) = (ws.container(), ws.compressed());
                self.run_tool(ToolKind::Compressor, &tools::compressor_args(rows, &input, &out))?;
                self.report.compressed_bytes = file_len(&out);
                Ok(CodecState::Compressed)
            }
            CodecState::Compressed => {
                let ws = self.workspace()?;
                let (input, out) = (ws.compressed(), ws.base_document());
                let meta = &self.config.metadata;
                let args = tools::converter_args(
                    &out,
                    &meta.creator,
                    &meta.title,
                    self.geometry.resolution_dpi(),
                    &input,
                );
                self.run_tool(ToolKind::Converter, &args)?;
                self.report.base_document_bytes = file_len(&out);
                Ok(CodecState::BaseDocumentBuilt)
            }
            CodecState::BaseDocumentBuilt => {
                let path = self.workspace()?.text_document();
                let bytes = emit_document(None, self.geometry, self.runs, &self.config.metadata)?;
                std::fs::write(&path, &bytes).map_err(|source| {
                    SearchablePdfError::OutputWriteFailed {
                        path: path.clone(),
                        source,
                    }
                })?;
                self.report.text_document_bytes = bytes.len() as u64;
                Ok(CodecState::TextDocumentBuilt)
            }
            CodecState::TextDocumentBuilt => {
                let ws = self.workspace()?;
                let args = tools::overlay_args(
                    &ws.base_document(),
                    &ws.text_document(),
                    &ws.merged_document(),
                );
                self.run_tool(ToolKind::Overlay, &args)?;
                Ok(CodecState::Merged)
            }
            CodecState::Merged => {
                let merged = self.workspace()?.merged_document();
                let bytes = std::fs::read(&merged).map_err(|source| {
                    SearchablePdfError::OutputWriteFailed {
                        path: merged.clone(),
                        source,
                    }
                })?;
                write_document(self.output, &bytes)?;
                self.report.output_bytes = bytes.len() as u64;
                Ok(CodecState::Done)
            }
            CodecState::Done => Ok(CodecState::Done),
        }
    }

    fn workspace(&self) -> Result<&CodecWorkspace, SearchablePdfError> {
        self.workspace.as_ref().ok_or_else(|| internal("workspace not created"))
    }

    fn run_tool(
        &self,
        kind: ToolKind,
        args: &[std::ffi::OsString],
    ) -> Result<(), SearchablePdfError> {
        let program = tools::resolve_tool(kind, &self.config.tools)?;
        let workdir = self.workspace()?.path();
        tools::run_tool(kind, &program, args, workdir, self.config.tool_timeout())
    }
}

fn internal(msg: &str) -> SearchablePdfError {
    SearchablePdfError::Internal(format!("codec pipeline: {msg}"))
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
