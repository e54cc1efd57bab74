//! Configuration types for searchable-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct holds every knob, so two
//! runs can be compared by diffing their configs.
//!
//! # Design choice: builder over constructor
//! Most callers only set an output mode and maybe a page number; the builder
//! lets them rely on documented defaults for the rest, and `build()` is the
//! single place where cross-field rules are checked.

use crate::error::SearchablePdfError;
use crate::pipeline::tools::ToolKind;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest accepted render scale.
pub const MAX_SCALE: f64 = 10.0;

/// Directories searched for the codec tools before `PATH`.
pub const DEFAULT_TOOL_DIRS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];

/// Configuration for one conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use searchable_pdf::{ConversionConfig, OutputMode};
///
/// let config = ConversionConfig::builder()
///     .page(1)
///     .scale(3.0)
///     .output_mode(OutputMode::Document)
///     .compress_bilevel(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Render scale for PDF pages, relative to 72 DPI. Range: (0, 10]. Default: 2.0.
    ///
    /// Recognition accuracy improves with resolution; 2.0 (144 DPI) reads
    /// body text well. The output page keeps the source page size at any
    /// scale. Ignored for image inputs.
    pub scale: f64,

    /// 1-based page number. Required for PDFs, must be absent for images.
    pub page: Option<usize>,

    /// Recognition language hints, highest priority first.
    /// Default: `["zh-Hans", "en-US"]`.
    pub languages: Vec<String>,

    /// Ask the engine to apply language-model correction. Default: true.
    pub use_language_correction: bool,

    /// Binarize the background even when it is not already bilevel. Default: false.
    pub force_bilevel: bool,

    /// Recompress the bilevel background with CCITT G4 through the external
    /// tools. Requires [`OutputMode::Document`]. Default: false.
    ///
    /// G4 typically shrinks a scanned page 10–20× compared to Flate, at the
    /// cost of needing `tiffcp`, `tiff2pdf` and `qpdf` installed.
    pub compress_bilevel: bool,

    /// What to produce. Default: [`OutputMode::Document`].
    pub output_mode: OutputMode,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Fixed creator/title strings stamped into every output.
    pub metadata: DocumentMetadata,

    /// Where to find the external codec tools.
    pub tools: ToolConfig,

    /// Explicit pdfium library path (file or directory).
    pub pdfium_library: Option<PathBuf>,

    /// Kill an external tool that runs longer than this. Default: no limit.
    pub tool_timeout_secs: Option<u64>,

    /// Rows per strip passed to the compressor. Default: whole image.
    pub rows_per_strip: Option<u32>,

    /// Parent directory for the codec workspace. Default: system temp dir.
    pub workspace_root: Option<PathBuf>,

    /// Stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            scale: 2.0,
            page: None,
            languages: vec!["zh-Hans".to_string(), "en-US".to_string()],
            use_language_correction: true,
            force_bilevel: false,
            compress_bilevel: false,
            output_mode: OutputMode::default(),
            password: None,
            metadata: DocumentMetadata::default(),
            tools: ToolConfig::default(),
            pdfium_library: None,
            tool_timeout_secs: None,
            rows_per_strip: None,
            workspace_root: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("scale", &self.scale)
            .field("page", &self.page)
            .field("languages", &self.languages)
            .field("use_language_correction", &self.use_language_correction)
            .field("force_bilevel", &self.force_bilevel)
            .field("compress_bilevel", &self.compress_bilevel)
            .field("output_mode", &self.output_mode)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("metadata", &self.metadata)
            .field("tools", &self.tools)
            .field("pdfium_library", &self.pdfium_library)
            .field("tool_timeout_secs", &self.tool_timeout_secs)
            .field("rows_per_strip", &self.rows_per_strip)
            .field("workspace_root", &self.workspace_root)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// [`Self::tool_timeout_secs`] as a duration.
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    /// Values above [`MAX_SCALE`] are clamped; non-positive values are
    /// rejected by `build()`.
    pub fn scale(mut self, scale: f64) -> Self {
        self.config.scale = if scale > MAX_SCALE { MAX_SCALE } else { scale };
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.config.page = Some(page);
        self
    }

    pub fn languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn use_language_correction(mut self, v: bool) -> Self {
        self.config.use_language_correction = v;
        self
    }

    pub fn force_bilevel(mut self, v: bool) -> Self {
        self.config.force_bilevel = v;
        self
    }

    pub fn compress_bilevel(mut self, v: bool) -> Self {
        self.config.compress_bilevel = v;
        self
    }

    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.config.output_mode = mode;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.config.metadata = metadata;
        self
    }

    pub fn tools(mut self, tools: ToolConfig) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tool_timeout_secs = Some(secs.max(1));
        self
    }

    pub fn rows_per_strip(mut self, rows: u32) -> Self {
        self.config.rows_per_strip = Some(rows.max(1));
        self
    }

    pub fn workspace_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, SearchablePdfError> {
        let c = &self.config;
        if !c.scale.is_finite() || c.scale <= 0.0 || c.scale > MAX_SCALE {
            return Err(SearchablePdfError::InvalidConfig(format!(
                "scale must be in (0, {MAX_SCALE}], got {}",
                c.scale
            )));
        }
        if c.page == Some(0) {
            return Err(SearchablePdfError::InvalidConfig("page numbers start at 1".into()));
        }
        if c.compress_bilevel && c.output_mode != OutputMode::Document {
            return Err(SearchablePdfError::InvalidConfig(
                "bilevel compression requires document output".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What a conversion produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// The recognized fragments as a JSON array, in fragment-file format.
    Structured,
    /// A one-page PDF with an invisible text layer. (default)
    #[default]
    Document,
}

// ── Document metadata ────────────────────────────────────────────────────

/// Creator and title stamped into every output document.
///
/// Both default to fixed strings so identical input gives identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub creator: String,
    pub title: String,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            creator: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            title: "Searchable PDF".to_string(),
        }
    }
}

impl DocumentMetadata {
    /// Producer string; always this library, whatever the creator says.
    pub fn producer(&self) -> String {
        format!("{} {} (lopdf)", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

// ── External tools ───────────────────────────────────────────────────────

/// Where to look for the external codec tools.
///
/// Explicit paths win; otherwise each tool's environment variable, then
/// `search_dirs`, then `PATH` are tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub tiffcp: Option<PathBuf>,
    pub tiff2pdf: Option<PathBuf>,
    pub qpdf: Option<PathBuf>,
    pub search_dirs: Vec<PathBuf>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            tiffcp: None,
            tiff2pdf: None,
            qpdf: None,
            search_dirs: DEFAULT_TOOL_DIRS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl ToolConfig {
    /// The explicitly configured path for `kind`, if any.
    pub fn explicit(&self, kind: ToolKind) -> Option<&Path> {
        match kind {
            ToolKind::Compressor => self.tiffcp.as_deref(),
            ToolKind::Converter => self.tiff2pdf.as_deref(),
            ToolKind::Overlay => self.qpdf.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ConversionConfig::default();
        assert_eq!(c.scale, 2.0);
        assert_eq!(c.languages, vec!["zh-Hans", "en-US"]);
        assert!(c.use_language_correction);
        assert_eq!(c.output_mode, OutputMode::Document);
        assert!(!c.compress_bilevel);
        assert_eq!(c.tools.search_dirs.len(), 3);
    }

    #[test]
    fn builder_clamps_scale() {
        let c = ConversionConfig::builder().scale(50.0).build().unwrap();
        assert_eq!(c.scale, MAX_SCALE);
    }

    #[test]
    fn non_positive_scale_is_rejected() {
        for bad in [0.0, -1.0, f64::NAN] {
            let err = ConversionConfig::builder().scale(bad).build().unwrap_err();
            assert!(matches!(err, SearchablePdfError::InvalidConfig(_)), "scale {bad}");
        }
    }

    #[test]
    fn compression_requires_document_mode() {
        let err = ConversionConfig::builder()
            .output_mode(OutputMode::Structured)
            .compress_bilevel(true)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("document output"));

        assert!(ConversionConfig::builder()
            .output_mode(OutputMode::Document)
            .compress_bilevel(true)
            .build()
            .is_ok());
    }

    #[test]
    fn page_zero_is_rejected() {
        assert!(ConversionConfig::builder().page(0).build().is_err());
    }

    #[test]
    fn default_metadata_is_stable() {
        let a = DocumentMetadata::default();
        let b = DocumentMetadata::default();
        assert_eq!(a, b);
        assert!(a.creator.starts_with("searchable-pdf "));
    }

    #[test]
    fn explicit_tool_paths() {
        let tools = ToolConfig {
            qpdf: Some(PathBuf::from("/x/qpdf")),
            ..ToolConfig::default()
        };
        assert_eq!(tools.explicit(ToolKind::Overlay), Some(Path::new("/x/qpdf")));
        assert_eq!(tools.explicit(ToolKind::Compressor), None);
    }

    #[test]
    fn debug_redacts_password() {
        let c = ConversionConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
    }
}
