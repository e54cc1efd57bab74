//! CLI binary for searchable-pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig`, picks a recognizer and prints results.

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use searchable_pdf::{
    convert, convert_to_file, ConversionConfig, ConversionProgressCallback,
    FragmentFileRecognizer, OutputMode, ProgressCallback, Recognizer, Stage, ToolConfig,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner showing the running stage and one
/// log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<Stage, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed(&self, stage: Stage) -> Option<Duration> {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&stage))
            .map(|t| t.elapsed())
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert(stage, Instant::now());
        }
        self.bar.set_prefix("Running");
        self.bar.set_message(stage.to_string());
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = self.elapsed(stage);
        self.bar.println(format!(
            "  {} {:<20}  {}",
            green("✓"),
            stage.as_str(),
            dim(&format!("{:.2}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let elapsed_ms = self.elapsed(stage).map(|d| d.as_millis()).unwrap_or(0);

        // Keep one line per stage; the full error is printed on exit.
        let first = error.lines().next().unwrap_or_default();
        let msg = if first.chars().count() > 80 {
            format!("{}\u{2026}", first.chars().take(79).collect::<String>())
        } else {
            first.to_string()
        };

        self.bar.println(format!(
            "  {} {:<20}  {}  {}",
            red("✗"),
            stage.as_str(),
            red(&msg),
            dim(&format!("{:.2}s", elapsed_ms as f64 / 1000.0)),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Page 3 of a scanned PDF, fragments from an external OCR engine
  searchpdf scan.pdf --page 3 --fragments page3.json --pdf -o page3.pdf

  # Same, recompressed as a 1-bit CCITT G4 image (needs tiffcp, tiff2pdf, qpdf)
  searchpdf scan.pdf -p 3 --fragments page3.json --pdf --g4 -o page3.pdf

  # A single image, forced to black and white
  searchpdf receipt.png --fragments receipt.json --bilevel --pdf -o receipt.pdf

  # Recognized fragments to stdout (replayable with --fragments)
  searchpdf receipt.png --fragments receipt.json --json

  # Built-in recognition (build with --features ocr)
  searchpdf scan.pdf -p 1 --models ~/.cache/ocrs --pdf -o page1.pdf

FRAGMENT FILE FORMAT:
  A JSON array in the recognizer's reading order; boxes are fractions of the
  page with the origin at the bottom-left:
  [{"text": "Invoice", "confidence": 0.98, "box": {"x": 0.1, "y": 0.85, "w": 0.3, "h": 0.04}}]

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  SEARCHPDF_TIFFCP        Path to tiffcp
  SEARCHPDF_TIFF2PDF      Path to tiff2pdf
  SEARCHPDF_QPDF          Path to qpdf
  RUST_LOG                Log filter, overrides --verbose/--quiet

  Tools not given explicitly are looked up in /opt/homebrew/bin,
  /usr/local/bin, /usr/bin and then PATH.
"#;

/// Turn a scanned page into a searchable PDF with an invisible text layer.
#[derive(Parser, Debug)]
#[command(
    name = "searchpdf",
    version,
    about = "Turn a scanned page into a searchable PDF with an invisible text layer",
    long_about = "Rasterise one page of a PDF (or load an image), run text recognition on it and \
write either the recognized text with its geometry as JSON, or a one-page PDF that keeps the \
original pixels and overlays selectable, invisible text. With --g4 the page is recompressed as a \
1-bit CCITT G4 image using tiffcp, tiff2pdf and qpdf.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP,
    group(ArgGroup::new("mode").required(true).args(["json", "pdf"]))
)]
struct Cli {
    /// PDF or image file.
    input: PathBuf,

    /// Recognition languages, most preferred first (comma separated).
    #[arg(short, long, env = "SEARCHPDF_LANGUAGES", value_delimiter = ',')]
    languages: Option<Vec<String>>,

    /// Ask the recognizer not to apply language correction.
    #[arg(long, env = "SEARCHPDF_NO_LANGUAGE_CORRECTION")]
    no_language_correction: bool,

    /// 1-based page number; required for PDFs, not allowed for images.
    #[arg(short, long, env = "SEARCHPDF_PAGE",
          value_parser = clap::value_parser!(u64).range(1..))]
    page: Option<u64>,

    /// Render scale for PDF pages (1.0 = 72 dpi).
    #[arg(short, long, env = "SEARCHPDF_SCALE", default_value_t = 2.0)]
    scale: f64,

    /// Binarize the page to black and white before embedding it.
    #[arg(long, env = "SEARCHPDF_BILEVEL")]
    bilevel: bool,

    /// Recompress the page as CCITT G4 with external tools.
    #[arg(long, env = "SEARCHPDF_G4", requires = "pdf")]
    g4: bool,

    /// Write the recognized fragments as a JSON array.
    #[arg(long)]
    json: bool,

    /// Write a searchable PDF.
    #[arg(long, requires = "output")]
    pdf: bool,

    /// Output file. `--json` without it prints to stdout.
    #[arg(short, long, env = "SEARCHPDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Read recognized fragments from this JSON file instead of running OCR.
    #[arg(long, env = "SEARCHPDF_FRAGMENTS")]
    fragments: Option<PathBuf>,

    /// Directory holding the ocrs models.
    #[cfg(feature = "ocr")]
    #[arg(long, env = "SEARCHPDF_MODELS")]
    models: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "SEARCHPDF_PASSWORD")]
    password: Option<String>,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Path to the tiffcp binary.
    #[arg(long, env = "SEARCHPDF_TIFFCP")]
    tiffcp: Option<PathBuf>,

    /// Path to the tiff2pdf binary.
    #[arg(long, env = "SEARCHPDF_TIFF2PDF")]
    tiff2pdf: Option<PathBuf>,

    /// Path to the qpdf binary.
    #[arg(long, env = "SEARCHPDF_QPDF")]
    qpdf: Option<PathBuf>,

    /// Kill an external tool still running after this many seconds.
    #[arg(long, env = "SEARCHPDF_TOOL_TIMEOUT")]
    tool_timeout: Option<u64>,

    /// Disable the progress spinner.
    #[arg(long, env = "SEARCHPDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SEARCHPDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SEARCHPDF_QUIET")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; library INFO logs
    // would only tear it apart.
    let show_progress = !cli.quiet && !cli.no_progress && cli.output.is_some();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config + recognizer ────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(&cli, progress.clone().map(|cb| cb as ProgressCallback))?;
    let recognizer = build_recognizer(&cli)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let result = run(&cli, recognizer.as_ref(), &config);
    if let Some(ref cb) = progress {
        cb.finish();
    }
    result
}

fn run(cli: &Cli, recognizer: &dyn Recognizer, config: &ConversionConfig) -> Result<()> {
    if let Some(ref output_path) = cli.output {
        let stats = convert_to_file(&cli.input, output_path, recognizer, config)
            .context("Conversion failed")?;

        if !cli.quiet {
            eprintln!(
                "{}  {} text runs  {}x{} px  {}ms  →  {}",
                green("✔"),
                stats.glyph_run_count,
                stats.pixel_width,
                stats.pixel_height,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
            eprintln!(
                "   {} bytes{}",
                dim(&stats.output_bytes.to_string()),
                if stats.codec.is_some() {
                    dim("  (CCITT G4)")
                } else if stats.bilevel {
                    dim("  (1-bit)")
                } else {
                    String::new()
                },
            );
        }
    } else {
        let output = convert(&cli.input, recognizer, config).context("Conversion failed")?;
        let json = output.page.structured_json().context("Failed to serialise output")?;

        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(&json).context("Failed to write to stdout")?;
        handle.write_all(b"\n").ok();

        if !cli.quiet {
            eprintln!(
                "Recognized {} fragments in {}ms",
                output.stats.fragment_count, output.stats.total_duration_ms
            );
        }
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mode = if cli.json {
        OutputMode::Structured
    } else {
        OutputMode::Document
    };

    let tools = ToolConfig {
        tiffcp: cli.tiffcp.clone(),
        tiff2pdf: cli.tiff2pdf.clone(),
        qpdf: cli.qpdf.clone(),
        ..ToolConfig::default()
    };

    let mut builder = ConversionConfig::builder()
        .scale(cli.scale)
        .use_language_correction(!cli.no_language_correction)
        .force_bilevel(cli.bilevel)
        .compress_bilevel(cli.g4)
        .output_mode(mode)
        .tools(tools);

    if let Some(ref languages) = cli.languages {
        builder = builder.languages(languages.iter().map(|l| l.trim()).filter(|l| !l.is_empty()));
    }
    if let Some(page) = cli.page {
        let page = usize::try_from(page).context("Page number is too large")?;
        builder = builder.page(page);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib.clone());
    }
    if let Some(secs) = cli.tool_timeout {
        builder = builder.tool_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Pick the recognizer: a fragment file wins, then the built-in engine.
fn build_recognizer(cli: &Cli) -> Result<Box<dyn Recognizer>> {
    if let Some(ref path) = cli.fragments {
        return Ok(Box::new(FragmentFileRecognizer::new(path)));
    }

    #[cfg(feature = "ocr")]
    {
        use searchable_pdf::recognize::{OcrsConfig, OcrsRecognizer};
        let models = match cli.models {
            Some(ref dir) => OcrsConfig::from_dir(dir),
            None => OcrsConfig::default(),
        };
        let engine = OcrsRecognizer::new(&models).context("Failed to load OCR models")?;
        Ok(Box::new(engine))
    }

    #[cfg(not(feature = "ocr"))]
    {
        anyhow::bail!(
            "No recognizer available: pass --fragments <FILE>, or rebuild with `--features ocr` \
             to use the built-in engine"
        )
    }
}
