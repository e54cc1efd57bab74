//! Conversion entry points.
//!
//! ## Why three layers?
//!
//! [`recognize_page`] stops after recognition so a host can inspect or edit
//! fragments before anything is written. [`build_document`] turns such a
//! page into PDF bytes in memory. [`convert_to_file`] chains everything and
//! is the only entry point that can drive the codec pipeline, because the
//! external tools work on files and need a destination path.
//!
//! Outside the codec pipeline errors are returned as-is; inside it they
//! arrive wrapped with the failing [`Stage`].

use crate::config::{ConversionConfig, OutputMode};
use crate::error::SearchablePdfError;
use crate::output::{ConversionOutput, ConversionStats, RecognizedPage};
use crate::pipeline::binarize::{binarize, is_already_bilevel};
use crate::pipeline::codec::run_codec_pipeline;
use crate::pipeline::emit::{emit_document, write_document};
use crate::pipeline::text_layer::composite;
use crate::pipeline::{input, render, Stage};
use crate::progress::track;
use crate::recognize::{run_recognizer, RecognitionRequest, Recognizer};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Resolve `input`, rasterise the configured page and run `recognizer` on it.
pub fn recognize_page(
    input: impl AsRef<Path>,
    recognizer: &dyn Recognizer,
    config: &ConversionConfig,
) -> Result<RecognizedPage, SearchablePdfError> {
    let (page, _, _) = recognize_timed(input.as_ref(), recognizer, config)?;
    Ok(page)
}

/// Build the plain one-page document for `page`.
///
/// The background is embedded as a 1-bit image when `force_bilevel` is set
/// or the raster already is bilevel; otherwise as-is.
pub fn build_document(
    page: &RecognizedPage,
    config: &ConversionConfig,
) -> Result<Vec<u8>, SearchablePdfError> {
    let runs = composite(&page.fragments, &page.geometry);
    track(config.progress_callback.as_ref(), Stage::Emit, || {
        if config.force_bilevel {
            let bilevel = binarize(page.image.clone(), true)?;
            emit_document(Some(&bilevel), &page.geometry, &runs, &config.metadata)
        } else {
            emit_document(Some(&page.image), &page.geometry, &runs, &config.metadata)
        }
    })
}

/// Convert `input` in memory.
///
/// In [`OutputMode::Document`] the returned output carries the PDF bytes.
/// The codec pipeline needs a destination, so `compress_bilevel` is rejected
/// here; use [`convert_to_file`].
pub fn convert(
    input: impl AsRef<Path>,
    recognizer: &dyn Recognizer,
    config: &ConversionConfig,
) -> Result<ConversionOutput, SearchablePdfError> {
    if config.compress_bilevel {
        return Err(SearchablePdfError::InvalidConfig(
            "compress_bilevel writes through external tools; use convert_to_file".into(),
        ));
    }
    let total_start = Instant::now();

    // ── Step 1: Rasterise + recognise ────────────────────────────────────
    let (page, rasterize_ms, recognize_ms) = recognize_timed(input.as_ref(), recognizer, config)?;
    let mut stats = base_stats(&page, config, rasterize_ms, recognize_ms);

    // ── Step 2: Emit ─────────────────────────────────────────────────────
    let document = match config.output_mode {
        OutputMode::Structured => None,
        OutputMode::Document => {
            let emit_start = Instant::now();
            let bytes = build_document(&page, config)?;
            stats.emit_duration_ms = emit_start.elapsed().as_millis() as u64;
            stats.output_bytes = bytes.len() as u64;
            Some(bytes)
        }
    };

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(ConversionOutput { page, document, stats })
}

/// Convert `input` and write the result to `output`.
///
/// Structured mode writes the fragment array as pretty-printed JSON;
/// document mode writes the plain document, or runs the codec pipeline when
/// `compress_bilevel` is set.
/// Writes are atomic: a failed run never leaves a partial file at `output`.
pub fn convert_to_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    recognizer: &dyn Recognizer,
    config: &ConversionConfig,
) -> Result<ConversionStats, SearchablePdfError> {
    let output = output.as_ref();
    let total_start = Instant::now();

    // ── Step 1: Rasterise + recognise ────────────────────────────────────
    let (page, rasterize_ms, recognize_ms) = recognize_timed(input.as_ref(), recognizer, config)?;
    let mut stats = base_stats(&page, config, rasterize_ms, recognize_ms);

    // ── Step 2: Produce and persist the output ───────────────────────────
    let emit_start = Instant::now();
    match config.output_mode {
        OutputMode::Structured => {
            let json = page.structured_json()?;
            track(config.progress_callback.as_ref(), Stage::WriteOutput, || {
                write_document(output, &json)
            })?;
            stats.output_bytes = json.len() as u64;
        }
        OutputMode::Document if config.compress_bilevel => {
            let runs = composite(&page.fragments, &page.geometry);
            let report = run_codec_pipeline(page.image, &page.geometry, &runs, output, config)?;
            stats.bilevel = true;
            stats.output_bytes = report.output_bytes;
            stats.codec = Some(report);
        }
        OutputMode::Document => {
            let bytes = build_document(&page, config)?;
            track(config.progress_callback.as_ref(), Stage::WriteOutput, || {
                write_document(output, &bytes)
            })?;
            stats.output_bytes = bytes.len() as u64;
        }
    }
    stats.emit_duration_ms = emit_start.elapsed().as_millis() as u64;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Wrote {} ({} bytes, {} text runs) in {}ms",
        output.display(),
        stats.output_bytes,
        stats.glyph_run_count,
        stats.total_duration_ms
    );
    Ok(stats)
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Resolve, rasterise and recognise, returning both step durations.
fn recognize_timed(
    path: &Path,
    recognizer: &dyn Recognizer,
    config: &ConversionConfig,
) -> Result<(RecognizedPage, u64, u64), SearchablePdfError> {
    info!("Starting conversion: {}", path.display());
    let callback = config.progress_callback.as_ref();

    let raster_start = Instant::now();
    let resolved = input::resolve_input(path)?;
    let (image, geometry) = track(callback, Stage::Rasterize, || {
        render::rasterize(&resolved, config)
    })?;
    let rasterize_ms = raster_start.elapsed().as_millis() as u64;
    info!(
        "Rasterised {}x{} px, page {:.1}x{:.1} pt in {}ms",
        geometry.pixel_width,
        geometry.pixel_height,
        geometry.page_width,
        geometry.page_height,
        rasterize_ms
    );

    let request = RecognitionRequest {
        languages: config.languages.clone(),
        use_language_correction: config.use_language_correction,
    };
    let recognize_start = Instant::now();
    let fragments = track(callback, Stage::Recognize, || {
        run_recognizer(recognizer, &image, &request)
    })?;
    let recognize_ms = recognize_start.elapsed().as_millis() as u64;

    let page = RecognizedPage {
        source: resolved.path,
        page: config.page,
        geometry,
        fragments,
        image,
    };
    Ok((page, rasterize_ms, recognize_ms))
}

fn base_stats(
    page: &RecognizedPage,
    config: &ConversionConfig,
    rasterize_ms: u64,
    recognize_ms: u64,
) -> ConversionStats {
    ConversionStats {
        page: page.page,
        pixel_width: page.geometry.pixel_width,
        pixel_height: page.geometry.pixel_height,
        page_width: page.geometry.page_width,
        page_height: page.geometry.page_height,
        fragment_count: page.fragments.len(),
        glyph_run_count: composite(&page.fragments, &page.geometry).len(),
        bilevel: config.output_mode == OutputMode::Document
            && (config.force_bilevel || is_already_bilevel(&page.image)),
        rasterize_duration_ms: rasterize_ms,
        recognize_duration_ms: recognize_ms,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PixelImage;
    use crate::recognize::{BoxError, NormalizedBox, RecognizedFragment};

    struct Fixed(Vec<RecognizedFragment>);

    impl Recognizer for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn recognize(
            &self,
            _: &PixelImage,
            _: &RecognitionRequest,
        ) -> Result<Vec<RecognizedFragment>, BoxError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl Recognizer for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn recognize(
            &self,
            _: &PixelImage,
            _: &RecognitionRequest,
        ) -> Result<Vec<RecognizedFragment>, BoxError> {
            Err("engine offline".into())
        }
    }

    fn png(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("page.png");
        image::RgbImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        })
        .save(&path)
        .unwrap();
        path
    }

    #[test]
    fn recognize_page_keeps_fragment_order() {
        let dir = tempfile::tempdir().unwrap();
        let fragments = vec![
            RecognizedFragment::new("b", 0.5, NormalizedBox::new(0.5, 0.5, 0.2, 0.2)),
            RecognizedFragment::new("a", 0.9, NormalizedBox::new(0.0, 0.0, 0.2, 0.2)),
        ];
        let config = ConversionConfig::default();
        let page = recognize_page(png(dir.path()), &Fixed(fragments.clone()), &config).unwrap();
        assert_eq!(page.fragments, fragments);
        assert_eq!(page.geometry.page_width, 40.0);
        assert_eq!(page.page, None);
    }

    #[test]
    fn recognition_failure_aborts_before_emission() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.pdf");
        let err = convert_to_file(png(dir.path()), &out, &Broken, &ConversionConfig::default())
            .unwrap_err();
        match err {
            SearchablePdfError::RecognitionEngine { engine, detail } => {
                assert_eq!(engine, "broken");
                assert!(detail.contains("offline"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!out.exists());
    }

    #[test]
    fn convert_rejects_codec_mode() {
        let config = ConversionConfig::builder().compress_bilevel(true).build().unwrap();
        let err = convert("whatever.png", &Fixed(vec![]), &config).unwrap_err();
        assert!(matches!(err, SearchablePdfError::InvalidConfig(_)));
    }

    #[test]
    fn structured_mode_returns_no_document() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConversionConfig::builder()
            .output_mode(OutputMode::Structured)
            .build()
            .unwrap();
        let out = convert(png(dir.path()), &Fixed(vec![]), &config).unwrap();
        assert!(out.document.is_none());
        assert_eq!(out.stats.output_bytes, 0);
        assert!(!out.stats.bilevel);
    }

    #[test]
    fn forced_bilevel_document_is_flagged_in_stats() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConversionConfig::builder().force_bilevel(true).build().unwrap();
        let out = convert(png(dir.path()), &Fixed(vec![]), &config).unwrap();
        let doc = out.document.unwrap();
        assert!(doc.starts_with(b"%PDF-1.5"));
        assert!(out.stats.bilevel);
        assert_eq!(out.stats.output_bytes, doc.len() as u64);
    }
}
