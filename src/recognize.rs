//! Text recognition boundary.
//!
//! Recognition itself is not part of this crate: any engine (a platform OCR
//! API, a local model, a remote service) plugs in by implementing
//! [`Recognizer`]. The call is a plain synchronous function returning the
//! fragments as a value; engines with callback-style APIs resolve their
//! callback inside `recognize` and hand back the collected result.
//!
//! Two engines ship with the crate:
//!
//! * [`FragmentFileRecognizer`] replays fragments from a JSON file, in the same
//!   format the structured output mode writes. This lets an external engine
//!   run out-of-process and still feed the document pipeline.
//! * `OcrsRecognizer` (feature `ocr`) runs the pure-Rust `ocrs` engine.

use crate::error::SearchablePdfError;
use crate::raster::PixelImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Error type engines return; the pipeline wraps it in
/// [`SearchablePdfError::RecognitionEngine`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A box whose coordinates are fractions of the page, origin bottom-left,
/// y increasing upward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "w")]
    pub width: f64,
    #[serde(rename = "h")]
    pub height: f64,
}

impl NormalizedBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// All four components finite and within `[0, 1]`.
    pub fn is_well_formed(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }
}

/// One recognized piece of text as reported by an engine.
///
/// Fields are taken as-is; validation happens when the text layer is built,
/// where malformed fragments are skipped rather than failing the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedFragment {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(rename = "box", default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<NormalizedBox>,
}

impl RecognizedFragment {
    pub fn new(text: impl Into<String>, confidence: f32, bbox: NormalizedBox) -> Self {
        Self {
            text: text.into(),
            confidence,
            bbox: Some(bbox),
        }
    }
}

/// Hints passed to the engine with every page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionRequest {
    /// Language tags in priority order, e.g. `["zh-Hans", "en-US"]`.
    pub languages: Vec<String>,
    /// Let the engine apply its own language-model correction.
    pub use_language_correction: bool,
}

/// A text recognition engine.
///
/// Fragments must be returned in the engine's native order; the text layer
/// reuses that order verbatim as the document's reading order.
pub trait Recognizer {
    /// Short engine name used in error messages and logs.
    fn name(&self) -> &str;

    fn recognize(
        &self,
        image: &PixelImage,
        request: &RecognitionRequest,
    ) -> Result<Vec<RecognizedFragment>, BoxError>;
}

/// Run `recognizer`, mapping engine errors into the crate error type.
pub fn run_recognizer(
    recognizer: &dyn Recognizer,
    image: &PixelImage,
    request: &RecognitionRequest,
) -> Result<Vec<RecognizedFragment>, SearchablePdfError> {
    info!(
        engine = recognizer.name(),
        width = image.width(),
        height = image.height(),
        languages = ?request.languages,
        "Running text recognition"
    );
    let fragments = recognizer
        .recognize(image, request)
        .map_err(|e| SearchablePdfError::RecognitionEngine {
            engine: recognizer.name().to_string(),
            detail: e.to_string(),
        })?;
    debug!(count = fragments.len(), "Recognition returned fragments");
    Ok(fragments)
}

/// Parse a JSON array of fragments.
///
/// Entries whose fields have the wrong JSON type are skipped; missing fields
/// fall back to empty defaults and are dealt with by the text layer.
pub fn parse_fragments(json: &str) -> Result<Vec<RecognizedFragment>, serde_json::Error> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let total = values.len();
    let fragments: Vec<RecognizedFragment> = values
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| match serde_json::from_value(v) {
            Ok(f) => Some(f),
            Err(e) => {
                debug!("Skipping fragment #{}: {}", i, e);
                None
            }
        })
        .collect();
    if fragments.len() < total {
        debug!("Parsed {}/{} fragments", fragments.len(), total);
    }
    Ok(fragments)
}

/// Replays fragments from a JSON file instead of running an engine.
#[derive(Debug, Clone)]
pub struct FragmentFileRecognizer {
    path: PathBuf,
}

impl FragmentFileRecognizer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Recognizer for FragmentFileRecognizer {
    fn name(&self) -> &str {
        "fragment-file"
    }

    fn recognize(
        &self,
        _image: &PixelImage,
        _request: &RecognitionRequest,
    ) -> Result<Vec<RecognizedFragment>, BoxError> {
        let json = std::fs::read_to_string(&self.path)
            .map_err(|e| format!("cannot read '{}': {}", self.path.display(), e))?;
        Ok(parse_fragments(&json)?)
    }
}

#[cfg(feature = "ocr")]
pub use ocrs_engine::{OcrsConfig, OcrsRecognizer};

#[cfg(feature = "ocr")]
mod ocrs_engine {
    use super::{BoxError, NormalizedBox, RecognitionRequest, RecognizedFragment, Recognizer};
    use crate::error::SearchablePdfError;
    use crate::raster::PixelImage;
    use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
    use rten::Model;
    use std::path::{Path, PathBuf};
    use tracing::{debug, info};

    const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
    const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

    /// Model locations for [`OcrsRecognizer`].
    #[derive(Debug, Clone)]
    pub struct OcrsConfig {
        pub detection_model_path: PathBuf,
        pub recognition_model_path: PathBuf,
    }

    impl Default for OcrsConfig {
        /// `$XDG_CACHE_HOME/ocrs`, falling back to `~/.cache/ocrs`.
        fn default() -> Self {
            let dir = if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
                PathBuf::from(xdg).join("ocrs")
            } else if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(home).join(".cache").join("ocrs")
            } else {
                PathBuf::from("ocrs-models")
            };
            Self::from_dir(dir)
        }
    }

    impl OcrsConfig {
        pub fn from_dir(dir: impl AsRef<Path>) -> Self {
            let dir = dir.as_ref();
            Self {
                detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
                recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
            }
        }
    }

    /// Recognizer backed by the `ocrs` engine.
    ///
    /// `ocrs` reports no per-line score, so every fragment has confidence 1.0.
    pub struct OcrsRecognizer {
        engine: OcrEngine,
    }

    impl OcrsRecognizer {
        pub fn new(config: &OcrsConfig) -> Result<Self, SearchablePdfError> {
            let load = |path: &Path| {
                Model::load_file(path).map_err(|e| SearchablePdfError::RecognitionEngine {
                    engine: "ocrs".into(),
                    detail: format!("failed to load model {}: {}", path.display(), e),
                })
            };
            info!("Loading OCR models");
            let detection_model = load(&config.detection_model_path)?;
            let recognition_model = load(&config.recognition_model_path)?;

            let engine = OcrEngine::new(OcrEngineParams {
                detection_model: Some(detection_model),
                recognition_model: Some(recognition_model),
                ..Default::default()
            })
            .map_err(|e| SearchablePdfError::RecognitionEngine {
                engine: "ocrs".into(),
                detail: e.to_string(),
            })?;
            Ok(Self { engine })
        }
    }

    impl Recognizer for OcrsRecognizer {
        fn name(&self) -> &str {
            "ocrs"
        }

        fn recognize(
            &self,
            image: &PixelImage,
            request: &RecognitionRequest,
        ) -> Result<Vec<RecognizedFragment>, BoxError> {
            if !request.languages.is_empty() {
                debug!(languages = ?request.languages, "ocrs ignores language hints");
            }
            let rgb = image.to_dynamic()?.to_rgb8();
            let (width, height) = rgb.dimensions();
            let source = ImageSource::from_bytes(rgb.as_raw(), (width, height))?;
            let input = self.engine.prepare_input(source)?;

            let word_rects = self.engine.detect_words(&input)?;
            let line_rects = self.engine.find_text_lines(&input, &word_rects);
            let lines = self.engine.recognize_text(&input, &line_rects)?;

            let (w, h) = (width as f64, height as f64);
            let fragments = lines
                .iter()
                .flatten()
                .filter_map(|line| {
                    let text = line.to_string();
                    if text.trim().is_empty() {
                        return None;
                    }
                    let rect = line.bounding_rect();
                    // ocrs rectangles are top-left origin in pixels.
                    let bbox = NormalizedBox::new(
                        rect.left() as f64 / w,
                        (h - rect.bottom() as f64) / h,
                        rect.width() as f64 / w,
                        rect.height() as f64 / h,
                    );
                    Some(RecognizedFragment::new(text, 1.0, bbox))
                })
                .collect();
            Ok(fragments)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PixelFormat;

    #[test]
    fn parses_engine_json_format() {
        let json =
            r#"[{"text":"Hello","confidence":0.9,"box":{"x":0.1,"y":0.2,"w":0.3,"h":0.05}}]"#;
        let fragments = parse_fragments(json).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].text, "Hello");
        assert_eq!(fragments[0].bbox, Some(NormalizedBox::new(0.1, 0.2, 0.3, 0.05)));
    }

    #[test]
    fn missing_fields_default_and_wrong_types_are_skipped() {
        let json = r#"[
            {"text":"no box","confidence":0.5},
            {"text":42,"confidence":0.5,"box":{"x":0,"y":0,"w":1,"h":1}},
            {"text":"ok","box":{"x":0,"y":0,"w":1,"h":1}}
        ]"#;
        let fragments = parse_fragments(json).unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].bbox, None);
        assert_eq!(fragments[1].text, "ok");
        assert_eq!(fragments[1].confidence, 0.0);
    }

    #[test]
    fn serialises_box_with_short_keys() {
        let f = RecognizedFragment::new("a", 1.0, NormalizedBox::new(0.0, 0.5, 0.25, 0.125));
        let json = serde_json::to_string(&f).unwrap();
        assert!(json.contains(r#""box":{"x":0.0,"y":0.5,"w":0.25,"h":0.125}"#), "got {json}");
    }

    #[test]
    fn well_formed_box_checks_range_and_finiteness() {
        assert!(NormalizedBox::new(0.0, 0.0, 1.0, 1.0).is_well_formed());
        assert!(!NormalizedBox::new(-0.1, 0.0, 0.5, 0.5).is_well_formed());
        assert!(!NormalizedBox::new(0.0, f64::NAN, 0.5, 0.5).is_well_formed());
        assert!(!NormalizedBox::new(0.0, 0.0, 1.5, 0.5).is_well_formed());
    }

    struct FailingEngine;

    impl Recognizer for FailingEngine {
        fn name(&self) -> &str {
            "failing"
        }

        fn recognize(
            &self,
            _: &PixelImage,
            _: &RecognitionRequest,
        ) -> Result<Vec<RecognizedFragment>, BoxError> {
            Err("model exploded".into())
        }
    }

    #[test]
    fn engine_errors_are_surfaced_with_engine_name() {
        let img = PixelImage::packed(1, 1, PixelFormat::Gray8, vec![0]).unwrap();
        let req = RecognitionRequest {
            languages: vec![],
            use_language_correction: false,
        };
        let err = run_recognizer(&FailingEngine, &img, &req).unwrap_err();
        match err {
            SearchablePdfError::RecognitionEngine { engine, detail } => {
                assert_eq!(engine, "failing");
                assert!(detail.contains("exploded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn fragment_file_recognizer_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fragments.json");
        let json = r#"[{"text":"x","confidence":1,"box":{"x":0,"y":0,"w":0.5,"h":0.5}}]"#;
        std::fs::write(&path, json).unwrap();

        let img = PixelImage::packed(1, 1, PixelFormat::Gray8, vec![0]).unwrap();
        let req = RecognitionRequest {
            languages: vec!["en-US".into()],
            use_language_correction: true,
        };
        let fragments = FragmentFileRecognizer::new(&path).recognize(&img, &req).unwrap();
        assert_eq!(fragments.len(), 1);
    }

    #[test]
    fn fragment_file_recognizer_missing_file_is_an_error() {
        let img = PixelImage::packed(1, 1, PixelFormat::Gray8, vec![0]).unwrap();
        let req = RecognitionRequest {
            languages: vec![],
            use_language_correction: false,
        };
        let err = FragmentFileRecognizer::new("/definitely/not/here.json")
            .recognize(&img, &req)
            .unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
