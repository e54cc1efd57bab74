//! Document emitter: one page, background raster, invisible text.
//!
//! The page is sized to the *true* page size in points. The background image,
//! when there is one, is stretched over the whole page box; the text layer
//! is painted on top in rendering mode 3 (neither fill nor stroke), so it is
//! selectable and searchable but leaves no ink.
//!
//! ## Why a composite font
//!
//! Recognised text can be in any script. A Type0 font with `Identity-H`
//! encoding lets each Basic Multilingual Plane character be used directly as
//! its own CID, and the `ToUnicode` CMap maps it straight back, so text
//! extraction returns the original string. No glyphs need to be embedded
//! because nothing is drawn.
//!
//! Characters beyond the BMP (emoji, CJK Extension B) would otherwise need two
//! codes each. Instead each distinct one gets a single CID from the surrogate
//! block `D800..DFFF`, which a Rust string never uses on its own, and a
//! `bfchar` entry maps that CID to the full surrogate pair. Every character is
//! then exactly one glyph, matching how the text layer sizes its runs.
//!
//! ## Determinism
//!
//! The `/Info` dictionary only carries fixed strings (no dates) and no `/ID`
//! is written. Identical input therefore gives byte-identical output.

use crate::config::DocumentMetadata;
use crate::error::SearchablePdfError;
use crate::pipeline::text_layer::{GlyphRun, GLYPH_ADVANCE_EM};
use crate::raster::{PageGeometry, PixelFormat, PixelImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Name of the invisible text font in page resources.
const FONT_RESOURCE: &str = "F1";
/// Name of the background image in page resources.
const IMAGE_RESOURCE: &str = "Im0";
/// `BaseFont` of the composite text font.
const FONT_NAME: &str = "InvisibleText";
/// CIDs handed out to characters beyond the BMP.
const ASTRAL_CIDS: std::ops::RangeInclusive<u16> = 0xD800..=0xDFFF;
/// Stand-in once [`ASTRAL_CIDS`] is used up.
const REPLACEMENT_CID: u16 = 0xFFFD;

/// Build a one-page PDF.
///
/// `background` is drawn first when present. Bilevel backgrounds are
/// embedded at 1 bit per component with interpolation disabled.
pub fn emit_document(
    background: Option<&PixelImage>,
    geometry: &PageGeometry,
    runs: &[GlyphRun],
    metadata: &DocumentMetadata,
) -> Result<Vec<u8>, SearchablePdfError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let codes = TextCodes::for_runs(runs);
    let font_id = add_text_font(&mut doc, &codes);
    let mut resources = dictionary! {
        "Font" => dictionary! { FONT_RESOURCE => font_id },
    };

    let image_id = match background {
        Some(image) => {
            let id = add_image(&mut doc, image)?;
            resources.set("XObject", dictionary! { IMAGE_RESOURCE => id });
            Some(id)
        }
        None => None,
    };

    let content = page_content(image_id.is_some(), geometry, runs, &codes);
    let encoded = content
        .encode()
        .map_err(|e| SearchablePdfError::DocumentBuild(format!("content stream: {e}")))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            0.into(),
            0.into(),
            Object::Real(geometry.page_width as f32),
            Object::Real(geometry.page_height as f32),
        ],
        "Resources" => resources,
        "Contents" => content_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Creator" => Object::string_literal(metadata.creator.as_str()),
        "Title" => Object::string_literal(metadata.title.as_str()),
        "Producer" => Object::string_literal(metadata.producer()),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| SearchablePdfError::DocumentBuild(e.to_string()))?;

    debug!(
        bytes = bytes.len(),
        runs = runs.len(),
        background = background.is_some(),
        "Emitted document"
    );
    Ok(bytes)
}

/// Write `bytes` to `path` atomically: a temp file in the same directory is
/// written, flushed and renamed over the destination.
pub fn write_document(path: &Path, bytes: &[u8]) -> Result<(), SearchablePdfError> {
    let fail = |source: std::io::Error| SearchablePdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(fail)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;

    info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn page_content(
    has_image: bool,
    geometry: &PageGeometry,
    runs: &[GlyphRun],
    codes: &TextCodes,
) -> Content {
    let (w, h) = (geometry.page_width as f32, geometry.page_height as f32);
    let mut operations = Vec::with_capacity(5 + runs.len() * 4 + 3);

    if has_image {
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new(
            "cm",
            vec![
                Object::Real(w),
                0.into(),
                0.into(),
                Object::Real(h),
                0.into(),
                0.into(),
            ],
        ));
        operations.push(Operation::new("Do", vec![Object::Name(IMAGE_RESOURCE.into())]));
        operations.push(Operation::new("Q", vec![]));
    }

    if !runs.is_empty() {
        operations.push(Operation::new("BT", vec![]));
        // Mode 3: no fill, no stroke.
        operations.push(Operation::new("Tr", vec![3.into()]));
        for run in runs {
            operations.push(Operation::new(
                "Tf",
                vec![Object::Name(FONT_RESOURCE.into()), Object::Real(run.font_size as f32)],
            ));
            operations.push(Operation::new("Tz", vec![Object::Real(run.horizontal_scale as f32)]));
            operations.push(Operation::new(
                "Tm",
                vec![
                    1.into(),
                    0.into(),
                    0.into(),
                    1.into(),
                    Object::Real(run.x as f32),
                    Object::Real(run.y as f32),
                ],
            ));
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(codes.encode(&run.text), StringFormat::Hexadecimal)],
            ));
        }
        operations.push(Operation::new("ET", vec![]));
    }

    Content { operations }
}

// ── Text codes ───────────────────────────────────────────────────────────

/// Character → 2-byte CID assignment for one document.
struct TextCodes {
    /// Characters beyond the BMP, in first-seen order; index `i` is CID `D800 + i`.
    astral: Vec<char>,
}

impl TextCodes {
    fn for_runs(runs: &[GlyphRun]) -> Self {
        let capacity = ASTRAL_CIDS.len();
        let mut astral = Vec::new();
        for c in runs.iter().flat_map(|r| r.text.chars()) {
            if c.len_utf16() == 2 && !astral.contains(&c) {
                if astral.len() == capacity {
                    warn!(capacity, "Out of CIDs for non-BMP characters, using U+FFFD");
                    break;
                }
                astral.push(c);
            }
        }
        Self { astral }
    }

    fn cid(&self, c: char) -> u16 {
        let mut units = [0u16; 2];
        match c.encode_utf16(&mut units) {
            [unit] => *unit,
            _ => self
                .astral
                .iter()
                .position(|&a| a == c)
                .map_or(REPLACEMENT_CID, |i| *ASTRAL_CIDS.start() + i as u16),
        }
    }

    /// Big-endian CIDs, one per character.
    fn encode(&self, text: &str) -> Vec<u8> {
        text.chars().flat_map(|c| self.cid(c).to_be_bytes()).collect()
    }
}

fn add_image(doc: &mut Document, image: &PixelImage) -> Result<ObjectId, SearchablePdfError> {
    let flattened;
    let image = if image.format().has_alpha() {
        flattened = image.clone().flatten_onto_white()?;
        &flattened
    } else {
        image
    };

    let (color_space, bits) = match image.format() {
        PixelFormat::Bilevel => ("DeviceGray", 1),
        PixelFormat::Gray8 => ("DeviceGray", 8),
        PixelFormat::Rgb8 => ("DeviceRGB", 8),
        PixelFormat::Rgba8 => {
            return Err(SearchablePdfError::Internal("alpha survived flattening".into()));
        }
    };

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width() as i64,
        "Height" => image.height() as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => bits,
    };
    if image.format() == PixelFormat::Bilevel {
        dict.set("Interpolate", false);
    }

    // PDF image rows are byte-aligned without padding beyond that.
    Ok(doc.add_object(Stream::new(dict, image.packed_rows())))
}

fn add_text_font(doc: &mut Document, codes: &TextCodes) -> ObjectId {
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => FONT_NAME,
        "Flags" => 4,
        "FontBBox" => vec![0.into(), 0.into(), 500.into(), 1000.into()],
        "ItalicAngle" => 0,
        "Ascent" => 1000,
        "Descent" => 0,
        "CapHeight" => 1000,
        "StemV" => 80,
    });

    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => FONT_NAME,
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => (GLYPH_ADVANCE_EM * 1000.0) as i64,
        "CIDToGIDMap" => "Identity",
    });

    let to_unicode_id = doc.add_object(Stream::new(dictionary! {}, to_unicode_cmap(codes)));

    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => FONT_NAME,
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![cid_font_id.into()],
        "ToUnicode" => to_unicode_id,
    })
}

/// A CMap mapping BMP codes to themselves and each assigned surrogate-block
/// CID to its character's UTF-16 pair.
///
/// Ranges may not cross a high-byte boundary, so there is one range per high
/// byte outside `D8..DF`; both range and char entries come in blocks of at
/// most 100.
fn to_unicode_cmap(codes: &TextCodes) -> Vec<u8> {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n",
    );
    let surrogate_highs = (*ASTRAL_CIDS.start() >> 8)..=(*ASTRAL_CIDS.end() >> 8);
    let highs: Vec<u16> = (0..=0xFFu16).filter(|hi| !surrogate_highs.contains(hi)).collect();
    for block in highs.chunks(100) {
        cmap.push_str(&format!("{} beginbfrange\n", block.len()));
        for hi in block {
            cmap.push_str(&format!("<{hi:02X}00> <{hi:02X}FF> <{hi:02X}00>\n"));
        }
        cmap.push_str("endbfrange\n");
    }
    for (block_index, block) in codes.astral.chunks(100).enumerate() {
        cmap.push_str(&format!("{} beginbfchar\n", block.len()));
        for (i, c) in block.iter().enumerate() {
            let cid = *ASTRAL_CIDS.start() + (block_index * 100 + i) as u16;
            let mut units = [0u16; 2];
            let pair: String =
                c.encode_utf16(&mut units).iter().map(|u| format!("{u:04X}")).collect();
            cmap.push_str(&format!("<{cid:04X}> <{pair}>\n"));
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap.into_bytes()
}
