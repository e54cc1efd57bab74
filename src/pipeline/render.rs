//! Rasterisation: one PDF page (via pdfium) or one image file → pixels.
//!
//! ## Why a `PageSource` trait?
//!
//! Only three questions are ever asked of a paginated source: how many pages,
//! how big is page *n*, and render page *n* at a given pixel size. Putting
//! them behind [`PageSource`] keeps the sizing and validation rules in
//! [`rasterize_page`] testable without a pdfium shared library, and lets a
//! different renderer slot in later.
//!
//! ## Sizing
//!
//! The page box is the crop box (falling back to the media box), in points,
//! turned upright by the page's `/Rotate`: pdfium renders rotated pages as
//! displayed, so a 90° or 270° page swaps its width and height. Pixel size is `max(round(box × scale), 1)` per axis. The renderer maps
//! the box onto the whole raster whatever its origin, so a page whose box
//! starts at `(36, 36)` still lands at pixel `(0, 0)`. Rendering clears to
//! opaque white first and any remaining alpha is flattened onto white.

use crate::config::ConversionConfig;
use crate::error::SearchablePdfError;
use crate::pipeline::binarize::{threshold, to_grayscale8};
use crate::pipeline::input::{InputKind, ResolvedInput};
use crate::raster::{PageGeometry, PixelImage};
use image::{DynamicImage, ExtendedColorType, ImageDecoder};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming a pdfium library file or directory.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// A page box in document units (points), origin at its lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub origin_x: f64,
    pub origin_y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    /// The box as displayed after `quarter_turns` clockwise quarter turns.
    pub fn rotated(self, quarter_turns: u8) -> PageBox {
        if quarter_turns % 2 == 0 {
            return self;
        }
        PageBox {
            origin_x: self.origin_y,
            origin_y: self.origin_x,
            width: self.height,
            height: self.width,
        }
    }
}

/// A paginated source. Indices are 0-based.
pub trait PageSource {
    fn page_count(&self) -> usize;

    fn page_bounds(&self, index: usize) -> Result<PageBox, SearchablePdfError>;

    /// Render page `index` so its box exactly fills `width × height` pixels.
    fn render_page(
        &self,
        index: usize,
        width: u32,
        height: u32,
    ) -> Result<PixelImage, SearchablePdfError>;
}

/// Rasterise 1-based `page` of `source` at `scale`.
pub fn rasterize_page(
    source: &dyn PageSource,
    page: usize,
    scale: f64,
) -> Result<(PixelImage, PageGeometry), SearchablePdfError> {
    let total = source.page_count();
    if page == 0 || page > total {
        return Err(SearchablePdfError::PageOutOfRange { page, total });
    }
    let index = page - 1;

    let bounds = source.page_bounds(index)?;
    let width = scaled_len(bounds.width, scale);
    let height = scaled_len(bounds.height, scale);
    check_raster_size(width, height)?;

    debug!(
        page,
        origin_x = bounds.origin_x,
        origin_y = bounds.origin_y,
        box_width = bounds.width,
        box_height = bounds.height,
        width,
        height,
        "Rendering page"
    );
    let image = source.render_page(index, width, height)?.flatten_onto_white()?;

    let geometry = PageGeometry {
        pixel_width: image.width(),
        pixel_height: image.height(),
        page_width: bounds.width,
        page_height: bounds.height,
        render_scale: scale,
    };
    info!(
        "Rendered page {}/{} → {}x{} px ({:.1}x{:.1} pt)",
        page,
        total,
        geometry.pixel_width,
        geometry.pixel_height,
        geometry.page_width,
        geometry.page_height
    );
    Ok((image, geometry))
}

/// `max(round(len × scale), 1)`, saturating at `u32::MAX`.
fn scaled_len(len: f64, scale: f64) -> u32 {
    let px = (len * scale).round();
    if px.is_nan() || px < 1.0 {
        1
    } else if px >= u32::MAX as f64 {
        u32::MAX
    } else {
        px as u32
    }
}

/// Refuse rasters whose RGBA buffer would not fit in memory addressing or
/// in pdfium's `i32` bitmap dimensions.
fn check_raster_size(width: u32, height: u32) -> Result<(), SearchablePdfError> {
    let too_big = width > i32::MAX as u32
        || height > i32::MAX as u32
        || (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| isize::try_from(n).ok())
            .is_none();
    if too_big {
        return Err(SearchablePdfError::RasterAllocation { width, height });
    }
    Ok(())
}

/// Load a single image at its native size: 1 pixel = 1 point.
///
/// A 1-bit source (bilevel TIFF or PNG) comes back as [`PixelFormat::Bilevel`]
/// so it is neither re-thresholded nor widened to 8 bits on output.
///
/// [`PixelFormat::Bilevel`]: crate::raster::PixelFormat::Bilevel
pub fn rasterize_image(path: &Path) -> Result<(PixelImage, PageGeometry), SearchablePdfError> {
    let load_error = |detail: String| SearchablePdfError::SourceLoad {
        path: path.to_path_buf(),
        detail,
    };
    let decoder = image::ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| load_error(e.to_string()))?
        .into_decoder()
        .map_err(|e| load_error(e.to_string()))?;
    let one_bit = decoder.original_color_type() == ExtendedColorType::L1;
    let decoded = DynamicImage::from_decoder(decoder).map_err(|e| load_error(e.to_string()))?;

    let mut image = PixelImage::from_dynamic(decoded)?.flatten_onto_white()?;
    if one_bit {
        // Decoders widen 1-bit sources to 8-bit gray; any non-zero sample is white.
        image = threshold(&to_grayscale8(&image)?, 1)?;
        debug!("{} is 1-bit, kept bilevel", path.display());
    }
    let geometry = PageGeometry::for_image(image.width(), image.height());
    info!(
        "Loaded image {} → {}x{} px",
        path.display(),
        geometry.pixel_width,
        geometry.pixel_height
    );
    Ok((image, geometry))
}

/// Rasterise `input` according to `config.page` and `config.scale`.
///
/// PDFs need a page number; images must not be given one.
pub fn rasterize(
    input: &ResolvedInput,
    config: &ConversionConfig,
) -> Result<(PixelImage, PageGeometry), SearchablePdfError> {
    match input.kind {
        InputKind::Image => {
            if let Some(page) = config.page {
                return Err(SearchablePdfError::PageNumberNotApplicable {
                    page,
                    path: input.path.clone(),
                });
            }
            rasterize_image(&input.path)
        }
        InputKind::Pdf => {
            let pdfium = bind_pdfium(config.pdfium_library.as_deref())?;
            let source = PdfiumPageSource::open(&pdfium, &input.path, config.password.as_deref())?;
            let page = config.page.ok_or(SearchablePdfError::PageNumberRequired {
                total: source.page_count(),
            })?;
            rasterize_page(&source, page, config.scale)
        }
    }
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// Bind to a pdfium library.
///
/// Tried in order: `explicit` (file or directory), `$PDFIUM_LIB_PATH`, the
/// current directory, then the system library. An explicit or environment
/// path that fails to load is an error rather than a silent fallback.
pub fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium, SearchablePdfError> {
    let bind = |path: &Path| {
        let lib = library_file(path);
        debug!("Binding pdfium at {}", lib.display());
        Pdfium::bind_to_library(&lib)
            .map(Pdfium::new)
            .map_err(|e| {
                SearchablePdfError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e))
            })
    };

    if let Some(path) = explicit {
        return bind(path);
    }
    if let Some(path) = std::env::var_os(PDFIUM_LIB_ENV).filter(|v| !v.is_empty()) {
        return bind(Path::new(&path));
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| SearchablePdfError::PdfiumBindingFailed(format!("{:?}", e)))
}

fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

/// [`PageSource`] backed by a pdfium document.
pub struct PdfiumPageSource<'a> {
    document: PdfDocument<'a>,
    path: PathBuf,
}

impl<'a> PdfiumPageSource<'a> {
    pub fn open(
        pdfium: &'a Pdfium,
        path: &Path,
        password: Option<&'a str>,
    ) -> Result<Self, SearchablePdfError> {
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| SearchablePdfError::SourceLoad {
                path: path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;
        info!("PDF loaded: {} pages", document.pages().len());
        Ok(Self {
            document,
            path: path.to_path_buf(),
        })
    }

    fn page(&self, index: usize) -> Result<PdfPage<'_>, SearchablePdfError> {
        let idx = u16::try_from(index).map_err(|_| SearchablePdfError::PageOutOfRange {
            page: index + 1,
            total: self.page_count(),
        })?;
        self.document.pages().get(idx).map_err(|e| SearchablePdfError::SourceLoad {
            path: self.path.clone(),
            detail: format!("page {}: {:?}", index + 1, e),
        })
    }
}

impl PageSource for PdfiumPageSource<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_bounds(&self, index: usize) -> Result<PageBox, SearchablePdfError> {
        let page = self.page(index)?;
        let boundaries = page.boundaries();
        let rect = boundaries
            .crop()
            .or_else(|_| boundaries.media())
            .map(|b| b.bounds)
            .map_err(|e| SearchablePdfError::SourceLoad {
                path: self.path.clone(),
                detail: format!("page {} has no usable box: {:?}", index + 1, e),
            })?;

        let (left, bottom) = (rect.left().value as f64, rect.bottom().value as f64);
        let (right, top) = (rect.right().value as f64, rect.top().value as f64);
        let quarter_turns = match page.rotation() {
            Ok(PdfPageRenderRotation::Degrees90) => 1,
            Ok(PdfPageRenderRotation::Degrees180) => 2,
            Ok(PdfPageRenderRotation::Degrees270) => 3,
            _ => 0,
        };
        Ok(PageBox {
            origin_x: left.min(right),
            origin_y: bottom.min(top),
            width: (right - left).abs(),
            height: (top - bottom).abs(),
        }
        .rotated(quarter_turns))
    }

    fn render_page(
        &self,
        index: usize,
        width: u32,
        height: u32,
    ) -> Result<PixelImage, SearchablePdfError> {
        let page = self.page(index)?;
        let render_config = PdfRenderConfig::new()
            .set_target_size(width as i32, height as i32)
            .set_clear_color(PdfColor::new(255, 255, 255, 255));

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|_| SearchablePdfError::RasterAllocation { width, height })?;
        PixelImage::from_dynamic(bitmap.as_image())
    }
}
