//! In-memory pixel buffers and page geometry.
//!
//! [`PixelImage`] is the hand-off type between stages: the rasterizer creates
//! one, the binarizer consumes it and creates another, the emitter embeds it.
//! Ownership moves from stage to stage; nothing mutates a buffer after
//! construction.
//!
//! Rows are stored top-to-bottom with an explicit `stride` (bytes per row),
//! which for the bilevel format is the packed row length `ceil(width / 8)`.

use crate::error::SearchablePdfError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Pixel layout of a [`PixelImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 1 bit per pixel, packed MSB-first; bit set = white.
    Bilevel,
    /// 8-bit single-channel grayscale.
    Gray8,
    /// 8-bit RGB.
    Rgb8,
    /// 8-bit RGB with straight alpha.
    Rgba8,
}

impl PixelFormat {
    pub fn bits_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bilevel => 1,
            PixelFormat::Gray8 => 8,
            PixelFormat::Rgb8 => 24,
            PixelFormat::Rgba8 => 32,
        }
    }

    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Bilevel | PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::Rgba8)
    }

    /// Smallest legal stride for a row of `width` pixels: `ceil(width × bpp / 8)`.
    pub fn min_stride(self, width: u32) -> usize {
        (width as usize * self.bits_per_pixel()).div_ceil(8)
    }
}

/// An immutable pixel buffer with known dimensions and layout.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    stride: usize,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("stride", &self.stride)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl PixelImage {
    /// Build an image, checking `stride ≥ ceil(width × bpp / 8)` and
    /// `data.len() == stride × height`.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        stride: usize,
        data: Vec<u8>,
    ) -> Result<Self, SearchablePdfError> {
        if width == 0 || height == 0 {
            return Err(SearchablePdfError::InvalidRaster(format!(
                "dimensions must be positive, got {width}x{height}"
            )));
        }
        let min = format.min_stride(width);
        if stride < min {
            return Err(SearchablePdfError::InvalidRaster(format!(
                "stride {stride} is shorter than {min} bytes needed for {width} {format:?} pixels"
            )));
        }
        let expected = stride
            .checked_mul(height as usize)
            .ok_or_else(|| SearchablePdfError::InvalidRaster("buffer size overflows".into()))?;
        if data.len() != expected {
            return Err(SearchablePdfError::InvalidRaster(format!(
                "buffer holds {} bytes, expected {expected} ({stride} × {height})",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            stride,
            data,
        })
    }

    /// Build a tightly packed image (stride = minimum stride).
    pub fn packed(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, SearchablePdfError> {
        Self::new(width, height, format, format.min_stride(width), data)
    }

    /// Take ownership of a decoded image, keeping grayscale, RGB and RGBA
    /// layouts and converting everything else to the nearest of them.
    pub fn from_dynamic(image: DynamicImage) -> Result<Self, SearchablePdfError> {
        let (width, height) = (image.width(), image.height());
        match image {
            DynamicImage::ImageLuma8(buf) => {
                Self::packed(width, height, PixelFormat::Gray8, buf.into_raw())
            }
            DynamicImage::ImageRgb8(buf) => {
                Self::packed(width, height, PixelFormat::Rgb8, buf.into_raw())
            }
            DynamicImage::ImageRgba8(buf) => {
                Self::packed(width, height, PixelFormat::Rgba8, buf.into_raw())
            }
            other if other.color().has_alpha() => {
                Self::packed(width, height, PixelFormat::Rgba8, other.to_rgba8().into_raw())
            }
            other => Self::packed(width, height, PixelFormat::Rgb8, other.to_rgb8().into_raw()),
        }
    }

    /// Convert to an `image` crate buffer, e.g. for a recognition engine.
    /// Bilevel pixels expand to 0/255 grayscale.
    pub fn to_dynamic(&self) -> Result<DynamicImage, SearchablePdfError> {
        let invalid =
            || SearchablePdfError::Internal("pixel buffer does not match its dimensions".into());
        let image = match self.format {
            PixelFormat::Bilevel => {
                let mut out = Vec::with_capacity(self.width as usize * self.height as usize);
                for y in 0..self.height {
                    let row = self.row(y);
                    out.extend((0..self.width as usize).map(|x| {
                        if row[x / 8] & (0x80 >> (x % 8)) != 0 {
                            255u8
                        } else {
                            0u8
                        }
                    }));
                }
                DynamicImage::ImageLuma8(
                    image::GrayImage::from_raw(self.width, self.height, out).ok_or_else(invalid)?,
                )
            }
            PixelFormat::Gray8 => DynamicImage::ImageLuma8(
                image::GrayImage::from_raw(self.width, self.height, self.packed_rows())
                    .ok_or_else(invalid)?,
            ),
            PixelFormat::Rgb8 => DynamicImage::ImageRgb8(
                image::RgbImage::from_raw(self.width, self.height, self.packed_rows())
                    .ok_or_else(invalid)?,
            ),
            PixelFormat::Rgba8 => DynamicImage::ImageRgba8(
                image::RgbaImage::from_raw(self.width, self.height, self.packed_rows())
                    .ok_or_else(invalid)?,
            ),
        };
        Ok(image)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes per row, including any trailing padding.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel bytes of row `y` without stride padding.
    ///
    /// # Panics
    /// Panics if `y >= height`.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.format.min_stride(self.width)]
    }

    /// All rows concatenated without stride padding.
    pub fn packed_rows(&self) -> Vec<u8> {
        if self.stride == self.format.min_stride(self.width) {
            return self.data.clone();
        }
        (0..self.height).flat_map(|y| self.row(y).iter().copied()).collect()
    }

    /// Composite onto opaque white and drop the alpha channel.
    ///
    /// Images without alpha are returned unchanged.
    pub fn flatten_onto_white(self) -> Result<Self, SearchablePdfError> {
        if !self.format.has_alpha() {
            return Ok(self);
        }
        let mut out = Vec::new();
        let bytes = self.width as usize * self.height as usize * 3;
        out.try_reserve_exact(bytes)
            .map_err(|_| SearchablePdfError::Allocation { bytes })?;
        for y in 0..self.height {
            for px in self.row(y).chunks_exact(4) {
                let a = px[3] as u32;
                for &c in &px[..3] {
                    out.push(over_white(c, a));
                }
            }
        }
        Self::packed(self.width, self.height, PixelFormat::Rgb8, out)
    }
}

/// Blend one 8-bit channel with straight alpha `a` over white.
pub(crate) fn over_white(c: u8, a: u32) -> u8 {
    ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8
}

/// Raster size in pixels and true page size in document units (points).
///
/// `page_width`/`page_height` are the page's real size, never the upscaled
/// raster size, so the output document keeps the source page dimensions
/// whatever scale the page was rendered at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub page_width: f64,
    pub page_height: f64,
    /// Scale the raster was rendered at; 1.0 for single images.
    pub render_scale: f64,
}

impl PageGeometry {
    /// Geometry of a single image: 1 pixel = 1 point.
    pub fn for_image(pixel_width: u32, pixel_height: u32) -> Self {
        Self {
            pixel_width,
            pixel_height,
            page_width: pixel_width as f64,
            page_height: pixel_height as f64,
            render_scale: 1.0,
        }
    }

    /// Raster resolution in dots per inch: `72 × render_scale`.
    pub fn resolution_dpi(&self) -> f64 {
        72.0 * self.render_scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_stride_rounds_bits_up_to_bytes() {
        assert_eq!(PixelFormat::Bilevel.min_stride(1), 1);
        assert_eq!(PixelFormat::Bilevel.min_stride(9), 2);
        assert_eq!(PixelFormat::Gray8.min_stride(5), 5);
        assert_eq!(PixelFormat::Rgb8.min_stride(5), 15);
        assert_eq!(PixelFormat::Rgba8.min_stride(5), 20);
    }

    #[test]
    fn new_rejects_short_stride() {
        let err = PixelImage::new(4, 1, PixelFormat::Rgb8, 11, vec![0; 11]).unwrap_err();
        assert!(matches!(err, SearchablePdfError::InvalidRaster(_)));
    }

    #[test]
    fn new_rejects_wrong_length() {
        let err = PixelImage::new(2, 2, PixelFormat::Gray8, 2, vec![0; 5]).unwrap_err();
        assert!(matches!(err, SearchablePdfError::InvalidRaster(_)));
    }

    #[test]
    fn new_rejects_zero_dimensions() {
        assert!(PixelImage::new(0, 2, PixelFormat::Gray8, 0, vec![]).is_err());
    }

    #[test]
    fn row_skips_padding() {
        let img =
            PixelImage::new(2, 2, PixelFormat::Gray8, 4, vec![1, 2, 9, 9, 3, 4, 9, 9]).unwrap();
        assert_eq!(img.row(1), &[3, 4]);
        assert_eq!(img.packed_rows(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn flatten_transparent_pixel_becomes_white() {
        let pixels = vec![0, 0, 0, 0, 10, 20, 30, 255];
        let img = PixelImage::packed(2, 1, PixelFormat::Rgba8, pixels).unwrap();
        let flat = img.flatten_onto_white().unwrap();
        assert_eq!(flat.format(), PixelFormat::Rgb8);
        assert_eq!(flat.data(), &[255, 255, 255, 10, 20, 30]);
    }

    #[test]
    fn from_dynamic_keeps_gray_layout() {
        let gray = image::GrayImage::from_raw(3, 1, vec![0, 128, 255]).unwrap();
        let img = PixelImage::from_dynamic(DynamicImage::ImageLuma8(gray)).unwrap();
        assert_eq!(img.format(), PixelFormat::Gray8);
        assert_eq!(img.data(), &[0, 128, 255]);
    }

    #[test]
    fn to_dynamic_expands_bilevel() {
        let img = PixelImage::packed(3, 1, PixelFormat::Bilevel, vec![0b1010_0000]).unwrap();
        let dynamic = img.to_dynamic().unwrap();
        assert_eq!(dynamic.to_luma8().into_raw(), vec![255, 0, 255]);
    }

    #[test]
    fn image_geometry_is_one_point_per_pixel() {
        let g = PageGeometry::for_image(640, 480);
        assert_eq!(g.page_width, 640.0);
        assert_eq!(g.page_height, 480.0);
        assert_eq!(g.resolution_dpi(), 72.0);
    }
}
