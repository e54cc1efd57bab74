//! Bilevel binarization: any pixel buffer → 8-bit gray → packed 1 bit/pixel.
//!
//! The threshold is fixed at 128 with an inclusive boundary: a gray value
//! `≥ 128` sets the bit (white/background), anything darker clears it
//! (black/foreground). There is deliberately no adaptive or Otsu step, so the
//! output is reproducible bit-for-bit.
//!
//! Packed rows are `ceil(width / 8)` bytes, most significant bit first, with
//! zero padding bits at the end of each row.

use crate::error::SearchablePdfError;
use crate::raster::{over_white, PixelFormat, PixelImage};
use tracing::debug;

/// Default gray threshold.
pub const DEFAULT_THRESHOLD: u8 = 128;

/// `true` when the image already is 1 bit/pixel, single channel, no alpha,
/// i.e. binarizing it again would be a no-op.
pub fn is_already_bilevel(image: &PixelImage) -> bool {
    image.format() == PixelFormat::Bilevel
}

/// Convert any supported layout to 8-bit single-channel grayscale.
///
/// RGB uses integer Rec. 601 luma; alpha is composited onto white first;
/// bilevel pixels expand to 0 or 255.
pub fn to_grayscale8(image: &PixelImage) -> Result<PixelImage, SearchablePdfError> {
    let (width, height) = (image.width(), image.height());
    let bytes = width as usize * height as usize;
    let mut out = Vec::new();
    out.try_reserve_exact(bytes)
        .map_err(|_| SearchablePdfError::Allocation { bytes })?;

    for y in 0..height {
        let row = image.row(y);
        match image.format() {
            PixelFormat::Gray8 => out.extend_from_slice(row),
            PixelFormat::Bilevel => {
                out.extend((0..width as usize).map(|x| {
                    if row[x / 8] & (0x80 >> (x % 8)) != 0 {
                        255
                    } else {
                        0
                    }
                }));
            }
            PixelFormat::Rgb8 => {
                out.extend(row.chunks_exact(3).map(|px| luma(px[0], px[1], px[2])));
            }
            PixelFormat::Rgba8 => {
                out.extend(row.chunks_exact(4).map(|px| {
                    let a = px[3] as u32;
                    luma(over_white(px[0], a), over_white(px[1], a), over_white(px[2], a))
                }));
            }
        }
    }

    PixelImage::packed(width, height, PixelFormat::Gray8, out)
}

/// Threshold an 8-bit gray image into a packed bilevel image.
///
/// Pixels with value `≥ threshold` become set bits (white).
pub fn threshold(gray: &PixelImage, threshold: u8) -> Result<PixelImage, SearchablePdfError> {
    if gray.format() != PixelFormat::Gray8 {
        return Err(SearchablePdfError::InvalidRaster(format!(
            "threshold expects Gray8 input, got {:?}",
            gray.format()
        )));
    }

    let (width, height) = (gray.width(), gray.height());
    let row_bytes = PixelFormat::Bilevel.min_stride(width);
    let bytes = row_bytes * height as usize;
    let mut out = Vec::new();
    out.try_reserve_exact(bytes)
        .map_err(|_| SearchablePdfError::Allocation { bytes })?;
    out.resize(bytes, 0u8);

    for y in 0..height {
        let src = gray.row(y);
        let dst = &mut out[y as usize * row_bytes..(y as usize + 1) * row_bytes];
        for (x, &value) in src.iter().enumerate() {
            if value >= threshold {
                dst[x / 8] |= 0x80 >> (x % 8);
            }
        }
    }

    debug!(width, height, row_bytes, "Binarized raster");
    PixelImage::new(width, height, PixelFormat::Bilevel, row_bytes, out)
}

/// Grayscale + threshold at [`DEFAULT_THRESHOLD`].
///
/// With `force = false` an already-bilevel image is handed back unchanged;
/// with `force = true` it is re-binarized regardless.
pub fn binarize(image: PixelImage, force: bool) -> Result<PixelImage, SearchablePdfError> {
    if !force && is_already_bilevel(&image) {
        debug!("Raster is already bilevel, skipping binarization");
        return Ok(image);
    }
    let gray = to_grayscale8(&image)?;
    threshold(&gray, DEFAULT_THRESHOLD)
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, data: Vec<u8>) -> PixelImage {
        PixelImage::packed(width, height, PixelFormat::Gray8, data).unwrap()
    }

    fn bits(image: &PixelImage) -> Vec<u8> {
        let mut out = Vec::new();
        for y in 0..image.height() {
            let row = image.row(y);
            for x in 0..image.width() as usize {
                out.push(u8::from(row[x / 8] & (0x80 >> (x % 8)) != 0));
            }
        }
        out
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let img = gray(2, 2, vec![127, 128, 129, 255]);
        let bw = threshold(&img, DEFAULT_THRESHOLD).unwrap();
        assert_eq!(bits(&bw), vec![0, 1, 1, 1]);
    }

    #[test]
    fn packed_row_length_is_ceil_width_over_eight() {
        for (w, expected) in [(1u32, 1usize), (7, 1), (8, 1), (9, 2), (16, 2), (17, 3)] {
            let img = gray(w, 2, vec![200; w as usize * 2]);
            let bw = threshold(&img, DEFAULT_THRESHOLD).unwrap();
            assert_eq!(bw.stride(), expected, "width {w}");
            assert_eq!(bw.data().len(), expected * 2, "width {w}");
        }
    }

    #[test]
    fn bits_are_msb_first_with_zero_padding() {
        let mut row = vec![0u8; 9];
        row[0] = 255;
        row[8] = 255;
        let bw = threshold(&gray(9, 1, row), DEFAULT_THRESHOLD).unwrap();
        assert_eq!(bw.data(), &[0b1000_0000, 0b1000_0000]);
    }

    #[test]
    fn binarization_is_idempotent() {
        let data: Vec<u8> = (0..60u32).map(|i| ((i * 37) % 256) as u8).collect();
        let rgb = PixelImage::packed(5, 4, PixelFormat::Rgb8, data).unwrap();

        let once = threshold(&to_grayscale8(&rgb).unwrap(), DEFAULT_THRESHOLD).unwrap();
        let twice = threshold(&to_grayscale8(&once).unwrap(), DEFAULT_THRESHOLD).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rgb_luma_weights() {
        let pixels = vec![255, 0, 0, 0, 255, 0, 0, 0, 255];
        let rgb = PixelImage::packed(3, 1, PixelFormat::Rgb8, pixels).unwrap();
        let g = to_grayscale8(&rgb).unwrap();
        assert_eq!(g.data(), &[76, 150, 29]);
    }

    #[test]
    fn transparent_rgba_reads_as_white() {
        let rgba = PixelImage::packed(1, 1, PixelFormat::Rgba8, vec![0, 0, 0, 0]).unwrap();
        assert_eq!(to_grayscale8(&rgba).unwrap().data(), &[255]);
    }

    #[test]
    fn already_bilevel_detection() {
        let bw = PixelImage::packed(8, 1, PixelFormat::Bilevel, vec![0xF0]).unwrap();
        assert!(is_already_bilevel(&bw));
        assert!(!is_already_bilevel(&gray(1, 1, vec![0])));
    }

    #[test]
    fn binarize_passes_bilevel_through_unless_forced() {
        let bw = PixelImage::new(4, 1, PixelFormat::Bilevel, 2, vec![0xF0, 0xAB]).unwrap();
        let kept = binarize(bw.clone(), false).unwrap();
        assert_eq!(kept, bw);

        let forced = binarize(bw, true).unwrap();
        assert_eq!(forced.stride(), 1);
        assert_eq!(forced.data(), &[0xF0]);
    }

    #[test]
    fn threshold_rejects_non_gray_input() {
        let rgb = PixelImage::packed(1, 1, PixelFormat::Rgb8, vec![0, 0, 0]).unwrap();
        assert!(matches!(
            threshold(&rgb, DEFAULT_THRESHOLD),
            Err(SearchablePdfError::InvalidRaster(_))
        ));
    }
}
