//! Uncompressed bilevel TIFF container.
//!
//! The codec path hands a 1-bit raster to an external G4 compressor, which
//! needs it in a TIFF file. Neither `image` nor `tiff` can encode 1-bit
//! images, so this module writes the (small, fixed) baseline layout itself:
//!
//! ```text
//! header (8) │ IFD (14 entries) │ XRes │ YRes │ Software │ DateTime │ strip
//! ```
//!
//! Little-endian, `PhotometricInterpretation = BlackIsZero` (a set bit is
//! white, matching the binarizer), a single uncompressed strip.
//! `DateTime` is fixed so every tool downstream sees identical input.

use crate::error::SearchablePdfError;
use crate::raster::{PixelFormat, PixelImage};
use std::path::Path;
use tracing::debug;

/// Written into the `DateTime` tag of every container.
pub const FIXED_DATE_TIME: &str = "1970:01:01 00:00:00";

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_X_RESOLUTION: u16 = 282;
const TAG_Y_RESOLUTION: u16 = 283;
const TAG_RESOLUTION_UNIT: u16 = 296;
const TAG_SOFTWARE: u16 = 305;
const TAG_DATE_TIME: u16 = 306;

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

const ENTRY_COUNT: usize = 14;
const IFD_OFFSET: u32 = 8;
const IFD_LEN: u32 = 2 + ENTRY_COUNT as u32 * 12 + 4;

/// Serialise a bilevel image as a single-strip, uncompressed TIFF.
///
/// `dpi` is stored as both X and Y resolution (unit: inch); `software` goes
/// into the `Software` tag.
pub fn encode_bilevel_tiff(
    image: &PixelImage,
    dpi: f64,
    software: &str,
) -> Result<Vec<u8>, SearchablePdfError> {
    if image.format() != PixelFormat::Bilevel {
        return Err(SearchablePdfError::InvalidRaster(format!(
            "container expects a Bilevel image, got {:?}",
            image.format()
        )));
    }
    if !dpi.is_finite() || dpi <= 0.0 {
        return Err(SearchablePdfError::InvalidRaster(format!("invalid resolution {dpi}")));
    }

    let strip = image.packed_rows();
    let strip_len = u32::try_from(strip.len())
        .map_err(|_| SearchablePdfError::InvalidRaster("image too large for a TIFF strip".into()))?;
    let (res_num, res_den) = rational(dpi);

    let mut software_bytes = software.as_bytes().to_vec();
    // NUL-terminated, and longer than the 4 bytes that would be stored inline.
    software_bytes.resize(software_bytes.len().max(4) + 1, 0);
    let mut date_bytes = FIXED_DATE_TIME.as_bytes().to_vec();
    date_bytes.push(0);

    // Out-of-line values follow the IFD, each on an even offset.
    let x_res_at = IFD_OFFSET + IFD_LEN;
    let y_res_at = x_res_at + 8;
    let software_at = y_res_at + 8;
    let date_at = even(software_at + software_bytes.len() as u32);
    let strip_at = even(date_at + date_bytes.len() as u32);

    let mut out = Vec::with_capacity(strip_at as usize + strip.len());
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&IFD_OFFSET.to_le_bytes());

    out.extend_from_slice(&(ENTRY_COUNT as u16).to_le_bytes());
    let entries: [(u16, u16, u32, u32); ENTRY_COUNT] = [
        (TAG_IMAGE_WIDTH, TYPE_LONG, 1, image.width()),
        (TAG_IMAGE_LENGTH, TYPE_LONG, 1, image.height()),
        (TAG_BITS_PER_SAMPLE, TYPE_SHORT, 1, 1),
        (TAG_COMPRESSION, TYPE_SHORT, 1, 1),
        (TAG_PHOTOMETRIC, TYPE_SHORT, 1, 1),
        (TAG_STRIP_OFFSETS, TYPE_LONG, 1, strip_at),
        (TAG_SAMPLES_PER_PIXEL, TYPE_SHORT, 1, 1),
        (TAG_ROWS_PER_STRIP, TYPE_LONG, 1, image.height()),
        (TAG_STRIP_BYTE_COUNTS, TYPE_LONG, 1, strip_len),
        (TAG_X_RESOLUTION, TYPE_RATIONAL, 1, x_res_at),
        (TAG_Y_RESOLUTION, TYPE_RATIONAL, 1, y_res_at),
        (TAG_RESOLUTION_UNIT, TYPE_SHORT, 1, 2),
        (TAG_SOFTWARE, TYPE_ASCII, software_bytes.len() as u32, software_at),
        (TAG_DATE_TIME, TYPE_ASCII, date_bytes.len() as u32, date_at),
    ];
    for (tag, kind, count, value) in entries {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        if kind == TYPE_SHORT {
            // Left-justified in the 4-byte value field.
            out.extend_from_slice(&(value as u16).to_le_bytes());
            out.extend_from_slice(&[0, 0]);
        } else {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());

    for _ in 0..2 {
        out.extend_from_slice(&res_num.to_le_bytes());
        out.extend_from_slice(&res_den.to_le_bytes());
    }
    out.extend_from_slice(&software_bytes);
    out.resize(date_at as usize, 0);
    out.extend_from_slice(&date_bytes);
    out.resize(strip_at as usize, 0);
    out.extend_from_slice(&strip);

    debug!(
        width = image.width(),
        height = image.height(),
        dpi,
        bytes = out.len(),
        "Encoded bilevel TIFF"
    );
    Ok(out)
}

/// Encode and write the container to `path`.
pub fn write_container(
    path: &Path,
    image: &PixelImage,
    dpi: f64,
    software: &str,
) -> Result<(), SearchablePdfError> {
    let bytes = encode_bilevel_tiff(image, dpi, software)?;
    std::fs::write(path, bytes).map_err(|source| SearchablePdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn even(offset: u32) -> u32 {
    offset + (offset & 1)
}

/// `dpi` as a reduced fraction with a denominator of at most 1000.
fn rational(dpi: f64) -> (u32, u32) {
    let num = (dpi * 1000.0).round().clamp(1.0, u32::MAX as f64) as u32;
    let g = gcd(num, 1000);
    (num / g, 1000 / g)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
