//! Shared test utilities for the webp-gallery test suite.
//!
//! Synthesizes fixture images in every supported input container and splices
//! hand-built EXIF blocks into them, so tests never depend on binary files
//! checked into the repo.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let block = build_exif_tiff(
//!     &[ExifEntry::Ascii(0x0110, "X-T4")],
//!     &[ExifEntry::Short(0x8827, 800)],
//! );
//! let jpeg = jpeg_with_exif(&encoded_jpeg(32, 24), &block);
//! let tmp = TempDir::new().unwrap();
//! let path = write_file(tmp.path(), "photo.jpg", &jpeg);
//! ```

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

// =========================================================================
// Pixel fixtures
// =========================================================================

/// Encode a gradient RGB image of the given size in `format`.
pub fn encode_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap();
    buf
}

pub fn encoded_jpeg(width: u32, height: u32) -> Vec<u8> {
    encode_image(width, height, ImageFormat::Jpeg)
}

pub fn encoded_bmp(width: u32, height: u32) -> Vec<u8> {
    encode_image(width, height, ImageFormat::Bmp)
}

/// PNG with a real alpha channel (no pixel fully opaque).
pub fn encoded_png_rgba(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([200, (x % 256) as u8, (y % 256) as u8, ((x + y) % 200) as u8])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// Write `bytes` to `dir/name` and return the full path.
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

// =========================================================================
// EXIF block builder
// =========================================================================

/// One IFD entry for [`build_exif_tiff`].
#[derive(Debug, Clone, Copy)]
pub enum ExifEntry<'a> {
    Ascii(u16, &'a str),
    Short(u16, u16),
    Long(u16, u32),
    /// `(tag, numerator, denominator)`
    Rational(u16, u32, u32),
}

const EXIF_IFD_POINTER: u16 = 0x8769;

impl ExifEntry<'_> {
    fn tag(&self) -> u16 {
        match *self {
            Self::Ascii(tag, _) | Self::Short(tag, _) | Self::Long(tag, _) => tag,
            Self::Rational(tag, _, _) => tag,
        }
    }

    /// `(field type, count, little-endian payload)`
    fn encode(&self) -> (u16, u32, Vec<u8>) {
        match *self {
            Self::Ascii(_, s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                (2, bytes.len() as u32, bytes)
            }
            Self::Short(_, v) => (3, 1, v.to_le_bytes().to_vec()),
            Self::Long(_, v) => (4, 1, v.to_le_bytes().to_vec()),
            Self::Rational(_, n, d) => {
                let mut bytes = n.to_le_bytes().to_vec();
                bytes.extend(d.to_le_bytes());
                (5, 1, bytes)
            }
        }
    }
}

fn ifd_len(entries: usize) -> usize {
    2 + 12 * entries + 4
}

/// Append one IFD to `out`; values over four bytes go to `data`, which will
/// start at absolute offset `data_base`.
fn write_ifd(out: &mut Vec<u8>, data: &mut Vec<u8>, data_base: usize, entries: &[ExifEntry]) {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|e| e.tag());

    out.extend((sorted.len() as u16).to_le_bytes());
    for entry in &sorted {
        let (kind, count, payload) = entry.encode();
        out.extend(entry.tag().to_le_bytes());
        out.extend(kind.to_le_bytes());
        out.extend(count.to_le_bytes());
        if payload.len() <= 4 {
            let mut inline = payload;
            inline.resize(4, 0);
            out.extend(inline);
        } else {
            out.extend(((data_base + data.len()) as u32).to_le_bytes());
            data.extend(&payload);
            if data.len() % 2 == 1 {
                data.push(0);
            }
        }
    }
    // No next IFD
    out.extend(0u32.to_le_bytes());
}

/// Little-endian TIFF block: IFD0, plus an Exif sub-IFD when `exif` is
/// non-empty. Entries are sorted by tag.
pub fn build_exif_tiff(ifd0: &[ExifEntry], exif: &[ExifEntry]) -> Vec<u8> {
    let mut ifd0 = ifd0.to_vec();
    let ifd0_entries = ifd0.len() + usize::from(!exif.is_empty());
    let exif_offset = 8 + ifd_len(ifd0_entries);
    let data_base = if exif.is_empty() {
        exif_offset
    } else {
        ifd0.push(ExifEntry::Long(EXIF_IFD_POINTER, exif_offset as u32));
        exif_offset + ifd_len(exif.len())
    };

    let mut out = b"II*\0".to_vec();
    out.extend(8u32.to_le_bytes());
    let mut data = Vec::new();
    write_ifd(&mut out, &mut data, data_base, &ifd0);
    if !exif.is_empty() {
        write_ifd(&mut out, &mut data, data_base, exif);
    }
    out.extend(data);
    out
}

// =========================================================================
// Container splicing
// =========================================================================

/// Insert an `Exif\0\0` APP1 segment right after SOI.
pub fn jpeg_with_exif(jpeg: &[u8], tiff: &[u8]) -> Vec<u8> {
    let payload_len = 2 + 6 + tiff.len();
    let mut out = jpeg[..2].to_vec();
    out.extend([0xFF, 0xE1]);
    out.extend((payload_len as u16).to_be_bytes());
    out.extend(b"Exif\0\0");
    out.extend(tiff);
    out.extend(&jpeg[2..]);
    out
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in bytes {
        crc ^= b as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

/// Insert an `eXIf` chunk (with a valid CRC) right after IHDR.
pub fn png_with_exif(png: &[u8], tiff: &[u8]) -> Vec<u8> {
    // signature (8) + IHDR length/type (8) + IHDR data (13) + CRC (4)
    let ihdr_end = 8 + 8 + 13 + 4;
    let mut chunk = b"eXIf".to_vec();
    chunk.extend(tiff);

    let mut out = png[..ihdr_end].to_vec();
    out.extend((tiff.len() as u32).to_be_bytes());
    out.extend(&chunk);
    out.extend(crc32(&chunk).to_be_bytes());
    out.extend(&png[ihdr_end..]);
    out
}

/// Turn a simple (VP8/VP8L) WebP into an extended one carrying an `EXIF`
/// chunk. `width`/`height` are the canvas size.
pub fn webp_with_exif(simple: &[u8], width: u32, height: u32, tiff: &[u8]) -> Vec<u8> {
    let mut body = b"WEBP".to_vec();

    body.extend(b"VP8X");
    body.extend(10u32.to_le_bytes());
    // EXIF flag
    body.extend([0x08, 0, 0, 0]);
    body.extend(&(width - 1).to_le_bytes()[..3]);
    body.extend(&(height - 1).to_le_bytes()[..3]);

    body.extend(&simple[12..]);

    body.extend(b"EXIF");
    body.extend((tiff.len() as u32).to_le_bytes());
    body.extend(tiff);
    if tiff.len() % 2 == 1 {
        body.push(0);
    }

    let mut out = b"RIFF".to_vec();
    out.extend((body.len() as u32).to_le_bytes());
    out.extend(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_known_value() {
        assert_eq!(crc32(b"IEND"), 0xAE42_6082);
    }

    #[test]
    fn exif_block_parses_with_pointer() {
        let block = build_exif_tiff(
            &[ExifEntry::Ascii(0x010F, "Make")],
            &[ExifEntry::Rational(0x829D, 28, 10)],
        );
        let exif = exif::Reader::new().read_raw(block).unwrap();
        let f = exif
            .get_field(exif::Tag::FNumber, exif::In::PRIMARY)
            .unwrap();
        assert_eq!(f.value.get_uint(0), None);
        assert!(matches!(f.value, exif::Value::Rational(ref v) if v[0].num == 28 && v[0].denom == 10));
    }
}
