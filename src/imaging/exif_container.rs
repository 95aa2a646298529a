//! EXIF tag extraction across image containers.
//!
//! Each container stores its EXIF block (a little TIFF structure) somewhere
//! different:
//!
//! | Container | Location |
//! |---|---|
//! | JPEG | APP1 segment starting with `Exif\0\0` |
//! | PNG | `eXIf` chunk |
//! | WebP | `EXIF` chunk of an extended (VP8X) RIFF file |
//! | TIFF | the file itself is the TIFF structure |
//! | BMP | none |
//!
//! The container is detected from magic bytes, not the file extension, and
//! dispatched to a [`TagExtractor`]. Locating the block is done here; the IFD
//! walk is delegated to `kamadak-exif`. Only primary-image tags from IFD0 and
//! the Exif sub-IFD are kept.
//!
//! Extraction never fails: a missing or malformed block yields an empty
//! [`RawExifTags`].

use std::collections::BTreeMap;

/// Container type detected from leading magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Jpeg,
    Png,
    Tiff,
    WebP,
    Bmp,
    Unknown,
}

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const EXIF_HEADER: &[u8] = b"Exif\0\0";

impl ContainerKind {
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Self::Jpeg
        } else if bytes.starts_with(PNG_SIGNATURE) {
            Self::Png
        } else if is_tiff_header(bytes) {
            Self::Tiff
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Self::WebP
        } else if bytes.starts_with(b"BM") {
            Self::Bmp
        } else {
            Self::Unknown
        }
    }
}

fn is_tiff_header(bytes: &[u8]) -> bool {
    bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*")
}

/// A single tag value, reduced to the shapes normalization cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Unsigned(Vec<u32>),
    Signed(Vec<i32>),
    /// `(numerator, denominator)` pairs.
    Rational(Vec<(u32, u32)>),
    SignedRational(Vec<(i32, i32)>),
    Float(Vec<f64>),
    Bytes(Vec<u8>),
}

impl RawValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn first_unsigned(&self) -> Option<u32> {
        match self {
            Self::Unsigned(v) => v.first().copied(),
            Self::Signed(v) => v.first().and_then(|&n| u32::try_from(n).ok()),
            _ => None,
        }
    }

    pub fn first_rational(&self) -> Option<(u32, u32)> {
        match self {
            Self::Rational(v) => v.first().copied(),
            Self::SignedRational(v) => v
                .first()
                .and_then(|&(n, d)| Some((u32::try_from(n).ok()?, u32::try_from(d).ok()?))),
            _ => None,
        }
    }

    /// First value as a float, from any numeric shape.
    pub fn first_f64(&self) -> Option<f64> {
        match self {
            Self::Rational(v) => v
                .first()
                .filter(|(_, d)| *d != 0)
                .map(|&(n, d)| n as f64 / d as f64),
            Self::SignedRational(v) => v
                .first()
                .filter(|(_, d)| *d != 0)
                .map(|&(n, d)| n as f64 / d as f64),
            Self::Unsigned(v) => v.first().map(|&n| n as f64),
            Self::Signed(v) => v.first().map(|&n| n as f64),
            Self::Float(v) => v.first().copied(),
            _ => None,
        }
    }
}

/// Primary-image EXIF tags keyed by tag number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawExifTags {
    tags: BTreeMap<u16, RawValue>,
}

impl RawExifTags {
    pub fn get(&self, tag: u16) -> Option<&RawValue> {
        self.tags.get(&tag)
    }

    pub fn insert(&mut self, tag: u16, value: RawValue) {
        self.tags.insert(tag, value);
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }
}

/// One way of pulling EXIF tags out of a container.
pub trait TagExtractor: Sync {
    /// Find the embedded TIFF-structured EXIF block, if any.
    fn locate<'a>(&self, bytes: &'a [u8]) -> Option<&'a [u8]>;

    fn extract(&self, bytes: &[u8]) -> RawExifTags {
        match self.locate(bytes) {
            Some(block) => parse_tiff_block(block),
            None => RawExifTags::default(),
        }
    }
}

pub struct JpegExtractor;
pub struct PngExtractor;
pub struct WebPExtractor;
pub struct TiffExtractor;
/// Containers that never carry EXIF (BMP, unrecognized data).
pub struct NoExif;

impl TagExtractor for JpegExtractor {
    /// Walk marker segments up to start-of-scan looking for an Exif APP1.
    fn locate<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        let mut pos = 2;
        while pos + 4 <= data.len() {
            if data[pos] != 0xFF {
                return None;
            }
            let marker = data[pos + 1];
            // Fill bytes
            if marker == 0xFF {
                pos += 1;
                continue;
            }
            if marker == 0xDA || marker == 0xD9 {
                return None;
            }
            if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
                pos += 2;
                continue;
            }
            let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            if seg_len < 2 {
                return None;
            }
            let seg_end = (pos + 2 + seg_len).min(data.len());
            let segment = &data[pos + 4..seg_end];
            if marker == 0xE1 && segment.starts_with(EXIF_HEADER) {
                return Some(&segment[EXIF_HEADER.len()..]);
            }
            pos += 2 + seg_len;
        }
        None
    }
}

impl TagExtractor for PngExtractor {
    fn locate<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        let mut pos = PNG_SIGNATURE.len();
        while pos + 8 <= data.len() {
            let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
                as usize;
            let kind = &data[pos + 4..pos + 8];
            let start = pos + 8;
            let end = start.checked_add(len)?;
            if end > data.len() {
                return None;
            }
            match kind {
                b"eXIf" => return Some(&data[start..end]),
                b"IEND" => return None,
                _ => {}
            }
            // data + CRC
            pos = end + 4;
        }
        None
    }
}

impl TagExtractor for WebPExtractor {
    fn locate<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        let mut pos = 12;
        while pos + 8 <= data.len() {
            let kind = &data[pos..pos + 4];
            let len = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
                as usize;
            let start = pos + 8;
            let end = start.checked_add(len)?;
            if end > data.len() {
                return None;
            }
            if kind == b"EXIF" {
                let block = &data[start..end];
                return Some(block.strip_prefix(EXIF_HEADER).unwrap_or(block));
            }
            // Chunks are padded to an even length
            pos = end + (len & 1);
        }
        None
    }
}

impl TagExtractor for TiffExtractor {
    fn locate<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        is_tiff_header(data).then_some(data)
    }
}

impl TagExtractor for NoExif {
    fn locate<'a>(&self, _data: &'a [u8]) -> Option<&'a [u8]> {
        None
    }
}

/// Extractor for a detected container.
pub fn extractor_for(kind: ContainerKind) -> &'static dyn TagExtractor {
    match kind {
        ContainerKind::Jpeg => &JpegExtractor,
        ContainerKind::Png => &PngExtractor,
        ContainerKind::WebP => &WebPExtractor,
        ContainerKind::Tiff => &TiffExtractor,
        ContainerKind::Bmp | ContainerKind::Unknown => &NoExif,
    }
}

/// Sniff the container and extract its primary-image EXIF tags.
pub fn extract(bytes: &[u8]) -> RawExifTags {
    extractor_for(ContainerKind::sniff(bytes)).extract(bytes)
}

/// Parse a TIFF-structured EXIF block with `kamadak-exif`.
fn parse_tiff_block(block: &[u8]) -> RawExifTags {
    let exif = match exif::Reader::new().read_raw(block.to_vec()) {
        Ok(exif) => exif,
        Err(e) => {
            log::debug!("ignoring unreadable EXIF block: {e}");
            return RawExifTags::default();
        }
    };

    let mut tags = RawExifTags::default();
    for field in exif.fields() {
        if field.ifd_num != exif::In::PRIMARY {
            continue;
        }
        if !matches!(field.tag.context(), exif::Context::Tiff | exif::Context::Exif) {
            continue;
        }
        if let Some(value) = convert_value(&field.value) {
            tags.insert(field.tag.number(), value);
        }
    }
    tags
}

fn convert_value(value: &exif::Value) -> Option<RawValue> {
    use exif::Value;
    let converted = match value {
        Value::Ascii(parts) => RawValue::Text(
            parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Value::Byte(v) => RawValue::Unsigned(v.iter().map(|&n| n as u32).collect()),
        Value::Short(v) => RawValue::Unsigned(v.iter().map(|&n| n as u32).collect()),
        Value::Long(v) => RawValue::Unsigned(v.clone()),
        Value::SByte(v) => RawValue::Signed(v.iter().map(|&n| n as i32).collect()),
        Value::SShort(v) => RawValue::Signed(v.iter().map(|&n| n as i32).collect()),
        Value::SLong(v) => RawValue::Signed(v.clone()),
        Value::Rational(v) => RawValue::Rational(v.iter().map(|r| (r.num, r.denom)).collect()),
        Value::SRational(v) => {
            RawValue::SignedRational(v.iter().map(|r| (r.num, r.denom)).collect())
        }
        Value::Float(v) => RawValue::Float(v.iter().map(|&n| n as f64).collect()),
        Value::Double(v) => RawValue::Float(v.clone()),
        Value::Undefined(bytes, _) => RawValue::Bytes(bytes.clone()),
        _ => return None,
    };
    Some(converted)
}
