//! Photo metadata normalization.
//!
//! Raw EXIF tags (see [`crate::imaging::exif_container`]) are reduced to the
//! handful of fields a gallery shows next to a photo.
//!
//! ## Field mapping
//!
//! | Field | Tag | Shape |
//! |---|---|---|
//! | `iso` | ISOSpeedRatings / PhotographicSensitivity (`0x8827`), then ISOSpeed (`0x8833`); `0x8833` wins when `0x8827` is saturated at 65535 | integer |
//! | `shutterSpeed` | ExposureTime (`0x829A`) | reduced rational, `"1/250"` |
//! | `aperture` | FNumber (`0x829D`) | f-number, two decimals |
//! | `camera` | Model (`0x0110`) | text |
//! | `cameraMake` | Make (`0x010F`) | text |
//! | `lens` | LensModel (`0xA434`) | text |
//! | `focalLength` | FocalLength (`0x920A`) | millimetres, one decimal |
//! | `dateTimeOriginal` | DateTimeOriginal (`0x9003`) | text as written by the camera |
//! | `software` | Software (`0x0131`) | text |
//! | `artist` | Artist (`0x013B`) | text |
//!
//! ## Absence is data
//!
//! Every field is optional. A missing tag, a zero denominator, an ISO of 0 or a
//! blank string all normalize to `None`, and `None` fields are left out of the
//! manifest entirely. Normalization never fails.
//!
//! Shutter speed stays a rational so it redisplays exactly: `10/2500` becomes
//! `1/250`, never `0.004`.

use crate::imaging::exif_container::{self, RawExifTags, RawValue};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub mod tags {
    pub const MAKE: u16 = 0x010F;
    pub const MODEL: u16 = 0x0110;
    pub const SOFTWARE: u16 = 0x0131;
    pub const ARTIST: u16 = 0x013B;
    pub const EXPOSURE_TIME: u16 = 0x829A;
    pub const F_NUMBER: u16 = 0x829D;
    pub const ISO_SPEED_RATINGS: u16 = 0x8827;
    pub const ISO_SPEED: u16 = 0x8833;
    pub const DATE_TIME_ORIGINAL: u16 = 0x9003;
    pub const FOCAL_LENGTH: u16 = 0x920A;
    pub const LENS_MODEL: u16 = 0xA434;
}

/// Exposure time as a reduced fraction of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutterSpeed {
    pub numerator: u32,
    pub denominator: u32,
}

impl ShutterSpeed {
    /// Build a reduced shutter speed. Zero on either side is not an exposure.
    pub fn new(numerator: u32, denominator: u32) -> Option<Self> {
        if numerator == 0 || denominator == 0 {
            return None;
        }
        let g = gcd(numerator, denominator);
        Some(Self {
            numerator: numerator / g,
            denominator: denominator / g,
        })
    }

    pub fn seconds(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl fmt::Display for ShutterSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

impl FromStr for ShutterSpeed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (s, "1"),
        };
        let parse = |part: &str| {
            part.parse::<u32>()
                .map_err(|e| format!("invalid shutter speed {s:?}: {e}"))
        };
        Self::new(parse(num)?, parse(den)?).ok_or_else(|| format!("invalid shutter speed {s:?}"))
    }
}

impl Serialize for ShutterSpeed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ShutterSpeed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Normalized photo metadata for one source image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutter_speed: Option<ShutterSpeed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aperture: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_focal_length"
    )]
    pub focal_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time_original: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
}

impl NormalizedMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Whole millimetres serialize as integers (`50`, not `50.0`).
fn serialize_focal_length<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(mm) if mm.fract() == 0.0 && *mm >= 0.0 && *mm <= u32::MAX as f64 => {
            serializer.serialize_u32(*mm as u32)
        }
        Some(mm) => serializer.serialize_f64(*mm),
        None => serializer.serialize_none(),
    }
}

/// Pick the first non-empty text value, trimmed of whitespace and NUL padding.
pub fn resolve(sources: &[Option<&str>]) -> Option<String> {
    sources
        .iter()
        .filter_map(|opt| {
            opt.map(clean_text)
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
        .next()
}

/// Trim whitespace and the NUL padding cameras leave in fixed-width fields.
fn clean_text(s: &str) -> &str {
    s.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}

fn text(raw: &RawExifTags, tag: u16) -> Option<String> {
    resolve(&[raw.get(tag).and_then(RawValue::as_text)])
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

const ISO_SHORT_MAX: u32 = u16::MAX as u32;

fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Reduce raw tags to [`NormalizedMetadata`].
pub fn normalize(raw: &RawExifTags) -> NormalizedMetadata {
    let iso_tag = |tag: u16| {
        raw.get(tag)
            .and_then(RawValue::first_unsigned)
            .filter(|&iso| iso > 0)
    };
    // 0x8827 is a SHORT and saturates at 65535; 0x8833 then holds the real value.
    let iso = match (iso_tag(tags::ISO_SPEED_RATINGS), iso_tag(tags::ISO_SPEED)) {
        (Some(ISO_SHORT_MAX), Some(speed)) => Some(speed),
        (Some(rating), _) => Some(rating),
        (None, speed) => speed,
    };

    let shutter_speed = raw
        .get(tags::EXPOSURE_TIME)
        .and_then(RawValue::first_rational)
        .and_then(|(n, d)| ShutterSpeed::new(n, d));

    let aperture = raw
        .get(tags::F_NUMBER)
        .and_then(RawValue::first_f64)
        .and_then(positive)
        .map(|f| round_to(f, 2));

    let focal_length = raw
        .get(tags::FOCAL_LENGTH)
        .and_then(RawValue::first_f64)
        .and_then(positive)
        .map(|mm| round_to(mm, 1));

    NormalizedMetadata {
        iso,
        shutter_speed,
        aperture,
        camera: text(raw, tags::MODEL),
        camera_make: text(raw, tags::MAKE),
        lens: text(raw, tags::LENS_MODEL),
        focal_length,
        date_time_original: text(raw, tags::DATE_TIME_ORIGINAL),
        software: text(raw, tags::SOFTWARE),
        artist: text(raw, tags::ARTIST),
    }
}

/// Extract and normalize metadata from a file's raw bytes. Never fails.
pub fn extract_metadata(bytes: &[u8]) -> NormalizedMetadata {
    normalize(&exif_container::extract(bytes))
}
