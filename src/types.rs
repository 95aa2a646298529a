//! Shared types used across the pipeline.
//!
//! These are the values that cross module boundaries: the validator and the
//! orchestrator both need [`SourceFormat`], the backend consumes a
//! [`SourceImage`], and every processed image ends in a [`ConversionOutcome`]
//! carried by a [`ProcessedImage`].

use crate::metadata::NormalizedMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Input extensions accepted by the pipeline (matched case-insensitively).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "bmp", "webp"];

/// Raster container of a source image, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
    Tiff,
    Bmp,
    WebP,
}

impl SourceFormat {
    /// Map an extension (without the dot) to a format. Case-insensitive.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "tif" | "tiff" => Some(Self::Tiff),
            "bmp" => Some(Self::Bmp),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::WebP => "webp",
        };
        f.write_str(name)
    }
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A source file after it has been read and identified. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub byte_size: u64,
    pub dimensions: Dimensions,
}

/// Result of converting one source image. Exactly one variant per source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ConversionOutcome {
    #[serde(rename_all = "camelCase")]
    Success {
        output_path: PathBuf,
        before_bytes: u64,
        after_bytes: u64,
    },
    Failure { reason: String },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Everything known about one source once the batch has handled it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    /// Position in the input list (0-based).
    pub index: usize,
    pub source: PathBuf,
    /// Resolved output name, assigned even when conversion failed.
    pub output_filename: String,
    pub outcome: ConversionOutcome,
    pub metadata: NormalizedMetadata,
    /// Pixel size of the written WebP (successes only).
    pub output_dimensions: Option<Dimensions>,
}

/// Filename component of a path as an owned string (lossy on non-UTF-8).
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
