//! Gallery manifest building and persistence.
//!
//! After a batch completes, every [`ProcessedImage`] is folded into one
//! `gallery-data.json` written next to the WebP files:
//!
//! ```text
//! <output_dir>/
//! └── exported/
//!     ├── gallery-data.json
//!     ├── shot-1.webp
//!     └── shot-2.webp
//! ```
//!
//! Only successful conversions become entries, so a consumer never sees an
//! entry whose file does not exist. Failures are counted in `stats`.
//!
//! ## Schema
//!
//! ```json
//! {
//!   "images": [
//!     { "sourceFilename": "DSC_0001.jpg", "outputFilename": "shot-1.webp",
//!       "iso": 400, "shutterSpeed": "1/250", "aperture": 2.8,
//!       "camera": "ILCE-7M3", "lens": "FE 50mm F1.8", "focalLength": 50,
//!       "width": 1000, "height": 750,
//!       "link": "https://cdn.example.com/gallery/shot-1.webp" }
//!   ],
//!   "stats": { "totalBeforeBytes": 0, "totalAfterBytes": 0,
//!              "compressionRatio": 0.0, "successCount": 0, "failureCount": 0 }
//! }
//! ```

use crate::metadata::NormalizedMetadata;
use crate::types::{ConversionOutcome, ProcessedImage, file_name_of};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MANIFEST_FILENAME: &str = "gallery-data.json";
pub const EXPORT_SUBDIR: &str = "exported";

/// Staging name for a manifest being written. Not a `.webp`, so inspection
/// and pre-flight ignore a leftover one.
const MANIFEST_TMP_FILENAME: &str = ".gallery-data.json.tmp";

/// Directory all outputs and the manifest are written to.
pub fn exported_dir(output_dir: &Path) -> PathBuf {
    output_dir.join(EXPORT_SUBDIR)
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One successfully converted image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryEntry {
    pub source_filename: String,
    pub output_filename: String,
    #[serde(flatten)]
    pub metadata: NormalizedMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Batch totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_before_bytes: u64,
    pub total_after_bytes: u64,
    pub compression_ratio: f64,
    pub success_count: usize,
    pub failure_count: usize,
}

/// `1 - after / before`, or 0.0 when nothing was converted.
pub fn compression_ratio(total_before: u64, total_after: u64) -> f64 {
    if total_before == 0 {
        0.0
    } else {
        1.0 - (total_after as f64 / total_before as f64)
    }
}

/// Running totals, owned by whoever consumes outcomes in input order.
#[derive(Debug, Clone, Default)]
pub struct StatsAccumulator {
    before: u64,
    after: u64,
    successes: usize,
    failures: usize,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &ConversionOutcome) {
        match outcome {
            ConversionOutcome::Success {
                before_bytes,
                after_bytes,
                ..
            } => {
                self.before += before_bytes;
                self.after += after_bytes;
                self.successes += 1;
            }
            ConversionOutcome::Failure { .. } => self.failures += 1,
        }
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            total_before_bytes: self.before,
            total_after_bytes: self.after,
            compression_ratio: compression_ratio(self.before, self.after),
            success_count: self.successes,
            failure_count: self.failures,
        }
    }
}

/// The `gallery-data.json` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GalleryManifest {
    pub images: Vec<GalleryEntry>,
    pub stats: Stats,
}

impl GalleryManifest {
    pub fn entry(&self, output_filename: &str) -> Option<&GalleryEntry> {
        self.images
            .iter()
            .find(|e| e.output_filename == output_filename)
    }
}

/// Public URL of an output file, if a base URL is configured.
///
/// Trailing slashes on the base are collapsed to exactly one separator.
pub fn build_link(api_base_url: Option<&str>, output_filename: &str) -> Option<String> {
    let base = api_base_url.map(str::trim).filter(|b| !b.is_empty())?;
    Some(format!(
        "{}/{}",
        base.trim_end_matches('/'),
        output_filename
    ))
}

/// Fold processed images (in input order) into a manifest.
pub fn build_manifest(images: &[ProcessedImage], api_base_url: Option<&str>) -> GalleryManifest {
    let mut stats = StatsAccumulator::new();
    let mut entries = Vec::new();

    for image in images {
        stats.record(&image.outcome);
        if !image.outcome.is_success() {
            continue;
        }
        entries.push(GalleryEntry {
            source_filename: file_name_of(&image.source),
            output_filename: image.output_filename.clone(),
            metadata: image.metadata.clone(),
            width: image.output_dimensions.map(|d| d.width),
            height: image.output_dimensions.map(|d| d.height),
            link: build_link(api_base_url, &image.output_filename),
        });
    }

    GalleryManifest {
        images: entries,
        stats: stats.snapshot(),
    }
}

/// Write `gallery-data.json` into `exported_dir`, creating it if needed.
///
/// The JSON goes to a temporary file in the same directory which is then
/// renamed over the manifest, so readers see the old file or the complete new
/// one. A symlink in the manifest's place is replaced, never followed. On
/// failure the temporary file is removed and any previous manifest is left
/// untouched.
pub fn write_manifest(
    exported_dir: &Path,
    manifest: &GalleryManifest,
) -> Result<PathBuf, ManifestError> {
    std::fs::create_dir_all(exported_dir)?;
    let path = exported_dir.join(MANIFEST_FILENAME);
    let tmp_path = exported_dir.join(MANIFEST_TMP_FILENAME);
    let mut json = serde_json::to_string_pretty(manifest)?;
    json.push('\n');

    let written =
        std::fs::write(&tmp_path, json).and_then(|()| std::fs::rename(&tmp_path, &path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    log::debug!("wrote {}", path.display());
    Ok(path)
}

pub fn read_manifest(path: &Path) -> Result<GalleryManifest, ManifestError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
