//! Read-back of an existing export folder.
//!
//! Reports what a previous run left in `<output_dir>/exported/`: the WebP
//! files present and the parsed `gallery-data.json`. A manifest that cannot
//! be read or parsed is reported as [`ManifestStatus::Invalid`].

use crate::manifest::{
    GalleryEntry, GalleryManifest, MANIFEST_FILENAME, exported_dir, read_manifest,
};
use crate::naming::OUTPUT_EXTENSION;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ManifestStatus {
    Missing,
    Valid(GalleryManifest),
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportInventory {
    pub exported_dir: PathBuf,
    pub exists: bool,
    /// WebP files in the export folder, sorted by name.
    pub image_files: Vec<String>,
    pub manifest: ManifestStatus,
}

impl ExportInventory {
    /// Manifest entry for an output file, if the manifest is valid and lists it.
    pub fn record_for(&self, output_filename: &str) -> Option<&GalleryEntry> {
        match &self.manifest {
            ManifestStatus::Valid(manifest) => manifest.entry(output_filename),
            _ => None,
        }
    }

    /// Image files on disk that the manifest does not list.
    pub fn unlisted_files(&self) -> Vec<&str> {
        match &self.manifest {
            ManifestStatus::Valid(manifest) => self
                .image_files
                .iter()
                .filter(|name| manifest.entry(name).is_none())
                .map(String::as_str)
                .collect(),
            _ => Vec::new(),
        }
    }
}

pub fn inspect_export(output_dir: &Path) -> Result<ExportInventory, InspectError> {
    let dir = exported_dir(output_dir);
    if !dir.is_dir() {
        return Ok(ExportInventory {
            exported_dir: dir,
            exists: false,
            image_files: Vec::new(),
            manifest: ManifestStatus::Missing,
        });
    }

    let mut image_files = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_webp = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(OUTPUT_EXTENSION));
        if entry.file_type()?.is_file() && is_webp {
            image_files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    image_files.sort();

    let manifest_path = dir.join(MANIFEST_FILENAME);
    let manifest = if !manifest_path.exists() {
        ManifestStatus::Missing
    } else {
        match read_manifest(&manifest_path) {
            Ok(manifest) => ManifestStatus::Valid(manifest),
            Err(e) => {
                log::debug!("unreadable manifest {}: {e}", manifest_path.display());
                ManifestStatus::Invalid(e.to_string())
            }
        }
    };

    Ok(ExportInventory {
        exported_dir: dir,
        exists: true,
        image_files,
        manifest,
    })
}
