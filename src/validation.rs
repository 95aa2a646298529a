//! Pre-flight validation.
//!
//! Runs before anything is decoded or written. Given the planned output names
//! and the current contents of `<output_dir>/exported/`, it reports:
//!
//! - whether `gallery-data.json` already exists there,
//! - planned names shared by two or more sources (compared case-sensitively),
//! - planned names that already exist on disk and would be overwritten.
//!
//! Any of these is a conflict the caller must explicitly override. Sources
//! with an unsupported extension are a hard error instead: the batch cannot
//! start until the input list is fixed.
//!
//! [`detect_conflicts`] is a pure function over an in-memory listing;
//! [`preflight`] reads the directory and delegates to it.

use crate::config::JobConfig;
use crate::manifest::{MANIFEST_FILENAME, exported_dir};
use crate::naming::resolve_output_names;
use crate::types::SourceFormat;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no source images given")]
    NoSources,
    #[error("unsupported input files: {}", display_paths(.0))]
    UnsupportedInput(Vec<PathBuf>),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// An output name claimed by more than one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateName {
    pub output_filename: String,
    pub sources: Vec<PathBuf>,
}

/// Conflicts found before a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub manifest_exists: bool,
    pub duplicates: Vec<DuplicateName>,
    pub existing_outputs: Vec<String>,
}

impl ValidationReport {
    pub fn has_conflicts(&self) -> bool {
        self.manifest_exists || !self.duplicates.is_empty() || !self.existing_outputs.is_empty()
    }
}

/// Outcome of pre-flight validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preflight {
    Clear,
    Conflict(ValidationReport),
}

/// Everything a batch needs to know about its inputs once validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedBatch {
    pub sources: Vec<PathBuf>,
    pub output_names: Vec<String>,
    pub preflight: Preflight,
}

/// Reject sources whose extension is not a supported input format.
pub fn check_extensions(sources: &[PathBuf]) -> Result<(), ValidationError> {
    if sources.is_empty() {
        return Err(ValidationError::NoSources);
    }
    let unsupported: Vec<PathBuf> = sources
        .iter()
        .filter(|p| SourceFormat::from_path(p).is_none())
        .cloned()
        .collect();
    if unsupported.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedInput(unsupported))
    }
}

/// Compare planned outputs against an existing directory listing.
///
/// `planned` pairs each source with its resolved output name, in input order.
pub fn detect_conflicts(
    planned: &[(&Path, &str)],
    existing: &BTreeSet<String>,
) -> ValidationReport {
    let mut claims: BTreeMap<&str, Vec<PathBuf>> = BTreeMap::new();
    for (source, name) in planned {
        claims.entry(name).or_default().push(source.to_path_buf());
    }

    let duplicates = claims
        .iter()
        .filter(|(_, sources)| sources.len() > 1)
        .map(|(name, sources)| DuplicateName {
            output_filename: name.to_string(),
            sources: sources.clone(),
        })
        .collect();

    let existing_outputs = claims
        .keys()
        .filter(|name| existing.contains(**name))
        .map(|name| name.to_string())
        .collect();

    ValidationReport {
        manifest_exists: existing.contains(MANIFEST_FILENAME),
        duplicates,
        existing_outputs,
    }
}

/// Names of every entry directly inside `dir`, whatever its type (files,
/// directories, symlinks including dangling ones). A missing directory is empty.
pub fn list_existing(dir: &Path) -> Result<BTreeSet<String>, ValidationError> {
    let mut names = BTreeSet::new();
    if !dir.is_dir() {
        return Ok(names);
    }
    for entry in std::fs::read_dir(dir)? {
        names.insert(entry?.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Validate a batch before it runs. Has no side effects.
pub fn preflight(config: &JobConfig, sources: &[PathBuf]) -> Result<PlannedBatch, ValidationError> {
    check_extensions(sources)?;

    let output_names = resolve_output_names(sources, &config.naming_scheme());
    let existing = list_existing(&exported_dir(&config.output_dir))?;
    let planned: Vec<(&Path, &str)> = sources
        .iter()
        .map(PathBuf::as_path)
        .zip(output_names.iter().map(String::as_str))
        .collect();

    let report = detect_conflicts(&planned, &existing);
    let preflight = if report.has_conflicts() {
        log::debug!("pre-flight found conflicts: {report:?}");
        Preflight::Conflict(report)
    } else {
        Preflight::Clear
    };

    Ok(PlannedBatch {
        sources: sources.to_vec(),
        output_names,
        preflight,
    })
}
