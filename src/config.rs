//! Job configuration.
//!
//! A [`JobConfig`] describes one batch run: encoding quality, optional resize,
//! output naming, the output directory and an optional API base URL recorded
//! into manifest links. It can be loaded from a TOML file, merged over the
//! stock defaults, and is always validated before any image is touched.
//!
//! ## Config File
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! quality = 90                   # WebP lossy quality (1-100)
//! output_dir = "output"          # Outputs land in <output_dir>/exported/
//! # api_base_url = "https://cdn.example.com/gallery"
//!
//! [naming]
//! # prefix = "shot"             # -> shot-1.webp, shot-2.webp, ...
//!
//! # [resize]
//! # width = 1600
//! # height = 1200
//! # lock_aspect = true          # with the lock on, give only one axis
//!
//! [processing]
//! # max_processes = 4           # omit for auto = CPU cores
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::naming::NamingScheme;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("quality must be between 1 and 100, got {0}")]
    Quality(u32),
    #[error("invalid resize settings: {0}")]
    Resize(String),
    #[error("invalid naming settings: {0}")]
    Naming(String),
    #[error("Config validation error: {0}")]
    Validation(String),
}

pub const DEFAULT_QUALITY: u32 = 90;

/// Configuration for a single batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    /// WebP lossy quality, 1 (smallest) to 100 (best).
    pub quality: u32,
    /// Base output directory; files are written to `<output_dir>/exported/`.
    pub output_dir: PathBuf,
    /// Base URL prefixed to each output filename to build manifest links.
    pub api_base_url: Option<String>,
    /// Output filename scheme.
    pub naming: NamingConfig,
    /// Resize settings. Absent means no geometry change.
    pub resize: Option<ResizeConfig>,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            output_dir: PathBuf::from("output"),
            api_base_url: None,
            naming: NamingConfig::default(),
            resize: None,
            processing: ProcessingConfig::default(),
        }
    }
}

impl JobConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.quality) {
            return Err(ConfigError::Quality(self.quality));
        }
        if let Some(resize) = &self.resize {
            resize.validate()?;
        }
        if let Some(prefix) = &self.naming.prefix
            && prefix.contains(['/', '\\'])
        {
            return Err(ConfigError::Naming(format!(
                "prefix must not contain path separators: {prefix:?}"
            )));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The naming scheme implied by `naming.prefix`.
    pub fn naming_scheme(&self) -> NamingScheme {
        self.naming.scheme()
    }

    /// The API base URL, treating blank strings as unset.
    pub fn api_base_url(&self) -> Option<&str> {
        self.api_base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Output naming settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamingConfig {
    /// Custom prefix. Absent or blank keeps the source file stem.
    pub prefix: Option<String>,
}

impl NamingConfig {
    pub fn scheme(&self) -> NamingScheme {
        match self.prefix.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => NamingScheme::Custom(prefix.to_string()),
            _ => NamingScheme::Original,
        }
    }
}

/// Resize constraints.
///
/// - `lock_aspect = false`: output is exactly `width` x `height`; a missing
///   axis keeps the source size on that axis.
/// - `lock_aspect = true`: give exactly one axis; the other is derived from
///   the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResizeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default = "default_lock_aspect")]
    pub lock_aspect: bool,
}

fn default_lock_aspect() -> bool {
    true
}

impl ResizeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.width, self.height) {
            (None, None) => Err(ConfigError::Resize(
                "provide at least width or height when resize is enabled".into(),
            )),
            (Some(0), _) | (_, Some(0)) => Err(ConfigError::Resize(
                "width and height must be greater than zero".into(),
            )),
            (Some(_), Some(_)) if self.lock_aspect => Err(ConfigError::Resize(
                "with aspect lock enabled, specify only width or only height".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(JobConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<JobConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: JobConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load a job config from a TOML file, or the stock defaults when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<JobConfig, ConfigError> {
    let overlay = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        }
        None => None,
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# WebP Gallery Configuration
# ==========================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# WebP lossy quality: 1 = smallest file, 100 = best quality.
quality = 90

# Base output directory. Converted images and gallery-data.json are
# written to <output_dir>/exported/, which is created if missing.
output_dir = "output"

# Base URL used to build a "link" for every manifest entry:
#   <api_base_url>/<output filename>
# api_base_url = "https://cdn.example.com/gallery"

# ---------------------------------------------------------------------------
# Output naming
# ---------------------------------------------------------------------------
[naming]
# Without a prefix, outputs keep the source stem (IMG_0001.jpg -> IMG_0001.webp).
# With a prefix, outputs are numbered in input order: shot-1.webp, shot-2.webp...
# prefix = "shot"

# ---------------------------------------------------------------------------
# Resize (omit the whole section to keep source dimensions)
# ---------------------------------------------------------------------------
# [resize]
# width = 1600
# height = 1200
# With lock_aspect = true, give only one of width/height; the other axis
# is derived from the source aspect ratio.
# lock_aspect = true

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
