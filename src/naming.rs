//! Output filename resolution.
//!
//! Every source maps to exactly one output name, computed from the input list
//! alone so names are predictable before any image is decoded:
//!
//! - [`NamingScheme::Original`]: source stem + `.webp`
//!   (`IMG_0001.JPG` → `IMG_0001.webp`)
//! - [`NamingScheme::Custom`]: `{prefix}-{n}.webp` where `n` is the 1-based
//!   position in the input list (`shot-1.webp`, `shot-2.webp`, ...)
//!
//! The counter is positional, so an image that later fails conversion still
//! consumes its number and later outputs keep theirs.

use std::path::{Path, PathBuf};

/// Extension of every output file.
pub const OUTPUT_EXTENSION: &str = "webp";

/// How output filenames are derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamingScheme {
    Original,
    Custom(String),
}

/// Output filename for the source at 1-based `position` in the batch.
pub fn output_name(source: &Path, scheme: &NamingScheme, position: usize) -> String {
    match scheme {
        NamingScheme::Original => {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{stem}.{OUTPUT_EXTENSION}")
        }
        NamingScheme::Custom(prefix) => format!("{prefix}-{position}.{OUTPUT_EXTENSION}"),
    }
}

/// Resolve output names for a whole batch, in input order.
pub fn resolve_output_names(sources: &[PathBuf], scheme: &NamingScheme) -> Vec<String> {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| output_name(source, scheme, i + 1))
        .collect()
}
