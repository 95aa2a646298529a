//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the pipeline needs:
//! identify (read dimensions without a full decode where possible) and
//! transcode (decode, optionally resample, encode as lossy WebP).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Backends work on bytes
//! already read from disk; writing the result is the orchestrator's job, so a
//! backend error is always scoped to one image.

use super::params::TranscodeParams;
use crate::types::Dimensions;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("failed to encode {}: {reason}", path.display())]
    Encode { path: PathBuf, reason: String },
}

/// Encoded output of a transcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcoded {
    pub data: Vec<u8>,
    pub dimensions: Dimensions,
}

/// Trait for image processing backends.
///
/// `Sync` so one backend can be shared by every worker in the pool.
pub trait ImageBackend: Sync {
    /// Read pixel dimensions from the encoded bytes of `path`.
    fn identify(&self, path: &Path, bytes: &[u8]) -> Result<Dimensions, BackendError>;

    /// Decode, apply the resize plan, and encode as lossy WebP.
    fn transcode(&self, params: &TranscodeParams) -> Result<Transcoded, BackendError>;
}
