//! Parameter types for the transcoder.
//!
//! These describe *what* to produce, not *how*. The orchestrator fills them in
//! and hands them to an [`ImageBackend`](super::backend::ImageBackend), which
//! does the pixel work. Keeping them plain data lets tests drive the pipeline
//! with a mock backend.

use super::calculations::ResizePlan;
use crate::types::SourceImage;

/// Lossy WebP quality (1-100). Clamped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Quality as the encoder's float scale (same numeric value).
    pub fn as_encoder_factor(self) -> f32 {
        self.0 as f32
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(crate::config::DEFAULT_QUALITY)
    }
}

/// Everything needed to transcode one source image.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeParams<'a> {
    pub source: &'a SourceImage,
    /// Raw file contents of the source.
    pub bytes: &'a [u8],
    pub plan: ResizePlan,
    pub quality: Quality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn encoder_factor_is_unscaled() {
        assert_eq!(Quality::new(75).as_encoder_factor(), 75.0);
    }
}
