//! Pure calculation functions for output geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use crate::config::ResizeConfig;
use crate::types::Dimensions;

/// What the transcoder should do with the source geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Encode at the source dimensions.
    Passthrough,
    /// Resample to exactly these dimensions before encoding.
    Scale(Dimensions),
}

impl ResizePlan {
    /// Dimensions the output will have for a source of `source` size.
    pub fn target(&self, source: Dimensions) -> Dimensions {
        match self {
            Self::Passthrough => source,
            Self::Scale(dims) => *dims,
        }
    }
}

/// Plan the output geometry for one source.
///
/// - no resize config → [`ResizePlan::Passthrough`]
/// - `lock_aspect` → scale factor from the supplied axis, applied to the other
///   axis and rounded to the nearest pixel (never below 1)
/// - unlocked → the given width/height verbatim; a missing axis keeps the
///   source size on that axis
///
/// The config is expected to have passed [`ResizeConfig::validate`]. A plan that
/// lands on the source size is reported as passthrough.
///
/// # Examples
/// ```
/// # use webp_gallery::config::ResizeConfig;
/// # use webp_gallery::imaging::{plan_resize, ResizePlan};
/// # use webp_gallery::types::Dimensions;
/// let resize = ResizeConfig { width: Some(1000), height: None, lock_aspect: true };
/// let plan = plan_resize(Some(&resize), Dimensions::new(4000, 3000));
/// assert_eq!(plan, ResizePlan::Scale(Dimensions::new(1000, 750)));
/// ```
pub fn plan_resize(resize: Option<&ResizeConfig>, source: Dimensions) -> ResizePlan {
    let Some(resize) = resize else {
        return ResizePlan::Passthrough;
    };

    let target = if resize.lock_aspect {
        match (resize.width, resize.height) {
            (Some(w), _) => Dimensions::new(w, scale_axis(source.height, w, source.width)),
            (None, Some(h)) => Dimensions::new(scale_axis(source.width, h, source.height), h),
            (None, None) => source,
        }
    } else {
        Dimensions::new(
            resize.width.unwrap_or(source.width),
            resize.height.unwrap_or(source.height),
        )
    };

    let target = Dimensions::new(target.width.max(1), target.height.max(1));
    if target == source {
        ResizePlan::Passthrough
    } else {
        ResizePlan::Scale(target)
    }
}

/// Scale `other` by `requested / reference`, rounded, minimum 1.
fn scale_axis(other: u32, requested: u32, reference: u32) -> u32 {
    if reference == 0 {
        return 1;
    }
    let factor = requested as f64 / reference as f64;
    ((other as f64 * factor).round() as u32).max(1)
}
