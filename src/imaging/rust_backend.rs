//! Pure Rust decode + libwebp lossy encode.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Decode (JPEG, PNG, TIFF, BMP, WebP) | `image` crate decoders, format sniffed from content |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → WebP | `webp::Encoder::encode_simple` (lossy, quality 1-100) |
//!
//! The `image` crate's own WebP encoder is lossless only, so encoding goes
//! through `webp` on the raw RGB/RGBA buffer.

use super::backend::{BackendError, ImageBackend, Transcoded};
use super::calculations::ResizePlan;
use super::params::TranscodeParams;
use crate::types::Dimensions;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// Largest width or height libwebp accepts.
pub const WEBP_MAX_DIMENSION: u32 = 16383;

/// Backend built on `image` for decoding and `webp` for encoding.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn reader<'a>(path: &Path, bytes: &'a [u8]) -> Result<ImageReader<Cursor<&'a [u8]>>, BackendError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| decode_error(path, e))
}

fn decode_error(path: &Path, reason: impl std::fmt::Display) -> BackendError {
    BackendError::Decode {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn encode_error(path: &Path, reason: impl std::fmt::Display) -> BackendError {
    BackendError::Encode {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Decode the full image from memory.
fn load_image(path: &Path, bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    reader(path, bytes)?
        .decode()
        .map_err(|e| decode_error(path, e))
}

fn apply_plan(img: DynamicImage, plan: ResizePlan) -> DynamicImage {
    match plan {
        ResizePlan::Passthrough => img,
        ResizePlan::Scale(dims) if dims.width == img.width() && dims.height == img.height() => img,
        ResizePlan::Scale(dims) => img.resize_exact(dims.width, dims.height, FilterType::Lanczos3),
    }
}

/// Encode as lossy WebP. Images with an alpha channel keep it.
fn encode_webp(img: &DynamicImage, path: &Path, quality: f32) -> Result<Vec<u8>, BackendError> {
    let (width, height) = (img.width(), img.height());
    if width > WEBP_MAX_DIMENSION || height > WEBP_MAX_DIMENSION {
        return Err(encode_error(
            path,
            format!("{width}x{height} exceeds the WebP limit of {WEBP_MAX_DIMENSION}px per side"),
        ));
    }

    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), width, height)
            .encode_simple(false, quality)
            .map_err(|e| encode_error(path, format!("{e:?}")))?
            .to_vec()
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), width, height)
            .encode_simple(false, quality)
            .map_err(|e| encode_error(path, format!("{e:?}")))?
            .to_vec()
    };
    Ok(encoded)
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path, bytes: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = reader(path, bytes)?
            .into_dimensions()
            .map_err(|e| decode_error(path, e))?;
        Ok(Dimensions { width, height })
    }

    fn transcode(&self, params: &TranscodeParams) -> Result<Transcoded, BackendError> {
        let path = params.source.path.as_path();
        let img = apply_plan(load_image(path, params.bytes)?, params.plan);
        let dimensions = Dimensions::new(img.width(), img.height());
        let data = encode_webp(&img, path, params.quality.as_encoder_factor())?;
        Ok(Transcoded { data, dimensions })
    }
}
