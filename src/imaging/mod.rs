//! Image processing: pure Rust decode, libwebp lossy encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **EXIF** | container sniffing here, TIFF parsing by `exif` (kamadak-exif) |
//! | **Resize** | `resize_exact` with Lanczos3 |
//! | **Encode → WebP** | `webp::Encoder` (lossy) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing a transcode
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **EXIF container**: Locating the raw EXIF block inside each input format

pub mod backend;
pub mod calculations;
pub mod exif_container;
pub mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, Transcoded};
pub use calculations::{ResizePlan, plan_resize};
pub use params::{Quality, TranscodeParams};
pub use rust_backend::RustBackend;
