//! # WebP Gallery
//!
//! Batch-converts photographs to lossy WebP and writes a `gallery-data.json`
//! manifest describing every converted image: its exposure data (ISO, shutter
//! speed, aperture, camera, lens, focal length), its output size, and an
//! optional public link.
//!
//! # Architecture: Validate, Convert, Describe
//!
//! A batch moves through three steps, each owned by one module:
//!
//! ```text
//! 1. Validate   config + sources  →  PlannedBatch     (names resolved, conflicts found)
//! 2. Convert    PlannedBatch      →  exported/*.webp  (decode, resize, encode, EXIF)
//! 3. Describe   outcomes          →  gallery-data.json
//! ```
//!
//! Validation has no side effects, so a caller can show the conflict report
//! and ask before anything on disk changes. Output names are fixed in step 1
//! and never depend on the order in which parallel workers finish.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `JobConfig`, TOML loading over stock defaults, validation, worker count |
//! | [`validation`] | Pre-flight check: unsupported inputs, duplicate names, existing output |
//! | [`naming`] | Output filename resolution (`Original` stem or `{prefix}-{n}.webp`) |
//! | [`imaging`] | Resize planning, the [`imaging::ImageBackend`] trait, EXIF block location |
//! | [`metadata`] | Raw EXIF tags → display-ready [`metadata::NormalizedMetadata`] |
//! | [`process`] | Batch state machine, worker pool, progress events, cancellation |
//! | [`manifest`] | Manifest building, statistics, `gallery-data.json` read/write |
//! | [`inspect`] | Read-back of an existing export folder |
//! | [`types`] | Shared value types (`SourceFormat`, `Dimensions`, `ConversionOutcome`) |
//! | [`output`] | CLI output formatting: pure `format_*` functions |
//!
//! # Design Decisions
//!
//! ## Failure Isolation
//!
//! One broken photo never sinks a batch. Decode and encode errors become a
//! `Failure` outcome for that image and the batch moves on. Only errors that
//! make every later write pointless (unwritable output directory, full disk)
//! abort, and even then the outcomes recorded so far are returned.
//!
//! ## Pure-Rust Decoding, libwebp Encoding
//!
//! Decoding and resampling use the `image` crate (Lanczos3). The `image`
//! crate only writes lossless WebP, so lossy encoding goes through the `webp`
//! crate's libwebp bindings on the raw pixel buffer.
//!
//! ## Manifest Lists Successes Only
//!
//! A consumer of `gallery-data.json` can trust that every entry's file
//! exists. Failed sources appear only in `stats.failureCount`.

pub mod config;
pub mod imaging;
pub mod inspect;
pub mod manifest;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod process;
pub mod types;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_helpers;
