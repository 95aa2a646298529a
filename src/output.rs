//! CLI output formatting for batch runs, pre-flight reports and inspection.
//!
//! # Output Format
//!
//! ## Convert
//!
//! ```text
//! ==> Validating
//! ==> Converting
//! 001 IMG_0001.jpg → shot-1.webp
//!     2.00 MB → 512.00 KB
//! 002 broken.jpg → shot-2.webp
//!     Failed: failed to decode broken.jpg: ...
//! ==> Completed
//! Done. Converted: 1/2. Failed: 1. Compression: 75.00% (2.00 MB → 512.00 KB). JSON: gallery-data.json
//! ```
//!
//! ## Check
//!
//! ```text
//! Conflicts
//!     gallery-data.json already exists
//!     a.webp ← a.jpg, a.png
//!     shot-1.webp already exists
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions do no I/O.

use crate::inspect::{ExportInventory, ManifestStatus};
use crate::manifest::{MANIFEST_FILENAME, Stats};
use crate::process::{AbortReason, BatchResult, BatchState, BatchStatus, ProcessEvent};
use crate::types::{ConversionOutcome, file_name_of};
use crate::validation::{PlannedBatch, ValidationReport};

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable size with two decimals, 1024 base.
///
/// ```
/// # use webp_gallery::output::format_bytes;
/// assert_eq!(format_bytes(512), "512.00 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

// ============================================================================
// Convert
// ============================================================================

pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::StateChanged(state) => match state {
            BatchState::Idle => Vec::new(),
            BatchState::Validating => vec!["==> Validating".to_string()],
            BatchState::Running => vec!["==> Converting".to_string()],
            BatchState::Completed => vec!["==> Completed".to_string()],
            BatchState::Aborted => vec!["==> Aborted".to_string()],
        },
        ProcessEvent::ImageProcessed {
            index,
            source,
            output_filename,
            outcome,
            ..
        } => {
            let header = format!(
                "{} {} → {}",
                format_index(index + 1),
                file_name_of(source),
                output_filename
            );
            let detail = match outcome {
                ConversionOutcome::Success {
                    before_bytes,
                    after_bytes,
                    ..
                } => format!(
                    "{}{} → {}",
                    indent(1),
                    format_bytes(*before_bytes),
                    format_bytes(*after_bytes)
                ),
                ConversionOutcome::Failure { reason } => {
                    format!("{}Failed: {}", indent(1), reason)
                }
            };
            vec![header, detail]
        }
    }
}

/// The one-line batch summary.
pub fn format_summary(stats: &Stats, total: usize, manifest_written: bool) -> String {
    let mut line = format!(
        "Done. Converted: {}/{}. Failed: {}. Compression: {:.2}% ({} → {}).",
        stats.success_count,
        total,
        stats.failure_count,
        stats.compression_ratio * 100.0,
        format_bytes(stats.total_before_bytes),
        format_bytes(stats.total_after_bytes),
    );
    if manifest_written {
        line.push_str(&format!(" JSON: {MANIFEST_FILENAME}"));
    }
    line
}

/// Summary plus the abort reason, if any.
pub fn format_batch_result(result: &BatchResult, total: usize) -> Vec<String> {
    let mut lines = Vec::new();
    match &result.status {
        BatchStatus::Completed => {}
        BatchStatus::Aborted(AbortReason::Cancelled) => {
            lines.push(format!(
                "Cancelled after {} of {} images",
                result.images.len(),
                total
            ));
        }
        BatchStatus::Aborted(AbortReason::Fatal { path, reason }) => {
            lines.push(format!("Aborted: {}: {}", path.display(), reason));
        }
    }
    lines.push(format_summary(
        &result.stats,
        total,
        result.manifest_path.is_some(),
    ));
    lines
}

pub fn print_batch_result(result: &BatchResult, total: usize) {
    for line in format_batch_result(result, total) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Source → output name for every planned conversion.
pub fn format_plan(planned: &PlannedBatch) -> Vec<String> {
    planned
        .sources
        .iter()
        .zip(&planned.output_names)
        .enumerate()
        .map(|(i, (source, name))| {
            format!("{} {} → {}", format_index(i + 1), file_name_of(source), name)
        })
        .collect()
}

pub fn print_plan(planned: &PlannedBatch) {
    for line in format_plan(planned) {
        println!("{}", line);
    }
}

pub fn format_validation_report(report: &ValidationReport) -> Vec<String> {
    if !report.has_conflicts() {
        return vec!["No conflicts".to_string()];
    }

    let mut lines = vec!["Conflicts".to_string()];
    if report.manifest_exists {
        lines.push(format!("{}{} already exists", indent(1), MANIFEST_FILENAME));
    }
    for dup in &report.duplicates {
        let sources: Vec<String> = dup.sources.iter().map(|p| file_name_of(p)).collect();
        lines.push(format!(
            "{}{} ← {}",
            indent(1),
            dup.output_filename,
            sources.join(", ")
        ));
    }
    for name in &report.existing_outputs {
        lines.push(format!("{}{} already exists", indent(1), name));
    }
    lines
}

pub fn print_validation_report(report: &ValidationReport) {
    for line in format_validation_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Inspect
// ============================================================================

pub fn format_inventory(inventory: &ExportInventory) -> Vec<String> {
    let mut lines = vec![format!("Export: {}", inventory.exported_dir.display())];
    if !inventory.exists {
        lines.push(format!("{}(does not exist)", indent(1)));
        return lines;
    }

    match &inventory.manifest {
        ManifestStatus::Missing => {
            lines.push(format!("{}Manifest: missing", indent(1)));
        }
        ManifestStatus::Invalid(reason) => {
            lines.push(format!("{}Manifest: invalid ({})", indent(1), reason));
        }
        ManifestStatus::Valid(manifest) => {
            lines.push(format!(
                "{}Manifest: {} images, {} failed",
                indent(1),
                manifest.stats.success_count,
                manifest.stats.failure_count
            ));
        }
    }

    lines.push(String::new());
    lines.push("Images".to_string());
    for (i, name) in inventory.image_files.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), name));
        if let Some(entry) = inventory.record_for(name) {
            let mut facts = Vec::new();
            if let (Some(w), Some(h)) = (entry.width, entry.height) {
                facts.push(format!("{w}x{h}"));
            }
            if let Some(camera) = &entry.metadata.camera {
                facts.push(camera.clone());
            }
            if let Some(iso) = entry.metadata.iso {
                facts.push(format!("ISO {iso}"));
            }
            if let Some(shutter) = &entry.metadata.shutter_speed {
                facts.push(format!("{shutter}s"));
            }
            if let Some(aperture) = entry.metadata.aperture {
                facts.push(format!("f/{aperture}"));
            }
            if !facts.is_empty() {
                lines.push(format!("{}{}", indent(1), facts.join(" · ")));
            }
        } else if matches!(inventory.manifest, ManifestStatus::Valid(_)) {
            lines.push(format!("{}(not in manifest)", indent(1)));
        }
    }
    lines
}

pub fn print_inventory(inventory: &ExportInventory) {
    for line in format_inventory(inventory) {
        println!("{}", line);
    }
}
