//! Batch conversion.
//!
//! Takes a list of source photos and a [`JobConfig`], converts every source to
//! lossy WebP under `<output_dir>/exported/`, and finishes with
//! `gallery-data.json` next to the outputs.
//!
//! ## States
//!
//! ```text
//! Idle → Validating → Running → Completed
//!             │           │
//!             └───────────┴──→ Aborted
//! ```
//!
//! - **Idle**: the batch before [`run_batch`] is called. It is a state a
//!   caller can hold while nothing runs, so it is never sent as a
//!   [`ProcessEvent`].
//! - **Validating**: config validation and the pre-flight check. A conflict
//!   aborts unless the caller passed `overwrite`.
//! - **Running**: sources are converted. A decode or encode failure is
//!   recorded as a [`ConversionOutcome::Failure`] and the batch moves on. A
//!   failed output write (unwritable directory, full disk) is fatal: nothing
//!   further is dispatched and the batch aborts with earlier outcomes intact.
//! - **Completed**: every source has an outcome and the manifest was written.
//!
//! ## Parallel processing
//!
//! Output names are resolved for the whole batch before any work is
//! dispatched, so they never depend on completion order. Workers on a
//! [rayon](https://docs.rs/rayon) pool claim source indices from a shared
//! cursor and send results back to the calling thread, which buffers them and
//! releases them strictly in input order. Progress events, statistics and the
//! final image list are all produced from that ordered stream.
//!
//! ## Cancellation
//!
//! [`CancelToken::cancel`] stops workers from claiming new sources. Images
//! already in flight finish and are reported; the batch then ends as
//! `Aborted(Cancelled)` without writing a manifest.

use crate::config::{ConfigError, JobConfig, ResizeConfig, effective_threads};
use crate::imaging::{ImageBackend, Quality, RustBackend, TranscodeParams, plan_resize};
use crate::manifest::{
    GalleryManifest, MANIFEST_FILENAME, Stats, StatsAccumulator, build_manifest, exported_dir,
    write_manifest,
};
use crate::metadata::{NormalizedMetadata, extract_metadata};
use crate::types::{ConversionOutcome, ProcessedImage, SourceFormat, SourceImage};
use crate::validation::{PlannedBatch, Preflight, ValidationError, ValidationReport, preflight};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Sender, channel};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("pre-flight conflicts (use --overwrite to replace existing output)")]
    Conflict(ValidationReport),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Lifecycle of one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// A batch that has not been started. Never emitted as an event: the
    /// first event of every run is `Validating`.
    Idle,
    Validating,
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Progress events, delivered in input order on the calling thread.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    StateChanged(BatchState),
    ImageProcessed {
        /// 0-based position in the input list.
        index: usize,
        total: usize,
        source: PathBuf,
        output_filename: String,
        outcome: ConversionOutcome,
        /// Totals including this image.
        running: Stats,
    },
}

/// Shared flag the caller flips to stop a running batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Caller-side controls for a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchControl {
    /// Proceed even when the pre-flight check reports conflicts.
    pub overwrite: bool,
    pub cancel: CancelToken,
    pub events: Option<Sender<ProcessEvent>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    Cancelled,
    Fatal { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Completed,
    Aborted(AbortReason),
}

/// A source that produced no output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSource {
    pub source: PathBuf,
    pub reason: String,
}

/// Everything a batch run produced.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub status: BatchStatus,
    /// Outcomes in input order; on abort, only those completed before it.
    pub images: Vec<ProcessedImage>,
    /// Present only when the batch completed.
    pub manifest: Option<GalleryManifest>,
    pub manifest_path: Option<PathBuf>,
    pub stats: Stats,
    pub failures: Vec<FailedSource>,
}

impl BatchResult {
    pub fn is_completed(&self) -> bool {
        self.status == BatchStatus::Completed
    }
}

/// What a worker sends back for one source.
enum ItemResult {
    Done(ProcessedImage),
    Fatal { path: PathBuf, reason: String },
}

/// Read-only context shared by every worker.
struct BatchJob<'a, B: ImageBackend> {
    backend: &'a B,
    sources: &'a [PathBuf],
    output_names: &'a [String],
    exported: &'a Path,
    quality: Quality,
    resize: Option<&'a ResizeConfig>,
}

/// Convert a batch with the production backend.
pub fn run_batch(
    sources: &[PathBuf],
    config: &JobConfig,
    control: BatchControl,
) -> Result<BatchResult, ProcessError> {
    let backend = RustBackend::new();
    run_batch_with_backend(&backend, sources, config, control)
}

/// Convert a batch using a specific backend (allows testing with mock).
pub fn run_batch_with_backend(
    backend: &impl ImageBackend,
    sources: &[PathBuf],
    config: &JobConfig,
    control: BatchControl,
) -> Result<BatchResult, ProcessError> {
    let emit = |event: ProcessEvent| {
        if let Some(tx) = &control.events {
            // Progress is advisory; a dropped receiver doesn't stop the batch.
            let _ = tx.send(event);
        }
    };

    emit(ProcessEvent::StateChanged(BatchState::Validating));
    let planned = match validate(config, sources) {
        Ok(planned) => planned,
        Err(e) => {
            emit(ProcessEvent::StateChanged(BatchState::Aborted));
            return Err(e);
        }
    };
    if let Preflight::Conflict(report) = planned.preflight {
        if !control.overwrite {
            emit(ProcessEvent::StateChanged(BatchState::Aborted));
            return Err(ProcessError::Conflict(report));
        }
        log::warn!("overwriting existing output in {}", config.output_dir.display());
    }

    emit(ProcessEvent::StateChanged(BatchState::Running));
    let exported = exported_dir(&config.output_dir);
    if let Err(e) = std::fs::create_dir_all(&exported) {
        emit(ProcessEvent::StateChanged(BatchState::Aborted));
        return Ok(aborted_before_start(&exported, e));
    }

    let job = BatchJob {
        backend,
        sources: &planned.sources,
        output_names: &planned.output_names,
        exported: &exported,
        quality: Quality::new(config.quality),
        resize: config.resize.as_ref(),
    };
    let threads = effective_threads(&config.processing).min(sources.len()).max(1);
    log::info!("converting {} images on {threads} threads", sources.len());

    let (images, fatal) = run_pool(&job, threads, &control.cancel, &emit)?;
    let stats = running_stats(&images);

    let mut status = match fatal {
        Some((path, reason)) => BatchStatus::Aborted(AbortReason::Fatal { path, reason }),
        None if images.len() < sources.len() => BatchStatus::Aborted(AbortReason::Cancelled),
        None => BatchStatus::Completed,
    };

    let mut manifest = None;
    let mut manifest_path = None;
    if status == BatchStatus::Completed {
        let built = build_manifest(&images, config.api_base_url());
        match write_manifest(&exported, &built) {
            Ok(path) => {
                manifest_path = Some(path);
                manifest = Some(built);
            }
            Err(e) => {
                status = BatchStatus::Aborted(AbortReason::Fatal {
                    path: exported.join(MANIFEST_FILENAME),
                    reason: e.to_string(),
                });
            }
        }
    }

    match &status {
        BatchStatus::Completed => emit(ProcessEvent::StateChanged(BatchState::Completed)),
        BatchStatus::Aborted(reason) => {
            log::warn!("batch aborted: {reason:?}");
            emit(ProcessEvent::StateChanged(BatchState::Aborted));
        }
    }

    Ok(BatchResult {
        status,
        failures: collect_failures(&images),
        images,
        manifest,
        manifest_path,
        stats,
    })
}

fn validate(
    config: &JobConfig,
    sources: &[PathBuf],
) -> Result<PlannedBatch, ProcessError> {
    config.validate()?;
    Ok(preflight(config, sources)?)
}

fn aborted_before_start(exported: &Path, err: std::io::Error) -> BatchResult {
    BatchResult {
        status: BatchStatus::Aborted(AbortReason::Fatal {
            path: exported.to_path_buf(),
            reason: err.to_string(),
        }),
        images: Vec::new(),
        manifest: None,
        manifest_path: None,
        stats: Stats::default(),
        failures: Vec::new(),
    }
}

fn running_stats(images: &[ProcessedImage]) -> Stats {
    let mut acc = StatsAccumulator::new();
    for image in images {
        acc.record(&image.outcome);
    }
    acc.snapshot()
}

fn collect_failures(images: &[ProcessedImage]) -> Vec<FailedSource> {
    images
        .iter()
        .filter_map(|image| match &image.outcome {
            ConversionOutcome::Failure { reason } => Some(FailedSource {
                source: image.source.clone(),
                reason: reason.clone(),
            }),
            ConversionOutcome::Success { .. } => None,
        })
        .collect()
}

/// Run workers on a dedicated pool and release their results in input order.
///
/// Returns the released images and, if the batch hit a fatal error, its path
/// and reason. Results after the fatal index are discarded and their output
/// files removed.
#[allow(clippy::type_complexity)]
fn run_pool<B: ImageBackend>(
    job: &BatchJob<'_, B>,
    threads: usize,
    cancel: &CancelToken,
    emit: &dyn Fn(ProcessEvent),
) -> Result<(Vec<ProcessedImage>, Option<(PathBuf, String)>), ProcessError> {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    let total = job.sources.len();
    let cursor = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    let (tx, rx) = channel::<(usize, ItemResult)>();

    let cursor = &cursor;
    let stop = &stop;

    let collected = pool.in_place_scope(move |scope| {
        for _ in 0..threads {
            let tx = tx.clone();
            scope.spawn(move |_| {
                loop {
                    if stop.load(Ordering::SeqCst) || cancel.is_cancelled() {
                        break;
                    }
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    if index >= total {
                        break;
                    }
                    let result = process_one(job, index);
                    if matches!(result, ItemResult::Fatal { .. }) {
                        stop.store(true, Ordering::SeqCst);
                    }
                    if tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut acc = StatsAccumulator::new();
        let mut pending: BTreeMap<usize, ItemResult> = BTreeMap::new();
        let mut released = Vec::new();
        let mut fatal = None;

        for (index, result) in rx {
            if fatal.is_some() {
                discard(result);
                continue;
            }
            pending.insert(index, result);

            while let Some(result) = pending.remove(&released.len()) {
                match result {
                    ItemResult::Done(image) => {
                        acc.record(&image.outcome);
                        emit(ProcessEvent::ImageProcessed {
                            index: image.index,
                            total,
                            source: image.source.clone(),
                            output_filename: image.output_filename.clone(),
                            outcome: image.outcome.clone(),
                            running: acc.snapshot(),
                        });
                        released.push(image);
                    }
                    ItemResult::Fatal { path, reason } => {
                        log::error!("fatal: {}: {reason}", path.display());
                        fatal = Some((path, reason));
                        break;
                    }
                }
            }

            if fatal.is_some() {
                for (_, result) in std::mem::take(&mut pending) {
                    discard(result);
                }
            }
        }

        (released, fatal)
    });

    Ok(collected)
}

/// Remove the output of a result that will not be reported.
fn discard(result: ItemResult) {
    if let ItemResult::Done(ProcessedImage {
        outcome: ConversionOutcome::Success { output_path, .. },
        ..
    }) = result
    {
        let _ = std::fs::remove_file(output_path);
    }
}

/// Convert one source. Only a failed output write is fatal.
fn process_one<B: ImageBackend>(job: &BatchJob<'_, B>, index: usize) -> ItemResult {
    let source = &job.sources[index];
    let output_filename = &job.output_names[index];

    let failure = |reason: String| {
        log::warn!("{}: {reason}", source.display());
        ItemResult::Done(ProcessedImage {
            index,
            source: source.clone(),
            output_filename: output_filename.clone(),
            outcome: ConversionOutcome::Failure { reason },
            metadata: NormalizedMetadata::default(),
            output_dimensions: None,
        })
    };

    let bytes = match std::fs::read(source) {
        Ok(bytes) => bytes,
        Err(e) => return failure(format!("cannot read {}: {e}", source.display())),
    };
    let Some(format) = SourceFormat::from_path(source) else {
        return failure(format!("unsupported input {}", source.display()));
    };
    let dimensions = match job.backend.identify(source, &bytes) {
        Ok(dimensions) => dimensions,
        Err(e) => return failure(e.to_string()),
    };

    let image = SourceImage {
        path: source.clone(),
        format,
        byte_size: bytes.len() as u64,
        dimensions,
    };
    let plan = plan_resize(job.resize, dimensions);
    let transcoded = match job.backend.transcode(&TranscodeParams {
        source: &image,
        bytes: &bytes,
        plan,
        quality: job.quality,
    }) {
        Ok(transcoded) => transcoded,
        Err(e) => return failure(e.to_string()),
    };
    let metadata = extract_metadata(&bytes);

    let output_path = job.exported.join(output_filename);
    if let Err(e) = std::fs::write(&output_path, &transcoded.data) {
        let _ = std::fs::remove_file(&output_path);
        return ItemResult::Fatal {
            path: output_path,
            reason: e.to_string(),
        };
    }
    log::debug!(
        "{} → {} ({} → {} bytes)",
        source.display(),
        output_path.display(),
        image.byte_size,
        transcoded.data.len()
    );

    ItemResult::Done(ProcessedImage {
        index,
        source: source.clone(),
        output_filename: output_filename.clone(),
        outcome: ConversionOutcome::Success {
            output_path,
            before_bytes: image.byte_size,
            after_bytes: transcoded.data.len() as u64,
        },
        metadata,
        output_dimensions: Some(transcoded.dimensions),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NamingConfig, ProcessingConfig};
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::imaging::{BackendError, Transcoded};
    use crate::test_helpers::write_file;
    use crate::types::Dimensions;
    use std::fs;
    use tempfile::TempDir;

    fn create_dummy_sources(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| write_file(dir, name, &[7u8; 100]))
            .collect()
    }

    fn config_for(output: &Path) -> JobConfig {
        JobConfig {
            output_dir: output.to_path_buf(),
            ..Default::default()
        }
    }

    fn single_threaded(mut config: JobConfig) -> JobConfig {
        config.processing = ProcessingConfig {
            max_processes: Some(1),
        };
        config
    }

    fn run_collecting(
        backend: &impl ImageBackend,
        sources: &[PathBuf],
        config: &JobConfig,
        overwrite: bool,
        cancel: CancelToken,
    ) -> (Result<BatchResult, ProcessError>, Vec<ProcessEvent>) {
        let (tx, rx) = channel();
        let result = run_batch_with_backend(
            backend,
            sources,
            config,
            BatchControl {
                overwrite,
                cancel,
                events: Some(tx),
            },
        );
        (result, rx.into_iter().collect())
    }

    fn states(events: &[ProcessEvent]) -> Vec<BatchState> {
        events
            .iter()
            .filter_map(|e| match e {
                ProcessEvent::StateChanged(s) => Some(*s),
                ProcessEvent::ImageProcessed { .. } => None,
            })
            .collect()
    }

    fn processed_indices(events: &[ProcessEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                ProcessEvent::ImageProcessed { index, .. } => Some(*index),
                ProcessEvent::StateChanged(_) => None,
            })
            .collect()
    }

    // =========================================================================
    // Happy path
    // =========================================================================

    #[test]
    fn converts_all_and_writes_manifest() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg", "b.png", "c.bmp"]);
        let out = tmp.path().join("out");
        let backend = MockBackend::new();

        let (result, events) =
            run_collecting(&backend, &sources, &config_for(&out), false, CancelToken::new());
        let result = result.unwrap();

        assert!(result.is_completed());
        assert_eq!(result.images.len(), 3);
        for name in ["a.webp", "b.webp", "c.webp"] {
            assert!(out.join("exported").join(name).exists(), "{name}");
        }
        let manifest_path = result.manifest_path.unwrap();
        assert_eq!(manifest_path, out.join("exported").join("gallery-data.json"));
        assert!(manifest_path.exists());
        assert_eq!(result.manifest.unwrap().images.len(), 3);

        assert_eq!(
            states(&events),
            vec![
                BatchState::Validating,
                BatchState::Running,
                BatchState::Completed
            ]
        );
        assert_eq!(processed_indices(&events), vec![0, 1, 2]);
    }

    #[test]
    fn stats_are_exact_sums() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg", "b.jpg"]);
        let backend = MockBackend::new();

        let result = run_batch_with_backend(
            &backend,
            &sources,
            &config_for(&tmp.path().join("out")),
            BatchControl::default(),
        )
        .unwrap();

        // Mock halves every 100-byte input
        assert_eq!(result.stats.total_before_bytes, 200);
        assert_eq!(result.stats.total_after_bytes, 100);
        assert_eq!(result.stats.compression_ratio, 0.5);
        assert_eq!(result.stats.success_count, 2);
    }

    #[test]
    fn resize_and_quality_reach_backend() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg"]);
        let backend = MockBackend::with_dimensions(Dimensions::new(4000, 3000));
        let mut config = config_for(&tmp.path().join("out"));
        config.quality = 70;
        config.resize = Some(ResizeConfig {
            width: Some(1000),
            height: None,
            lock_aspect: true,
        });

        let result =
            run_batch_with_backend(&backend, &sources, &config, BatchControl::default()).unwrap();

        assert!(backend.get_operations().contains(&RecordedOp::Transcode {
            source: "a.jpg".into(),
            width: 1000,
            height: 750,
            quality: 70,
        }));
        assert_eq!(
            result.images[0].output_dimensions,
            Some(Dimensions::new(1000, 750))
        );
    }

    // =========================================================================
    // Per-image failures
    // =========================================================================

    #[test]
    fn failure_keeps_counter_and_batch_continues() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["x.jpg", "y.jpg", "z.jpg"]);
        let out = tmp.path().join("out");
        let backend = MockBackend::new().failing_decode("y.jpg");
        let mut config = config_for(&out);
        config.naming = NamingConfig {
            prefix: Some("shot".into()),
        };

        let result =
            run_batch_with_backend(&backend, &sources, &config, BatchControl::default()).unwrap();

        assert!(result.is_completed());
        let names: Vec<_> = result
            .images
            .iter()
            .map(|i| i.output_filename.as_str())
            .collect();
        assert_eq!(names, vec!["shot-1.webp", "shot-2.webp", "shot-3.webp"]);
        assert!(!result.images[1].outcome.is_success());
        assert!(out.join("exported/shot-1.webp").exists());
        assert!(!out.join("exported/shot-2.webp").exists());
        assert!(out.join("exported/shot-3.webp").exists());

        let manifest = result.manifest.unwrap();
        assert_eq!(manifest.images.len(), 2);
        assert_eq!(manifest.stats.failure_count, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].source, sources[1]);
    }

    #[test]
    fn encode_failure_is_isolated() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg", "b.jpg"]);
        let backend = MockBackend::new().failing_encode("a.jpg");

        let result = run_batch_with_backend(
            &backend,
            &sources,
            &config_for(&tmp.path().join("out")),
            BatchControl::default(),
        )
        .unwrap();

        assert!(result.is_completed());
        assert_eq!(result.stats.success_count, 1);
        assert_eq!(result.stats.failure_count, 1);
        match &result.images[0].outcome {
            ConversionOutcome::Failure { reason } => assert!(reason.contains("a.jpg")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn missing_source_is_a_per_image_failure() {
        let tmp = TempDir::new().unwrap();
        let mut sources = create_dummy_sources(tmp.path(), &["a.jpg"]);
        sources.push(tmp.path().join("gone.jpg"));
        let backend = MockBackend::new();

        let result = run_batch_with_backend(
            &backend,
            &sources,
            &config_for(&tmp.path().join("out")),
            BatchControl::default(),
        )
        .unwrap();

        assert!(result.is_completed());
        assert!(!result.images[1].outcome.is_success());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn conflict_aborts_without_overwrite() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg", "a.png"]);
        let out = tmp.path().join("out");
        let backend = MockBackend::new();

        let (result, events) =
            run_collecting(&backend, &sources, &config_for(&out), false, CancelToken::new());

        match result {
            Err(ProcessError::Conflict(report)) => {
                assert_eq!(report.duplicates[0].output_filename, "a.webp");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(
            states(&events),
            vec![BatchState::Validating, BatchState::Aborted]
        );
        assert!(backend.get_operations().is_empty());
        assert!(!out.join("exported").exists());
    }

    #[test]
    fn overwrite_replaces_previous_run() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg"]);
        let out = tmp.path().join("out");
        let exported = out.join("exported");
        fs::create_dir_all(&exported).unwrap();
        fs::write(exported.join("gallery-data.json"), "old").unwrap();
        fs::write(exported.join("a.webp"), "old").unwrap();
        let backend = MockBackend::new();

        let result = run_batch_with_backend(
            &backend,
            &sources,
            &config_for(&out),
            BatchControl {
                overwrite: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(result.is_completed());
        assert_ne!(fs::read(exported.join("a.webp")).unwrap(), b"old");
        assert_ne!(
            fs::read_to_string(exported.join("gallery-data.json")).unwrap(),
            "old"
        );
    }

    #[test]
    fn invalid_config_never_starts() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg"]);
        let mut config = config_for(&tmp.path().join("out"));
        config.quality = 0;
        let backend = MockBackend::new();

        let result = run_batch_with_backend(&backend, &sources, &config, BatchControl::default());
        assert!(matches!(result, Err(ProcessError::Config(_))));
        assert!(backend.get_operations().is_empty());
    }

    #[test]
    fn unsupported_input_never_starts() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg", "b.gif"]);
        let backend = MockBackend::new();

        let result = run_batch_with_backend(
            &backend,
            &sources,
            &config_for(&tmp.path().join("out")),
            BatchControl::default(),
        );
        assert!(matches!(
            result,
            Err(ProcessError::Validation(ValidationError::UnsupportedInput(_)))
        ));
        assert!(backend.get_operations().is_empty());
    }

    // =========================================================================
    // Fatal errors
    // =========================================================================

    #[test]
    fn fatal_write_on_third_of_five_keeps_first_two() {
        let tmp = TempDir::new().unwrap();
        let sources =
            create_dummy_sources(tmp.path(), &["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"]);
        let out = tmp.path().join("out");
        // A directory where c.webp should go makes that write fail. It is also
        // a pre-flight conflict, so overwrite is needed to get that far.
        fs::create_dir_all(out.join("exported").join("c.webp")).unwrap();
        let backend = MockBackend::new();

        let (result, events) =
            run_collecting(&backend, &sources, &config_for(&out), true, CancelToken::new());
        let result = result.unwrap();

        match &result.status {
            BatchStatus::Aborted(AbortReason::Fatal { path, .. }) => {
                assert_eq!(path, &out.join("exported").join("c.webp"));
            }
            other => panic!("expected fatal abort, got {other:?}"),
        }
        assert_eq!(result.images.len(), 2);
        assert!(result.manifest.is_none());
        assert!(!out.join("exported/gallery-data.json").exists());
        assert!(!out.join("exported/d.webp").exists());
        assert!(!out.join("exported/e.webp").exists());
        assert_eq!(processed_indices(&events), vec![0, 1]);
        assert_eq!(states(&events).last(), Some(&BatchState::Aborted));
    }

    #[test]
    fn fatal_write_single_threaded() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg", "b.jpg", "c.jpg"]);
        let out = tmp.path().join("out");
        fs::create_dir_all(out.join("exported").join("b.webp")).unwrap();
        let backend = MockBackend::new();

        let result = run_batch_with_backend(
            &backend,
            &sources,
            &single_threaded(config_for(&out)),
            BatchControl {
                overwrite: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(matches!(
            result.status,
            BatchStatus::Aborted(AbortReason::Fatal { .. })
        ));
        assert_eq!(result.images.len(), 1);
        // Nothing dispatched after the fatal write
        assert_eq!(backend.transcoded_sources(), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn failed_manifest_write_leaves_no_partial_file() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg", "b.jpg"]);
        let out = tmp.path().join("out");
        let exported = out.join("exported");
        // A non-empty directory in the manifest's place cannot be replaced.
        fs::create_dir_all(exported.join("gallery-data.json").join("keep")).unwrap();
        let backend = MockBackend::new();

        let (result, events) =
            run_collecting(&backend, &sources, &config_for(&out), true, CancelToken::new());
        let result = result.unwrap();

        match &result.status {
            BatchStatus::Aborted(AbortReason::Fatal { path, .. }) => {
                assert_eq!(path, &exported.join("gallery-data.json"));
            }
            other => panic!("expected fatal abort, got {other:?}"),
        }
        assert!(result.manifest.is_none());
        assert!(result.manifest_path.is_none());
        assert!(exported.join("gallery-data.json").join("keep").is_dir());
        let leftovers: Vec<_> = fs::read_dir(&exported)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
        assert_eq!(states(&events).last(), Some(&BatchState::Aborted));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_manifest_conflicts_then_is_replaced_not_followed() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg"]);
        let out = tmp.path().join("out");
        let exported = out.join("exported");
        fs::create_dir_all(&exported).unwrap();
        let elsewhere = tmp.path().join("precious.json");
        fs::write(&elsewhere, "KEEP ME").unwrap();
        std::os::unix::fs::symlink(&elsewhere, exported.join("gallery-data.json")).unwrap();
        let backend = MockBackend::new();

        let (result, _) =
            run_collecting(&backend, &sources, &config_for(&out), false, CancelToken::new());
        match result {
            Err(ProcessError::Conflict(report)) => assert!(report.manifest_exists),
            other => panic!("expected conflict, got {other:?}"),
        }

        let (result, _) =
            run_collecting(&backend, &sources, &config_for(&out), true, CancelToken::new());
        assert!(result.unwrap().is_completed());
        assert_eq!(fs::read_to_string(&elsewhere).unwrap(), "KEEP ME");
        let manifest_meta = fs::symlink_metadata(exported.join("gallery-data.json")).unwrap();
        assert!(manifest_meta.file_type().is_file());
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Cancels the shared token while transcoding the named source.
    struct CancellingBackend {
        inner: MockBackend,
        trigger: &'static str,
        token: CancelToken,
    }

    impl ImageBackend for CancellingBackend {
        fn identify(&self, path: &Path, bytes: &[u8]) -> Result<Dimensions, BackendError> {
            self.inner.identify(path, bytes)
        }

        fn transcode(&self, params: &TranscodeParams) -> Result<Transcoded, BackendError> {
            if params.source.path.ends_with(self.trigger) {
                self.token.cancel();
            }
            self.inner.transcode(params)
        }
    }

    #[test]
    fn cancel_lets_in_flight_finish() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);
        let out = tmp.path().join("out");
        let token = CancelToken::new();
        let backend = CancellingBackend {
            inner: MockBackend::new(),
            trigger: "b.jpg",
            token: token.clone(),
        };

        let (result, events) = run_collecting(
            &backend,
            &sources,
            &single_threaded(config_for(&out)),
            false,
            token,
        );
        let result = result.unwrap();

        assert_eq!(result.status, BatchStatus::Aborted(AbortReason::Cancelled));
        assert_eq!(result.images.len(), 2);
        assert!(out.join("exported/b.webp").exists());
        assert!(!out.join("exported/c.webp").exists());
        assert!(result.manifest.is_none());
        assert_eq!(processed_indices(&events), vec![0, 1]);
    }

    #[test]
    fn cancelled_before_start_processes_nothing() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg", "b.jpg"]);
        let token = CancelToken::new();
        token.cancel();
        let backend = MockBackend::new();

        let (result, _) = run_collecting(
            &backend,
            &sources,
            &config_for(&tmp.path().join("out")),
            false,
            token,
        );
        let result = result.unwrap();

        assert_eq!(result.status, BatchStatus::Aborted(AbortReason::Cancelled));
        assert!(result.images.is_empty());
        assert!(backend.get_operations().is_empty());
    }

    // =========================================================================
    // Ordering under the worker pool
    // =========================================================================

    #[test]
    fn progress_is_in_input_order_with_many_workers() {
        let tmp = TempDir::new().unwrap();
        let names: Vec<String> = (0..12).map(|i| format!("img{i:02}.jpg")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let sources = create_dummy_sources(tmp.path(), &refs);
        let mut config = config_for(&tmp.path().join("out"));
        config.processing = ProcessingConfig {
            max_processes: Some(4),
        };
        let backend = MockBackend::new().failing_decode("img05.jpg");

        let (result, events) =
            run_collecting(&backend, &sources, &config, false, CancelToken::new());
        let result = result.unwrap();

        assert_eq!(processed_indices(&events), (0..12).collect::<Vec<_>>());
        let indices: Vec<_> = result.images.iter().map(|i| i.index).collect();
        assert_eq!(indices, (0..12).collect::<Vec<_>>());

        // Running stats grow monotonically in event order
        let counts: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ProcessEvent::ImageProcessed { running, .. } => {
                    Some(running.success_count + running.failure_count)
                }
                ProcessEvent::StateChanged(_) => None,
            })
            .collect();
        assert_eq!(counts, (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn dropped_receiver_does_not_stop_batch() {
        let tmp = TempDir::new().unwrap();
        let sources = create_dummy_sources(tmp.path(), &["a.jpg", "b.jpg"]);
        let (tx, rx) = channel();
        drop(rx);
        let backend = MockBackend::new();

        let result = run_batch_with_backend(
            &backend,
            &sources,
            &config_for(&tmp.path().join("out")),
            BatchControl {
                events: Some(tx),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(result.is_completed());
    }
}
