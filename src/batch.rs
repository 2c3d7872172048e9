//! Batch entry points: stamp every record's first page, then split the
//! annotated document into one file per record.
//!
//! ```text
//! Idle ──load──▶ Loaded ──stamp all──▶ Annotated ──split all──▶ Split ──cleanup──▶ Done
//! ```
//!
//! Annotation is strictly sequential and finishes before any split starts;
//! the mutable source handle is consumed when the working file is saved.
//! Splitting then runs up to `concurrency` records at a time against an
//! immutable snapshot. A record whose range does not fit the document is
//! skipped in both phases without affecting the others.

use crate::config::BatchConfig;
use crate::error::{BatchError, RecordError};
use crate::model::Record;
use crate::output::{BatchReport, BatchStats, RecordOutcome};
use crate::pipeline::annotate::{self, AnnotateError};
use crate::pipeline::document::{AnnotatedDocument, SourceDocument, WorkingCopy};
use crate::pipeline::roster::{self, Dataset};
use crate::pipeline::split;
use crate::pipeline::stamp::{StampArtifact, StampRenderer};
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ── State machine ────────────────────────────────────────────────────────

/// Phase of a batch run. Phases only ever move forward, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Idle,
    Loaded,
    Annotated,
    Split,
    Done,
}

impl BatchState {
    /// The only state reachable from `self`.
    pub fn next(self) -> Option<BatchState> {
        match self {
            BatchState::Idle => Some(BatchState::Loaded),
            BatchState::Loaded => Some(BatchState::Annotated),
            BatchState::Annotated => Some(BatchState::Split),
            BatchState::Split => Some(BatchState::Done),
            BatchState::Done => None,
        }
    }

    /// Move to `to`, refusing skips, repeats and reversals.
    pub fn advance(&mut self, to: BatchState) -> Result<(), BatchError> {
        if self.next() != Some(to) {
            return Err(BatchError::InvalidState {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        *self = to;
        Ok(())
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchState::Idle => "idle",
            BatchState::Loaded => "loaded",
            BatchState::Annotated => "annotated",
            BatchState::Split => "split",
            BatchState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Advance `state` and tell the callback about it.
fn enter(state: &mut BatchState, to: BatchState, cb: &Option<ProgressCallback>) -> Result<(), BatchError> {
    state.advance(to)?;
    debug!("Batch state → {}", to);
    if let Some(cb) = cb {
        cb.on_phase(to);
    }
    Ok(())
}

// ── Public entry points ──────────────────────────────────────────────────

/// Run the whole batch described by `config`.
///
/// # Returns
/// `Ok(BatchReport)` once every record has been attempted, even if some
/// were skipped (check `report.stats.skipped`, or call
/// [`BatchReport::into_result`] for strict handling).
///
/// # Errors
/// Returns `Err(BatchError)` only for fatal errors:
/// - Malformed, ambiguous or empty roster
/// - Source PDF missing, unreadable or corrupt
/// - Destination folder or working file unusable
pub async fn run(config: &BatchConfig) -> Result<BatchReport, BatchError> {
    let total_start = Instant::now();
    let cb = config.progress_callback.clone();
    let mut state = BatchState::Idle;
    info!(
        "Starting batch: roster={} source={} destination={}",
        config.roster_path.display(),
        config.source_path.display(),
        config.destination.display()
    );

    // ── Step 1: Load roster ──────────────────────────────────────────────
    let roster_path = config.roster_path.clone();
    let dataset = tokio::task::spawn_blocking(move || roster::load_dataset(&roster_path))
        .await
        .map_err(|e| BatchError::Internal(format!("Roster task panicked: {e}")))??;
    let renderer = StampRenderer::new(&dataset, config.style.clone())?;
    enter(&mut state, BatchState::Loaded, &cb)?;
    if let Some(ref cb) = cb {
        cb.on_batch_start(dataset.len());
    }

    // ── Step 2: Prepare destination ──────────────────────────────────────
    tokio::fs::create_dir_all(&config.destination)
        .await
        .map_err(|e| BatchError::DestinationUnavailable {
            path: config.destination.clone(),
            source: e,
        })?;

    // ── Step 3: Stamp every record's first page ──────────────────────────
    let annotate_start = Instant::now();
    let dataset = Arc::new(dataset);
    let job = AnnotateJob {
        dataset: Arc::clone(&dataset),
        renderer: renderer.clone(),
        config: config.clone(),
    };
    let (working, source_pages, mut outcomes) = tokio::task::spawn_blocking(move || job.run())
        .await
        .map_err(|e| BatchError::Internal(format!("Annotation task panicked: {e}")))??;
    let annotate_duration_ms = annotate_start.elapsed().as_millis() as u64;
    enter(&mut state, BatchState::Annotated, &cb)?;
    info!(
        "Annotated {} of {} records in {}ms",
        outcomes.iter().filter(|o| o.is_none()).count(),
        dataset.len(),
        annotate_duration_ms
    );

    // ── Step 4: Split per record ─────────────────────────────────────────
    let split_start = Instant::now();
    let snapshot = {
        let path = working.path().to_path_buf();
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| BatchError::WorkingFileFailed {
                path: path.clone(),
                detail: e.to_string(),
            })?;
        let snapshot = tokio::task::spawn_blocking(move || AnnotatedDocument::from_bytes(bytes, path))
            .await
            .map_err(|e| BatchError::Internal(format!("Reload task panicked: {e}")))??;
        Arc::new(snapshot)
    };

    let pending: Vec<(usize, Record)> = dataset
        .iter()
        .enumerate()
        .filter(|(pos, _)| outcomes[*pos].is_none())
        .map(|(pos, record)| (pos, record.clone()))
        .collect();
    let split_results = split_concurrent(&snapshot, pending, config).await;
    for (pos, outcome) in split_results {
        outcomes[pos] = Some(outcome);
    }
    let split_duration_ms = split_start.elapsed().as_millis() as u64;
    enter(&mut state, BatchState::Split, &cb)?;

    // ── Step 5: Release the working file ─────────────────────────────────
    drop(snapshot);
    release(working)?;
    enter(&mut state, BatchState::Done, &cb)?;

    // ── Step 6: Report ───────────────────────────────────────────────────
    let outcomes: Vec<RecordOutcome> = outcomes
        .into_iter()
        .zip(dataset.iter())
        .map(|(outcome, record)| {
            outcome.unwrap_or_else(|| {
                RecordOutcome::skipped(
                    record.pages,
                    RecordError::Split {
                        identifier: record.identifier.clone(),
                        detail: "record was never split".into(),
                    },
                )
            })
        })
        .collect();
    let succeeded = outcomes.iter().filter(|o| o.is_written()).count();
    let skipped = outcomes.len() - succeeded;

    let stats = BatchStats {
        total_records: dataset.len(),
        succeeded,
        skipped,
        dropped_rows: dataset.dropped_rows(),
        source_pages,
        annotate_duration_ms,
        split_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Batch complete: {}/{} records written, {} skipped, {}ms total",
        succeeded, stats.total_records, skipped, stats.total_duration_ms
    );
    if let Some(ref cb) = cb {
        cb.on_batch_complete(succeeded, skipped);
    }

    Ok(BatchReport {
        outcomes,
        stats,
        summary: renderer.summary().clone(),
        classification: renderer.classification(),
    })
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally, so it must not be called
/// from inside another runtime.
pub fn run_sync(config: &BatchConfig) -> Result<BatchReport, BatchError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BatchError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(config))
}

/// Load and validate the roster without touching any PDF.
pub async fn inspect(roster_path: impl AsRef<Path>) -> Result<Dataset, BatchError> {
    let path = roster_path.as_ref().to_path_buf();
    let dataset = tokio::task::spawn_blocking(move || roster::load_dataset(&path))
        .await
        .map_err(|e| BatchError::Internal(format!("Roster task panicked: {e}")))??;
    Ok(dataset)
}

/// Render the stamp one record would receive, without opening the source.
pub async fn render_stamp(config: &BatchConfig, identifier: &str) -> Result<StampArtifact, BatchError> {
    let dataset = inspect(&config.roster_path).await?;
    let record = dataset
        .get(identifier)
        .cloned()
        .ok_or_else(|| BatchError::UnknownIdentifier {
            identifier: identifier.to_string(),
        })?;
    let renderer = StampRenderer::new(&dataset, config.style.clone())?;
    tokio::task::spawn_blocking(move || renderer.render(&record))
        .await
        .map_err(|e| BatchError::Internal(format!("Render task panicked: {e}")))?
        .map_err(|e| BatchError::Internal(e.to_string()))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Everything the blocking annotation phase owns.
struct AnnotateJob {
    dataset: Arc<Dataset>,
    renderer: StampRenderer,
    config: BatchConfig,
}

/// Per-record result of the annotation phase: `None` means "stamped, still
/// to be split", `Some` is a final skip.
type Pending = Option<RecordOutcome>;

impl AnnotateJob {
    fn run(self) -> Result<(WorkingCopy, usize, Vec<Pending>), BatchError> {
        let mut source = SourceDocument::open(&self.config.source_path)?;
        let total_pages = source.page_count();
        let cb = self.config.progress_callback.as_ref();

        let outcomes = self
            .dataset
            .iter()
            .map(|record| {
                let result = self.stamp_record(&mut source, record);
                match result {
                    Ok(page_num) => {
                        if let Some(cb) = cb {
                            cb.on_record_stamped(&record.identifier, page_num);
                        }
                        None
                    }
                    Err(e) => {
                        warn!("Skipping {}: {}", record.identifier, e);
                        if let Some(cb) = cb {
                            cb.on_record_skipped(&record.identifier, &e.to_string());
                        }
                        Some(RecordOutcome::skipped(record.pages, e))
                    }
                }
            })
            .collect();

        let working = source.save_working_copy(&self.config.destination)?;
        Ok((working, total_pages, outcomes))
    }

    /// Stamp `record` and return the 1-based page that received it.
    fn stamp_record(&self, source: &mut SourceDocument, record: &Record) -> Result<u32, RecordError> {
        // The whole range is checked, not just the stamped page, so nothing
        // is stamped for a record that could never be split.
        let page_index = record.pages.stamp_index(&record.identifier, source.page_count())?;

        let artifact = self.renderer.render(record)?;
        annotate::stamp_page(source, page_index, &artifact, &self.config.placement).map_err(|e| {
            match e {
                AnnotateError::PageOutOfRange { total, .. } => RecordError::Range {
                    identifier: record.identifier.clone(),
                    first: record.pages.first,
                    last: record.pages.last,
                    total,
                },
                other => RecordError::Annotate {
                    identifier: record.identifier.clone(),
                    page: record.pages.first,
                    detail: other.to_string(),
                },
            }
        })?;
        Ok(record.pages.first)
    }
}

/// Split the pending records, up to `config.concurrency` at a time.
async fn split_concurrent(
    snapshot: &Arc<AnnotatedDocument>,
    pending: Vec<(usize, Record)>,
    config: &BatchConfig,
) -> Vec<(usize, RecordOutcome)> {
    stream::iter(pending.into_iter().map(|(pos, record)| {
        let snapshot = Arc::clone(snapshot);
        let destination: PathBuf = config.destination.clone();
        let cb = config.progress_callback.clone();
        async move {
            let identifier = record.identifier.clone();
            let pages = record.pages;
            let result = tokio::task::spawn_blocking(move || split::split_record(&snapshot, &record, &destination))
                .await
                .unwrap_or_else(|e| {
                    Err(RecordError::Split {
                        identifier: identifier.clone(),
                        detail: format!("split task panicked: {e}"),
                    })
                });

            let outcome = match result {
                Ok(written) => {
                    if let Some(ref cb) = cb {
                        cb.on_record_written(&identifier, &written.path, written.page_count);
                    }
                    RecordOutcome::written(identifier, pages, written.path, written.page_count)
                }
                Err(e) => {
                    warn!("Skipping {}: {}", identifier, e);
                    if let Some(ref cb) = cb {
                        cb.on_record_skipped(&identifier, &e.to_string());
                    }
                    RecordOutcome::skipped(pages, e)
                }
            };
            (pos, outcome)
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await
}

/// Delete the working file.
fn release(working: WorkingCopy) -> Result<(), BatchError> {
    let path = working.path().to_path_buf();
    working.close()?;
    debug!("Working file removed: {}", path.display());
    Ok(())
}
