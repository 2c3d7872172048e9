//! Progress-callback trait for per-record batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the batch stamps and splits each record.
//!
//! # Example
//!
//! ```rust
//! use gradestamp::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     written: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_record_written(&self, identifier: &str, _path: &std::path::Path, _pages: usize) {
//!         let done = self.written.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{identifier} done ({done} so far)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { written: AtomicUsize::new(0) });
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::batch::BatchState;
use std::path::Path;
use std::sync::Arc;

/// Called by the batch as it processes each record.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// `on_record_written` and `on_record_skipped` may be called concurrently
/// from different threads during the splitting phase when
/// `concurrency > 1`. Stamping events always arrive in roster order.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after the roster is loaded.
    ///
    /// # Arguments
    /// * `total_records` — number of records that will be processed
    fn on_batch_start(&self, total_records: usize) {
        let _ = total_records;
    }

    /// Called on every state transition of the orchestrator.
    fn on_phase(&self, state: BatchState) {
        let _ = state;
    }

    /// Called when a record's stamp has been placed on its first page.
    ///
    /// # Arguments
    /// * `identifier` — the record's identifier
    /// * `page_num`   — 1-based page that received the stamp
    fn on_record_stamped(&self, identifier: &str, page_num: u32) {
        let _ = (identifier, page_num);
    }

    /// Called when a record's output document has been persisted.
    fn on_record_written(&self, identifier: &str, path: &Path, page_count: usize) {
        let _ = (identifier, path, page_count);
    }

    /// Called when a record is skipped.
    ///
    /// # Arguments
    /// * `identifier` — the record's identifier
    /// * `error`      — human-readable reason
    fn on_record_skipped(&self, identifier: &str, error: &str) {
        let _ = (identifier, error);
    }

    /// Called once after every record has been attempted.
    fn on_batch_complete(&self, succeeded: usize, skipped: usize) {
        let _ = (succeeded, skipped);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
