//! # gradestamp
//!
//! Stamp each student's graded exam pages with a box-plot of the class's
//! grades, then split the shared scan into one PDF per student.
//!
//! The input is a `;`-separated roster (`Name`/`Nachname`, `Vorname`,
//! `Note`, `Total`, `Titel`, `Datum`, `First`, `Last`) and one multi-page
//! PDF holding every student's pages back to back. Every record gets a stamp
//! on the first page of its range showing its points, its grade and where
//! that grade sits in the class distribution; the stamp background is
//! green, orange or red depending on how the class did overall.
//!
//! ## Pipeline Overview
//!
//! ```text
//! steuerung.csv ─┐
//!                ├─ 1. Load     normalise roster, fold umlauts, reject duplicates
//!                ├─ 2. Stats    class quartiles → Favorable / Mixed / Unfavorable
//! fahne.pdf ─────┤
//!                ├─ 3. Stamp    render PNG per record, embed on its first page
//!                ├─ 4. Save     annotated document → hidden working file
//!                ├─ 5. Split    one PDF per record, concurrently
//!                └─ 6. Report   written paths + skipped records with reasons
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gradestamp::{run, BatchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder()
//!         .roster_path("data/steuerung.csv")
//!         .source_path("data/fahne.pdf")
//!         .destination("data/output")
//!         .build()?;
//!     let report = run(&config).await?;
//!     for skipped in report.skipped() {
//!         eprintln!("skipped: {:?}", skipped.error);
//!     }
//!     eprintln!("{}/{} written", report.stats.succeeded, report.stats.total_records);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `gradestamp` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! gradestamp = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{inspect, render_stamp, run, run_sync, BatchState};
pub use config::{BatchConfig, BatchConfigBuilder, StampPlacement, StampStyle};
pub use error::{BatchError, DataError, RecordError};
pub use model::{PageRange, Record};
pub use output::{BatchReport, BatchStats, RecordOutcome};
pub use pipeline::roster::{load_dataset, Dataset};
pub use pipeline::stamp::{StampArtifact, StampRenderer};
pub use pipeline::stats::{BoxSummary, Classification};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
