//! Configuration types for a stamping batch.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. The three input paths are plain values on the
//! config; nothing is read from prompts or global state.
//!
//! # Example
//! ```rust
//! use gradestamp::{BatchConfig, StampPlacement};
//!
//! let config = BatchConfig::builder()
//!     .roster_path("data/steuerung.csv")
//!     .source_path("data/fahne.pdf")
//!     .destination("data/output")
//!     .placement(StampPlacement { x: 380.0, y: 60.0, max_width: 180.0 })
//!     .build()
//!     .unwrap();
//! assert_eq!(config.placement.max_width, 180.0);
//! ```

use crate::error::BatchError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default roster location, relative to the working directory.
pub const DEFAULT_ROSTER_PATH: &str = "./data/steuerung.csv";
/// Default source PDF location.
pub const DEFAULT_SOURCE_PATH: &str = "./data/fahne.pdf";
/// Default output folder; one sub-folder per student is created below it.
pub const DEFAULT_DESTINATION: &str = "./data/output/";

/// Configuration for one stamping batch.
#[derive(Clone)]
pub struct BatchConfig {
    /// `;`-separated UTF-8 roster. Default: `./data/steuerung.csv`.
    pub roster_path: PathBuf,

    /// Shared multi-page PDF the page ranges refer to. Default: `./data/fahne.pdf`.
    pub source_path: PathBuf,

    /// Root folder for the per-student output. Default: `./data/output/`.
    pub destination: PathBuf,

    /// Where the stamp lands on the record's first page.
    pub placement: StampPlacement,

    /// Stamp image size and label texts.
    pub style: StampStyle,

    /// Number of records split into output files at the same time. Default: 4.
    ///
    /// Only the splitting phase runs concurrently; stamping is always
    /// sequential because every stamp mutates the same document.
    pub concurrency: usize,

    /// Optional per-record progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            roster_path: PathBuf::from(DEFAULT_ROSTER_PATH),
            source_path: PathBuf::from(DEFAULT_SOURCE_PATH),
            destination: PathBuf::from(DEFAULT_DESTINATION),
            placement: StampPlacement::default(),
            style: StampStyle::default(),
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("roster_path", &self.roster_path)
            .field("source_path", &self.source_path)
            .field("destination", &self.destination)
            .field("placement", &self.placement)
            .field("style", &self.style)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn roster_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.roster_path = path.into();
        self
    }

    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.source_path = path.into();
        self
    }

    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.destination = path.into();
        self
    }

    pub fn placement(mut self, placement: StampPlacement) -> Self {
        self.config.placement = placement;
        self
    }

    pub fn style(mut self, style: StampStyle) -> Self {
        self.config.style = style;
        self
    }

    /// Stamp raster size in pixels; clamped to at least 320 × 240.
    pub fn stamp_size(mut self, width_px: u32, height_px: u32) -> Self {
        self.config.style.width_px = width_px.max(320);
        self.config.style.height_px = height_px.max(240);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        let p = &c.placement;
        if !(p.max_width.is_finite() && p.max_width > 0.0) {
            return Err(BatchError::InvalidConfig(format!(
                "Stamp width must be a positive number of points, got {}",
                p.max_width
            )));
        }
        if !(p.x.is_finite() && p.y.is_finite() && p.x >= 0.0 && p.y >= 0.0) {
            return Err(BatchError::InvalidConfig(format!(
                "Stamp anchor must be non-negative, got ({}, {})",
                p.x, p.y
            )));
        }
        if c.style.width_px == 0 || c.style.height_px == 0 {
            return Err(BatchError::InvalidConfig(
                "Stamp image size must be non-zero".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(BatchError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.destination.as_os_str().is_empty() {
            return Err(BatchError::InvalidConfig(
                "Destination folder must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Value types ──────────────────────────────────────────────────────────

/// Stamp anchor and width on the page, in PDF points.
///
/// `x`/`y` address the stamp's top-left corner measured from the page's
/// top-left corner. The height follows from the stamp image's aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StampPlacement {
    pub x: f32,
    pub y: f32,
    pub max_width: f32,
}

impl Default for StampPlacement {
    fn default() -> Self {
        Self {
            x: 400.0,
            y: 100.0,
            max_width: 200.0,
        }
    }
}

/// Appearance of the rendered stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampStyle {
    /// Raster width in pixels. Default: 960.
    pub width_px: u32,
    /// Raster height in pixels. Default: 720.
    pub height_px: u32,
    /// Title line; `{given_name}` is replaced with the student's given name.
    pub title_template: String,
    /// Label of the points row in the key/value table.
    pub points_label: String,
    /// Label of the grade row in the key/value table.
    pub grade_label: String,
    /// Caption under the grade axis.
    pub axis_label: String,
}

impl Default for StampStyle {
    fn default() -> Self {
        Self {
            width_px: 960,
            height_px: 720,
            title_template: "Individuelle Note von {given_name} und Notenverteilung".into(),
            points_label: "Punkte".into(),
            grade_label: "Note".into(),
            axis_label: "Note".into(),
        }
    }
}

impl StampStyle {
    /// Render the title for one student.
    pub fn title_for(&self, given_name: &str) -> String {
        self.title_template.replace("{given_name}", given_name)
    }
}
