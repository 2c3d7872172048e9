//! Error types for the gradestamp library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BatchError`] — **Fatal**: the batch cannot proceed at all (malformed
//!   roster, unreadable source PDF, unwritable working file). Returned as
//!   `Err(BatchError)` from [`crate::batch::run`] before any output for the
//!   affected phase is produced.
//!
//! * [`RecordError`] — **Non-fatal**: a single record failed (its page range
//!   does not fit the source document, its output file could not be written)
//!   but every other record is fine. Stored inside
//!   [`crate::output::RecordOutcome`] so the run report can say which
//!   students were skipped and why.
//!
//! Roster problems get their own [`DataError`] so callers can tell "fix the
//! table" apart from "fix the PDF".

use std::path::PathBuf;
use thiserror::Error;

/// A malformed or ambiguous roster.
///
/// Always fatal: it is raised while loading, before the source document is
/// opened, so no page is ever stamped from a roster that fails here.
#[derive(Debug, Error)]
pub enum DataError {
    /// The roster file could not be read or is not valid `;`-separated UTF-8.
    #[error("Failed to read roster '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// One or more required columns are missing from the header row.
    #[error("Roster is missing required column(s): {}", missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    /// Two header cells map to the same required column (e.g. `Name` and `Nachname`).
    #[error("Roster has more than one '{column}' column")]
    AmbiguousColumn { column: String },

    /// Two rows fold to the same identifier and would share one output folder.
    #[error(
        "Duplicate identifier '{identifier}' (rows {first_row} and {second_row})\n\
Two students would be written to the same folder; disambiguate their surnames."
    )]
    DuplicateIdentifier {
        identifier: String,
        first_row: usize,
        second_row: usize,
    },

    /// A field holds text that cannot be parsed into the column's type.
    #[error("Row {row}: column '{column}' has invalid value '{value}'")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    /// A record's page range violates `1 ≤ First ≤ Last`.
    #[error("Record '{identifier}': invalid page range First={first}, Last={last}")]
    InvalidPageRange {
        identifier: String,
        first: u32,
        last: u32,
    },

    /// No row survived the missing-value filter.
    #[error("Roster '{path}' contains no complete rows")]
    Empty { path: PathBuf },

    /// The dataset holds no finite grade to build class statistics from.
    #[error("Dataset has no grades to summarise")]
    NoGrades,
}

/// All fatal errors returned by the gradestamp library.
///
/// Record-level failures use [`RecordError`] and are stored in
/// [`crate::output::RecordOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Roster errors ─────────────────────────────────────────────────────
    #[error(transparent)]
    Data(#[from] DataError),

    /// A single-stamp request named an identifier the roster does not have.
    #[error("No record with identifier '{identifier}' in the roster")]
    UnknownIdentifier { identifier: String },

    // ── Source document errors ────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Source PDF not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The PDF could not be parsed or re-parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The destination folder could not be created.
    #[error("Destination folder '{path}' is not usable: {source}")]
    DestinationUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The annotated source could not be saved to, or reloaded from, its
    /// working file.
    #[error("Working file '{path}' failed: {detail}")]
    WorkingFileFailed { path: PathBuf, detail: String },

    // ── Outcome errors ────────────────────────────────────────────────────
    /// Some records were written but at least one was skipped.
    ///
    /// Returned by [`crate::output::BatchReport::into_result`] when the
    /// caller wants to treat any skipped record as an error.
    #[error("{skipped}/{total} records were skipped")]
    PartialFailure {
        succeeded: usize,
        skipped: usize,
        total: usize,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The orchestrator was asked to skip or repeat a phase.
    #[error("Invalid batch transition from {from} to {to}")]
    InvalidState { from: String, to: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single record.
///
/// The batch continues with the remaining records; the error is reported in
/// the record's [`crate::output::RecordOutcome`].
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum RecordError {
    /// The record's page range does not fit the source document.
    #[error("{identifier}: pages {first}-{last} out of range (document has {total} pages)")]
    Range {
        identifier: String,
        first: u32,
        last: u32,
        total: usize,
    },

    /// The stamp image could not be rendered.
    #[error("{identifier}: stamp rendering failed: {detail}")]
    Render { identifier: String, detail: String },

    /// The stamp could not be placed on its page.
    #[error("{identifier}: stamping page {page} failed: {detail}")]
    Annotate {
        identifier: String,
        page: u32,
        detail: String,
    },

    /// Page extraction into a standalone document failed.
    #[error("{identifier}: page extraction failed: {detail}")]
    Split { identifier: String, detail: String },

    /// The output document could not be written.
    #[error("{identifier}: failed to write '{path}': {detail}")]
    Write {
        identifier: String,
        path: PathBuf,
        detail: String,
    },
}

impl RecordError {
    /// Identifier of the record this error belongs to.
    pub fn identifier(&self) -> &str {
        match self {
            RecordError::Range { identifier, .. }
            | RecordError::Render { identifier, .. }
            | RecordError::Annotate { identifier, .. }
            | RecordError::Split { identifier, .. }
            | RecordError::Write { identifier, .. } => identifier,
        }
    }

    /// Short machine-friendly category, used in the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::Range { .. } => "range",
            RecordError::Render { .. } => "render",
            RecordError::Annotate { .. } => "annotate",
            RecordError::Split { .. } => "split",
            RecordError::Write { .. } => "io",
        }
    }
}
