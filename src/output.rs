//! Result types returned by a batch run.

use crate::error::{BatchError, RecordError};
use crate::model::PageRange;
use crate::pipeline::stats::{BoxSummary, Classification};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What happened to one roster record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub identifier: String,
    pub pages: PageRange,
    /// Path of the written output document, when the record succeeded.
    pub output_path: Option<PathBuf>,
    /// Pages in the written output document (0 when skipped).
    pub page_count: usize,
    /// Why the record was skipped.
    pub error: Option<RecordError>,
}

impl RecordOutcome {
    pub fn written(identifier: String, pages: PageRange, output_path: PathBuf, page_count: usize) -> Self {
        Self {
            identifier,
            pages,
            output_path: Some(output_path),
            page_count,
            error: None,
        }
    }

    pub fn skipped(pages: PageRange, error: RecordError) -> Self {
        Self {
            identifier: error.identifier().to_string(),
            pages,
            output_path: None,
            page_count: 0,
            error: Some(error),
        }
    }

    pub fn is_written(&self) -> bool {
        self.error.is_none() && self.output_path.is_some()
    }
}

/// Counters and timings for a finished batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    /// Records in the dataset after missing-value filtering.
    pub total_records: usize,
    pub succeeded: usize,
    pub skipped: usize,
    /// Roster rows discarded for missing values.
    pub dropped_rows: usize,
    /// Pages in the source document.
    pub source_pages: usize,
    pub annotate_duration_ms: u64,
    pub split_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a batch run produced, in roster order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<RecordOutcome>,
    pub stats: BatchStats,
    pub summary: BoxSummary,
    pub classification: Classification,
}

impl BatchReport {
    pub fn written(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(|o| o.is_written())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }

    /// `Err(PartialFailure)` if any record was skipped.
    pub fn into_result(self) -> Result<Self, BatchError> {
        if self.stats.skipped > 0 {
            return Err(BatchError::PartialFailure {
                succeeded: self.stats.succeeded,
                skipped: self.stats.skipped,
                total: self.stats.total_records,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(skipped: usize) -> BatchReport {
        let mut outcomes = vec![RecordOutcome::written(
            "A".into(),
            PageRange::new(1, 1),
            PathBuf::from("out/A/a.pdf"),
            1,
        )];
        for i in 0..skipped {
            outcomes.push(RecordOutcome::skipped(
                PageRange::new(10, 12),
                RecordError::Range {
                    identifier: format!("S{i}"),
                    first: 10,
                    last: 12,
                    total: 5,
                },
            ));
        }
        BatchReport {
            stats: BatchStats {
                total_records: outcomes.len(),
                succeeded: 1,
                skipped,
                ..Default::default()
            },
            outcomes,
            summary: BoxSummary::from_grades(&[4.0, 5.0]).unwrap(),
            classification: Classification::Mixed,
        }
    }

    #[test]
    fn skipped_outcome_takes_identifier_from_error() {
        let r = report(1);
        let skipped: Vec<_> = r.skipped().collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].identifier, "S0");
        assert!(!skipped[0].is_written());
        assert_eq!(r.written().count(), 1);
    }

    #[test]
    fn into_result_ok_without_skips() {
        assert!(report(0).into_result().is_ok());
    }

    #[test]
    fn into_result_errors_on_skips() {
        match report(2).into_result() {
            Err(BatchError::PartialFailure {
                succeeded,
                skipped,
                total,
            }) => {
                assert_eq!((succeeded, skipped, total), (1, 2, 3));
            }
            other => panic!("expected PartialFailure, got {other:?}"),
        }
    }

    #[test]
    fn report_serialises_to_json() {
        let json = serde_json::to_value(report(1)).unwrap();
        assert_eq!(json["stats"]["skipped"], 1);
        assert_eq!(json["outcomes"][1]["error"]["Range"]["last"], 12);
        assert_eq!(json["classification"], "Mixed");
    }
}
