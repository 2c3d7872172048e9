//! Domain types: one roster row and its page range.

use crate::error::RecordError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// A 1-based inclusive page range as written in the roster (`First`, `Last`).
///
/// This is the only place where roster page numbers are turned into 0-based
/// document indices. Annotator and splitter both go through
/// [`PageRange::to_indices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub first: u32,
    pub last: u32,
}

impl PageRange {
    pub fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    /// `1 ≤ first ≤ last`.
    pub fn is_well_formed(&self) -> bool {
        self.first >= 1 && self.first <= self.last
    }

    /// Number of pages covered.
    pub fn len(&self) -> usize {
        if self.is_well_formed() {
            (self.last - self.first + 1) as usize
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Translate into 0-based indices of a document with `total_pages` pages.
    ///
    /// Fails with [`RecordError::Range`] when the range is malformed or any
    /// bound lies past the end of the document.
    pub fn to_indices(
        &self,
        identifier: &str,
        total_pages: usize,
    ) -> Result<RangeInclusive<usize>, RecordError> {
        if !self.is_well_formed() || self.last as usize > total_pages {
            return Err(RecordError::Range {
                identifier: identifier.to_string(),
                first: self.first,
                last: self.last,
                total: total_pages,
            });
        }
        Ok((self.first as usize - 1)..=(self.last as usize - 1))
    }

    /// 0-based index of the first page, which receives the stamp.
    pub fn stamp_index(&self, identifier: &str, total_pages: usize) -> Result<usize, RecordError> {
        self.to_indices(identifier, total_pages).map(|r| *r.start())
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}-{}", self.first, self.last)
        }
    }
}

/// One student's row from the roster, after normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Diacritic-folded surname; unique within a [`crate::Dataset`].
    pub identifier: String,
    pub given_name: String,
    pub grade: f64,
    pub total: f64,
    pub title: String,
    pub date: String,
    pub pages: PageRange,
}

/// Format a roster number the way the table shows it: integral values keep
/// one decimal (`5.0`), others print as-is (`4.75`).
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}
