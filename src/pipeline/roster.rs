//! Roster loading: `;`-separated table → validated, identifier-indexed [`Dataset`].
//!
//! Cleaning happens in a fixed order:
//!
//! 1. rows with a missing value in *any* column are dropped (not repaired);
//! 2. a header starting with `Nach` (e.g. `Nachname`) becomes `Name`;
//! 3. umlauts in the surname are folded to ASCII (`ä` → `ae`, …);
//! 4. the folded surname becomes the record's identifier, which must be
//!    unique: two students folding to the same name would overwrite each
//!    other's folder, so that is a [`DataError`], never a silent dedup.

use crate::error::DataError;
use crate::model::{PageRange, Record};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Columns every roster must provide (after the surname rename).
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "Name", "Vorname", "Note", "Total", "Titel", "Datum", "First", "Last",
];

/// Header prefix that marks the surname column.
const SURNAME_PREFIX: &str = "Nach";

/// Cell values treated as missing, in addition to blank cells.
const MISSING_MARKERS: [&str; 7] = ["NA", "N/A", "NaN", "nan", "null", "NULL", "#N/A"];

/// The cleaned roster: records in file order, indexed by identifier.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<Record>,
    index: HashMap<String, usize>,
    dropped_rows: usize,
}

impl Dataset {
    /// Build a dataset from already-parsed records, enforcing identifier
    /// uniqueness and well-formed page ranges.
    pub fn from_records(records: Vec<Record>) -> Result<Self, DataError> {
        let rows = records
            .into_iter()
            .enumerate()
            .map(|(i, r)| (i + 1, r))
            .collect();
        Self::from_rows(rows, 0)
    }

    fn from_rows(rows: Vec<(usize, Record)>, dropped_rows: usize) -> Result<Self, DataError> {
        let mut index: HashMap<String, usize> = HashMap::with_capacity(rows.len());
        let mut lines: Vec<usize> = Vec::with_capacity(rows.len());
        let mut records = Vec::with_capacity(rows.len());

        for (line, record) in rows {
            if !record.pages.is_well_formed() {
                return Err(DataError::InvalidPageRange {
                    identifier: record.identifier,
                    first: record.pages.first,
                    last: record.pages.last,
                });
            }
            if let Some(&existing) = index.get(&record.identifier) {
                return Err(DataError::DuplicateIdentifier {
                    identifier: record.identifier,
                    first_row: lines[existing],
                    second_row: line,
                });
            }
            index.insert(record.identifier.clone(), records.len());
            lines.push(line);
            records.push(record);
        }

        Ok(Self {
            records,
            index,
            dropped_rows,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look a record up by identifier.
    pub fn get(&self, identifier: &str) -> Option<&Record> {
        self.index.get(identifier).map(|&i| &self.records[i])
    }

    /// Records in roster order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Every grade in the class, in roster order.
    pub fn grades(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.grade).collect()
    }

    /// Rows discarded during loading because a value was missing.
    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }
}

/// Load and clean the roster at `path`.
pub fn load_dataset(path: &Path) -> Result<Dataset, DataError> {
    let file = std::fs::File::open(path).map_err(|e| DataError::Unreadable {
        path: path.to_path_buf(),
        source: csv::Error::from(e),
    })?;
    let dataset = read_dataset(file, path)?;
    info!(
        "Roster loaded: {} records ({} incomplete rows dropped) from {}",
        dataset.len(),
        dataset.dropped_rows(),
        path.display()
    );
    Ok(dataset)
}

/// Clean a roster from any reader. `origin` is only used in error messages.
pub fn read_dataset<R: Read>(reader: R, origin: &Path) -> Result<Dataset, DataError> {
    let unreadable = |source: csv::Error| DataError::Unreadable {
        path: origin.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns: Vec<String> = reader
        .headers()
        .map_err(unreadable)?
        .iter()
        .map(canonical_column)
        .collect();
    let layout = ColumnLayout::resolve(&columns)?;
    debug!("Roster columns: {:?}", columns);

    let mut rows = Vec::new();
    let mut dropped = 0usize;

    for (i, result) in reader.records().enumerate() {
        let row = result.map_err(unreadable)?;
        // Header is line 1.
        let line = i + 2;

        if row.len() < columns.len() || row.iter().any(is_missing) {
            debug!("Dropping incomplete row {}", line);
            dropped += 1;
            continue;
        }

        rows.push((line, layout.parse_row(&row, line)?));
    }

    if dropped > 0 {
        warn!("{} incomplete roster row(s) dropped", dropped);
    }
    if rows.is_empty() {
        return Err(DataError::Empty {
            path: origin.to_path_buf(),
        });
    }

    Dataset::from_rows(rows, dropped)
}

/// Fold German umlauts to their two-letter ASCII spelling.
pub fn fold_diacritics(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        match ch {
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'Ä' => out.push_str("Ae"),
            'Ö' => out.push_str("Oe"),
            'Ü' => out.push_str("Ue"),
            other => out.push(other),
        }
    }
    out
}

/// Normalise one header cell: strip whitespace and BOM, rename the surname column.
fn canonical_column(header: &str) -> String {
    let header = header.trim_start_matches('\u{feff}').trim();
    if header.starts_with(SURNAME_PREFIX) {
        "Name".to_string()
    } else {
        header.to_string()
    }
}

fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || MISSING_MARKERS.contains(&cell)
}

/// Positions of the required columns within a row.
struct ColumnLayout {
    name: usize,
    given_name: usize,
    grade: usize,
    total: usize,
    title: usize,
    date: usize,
    first: usize,
    last: usize,
}

impl ColumnLayout {
    fn resolve(columns: &[String]) -> Result<Self, DataError> {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (i, column) in columns.iter().enumerate() {
            if let Some(&required) = REQUIRED_COLUMNS.iter().find(|c| **c == column.as_str()) {
                if positions.insert(required, i).is_some() {
                    return Err(DataError::AmbiguousColumn {
                        column: required.to_string(),
                    });
                }
            }
        }

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| !positions.contains_key(*c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DataError::MissingColumns { missing });
        }

        Ok(Self {
            name: positions["Name"],
            given_name: positions["Vorname"],
            grade: positions["Note"],
            total: positions["Total"],
            title: positions["Titel"],
            date: positions["Datum"],
            first: positions["First"],
            last: positions["Last"],
        })
    }

    fn parse_row(&self, row: &csv::StringRecord, line: usize) -> Result<Record, DataError> {
        let cell = |i: usize| row.get(i).unwrap_or_default();
        let invalid = |column: &str, value: &str| DataError::InvalidValue {
            row: line,
            column: column.to_string(),
            value: value.to_string(),
        };

        let grade = parse_decimal(cell(self.grade)).ok_or_else(|| invalid("Note", cell(self.grade)))?;
        let total = parse_decimal(cell(self.total)).ok_or_else(|| invalid("Total", cell(self.total)))?;
        let first = parse_page(cell(self.first)).ok_or_else(|| invalid("First", cell(self.first)))?;
        let last = parse_page(cell(self.last)).ok_or_else(|| invalid("Last", cell(self.last)))?;

        Ok(Record {
            identifier: fold_diacritics(cell(self.name).trim()),
            given_name: cell(self.given_name).trim().to_string(),
            grade,
            total,
            title: cell(self.title).to_string(),
            date: cell(self.date).to_string(),
            pages: PageRange::new(first, last),
        })
    }
}

/// Parse a number written with either `.` or `,` as decimal separator.
fn parse_decimal(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().replace(',', ".").parse().ok()?;
    value.is_finite().then_some(value)
}

/// Parse a page number; integral decimals such as `3.0` are accepted.
fn parse_page(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Ok(page) = raw.parse::<u32>() {
        return Some(page);
    }
    let value = parse_decimal(raw)?;
    (value.fract() == 0.0 && value >= 0.0 && value <= u32::MAX as f64).then_some(value as u32)
}
