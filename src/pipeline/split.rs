//! Extract one record's page range into its own PDF file.
//!
//! Each call parses a private copy of the annotated snapshot, drops every
//! page outside the range and prunes what became unreachable, so the output
//! carries only its own stamp. The snapshot itself is never touched, which
//! is what lets the orchestrator run several splits at once.

use crate::error::RecordError;
use crate::model::{PageRange, Record};
use crate::pipeline::document::AnnotatedDocument;
use crate::pipeline::paths;
use lopdf::Document;
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A written output document.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOutput {
    pub path: PathBuf,
    pub page_count: usize,
}

/// Keep only the 0-based `indices` of `doc`.
pub fn retain_pages(doc: &mut Document, indices: RangeInclusive<usize>) {
    // get_pages() is keyed by 1-based page number.
    let keep = (*indices.start() as u32 + 1)..=(*indices.end() as u32 + 1);
    let drop: Vec<u32> = doc
        .get_pages()
        .keys()
        .copied()
        .filter(|n| !keep.contains(n))
        .collect();
    if !drop.is_empty() {
        doc.delete_pages(&drop);
    }
    doc.prune_objects();
    doc.renumber_objects();
    doc.compress();
}

/// Extract `range` from the snapshot into serialised PDF bytes.
pub fn extract(
    source: &AnnotatedDocument,
    identifier: &str,
    range: PageRange,
) -> Result<(Vec<u8>, usize), RecordError> {
    let indices = range.to_indices(identifier, source.page_count())?;
    let fail = |detail: String| RecordError::Split {
        identifier: identifier.to_string(),
        detail,
    };

    let mut doc = source.load().map_err(|e| fail(e.to_string()))?;
    retain_pages(&mut doc, indices);

    let page_count = doc.get_pages().len();
    if page_count != range.len() {
        return Err(fail(format!(
            "expected {} page(s), extracted {}",
            range.len(),
            page_count
        )));
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| fail(e.to_string()))?;
    Ok((bytes, page_count))
}

/// Split `record`'s pages out of the snapshot and write them below
/// `destination`.
pub fn split_record(
    source: &AnnotatedDocument,
    record: &Record,
    destination: &Path,
) -> Result<SplitOutput, RecordError> {
    let (bytes, page_count) = extract(source, &record.identifier, record.pages)?;
    let path = paths::resolve_output_path(destination, record)?;

    write_atomic(&path, &bytes).map_err(|e| RecordError::Write {
        identifier: record.identifier.clone(),
        path: path.clone(),
        detail: e.to_string(),
    })?;

    debug!(
        "{}: wrote {} page(s), {} bytes → {}",
        record.identifier,
        page_count,
        bytes.len(),
        path.display()
    );
    Ok(SplitOutput { path, page_count })
}

/// Write via a sibling temp file and rename, replacing any existing file.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".gradestamp-")
        .suffix(".pdf.tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
