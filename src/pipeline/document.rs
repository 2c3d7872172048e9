//! The shared source document and its lifecycle.
//!
//! ```text
//! SourceDocument ──save_working_copy──▶ WorkingCopy ──open──▶ AnnotatedDocument
//!   (mutable, one owner)                 (temp file)          (read-only bytes)
//! ```
//!
//! [`SourceDocument`] is the only mutable handle; stamps are applied through
//! it one record at a time. Saving consumes it, so nothing can stamp the
//! document after the splitter has started reading. The splitter works from
//! [`AnnotatedDocument`], an immutable byte snapshot of the saved working
//! file that each split job parses on its own.

use crate::error::BatchError;
use crate::pipeline::input;
use lopdf::{Document, ObjectId};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// The opened, mutable source PDF.
pub struct SourceDocument {
    doc: Document,
    path: PathBuf,
    page_ids: Vec<ObjectId>,
}

impl SourceDocument {
    /// Validate and parse the PDF at `path`.
    pub fn open(path: &Path) -> Result<Self, BatchError> {
        input::check_pdf(path)?;
        let doc = Document::load(path).map_err(|e| BatchError::CorruptPdf {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let source = Self::from_document(doc, path);
        info!(
            "Source PDF loaded: {} pages from {}",
            source.page_count(),
            path.display()
        );
        Ok(source)
    }

    /// Wrap an already-parsed document; `path` is only used for messages.
    pub fn from_document(doc: Document, path: impl Into<PathBuf>) -> Self {
        let page_ids = doc.get_pages().into_values().collect();
        Self {
            doc,
            path: path.into(),
            page_ids,
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Object id of the page at 0-based `index`.
    pub fn page_id(&self, index: usize) -> Option<ObjectId> {
        self.page_ids.get(index).copied()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Serialise the current in-memory state.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, BatchError> {
        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| BatchError::CorruptPdf {
                path: self.path.clone(),
                detail: format!("serialisation failed: {e}"),
            })?;
        Ok(buf)
    }

    /// Save the annotated document to a hidden temporary file inside `dir`
    /// and release the mutable handle.
    pub fn save_working_copy(mut self, dir: &Path) -> Result<WorkingCopy, BatchError> {
        let bytes = self.to_bytes()?;
        let failed = |detail: String| BatchError::WorkingFileFailed {
            path: dir.to_path_buf(),
            detail,
        };

        let mut file = tempfile::Builder::new()
            .prefix(".gradestamp-")
            .suffix(".pdf")
            .tempfile_in(dir)
            .map_err(|e| failed(e.to_string()))?;
        file.write_all(&bytes)
            .and_then(|_| file.flush())
            .map_err(|e| failed(e.to_string()))?;

        debug!(
            "Annotated source saved: {} bytes → {}",
            bytes.len(),
            file.path().display()
        );
        Ok(WorkingCopy { file })
    }
}

/// The annotated source persisted to a temporary working file.
///
/// Dropping it (or calling [`WorkingCopy::close`]) deletes the file.
pub struct WorkingCopy {
    file: NamedTempFile,
}

impl WorkingCopy {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Re-read the working file as an immutable snapshot.
    pub fn open(&self) -> Result<AnnotatedDocument, BatchError> {
        let path = self.path().to_path_buf();
        let bytes = std::fs::read(&path).map_err(|e| BatchError::WorkingFileFailed {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        AnnotatedDocument::from_bytes(bytes, path)
    }

    /// Delete the working file, reporting any failure.
    pub fn close(self) -> Result<(), BatchError> {
        let path = self.path().to_path_buf();
        self.file
            .close()
            .map_err(|e| BatchError::WorkingFileFailed {
                path,
                detail: e.to_string(),
            })
    }
}

/// Read-only snapshot of the fully annotated source document.
#[derive(Debug, Clone)]
pub struct AnnotatedDocument {
    bytes: Vec<u8>,
    page_count: usize,
    path: PathBuf,
}

impl AnnotatedDocument {
    /// Parse `bytes` once to validate them and count pages.
    pub fn from_bytes(bytes: Vec<u8>, path: impl Into<PathBuf>) -> Result<Self, BatchError> {
        let path = path.into();
        let doc = Document::load_mem(&bytes).map_err(|e| BatchError::CorruptPdf {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        let page_count = doc.get_pages().len();
        Ok(Self {
            bytes,
            page_count,
            path,
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A fresh, independently mutable parse of the snapshot.
    pub fn load(&self) -> Result<Document, lopdf::Error> {
        Document::load_mem(&self.bytes)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// An A4 document with `pages` pages, each printing "Page N".
    ///
    /// Resources and MediaBox live on the page tree root and are inherited.
    pub(crate) fn sample_document(pages: usize) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(pages);
        for n in 1..=pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(format!("Page {n}"))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    /// `sample_document` serialised to bytes.
    pub(crate) fn sample_pdf_bytes(pages: usize) -> Vec<u8> {
        let mut doc = sample_document(pages);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn page_lookup_is_zero_based() {
        let src = SourceDocument::from_document(sample_document(3), "mem.pdf");
        assert_eq!(src.page_count(), 3);
        assert!(src.page_id(0).is_some());
        assert!(src.page_id(2).is_some());
        assert!(src.page_id(3).is_none());
        assert_ne!(src.page_id(0), src.page_id(1));
    }

    #[test]
    fn open_reads_pdf_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fahne.pdf");
        std::fs::write(&path, sample_pdf_bytes(4)).unwrap();

        let src = SourceDocument::open(&path).unwrap();
        assert_eq!(src.page_count(), 4);
        assert_eq!(src.path(), path.as_path());
    }

    #[test]
    fn open_rejects_garbage_after_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.5\nthis is not a pdf body").unwrap();
        assert!(matches!(
            SourceDocument::open(&path),
            Err(BatchError::CorruptPdf { .. })
        ));
    }

    #[test]
    fn working_copy_round_trip_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let src = SourceDocument::from_document(sample_document(5), "mem.pdf");

        let working = src.save_working_copy(dir.path()).unwrap();
        let working_path = working.path().to_path_buf();
        assert!(working_path.exists());
        assert!(working_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".gradestamp-"));

        let annotated = working.open().unwrap();
        assert_eq!(annotated.page_count(), 5);
        assert_eq!(annotated.load().unwrap().get_pages().len(), 5);

        working.close().unwrap();
        assert!(!working_path.exists());
    }

    #[test]
    fn annotated_document_rejects_invalid_bytes() {
        let err = AnnotatedDocument::from_bytes(b"not a pdf".to_vec(), "x.pdf").unwrap_err();
        assert!(matches!(err, BatchError::CorruptPdf { .. }));
    }
}
