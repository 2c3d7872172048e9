//! Output locations: `<destination>/<identifier>/<date>_<identifier>_<title>.pdf`.

use crate::error::RecordError;
use crate::model::Record;
use std::path::{Path, PathBuf};

/// File name for a record's output document, without any directory.
pub fn file_name(record: &Record) -> String {
    format!(
        "{}_{}_{}.pdf",
        record.date.trim(),
        record.identifier,
        record.title.trim()
    )
}

/// Full output path for `record` below `destination`. Pure; touches nothing.
pub fn output_path(destination: &Path, record: &Record) -> PathBuf {
    destination
        .join(&record.identifier)
        .join(file_name(record))
}

/// Resolve the output path and make sure its folder exists.
///
/// Calling this again for the same record is a no-op apart from returning
/// the same path.
pub fn resolve_output_path(destination: &Path, record: &Record) -> Result<PathBuf, RecordError> {
    let path = output_path(destination, record);
    let fail = |detail: String| RecordError::Write {
        identifier: record.identifier.clone(),
        path: path.clone(),
        detail,
    };

    for (field, value) in [
        ("identifier", record.identifier.as_str()),
        ("date", record.date.as_str()),
        ("title", record.title.as_str()),
    ] {
        if value.contains(['/', '\\']) {
            return Err(fail(format!("{field} '{value}' contains a path separator")));
        }
    }
    if record.identifier.is_empty() || record.identifier == "." || record.identifier == ".." {
        return Err(fail(format!(
            "identifier '{}' is not a usable folder name",
            record.identifier
        )));
    }

    let folder = destination.join(&record.identifier);
    std::fs::create_dir_all(&folder).map_err(|e| fail(e.to_string()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageRange;

    fn record(identifier: &str, date: &str, title: &str) -> Record {
        Record {
            identifier: identifier.into(),
            given_name: "Anna".into(),
            grade: 5.0,
            total: 42.0,
            title: title.into(),
            date: date.into(),
            pages: PageRange::new(1, 1),
        }
    }

    #[test]
    fn file_name_trims_date_and_title() {
        let r = record("Mueller", " 2024-03-01 ", "  Pruefung 1 ");
        assert_eq!(file_name(&r), "2024-03-01_Mueller_Pruefung 1.pdf");
    }

    #[test]
    fn output_path_nests_under_identifier() {
        let r = record("Mueller", "2024-03-01", "Pruefung 1");
        let p = output_path(Path::new("/out"), &r);
        assert_eq!(
            p,
            PathBuf::from("/out/Mueller/2024-03-01_Mueller_Pruefung 1.pdf")
        );
    }

    #[test]
    fn resolve_creates_folder_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let r = record("Keller", "2024-03-01", "Test");

        let first = resolve_output_path(dir.path(), &r).unwrap();
        assert!(dir.path().join("Keller").is_dir());
        let second = resolve_output_path(dir.path(), &r).unwrap();
        assert_eq!(first, second);
        assert!(!first.exists(), "resolver must not create the file itself");
    }

    #[test]
    fn separators_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for r in [
            record("Keller", "01/03/2024", "Test"),
            record("Keller", "2024-03-01", "A\\B"),
            record("../Keller", "2024-03-01", "Test"),
        ] {
            let err = resolve_output_path(dir.path(), &r).unwrap_err();
            assert_eq!(err.kind(), "io");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn dot_identifiers_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_output_path(dir.path(), &record("..", "d", "t")).is_err());
        assert!(resolve_output_path(dir.path(), &record("", "d", "t")).is_err());
    }
}
