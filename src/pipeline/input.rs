//! Input resolution: validate and read local PDF documents.
//!
//! All local-file failures are detected here, before any remote call, and
//! reported as [`DocumentError::Input`] so a bad path costs nothing but a
//! stat. We validate the `%PDF` magic bytes up front so callers get a
//! meaningful error instead of a cryptic rejection from the parsing service
//! after a full upload.

use crate::error::{DocumentError, Pdf2NlError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Collect the PDF files to process from a file or directory path.
///
/// A directory is scanned non-recursively for `*.pdf` entries, sorted by
/// file name so batch order is stable across platforms. A file path is
/// returned as-is (its extension is validated later, per document, so that
/// a bad explicit path still yields a per-document error in batch output).
pub fn collect_documents(path: &Path) -> Result<Vec<PathBuf>, Pdf2NlError> {
    if path.is_dir() {
        let entries = std::fs::read_dir(path).map_err(|e| Pdf2NlError::InputPath {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

        let mut pdfs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| has_pdf_extension(p))
            .collect();
        pdfs.sort();

        debug!("Found {} PDF file(s) in {}", pdfs.len(), path.display());
        Ok(pdfs)
    } else if path.exists() {
        Ok(vec![path.to_path_buf()])
    } else {
        Err(Pdf2NlError::InputPath {
            path: path.to_path_buf(),
            detail: "no such file or directory".into(),
        })
    }
}

/// Whether the path carries a `.pdf` extension (case-insensitive).
pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Read a document's bytes, validating extension and `%PDF` magic.
pub async fn read_document(path: &Path) -> Result<Vec<u8>, DocumentError> {
    if !has_pdf_extension(path) {
        return Err(DocumentError::Input {
            path: path.to_path_buf(),
            detail: "unsupported extension (expected .pdf)".into(),
        });
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DocumentError::Input {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        return Err(DocumentError::Input {
            path: path.to_path_buf(),
            detail: "not a valid PDF (missing %PDF header)".into(),
        });
    }

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_pdf_extension(Path::new("a.pdf")));
        assert!(has_pdf_extension(Path::new("a.PDF")));
        assert!(!has_pdf_extension(Path::new("a.txt")));
        assert!(!has_pdf_extension(Path::new("pdf")));
    }

    #[tokio::test]
    async fn read_rejects_wrong_extension() {
        let err = read_document(Path::new("notes.txt")).await.unwrap_err();
        assert!(matches!(err, DocumentError::Input { .. }));
        assert!(err.to_string().contains("unsupported extension"));
    }

    #[tokio::test]
    async fn read_rejects_missing_file() {
        let err = read_document(Path::new("/nonexistent/x.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::Input { .. }));
    }

    #[tokio::test]
    async fn read_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"hello world")
            .unwrap();

        let err = read_document(&path).await.unwrap_err();
        assert!(err.to_string().contains("%PDF"));
    }

    #[tokio::test]
    async fn read_accepts_valid_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.pdf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"%PDF-1.4\nminimal")
            .unwrap();

        let bytes = read_document(&path).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn collect_scans_directory_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.pdf", "c.txt"] {
            std::fs::File::create(dir.path().join(name))
                .unwrap()
                .write_all(b"%PDF-1.4")
                .unwrap();
        }

        let docs = collect_documents(dir.path()).unwrap();
        let names: Vec<_> = docs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn collect_missing_path_is_fatal() {
        let err = collect_documents(Path::new("/definitely/missing")).unwrap_err();
        assert!(matches!(err, Pdf2NlError::InputPath { .. }));
    }
}
