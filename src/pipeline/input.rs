//! Input discovery: turn a user-supplied file or folder into the list of
//! invoices to process.
//!
//! A folder yields its direct `*.pdf` children (any case), sorted by name so
//! dispatch order is reproducible. Sub-folders are not searched: the output
//! directory often lives inside the input folder and must not be re-read.

use crate::error::InvoiceSortError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Resolve `input` to the ordered list of PDF files to process.
pub fn discover(input: &Path) -> Result<Vec<PathBuf>, InvoiceSortError> {
    let meta = std::fs::metadata(input).map_err(|_| InvoiceSortError::InputNotFound {
        path: input.to_path_buf(),
    })?;

    if meta.is_file() {
        if !has_pdf_extension(input) {
            warn!("{} does not have a .pdf extension", input.display());
        }
        debug!("Single input file: {}", input.display());
        return Ok(vec![input.to_path_buf()]);
    }

    let entries = std::fs::read_dir(input).map_err(|e| {
        InvoiceSortError::Internal(format!("cannot list '{}': {}", input.display(), e))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && has_pdf_extension(p))
        .collect();
    files.sort();

    if files.is_empty() {
        warn!("No PDF files found in {}", input.display());
    } else {
        info!("Found {} PDF files in {}", files.len(), input.display());
    }
    Ok(files)
}

/// `true` when the extension is `pdf`, ignoring case.
pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn extension_check_ignores_case() {
        assert!(has_pdf_extension(Path::new("a.pdf")));
        assert!(has_pdf_extension(Path::new("b.PDF")));
        assert!(!has_pdf_extension(Path::new("c.pdf.txt")));
        assert!(!has_pdf_extension(Path::new("pdf")));
    }

    #[test]
    fn folder_yields_sorted_pdfs_only() {
        let dir = TempDir::new().unwrap();
        for name in ["b.pdf", "a.PDF", "notes.txt", "c.pdf"] {
            std::fs::write(dir.path().join(name), b"%PDF").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.pdf")).unwrap();
        std::fs::write(dir.path().join("nested.pdf/ignored.pdf"), b"%PDF").unwrap();

        let files = discover(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn single_file_is_returned_as_is() {
        let dir = TempDir::new().unwrap();
        let f = dir.path().join("invoice.pdf");
        std::fs::write(&f, b"%PDF").unwrap();
        assert_eq!(discover(&f).unwrap(), vec![f]);
    }

    #[test]
    fn empty_folder_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(discover(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_input_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = discover(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, InvoiceSortError::InputNotFound { .. }));
    }
}
