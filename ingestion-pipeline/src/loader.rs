use std::{fs, path::Path};

use lopdf::Document;
use tracing::{debug, warn};

use common::error::AppError;

/// One loaded source unit prior to chunking: a whole text file, or a PDF
/// page when only the per-page extractor succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub content: String,
    pub source_path: String,
    pub source_type: String,
    pub page: Option<u32>,
    pub heading_path: Vec<String>,
}

/// Loads a single source file into document records.
///
/// PDFs prefer the layout-aware whole-document extractor; when that fails the
/// per-page parser takes over and records carry page numbers. Text and
/// Markdown are read as UTF-8 single records. A file that cannot be loaded
/// yields an empty list after a warning, so one bad source never aborts the
/// ingestion run.
pub fn load_document(path: &Path) -> Vec<DocumentRecord> {
    let source_type = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match source_type.as_str() {
        "pdf" => load_pdf(path),
        "txt" | "md" => load_text(path, &source_type),
        other => {
            warn!(path = %path.display(), source_type = other, "Unsupported source type");
            Vec::new()
        }
    }
}

fn load_text(path: &Path, source_type: &str) -> Vec<DocumentRecord> {
    match fs::read_to_string(path) {
        Ok(content) => vec![DocumentRecord {
            content,
            source_path: path.display().to_string(),
            source_type: source_type.to_string(),
            page: None,
            heading_path: Vec::new(),
        }],
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to read text file");
            Vec::new()
        }
    }
}

fn load_pdf(path: &Path) -> Vec<DocumentRecord> {
    match extract_pdf_layout(path) {
        Ok(content) if !content.trim().is_empty() => {
            debug!(path = %path.display(), "Extracted PDF via layout-aware path");
            return vec![DocumentRecord {
                content,
                source_path: path.display().to_string(),
                source_type: "pdf".to_string(),
                page: None,
                heading_path: Vec::new(),
            }];
        }
        Ok(_) => {
            debug!(path = %path.display(), "Layout-aware extraction produced no text");
        }
        Err(err) => {
            debug!(path = %path.display(), error = %err, "Layout-aware extraction failed");
        }
    }

    match extract_pdf_pages(path) {
        Ok(records) if !records.is_empty() => records,
        Ok(_) => {
            warn!(path = %path.display(), "PDF produced no extractable text");
            Vec::new()
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to load PDF");
            Vec::new()
        }
    }
}

fn extract_pdf_layout(path: &Path) -> Result<String, AppError> {
    let bytes = fs::read(path)?;
    pdf_extract::extract_text_from_mem(&bytes)
        .map(|text| text.trim().to_string())
        .map_err(|err| AppError::Processing(format!("Failed to extract text from PDF: {err}")))
}

fn extract_pdf_pages(path: &Path) -> Result<Vec<DocumentRecord>, AppError> {
    let document = Document::load(path)
        .map_err(|err| AppError::Processing(format!("Failed to parse PDF: {err}")))?;
    let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    page_numbers.sort_unstable();

    let mut records = Vec::with_capacity(page_numbers.len());
    for page in page_numbers {
        match document.extract_text(&[page]) {
            Ok(content) if !content.trim().is_empty() => records.push(DocumentRecord {
                content,
                source_path: path.display().to_string(),
                source_type: "pdf".to_string(),
                page: Some(page),
                heading_path: Vec::new(),
            }),
            Ok(_) => {}
            Err(err) => {
                warn!(page, error = %err, "Skipping unextractable PDF page");
            }
        }
    }
    Ok(records)
}
