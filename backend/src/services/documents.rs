//! Document text extraction service
//!
//! Turns PDF, DOCX, CSV and plain-text attachments into text the pipeline can
//! forward to the reasoning capability. Extraction is CPU-bound and runs on
//! the blocking pool.

use crate::intake::MediaKind;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Read};
use thiserror::Error;

/// Number of CSV rows rendered verbatim before the rest is summarized
const CSV_PREVIEW_ROWS: usize = 50;

static DOCX_PARAGRAPH_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</w:p>").expect("static regex"));
static DOCX_TAB: Lazy<Regex> = Lazy::new(|| Regex::new(r"<w:tab/>").expect("static regex"));
static XML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));

/// Errors that can occur while extracting text from an attachment
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// PDF could not be parsed
    #[error("could not read PDF '{0}': {1}")]
    Pdf(String, String),

    /// DOCX archive or document part could not be read
    #[error("could not read DOCX '{0}': {1}")]
    Docx(String, String),

    /// CSV could not be parsed
    #[error("could not read CSV '{0}': {1}")]
    Csv(String, String),

    /// Text attachment is not valid UTF-8
    #[error("attachment '{0}' is not valid UTF-8 text")]
    Encoding(String),

    /// Extraction produced no text at all
    #[error("attachment '{0}' contains no extractable text")]
    Empty(String),

    /// Extraction task panicked or was cancelled
    #[error("extraction of '{0}' was interrupted: {1}")]
    Interrupted(String, String),

    /// Media kind has no text representation
    #[error("attachment '{0}' of kind {1} has no text to extract")]
    Unsupported(String, MediaKind),
}

/// Document extraction service
pub struct DocumentService;

impl DocumentService {
    /// Extract text from an attachment on the blocking pool
    ///
    /// # Arguments
    /// * `file_name` - Attachment name (used in error messages)
    /// * `kind` - Declared media kind
    /// * `data` - Raw attachment bytes
    /// * `max_chars` - Maximum number of characters kept
    ///
    /// # Returns
    /// * `Ok(String)` - Extracted (possibly truncated) text
    /// * `Err(ExtractionError)` - If the document cannot be read
    pub async fn extract_text(
        file_name: String,
        kind: MediaKind,
        data: Vec<u8>,
        max_chars: usize,
    ) -> Result<String, ExtractionError> {
        let name = file_name.clone();
        tokio::task::spawn_blocking(move || {
            Self::extract_text_blocking(&file_name, kind, &data, max_chars)
        })
        .await
        .map_err(|e| ExtractionError::Interrupted(name, e.to_string()))?
    }

    /// Synchronous extraction, see [`DocumentService::extract_text`]
    pub fn extract_text_blocking(
        file_name: &str,
        kind: MediaKind,
        data: &[u8],
        max_chars: usize,
    ) -> Result<String, ExtractionError> {
        let text = match kind {
            MediaKind::Pdf => extract_pdf(file_name, data)?,
            MediaKind::Docx => extract_docx(file_name, data)?,
            MediaKind::Csv => extract_csv(file_name, data)?,
            MediaKind::Text => String::from_utf8(data.to_vec())
                .map_err(|_| ExtractionError::Encoding(file_name.to_string()))?,
            MediaKind::Image => {
                return Err(ExtractionError::Unsupported(file_name.to_string(), kind))
            }
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(ExtractionError::Empty(file_name.to_string()));
        }

        tracing::debug!(
            file_name = %file_name,
            kind = %kind,
            chars = text.chars().count(),
            "Extracted attachment text"
        );
        Ok(truncate_chars(text, max_chars))
    }
}

fn extract_pdf(file_name: &str, data: &[u8]) -> Result<String, ExtractionError> {
    pdf_extract::extract_text_from_mem(data)
        .map_err(|e| ExtractionError::Pdf(file_name.to_string(), e.to_string()))
}

fn extract_docx(file_name: &str, data: &[u8]) -> Result<String, ExtractionError> {
    let docx_err = |e: &dyn std::fmt::Display| ExtractionError::Docx(file_name.to_string(), e.to_string());

    let mut archive = zip::ZipArchive::new(Cursor::new(data)).map_err(|e| docx_err(&e))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| docx_err(&e))?
        .read_to_string(&mut xml)
        .map_err(|e| docx_err(&e))?;

    let xml = DOCX_PARAGRAPH_END.replace_all(&xml, "\n");
    let xml = DOCX_TAB.replace_all(&xml, "\t");
    let text = XML_TAG.replace_all(&xml, "");
    Ok(unescape_xml(&text))
}

fn extract_csv(file_name: &str, data: &[u8]) -> Result<String, ExtractionError> {
    let csv_err = |e: csv::Error| ExtractionError::Csv(file_name.to_string(), e.to_string());

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data);
    let headers = reader.headers().map_err(csv_err)?.clone();

    let mut out = format!(
        "Columns: {}\n",
        headers.iter().collect::<Vec<_>>().join(", ")
    );
    let mut rows = 0usize;
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        if rows < CSV_PREVIEW_ROWS {
            out.push_str(&record.iter().collect::<Vec<_>>().join(" | "));
            out.push('\n');
        }
        rows += 1;
    }
    if rows > CSV_PREVIEW_ROWS {
        out.push_str(&format!("... ({} more rows)\n", rows - CSV_PREVIEW_ROWS));
    }
    out.push_str(&format!("Total rows: {}\n", rows));
    Ok(out)
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Truncate to at most `max_chars` characters, on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n[truncated]", &text[..idx]),
        None => text.to_string(),
    }
}
