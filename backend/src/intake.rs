//! Request intake
//!
//! Validates a research submission before any streaming starts: at least one
//! of query text or attachment must be present, attachments must declare a
//! supported media kind, and document attachments are reduced to text.
//! Nothing in here touches the session registry; the caller opens the session
//! only after `prepare` succeeds, so a rejected submission leaves no trace.

use crate::error::AppError;
use crate::services::documents::DocumentService;
use crate::session::SessionId;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Maximum number of attachments per submission
pub const MAX_ATTACHMENTS: usize = 5;

/// Maximum length of a client-supplied session identifier
pub const MAX_SESSION_ID_LENGTH: usize = 64;

/// Declared media kind of an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Raster image, described by the vision capability
    Image,
    /// PDF document
    Pdf,
    /// Word document
    Docx,
    /// Comma-separated values
    Csv,
    /// Plain text
    Text,
}

impl MediaKind {
    /// Declare the media kind from the part's content type, falling back to the
    /// file extension when the content type is missing or generic
    pub fn declare(content_type: Option<&str>, file_name: &str) -> Option<Self> {
        let from_type = content_type.and_then(|ct| {
            let essence = ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase();
            match essence.as_str() {
                t if t.starts_with("image/") => Some(MediaKind::Image),
                "application/pdf" => Some(MediaKind::Pdf),
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                    Some(MediaKind::Docx)
                }
                "text/csv" | "application/csv" => Some(MediaKind::Csv),
                "text/plain" | "text/markdown" => Some(MediaKind::Text),
                _ => None,
            }
        });

        from_type.or_else(|| {
            let ext = Path::new(file_name)
                .extension()
                .and_then(|e| e.to_str())?
                .to_ascii_lowercase();
            match ext.as_str() {
                "png" | "jpg" | "jpeg" | "gif" | "webp" => Some(MediaKind::Image),
                "pdf" => Some(MediaKind::Pdf),
                "docx" => Some(MediaKind::Docx),
                "csv" => Some(MediaKind::Csv),
                "txt" | "md" => Some(MediaKind::Text),
                _ => None,
            }
        })
    }

    /// String form used in logs and payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Pdf => "pdf",
            MediaKind::Docx => "docx",
            MediaKind::Csv => "csv",
            MediaKind::Text => "text",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file part as received from the client, before validation
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-side file name
    pub file_name: String,
    /// Content type declared by the client, if any
    pub content_type: Option<String>,
    /// Raw bytes
    pub data: Vec<u8>,
}

/// A raw research submission
#[derive(Debug, Clone, Default)]
pub struct Submission {
    /// Query text (may be empty if attachments are present)
    pub query: String,
    /// Client-supplied session identifier
    pub session_id: Option<String>,
    /// Uploaded files
    pub uploads: Vec<Upload>,
}

/// A validated attachment
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Client-side file name
    pub file_name: String,
    /// Declared media kind
    pub kind: MediaKind,
    /// Content type (derived from the kind when the client sent none)
    pub content_type: String,
    /// Raw bytes
    pub data: Vec<u8>,
    /// Extracted text for document kinds
    pub text: Option<String>,
}

/// Summary of an attachment, safe to put in progress events
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentSummary {
    /// Client-side file name
    pub file_name: String,
    /// Declared media kind
    pub kind: MediaKind,
    /// Size in bytes
    pub size: usize,
}

/// Validated input for one research session run
#[derive(Debug, Clone)]
pub struct ResearchInput {
    /// Session this input belongs to
    pub session_id: SessionId,
    /// Trimmed query text (may be empty when attachments carry the request)
    pub query: String,
    /// Validated attachments
    pub attachments: Vec<Attachment>,
}

impl ResearchInput {
    /// Image attachments
    pub fn images(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments
            .iter()
            .filter(|a| a.kind == MediaKind::Image)
    }

    /// Attachment summaries for progress payloads
    pub fn attachment_summaries(&self) -> Vec<AttachmentSummary> {
        self.attachments
            .iter()
            .map(|a| AttachmentSummary {
                file_name: a.file_name.clone(),
                kind: a.kind,
                size: a.data.len(),
            })
            .collect()
    }
}

/// Limits applied during intake
#[derive(Debug, Clone, Copy)]
pub struct IntakeLimits {
    /// Maximum query length in characters
    pub max_query_length: usize,
    /// Maximum size of a single attachment in bytes
    pub max_upload_bytes: usize,
    /// Maximum characters kept from an extracted document
    pub max_document_chars: usize,
}

/// Validate a client-supplied session identifier
///
/// # Returns
/// * `Ok(())` - 1 to 64 characters of `[A-Za-z0-9_-]`
/// * `Err(AppError::InvalidRequest)` - otherwise
pub fn validate_session_id(id: &str) -> Result<(), AppError> {
    if id.is_empty() || id.len() > MAX_SESSION_ID_LENGTH {
        return Err(AppError::InvalidRequest(format!(
            "session_id must be between 1 and {} characters",
            MAX_SESSION_ID_LENGTH
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::InvalidRequest(
            "session_id may only contain letters, digits, '-' and '_'".to_string(),
        ));
    }
    Ok(())
}

/// Validate a submission and turn it into pipeline input
///
/// # Arguments
/// * `submission` - Raw fields parsed from the multipart body
/// * `limits` - Intake limits
///
/// # Returns
/// * `Ok(ResearchInput)` - Validated input with document text extracted
/// * `Err(AppError)` - `InvalidRequest` for malformed or empty input,
///   `PayloadTooLarge` for oversized attachments
pub async fn prepare(submission: Submission, limits: &IntakeLimits) -> Result<ResearchInput, AppError> {
    let query = submission.query.trim().to_string();

    if query.is_empty() && submission.uploads.is_empty() {
        return Err(AppError::InvalidRequest(
            "a query or at least one attachment is required".to_string(),
        ));
    }
    if query.chars().count() > limits.max_query_length {
        return Err(AppError::InvalidRequest(format!(
            "query exceeds maximum length of {} characters",
            limits.max_query_length
        )));
    }
    if submission.uploads.len() > MAX_ATTACHMENTS {
        return Err(AppError::InvalidRequest(format!(
            "at most {} attachments are accepted",
            MAX_ATTACHMENTS
        )));
    }

    let session_id = match submission.session_id {
        Some(id) => {
            validate_session_id(&id)?;
            id
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    let mut attachments = Vec::with_capacity(submission.uploads.len());
    for upload in submission.uploads {
        attachments.push(admit_upload(upload, limits).await?);
    }

    tracing::info!(
        session_id = %session_id,
        query_len = query.len(),
        attachments = attachments.len(),
        "Research submission accepted"
    );

    Ok(ResearchInput {
        session_id,
        query,
        attachments,
    })
}

async fn admit_upload(upload: Upload, limits: &IntakeLimits) -> Result<Attachment, AppError> {
    if upload.data.is_empty() {
        return Err(AppError::InvalidRequest(format!(
            "attachment '{}' is empty",
            upload.file_name
        )));
    }
    if upload.data.len() > limits.max_upload_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "attachment '{}' is {} bytes, limit is {} bytes",
            upload.file_name,
            upload.data.len(),
            limits.max_upload_bytes
        )));
    }

    let kind = MediaKind::declare(upload.content_type.as_deref(), &upload.file_name).ok_or_else(
        || {
            AppError::InvalidRequest(format!(
                "attachment '{}' has an unsupported media type ({})",
                upload.file_name,
                upload.content_type.as_deref().unwrap_or("none declared")
            ))
        },
    )?;

    let content_type = upload
        .content_type
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
        .unwrap_or_else(|| default_content_type(kind, &upload.file_name).to_string());

    let text = match kind {
        MediaKind::Image => None,
        _ => Some(
            DocumentService::extract_text(
                upload.file_name.clone(),
                kind,
                upload.data.clone(),
                limits.max_document_chars,
            )
            .await?,
        ),
    };

    Ok(Attachment {
        file_name: upload.file_name,
        kind,
        content_type,
        data: upload.data,
        text,
    })
}

fn default_content_type(kind: MediaKind, file_name: &str) -> &'static str {
    match kind {
        MediaKind::Image => {
            let ext = Path::new(file_name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            match ext.as_deref() {
                Some("jpg") | Some("jpeg") => "image/jpeg",
                Some("gif") => "image/gif",
                Some("webp") => "image/webp",
                _ => "image/png",
            }
        }
        MediaKind::Pdf => "application/pdf",
        MediaKind::Docx => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        MediaKind::Csv => "text/csv",
        MediaKind::Text => "text/plain",
    }
}
