//! Document upload boundary.
//!
//! Type, size and filename checks all run before anything is written to the
//! object store. The size limit is enforced while the multipart stream is
//! consumed, so an oversized body is never buffered whole.

use actix_multipart::Multipart;
use chrono::Utc;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{DocumentKind, FileStatus, UploadedFile};

use super::PipelineContext;
use super::storage::document_key;

/// Multipart field carrying the document.
pub const FILE_FIELD: &str = "file";

/// Generic MIME type that falls back to extension detection.
const OCTET_STREAM: &str = "application/octet-stream";

/// Document read from a multipart request, not yet validated.
#[derive(Debug, Clone)]
pub struct IncomingDocument {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

fn size_limit_error(max_size: usize) -> AppError {
    AppError::UploadRejected(format!(
        "Document exceeds the maximum size of {} bytes ({} MB)",
        max_size,
        max_size / (1024 * 1024)
    ))
}

/// Read the single document of a multipart upload, stopping at `max_size`.
pub async fn read_document(mut payload: Multipart, max_size: usize) -> AppResult<IncomingDocument> {
    let mut document: Option<IncomingDocument> = None;

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::InvalidInput(format!("Multipart error: {}", e)))?;

        let content_disposition = field
            .content_disposition()
            .ok_or_else(|| AppError::InvalidInput("Missing content disposition".to_string()))?;

        let is_file = content_disposition.get_name() == Some(FILE_FIELD)
            || content_disposition.get_filename().is_some();
        if !is_file {
            // Drain unknown form fields
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| AppError::InvalidInput(format!("Read error: {}", e)))?;
            }
            continue;
        }

        if document.is_some() {
            return Err(AppError::UploadRejected(
                "Only one document may be uploaded per request".to_string(),
            ));
        }

        let filename = content_disposition
            .get_filename()
            .ok_or_else(|| AppError::UploadRejected("Missing filename".to_string()))?
            .to_string();
        let content_type = field.content_type().map(|m| m.essence_str().to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::InvalidInput(format!("Read error: {}", e)))?;
            if data.len() + chunk.len() > max_size {
                warn!(filename = %filename, "Rejecting oversized upload");
                return Err(size_limit_error(max_size));
            }
            data.extend_from_slice(&chunk);
        }

        document = Some(IncomingDocument {
            filename,
            content_type,
            data,
        });
    }

    document.ok_or_else(|| {
        AppError::UploadRejected(format!("Missing '{}' field in multipart body", FILE_FIELD))
    })
}

/// Reject empty names and anything that looks like a path.
pub fn validate_filename(filename: &str) -> AppResult<&str> {
    let name = filename.trim();
    if name.is_empty() {
        return Err(AppError::UploadRejected("Filename is empty".to_string()));
    }
    if name.contains("..")
        || name.starts_with('/')
        || name.starts_with('\\')
        || name.contains('\0')
        || name.chars().nth(1) == Some(':')
    {
        return Err(AppError::UploadRejected(format!(
            "Invalid filename: {}",
            name
        )));
    }
    Ok(name)
}

/// Resolve the accepted document kind.
///
/// The declared MIME type wins; `application/octet-stream` or a missing type
/// falls back to the filename extension.
pub fn resolve_kind(filename: &str, content_type: Option<&str>) -> AppResult<DocumentKind> {
    let declared = content_type
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty() && c != OCTET_STREAM);

    let kind = match &declared {
        Some(mime) => DocumentKind::from_mime(mime),
        None => DocumentKind::from_extension(filename),
    };

    kind.ok_or_else(|| {
        AppError::UploadRejected(format!(
            "Unsupported document type '{}'; accepted: PDF, CSV, XLS, XLSX, TXT",
            declared.unwrap_or_else(|| filename.to_string())
        ))
    })
}

/// Run every pre-storage check on an incoming document.
pub fn validate_document(document: &IncomingDocument, max_size: usize) -> AppResult<DocumentKind> {
    let filename = validate_filename(&document.filename)?;
    let kind = resolve_kind(filename, document.content_type.as_deref())?;

    if document.data.is_empty() {
        return Err(AppError::UploadRejected("Document is empty".to_string()));
    }
    if document.data.len() > max_size {
        return Err(size_limit_error(max_size));
    }

    Ok(kind)
}

/// Validate, store and register an uploaded document.
pub async fn store_document(
    ctx: &PipelineContext,
    user: &AuthenticatedUser,
    document: IncomingDocument,
) -> AppResult<UploadedFile> {
    let kind = validate_document(&document, ctx.max_upload_size)?;

    let file_id = Uuid::now_v7();
    let sha256 = hex::encode(Sha256::digest(&document.data));
    let filename = document.filename.trim().to_string();
    let key = document_key(user.tenant_id, file_id, &sha256, &filename);
    let size_bytes = document.data.len() as i64;

    ctx.objects
        .put(&key, document.data, kind.mime_type())
        .await?;

    let now = Utc::now();
    let file = UploadedFile {
        id: file_id,
        tenant_id: user.tenant_id,
        uploaded_by: user.user_id.clone(),
        original_filename: filename,
        storage_path: key,
        mime_type: kind.mime_type().to_string(),
        size_bytes,
        content_sha256: sha256,
        status: FileStatus::Uploaded,
        error_message: None,
        attempt: 0,
        progress: 0,
        progress_message: None,
        created_at: now,
        updated_at: now,
    };
    ctx.store.insert_file(&file).await?;

    info!(
        file_id = %file.id,
        tenant_id = %file.tenant_id,
        size_bytes,
        mime_type = %file.mime_type,
        "Document uploaded"
    );

    Ok(file)
}
