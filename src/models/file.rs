//! Uploaded document models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of an uploaded document.
///
/// `uploaded → parsed → extracted | failed`. `parsed` means an extraction
/// attempt is in flight; a new attempt may only begin from a settled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Uploaded,
    Parsed,
    Extracted,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Parsed => "parsed",
            Self::Extracted => "extracted",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(Self::Uploaded),
            "parsed" => Some(Self::Parsed),
            "extracted" => Some(Self::Extracted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether a new extraction attempt may start from this status.
    pub fn accepts_new_attempt(&self) -> bool {
        !matches!(self, Self::Parsed)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Accepted document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Csv,
    Xls,
    Xlsx,
    Txt,
}

impl DocumentKind {
    /// Canonical MIME type stored with the file.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Csv => "text/csv",
            Self::Xls => "application/vnd.ms-excel",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Txt => "text/plain",
        }
    }

    /// Resolve from a declared MIME type (parameters such as charset are ignored).
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "text/csv" | "application/csv" => Some(Self::Csv),
            "application/vnd.ms-excel" => Some(Self::Xls),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Some(Self::Xlsx),
            "text/plain" => Some(Self::Txt),
            _ => None,
        }
    }

    /// Resolve from a filename extension.
    pub fn from_extension(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "csv" => Some(Self::Csv),
            "xls" => Some(Self::Xls),
            "xlsx" => Some(Self::Xlsx),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }
}

/// Uploaded document as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub uploaded_by: String,
    pub original_filename: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub content_sha256: String,
    pub status: FileStatus,
    pub error_message: Option<String>,
    /// Number of extraction attempts started
    pub attempt: i32,
    /// Progress of the current attempt (0-100, monotonic within an attempt)
    pub progress: i16,
    pub progress_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// File metadata response.
#[derive(Debug, Serialize, ToSchema)]
pub struct FileResponse {
    pub id: Uuid,
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub attempt: i32,
    pub created_at: DateTime<Utc>,
    /// Signed, time-limited download URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl FileResponse {
    pub fn from_file(file: &UploadedFile, download_url: Option<String>) -> Self {
        Self {
            id: file.id,
            original_filename: file.original_filename.clone(),
            mime_type: file.mime_type.clone(),
            size_bytes: file.size_bytes,
            status: file.status,
            error_message: file.error_message.clone(),
            attempt: file.attempt,
            created_at: file.created_at,
            download_url,
        }
    }
}
