//! Domain error types for the extraction server.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;

/// A single field-level validation failure on a transformed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct FieldViolation {
    /// Destination record index within the candidate batch.
    pub record: usize,
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {} field '{}': {}", self.record, self.field, self.message)
    }
}

/// Why an extraction failed the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GateFailure {
    LowConfidence,
    InsufficientEvidence,
}

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Upload refused before storage (type or size)
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    /// Object store could not deliver the document
    #[error("Document download failed: {0}")]
    DownloadFailed(String),

    /// AI service transport error or 5xx
    #[error("Extraction service unavailable: {0}")]
    ExternalServiceFailed(String),

    /// AI output did not match the extraction contract
    #[error("Extraction output violated the schema: {0}")]
    SchemaViolation(String),

    /// Extraction rejected for low confidence or too little evidence
    #[error("{message}")]
    QualityGateFailed { reason: GateFailure, message: String },

    /// Transformed records failed field rules
    #[error("Validation failed with {} violation(s)", .0.len())]
    ValidationFailed(Vec<FieldViolation>),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not allowed in the resource's current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Storage (S3) operation failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AppError {
    /// Whether a caller should retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ExternalServiceFailed(_) | AppError::DownloadFailed(_)
        )
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::UploadRejected(_) => "UPLOAD_REJECTED",
            AppError::DownloadFailed(_) => "DOWNLOAD_FAILED",
            AppError::ExternalServiceFailed(_) => "EXTERNAL_SERVICE_FAILED",
            AppError::SchemaViolation(_) => "SCHEMA_VIOLATION",
            AppError::QualityGateFailed { .. } => "QUALITY_GATE_FAILED",
            AppError::ValidationFailed(_) => "VALIDATION_FAILED",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::UploadRejected(_)
            | AppError::InvalidInput(_)
            | AppError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::QualityGateFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DownloadFailed(_)
            | AppError::ExternalServiceFailed(_)
            | AppError::SchemaViolation(_)
            | AppError::Database(_)
            | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Database(err_str) => {
                tracing::error!("Database error: {}", err_str);
                "An internal database error occurred".to_string()
            }
            AppError::Storage(err_str) => {
                tracing::error!("Storage error: {}", err_str);
                "An internal storage error occurred".to_string()
            }
            _ => self.to_string(),
        };

        let details = match self {
            AppError::ValidationFailed(violations) => violations.clone(),
            _ => Vec::new(),
        };

        let reason = match self {
            AppError::QualityGateFailed { reason, .. } => Some(*reason),
            _ => None,
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            ok: false,
            error: self.code().to_string(),
            message,
            reason,
            details,
        })
    }
}

/// Error response body matching OpenAPI schema.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<GateFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldViolation>,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("Invalid UUID: {}", err))
    }
}
