//! Domain models for the extraction pipeline.

use utoipa::ToSchema;

pub mod audit;
pub mod destination;
pub mod extraction;
pub mod file;
pub mod preview;

// Re-export commonly used types
pub use audit::{ApprovalAuditEntry, AuditAction, AuditQuery, NewAuditEntry};
pub use destination::{
    DestinationRecord, DestinationTable, FieldBag, HazardClass, LicenseConditionRecord,
    MAX_TRACKING_REISSUES, SupplierRecord, TrackingSeed, WasteLogRecord,
};
pub use extraction::{
    ExtractRequest, ExtractResponse, ExtractionJob, ExtractionStatus, JobStatus, LogOutcome,
    NewExtractionLog, NewStagingItem, ReviewStatus, StagingItem, StatusQuery,
};
pub use file::{DocumentKind, FileResponse, FileStatus, UploadedFile};
pub use preview::{
    ApprovalMode, ApproveRequest, ApproveResponse, ChangeKind, ComparisonSet, ExtractionPreview,
    FieldComparison, PreviewStatus, PreviewSummary, RejectRequest, RejectResponse, RowComparison,
};

/// Pagination parameters.
#[derive(Debug, Clone, Default, serde::Deserialize, ToSchema)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    50
}

impl PaginationParams {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(default_page()).max(1)
    }

    /// Calculate the offset for database queries.
    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.clamped_limit())
    }

    /// Clamp limit to maximum allowed value.
    pub fn clamped_limit(&self) -> u32 {
        self.limit.unwrap_or(default_limit()).clamp(1, 200)
    }
}

/// Pagination metadata for responses.
#[derive(Debug, Clone, serde::Serialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit)) as u32
        };

        Pagination {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// Paginated audit listing.
#[derive(Debug, serde::Serialize, ToSchema)]
pub struct AuditListResponse {
    pub entries: Vec<ApprovalAuditEntry>,
    pub pagination: Pagination,
}
