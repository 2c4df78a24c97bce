//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ESG Extraction Server",
        version = "0.1.0",
        description = "Document upload, AI extraction, human reconciliation and approval of ESG records"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health
        api::health::health,
        api::health::ready,
        // Files
        api::files::upload_file,
        api::files::get_file,
        api::files::list_file_previews,
        // Extractions
        api::extractions::start_extraction,
        api::extractions::get_status,
        // Previews
        api::previews::get_preview,
        api::previews::approve_preview,
        api::previews::reject_preview,
        // Audit
        api::audit::list_audit,
    ),
    components(
        schemas(
            error::ErrorResponse,
            error::FieldViolation,
            error::GateFailure,
            api::health::HealthResponse,
            api::health::ReadyResponse,
            api::files::UploadForm,
            api::files::PreviewListResponse,
            models::FileStatus,
            models::DocumentKind,
            models::FileResponse,
            models::ExtractRequest,
            models::ExtractResponse,
            models::ExtractionStatus,
            models::JobStatus,
            models::ReviewStatus,
            models::StagingItem,
            models::DestinationTable,
            models::FieldBag,
            models::HazardClass,
            models::PreviewStatus,
            models::ChangeKind,
            models::FieldComparison,
            models::RowComparison,
            models::ComparisonSet,
            models::PreviewSummary,
            models::ApprovalMode,
            models::ApproveRequest,
            models::ApproveResponse,
            models::RejectRequest,
            models::RejectResponse,
            models::AuditAction,
            models::ApprovalAuditEntry,
            models::AuditListResponse,
            models::Pagination,
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Files", description = "Document upload and download"),
        (name = "Extractions", description = "AI extraction attempts and status polling"),
        (name = "Previews", description = "Reconciliation, approval and rejection"),
        (name = "Audit", description = "Approval audit log")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Bearer token security scheme.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
