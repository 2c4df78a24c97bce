//! Approval audit listing.

use actix_web::{HttpResponse, web};

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::{AuditListResponse, AuditQuery, Pagination, PaginationParams};
use crate::services::PipelineContext;

#[utoipa::path(
    get,
    path = "/api/v1/audit",
    tag = "Audit",
    params(
        ("file_id" = Option<uuid::Uuid>, Query, description = "Filter by file"),
        ("preview_id" = Option<uuid::Uuid>, Query, description = "Filter by preview"),
        ("page" = Option<u32>, Query, description = "Page number (default 1)"),
        ("limit" = Option<u32>, Query, description = "Entries per page (default 50, max 200)")
    ),
    responses(
        (status = 200, description = "Audit entries, newest first", body = AuditListResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list_audit(
    user: AuthenticatedUser,
    ctx: web::Data<PipelineContext>,
    query: web::Query<AuditQuery>,
    page: web::Query<PaginationParams>,
) -> AppResult<HttpResponse> {
    let (entries, total) = ctx
        .store
        .list_audit_entries(user.tenant_id, &query, &page)
        .await?;

    Ok(HttpResponse::Ok().json(AuditListResponse {
        entries,
        pagination: Pagination::new(page.page(), page.clamped_limit(), total),
    }))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/audit").route(web::get().to(list_audit)));
}
