//! Preview review and approval handlers.

use actix_web::{HttpResponse, web};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::{
    ApproveRequest, ApproveResponse, ComparisonSet, RejectRequest, RejectResponse,
};
use crate::services::{PipelineContext, approval, reconciliation};

/// Editable comparison set of a preview.
#[utoipa::path(
    get,
    path = "/api/v1/previews/{preview_id}",
    tag = "Previews",
    params(("preview_id" = Uuid, Path, description = "Preview id")),
    responses(
        (status = 200, description = "Comparison set", body = ComparisonSet),
        (status = 404, description = "Preview not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn get_preview(
    user: AuthenticatedUser,
    ctx: web::Data<PipelineContext>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let review = reconciliation::load_review(&ctx, user.tenant_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(review.comparison))
}

/// Approve a preview, optionally with edits, and write destination records.
#[utoipa::path(
    post,
    path = "/api/v1/previews/{preview_id}/approve",
    tag = "Previews",
    params(("preview_id" = Uuid, Path, description = "Preview id")),
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Records committed", body = ApproveResponse),
        (status = 400, description = "Validation failed; nothing written", body = crate::error::ErrorResponse),
        (status = 404, description = "Preview not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Preview rejected or job not completed", body = crate::error::ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn approve_preview(
    user: AuthenticatedUser,
    ctx: web::Data<PipelineContext>,
    path: web::Path<Uuid>,
    body: web::Json<ApproveRequest>,
) -> AppResult<HttpResponse> {
    let response = approval::approve(&ctx, &user, path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Reject a preview with a mandatory reason. Writes no destination records.
#[utoipa::path(
    post,
    path = "/api/v1/previews/{preview_id}/reject",
    tag = "Previews",
    params(("preview_id" = Uuid, Path, description = "Preview id")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Preview rejected", body = RejectResponse),
        (status = 400, description = "Missing reason", body = crate::error::ErrorResponse),
        (status = 409, description = "Preview already resolved", body = crate::error::ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn reject_preview(
    user: AuthenticatedUser,
    ctx: web::Data<PipelineContext>,
    path: web::Path<Uuid>,
    body: web::Json<RejectRequest>,
) -> AppResult<HttpResponse> {
    let response = approval::reject(&ctx, &user, path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/previews/{preview_id}").route(web::get().to(get_preview)))
        .service(
            web::resource("/previews/{preview_id}/approve").route(web::post().to(approve_preview)),
        )
        .service(
            web::resource("/previews/{preview_id}/reject").route(web::post().to(reject_preview)),
        );
}
