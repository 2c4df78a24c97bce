//! Extraction API handlers.

use actix_web::{HttpResponse, web};
use tracing::error;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{ExtractRequest, ExtractResponse, ExtractionStatus, StatusQuery};
use crate::services::{PipelineContext, extraction, status};

/// Run one extraction attempt for an uploaded file.
///
/// The attempt runs on its own task, so it settles the file even when the
/// caller disconnects; progress is visible through the status endpoint.
#[utoipa::path(
    post,
    path = "/api/v1/extractions",
    tag = "Extractions",
    request_body = ExtractRequest,
    responses(
        (status = 200, description = "Extraction staged for review", body = ExtractResponse),
        (status = 404, description = "File not found", body = crate::error::ErrorResponse),
        (status = 409, description = "An attempt is already in flight", body = crate::error::ErrorResponse),
        (status = 422, description = "Quality gate failed", body = crate::error::ErrorResponse),
        (status = 500, description = "Download, AI service or schema failure", body = crate::error::ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn start_extraction(
    user: AuthenticatedUser,
    ctx: web::Data<PipelineContext>,
    body: web::Json<ExtractRequest>,
) -> AppResult<HttpResponse> {
    let file_id = body.into_inner().file_id;
    let ctx = ctx.get_ref().clone();
    let tenant_id = user.tenant_id;

    let response = tokio::spawn(async move {
        extraction::run_extraction(&ctx, tenant_id, file_id).await
    })
    .await
    .map_err(|e| {
        error!(file_id = %file_id, "Extraction task aborted: {}", e);
        AppError::ExternalServiceFailed("Extraction task aborted".to_string())
    })??;

    Ok(HttpResponse::Ok().json(response))
}

/// Poll extraction status. Idempotent; never changes state.
#[utoipa::path(
    get,
    path = "/api/v1/extractions/{file_id}/status",
    tag = "Extractions",
    params(
        ("file_id" = uuid::Uuid, Path, description = "File id"),
        ("job_id" = Option<uuid::Uuid>, Query, description = "Specific extraction job")
    ),
    responses(
        (status = 200, description = "Current status", body = ExtractionStatus),
        (status = 404, description = "File or job not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn get_status(
    user: AuthenticatedUser,
    ctx: web::Data<PipelineContext>,
    path: web::Path<uuid::Uuid>,
    query: web::Query<StatusQuery>,
) -> AppResult<HttpResponse> {
    let status =
        status::extraction_status(&ctx, user.tenant_id, path.into_inner(), query.job_id).await?;
    Ok(HttpResponse::Ok().json(status))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/extractions").route(web::post().to(start_extraction)))
        .service(
            web::resource("/extractions/{file_id}/status").route(web::get().to(get_status)),
        );
}
