//! Document upload and file API handlers.

use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{FileResponse, PreviewSummary};
use crate::services::{PipelineContext, upload};

/// Previews of one file, newest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct PreviewListResponse {
    pub file_id: Uuid,
    pub previews: Vec<PreviewSummary>,
}

/// Multipart upload form.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// PDF, CSV, XLS, XLSX or TXT document
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

/// Upload a document (multipart field `file`).
///
/// Type and size are checked before anything is written to storage.
#[utoipa::path(
    post,
    path = "/api/v1/files",
    tag = "Files",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Document stored", body = FileResponse),
        (status = 400, description = "Upload rejected (type, size or filename)", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn upload_file(
    user: AuthenticatedUser,
    ctx: web::Data<PipelineContext>,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let document = upload::read_document(payload, ctx.max_upload_size).await?;
    let file = upload::store_document(&ctx, &user, document).await?;
    Ok(HttpResponse::Created().json(FileResponse::from_file(&file, None)))
}

/// File metadata with a signed, time-limited download URL.
#[utoipa::path(
    get,
    path = "/api/v1/files/{file_id}",
    tag = "Files",
    params(("file_id" = Uuid, Path, description = "File id")),
    responses(
        (status = 200, description = "File metadata", body = FileResponse),
        (status = 404, description = "File not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn get_file(
    user: AuthenticatedUser,
    ctx: web::Data<PipelineContext>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let file_id = path.into_inner();
    let file = ctx
        .store
        .get_file(user.tenant_id, file_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))?;

    let url = ctx
        .objects
        .signed_url(&file.storage_path, ctx.policy.signed_url_ttl)
        .await?;

    Ok(HttpResponse::Ok().json(FileResponse::from_file(&file, Some(url))))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{file_id}/previews",
    tag = "Previews",
    params(("file_id" = Uuid, Path, description = "File id")),
    responses(
        (status = 200, description = "Previews of the file", body = PreviewListResponse),
        (status = 404, description = "File not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list_file_previews(
    user: AuthenticatedUser,
    ctx: web::Data<PipelineContext>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let file_id = path.into_inner();
    ctx.store
        .get_file(user.tenant_id, file_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))?;

    let previews = ctx.store.previews_for_file(user.tenant_id, file_id).await?;
    Ok(HttpResponse::Ok().json(PreviewListResponse {
        file_id,
        previews: previews.iter().map(PreviewSummary::from).collect(),
    }))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/files").route(web::post().to(upload_file)))
        .service(web::resource("/files/{file_id}").route(web::get().to(get_file)))
        .service(
            web::resource("/files/{file_id}/previews").route(web::get().to(list_file_previews)),
        );
}
