//! Upload boundary tests.

use super::test_helpers::*;
use uuid::Uuid;

#[actix_rt::test]
async fn test_upload_stores_document_and_returns_file() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let token = token_for(Uuid::new_v4(), "analyst");

    let (status, body) =
        upload_document(&app, &token, "licenca.pdf", "application/pdf", b"%PDF-1.7 body").await;

    assert_eq!(status, 201, "{}", body);
    assert_eq!(body["status"], "uploaded");
    assert_eq!(body["mime_type"], "application/pdf");
    assert_eq!(body["size_bytes"], 13);
    assert_eq!(harness.objects.object_count(), 1);
}

#[actix_rt::test]
async fn test_oversized_upload_is_rejected_before_storage() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let token = token_for(Uuid::new_v4(), "analyst");

    let data = vec![b'a'; 21 * 1024 * 1024];
    let (status, body) = upload_document(&app, &token, "big.pdf", "application/pdf", &data).await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "UPLOAD_REJECTED");
    assert_eq!(harness.objects.object_count(), 0);
}

#[actix_rt::test]
async fn test_unsupported_type_is_rejected() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let token = token_for(Uuid::new_v4(), "analyst");

    let (status, body) =
        upload_document(&app, &token, "photo.png", "image/png", b"\x89PNG....").await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "UPLOAD_REJECTED");
    assert_eq!(harness.objects.object_count(), 0);
}

#[actix_rt::test]
async fn test_octet_stream_falls_back_to_extension() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let token = token_for(Uuid::new_v4(), "analyst");

    let (status, body) = upload_document(
        &app,
        &token,
        "planilha.xlsx",
        "application/octet-stream",
        b"PK\x03\x04 sheet",
    )
    .await;

    assert_eq!(status, 201, "{}", body);
    assert_eq!(
        body["mime_type"],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
}

#[actix_rt::test]
async fn test_get_file_returns_signed_url_for_owner_only() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let owner = token_for(Uuid::new_v4(), "analyst");
    let stranger = token_for(Uuid::new_v4(), "analyst");

    let file_id = upload_csv(&app, &owner).await;

    let (status, body) = get_json(&app, &owner, &format!("/api/v1/files/{}", file_id)).await;
    assert_eq!(status, 200, "{}", body);
    assert!(body["download_url"].as_str().is_some_and(|u| !u.is_empty()));

    let (status, _) = get_json(&app, &stranger, &format!("/api/v1/files/{}", file_id)).await;
    assert_eq!(status, 404);
}
