//! Authentication tests for the pipeline API.

use super::test_helpers::*;
use actix_web::test;
use esg_extract_lib::auth::Claims;
use jsonwebtoken::{EncodingKey, Header};
use uuid::Uuid;

#[actix_rt::test]
async fn test_missing_token_is_unauthorized() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/files/{}", Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status().as_u16(), 401);
}

#[actix_rt::test]
async fn test_token_signed_with_other_secret_is_unauthorized() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;

    let claims = Claims {
        sub: "intruder".to_string(),
        tenant_id: Uuid::new_v4(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        iss: None,
    };
    let forged = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"another-secret"),
    )
    .unwrap();

    let (status, body) = upload_document(&app, &forged, "a.txt", "text/plain", b"hello").await;

    assert_eq!(status, 401);
    assert_eq!(body["error"], "UNAUTHORIZED");
    assert_eq!(harness.objects.object_count(), 0);
}

#[actix_rt::test]
async fn test_health_needs_no_token() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get().uri("/api/v1/ready").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}
