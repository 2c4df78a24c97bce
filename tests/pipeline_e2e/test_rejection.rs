//! Rejection tests and one-way review status.

use super::test_helpers::*;
use esg_extract_lib::models::{AuditAction, ReviewStatus};
use serde_json::json;
use uuid::Uuid;

#[actix_rt::test]
async fn test_reject_writes_audit_but_no_records() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "reviewer");

    let extraction = extract_document(&app, &harness, &token, license_output(2)).await;
    let preview = extraction["preview_id"].as_str().unwrap();

    let (status, body) = post_json(
        &app,
        &token,
        &format!("/api/v1/previews/{}/reject", preview),
        json!({ "reason": "Wrong license scanned" }),
    )
    .await;

    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["items_rejected"], 4);
    assert!(harness.store.destination_records(tenant).is_empty());

    let audit = harness.store.audit_entries();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::Rejected);
    assert_eq!(audit[0].target_table, None);
    assert_eq!(audit[0].notes.as_deref(), Some("Wrong license scanned"));

    let job_id: Uuid = extraction["extraction_id"].as_str().unwrap().parse().unwrap();
    assert!(
        harness
            .staging_items(tenant, job_id)
            .await
            .iter()
            .all(|i| i.review_status == ReviewStatus::Rejected)
    );
}

#[actix_rt::test]
async fn test_reject_requires_reason() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let token = token_for(Uuid::new_v4(), "reviewer");

    let extraction = extract_document(&app, &harness, &token, license_output(1)).await;
    let preview = extraction["preview_id"].as_str().unwrap();

    let (status, body) = post_json(
        &app,
        &token,
        &format!("/api/v1/previews/{}/reject", preview),
        json!({ "reason": "   " }),
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "INVALID_INPUT");
    assert!(harness.store.audit_entries().is_empty());
}

#[actix_rt::test]
async fn test_rejected_preview_cannot_be_approved() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "reviewer");

    let extraction = extract_document(&app, &harness, &token, license_output(1)).await;
    let preview = extraction["preview_id"].as_str().unwrap();

    let (status, _) = post_json(
        &app,
        &token,
        &format!("/api/v1/previews/{}/reject", preview),
        json!({ "reason": "Duplicate upload" }),
    )
    .await;
    assert_eq!(status, 200);

    let (status, body) = post_json(
        &app,
        &token,
        &format!("/api/v1/previews/{}/approve", preview),
        json!({}),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], "CONFLICT");
    assert!(harness.store.destination_records(tenant).is_empty());

    let job_id: Uuid = extraction["extraction_id"].as_str().unwrap().parse().unwrap();
    assert!(
        harness
            .staging_items(tenant, job_id)
            .await
            .iter()
            .all(|i| i.review_status == ReviewStatus::Rejected)
    );
}

#[actix_rt::test]
async fn test_approved_preview_cannot_be_rejected() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "reviewer");

    let extraction = extract_document(&app, &harness, &token, license_output(2)).await;
    let preview = extraction["preview_id"].as_str().unwrap();

    let (status, _) = post_json(
        &app,
        &token,
        &format!("/api/v1/previews/{}/approve", preview),
        json!({}),
    )
    .await;
    assert_eq!(status, 200);

    let (status, _) = post_json(
        &app,
        &token,
        &format!("/api/v1/previews/{}/reject", preview),
        json!({ "reason": "Changed my mind" }),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(harness.store.destination_records(tenant).len(), 2);

    let job_id: Uuid = extraction["extraction_id"].as_str().unwrap().parse().unwrap();
    assert!(
        harness
            .staging_items(tenant, job_id)
            .await
            .iter()
            .all(|i| i.review_status == ReviewStatus::Approved)
    );
}

#[actix_rt::test]
async fn test_file_previews_list_shows_resolution() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let token = token_for(Uuid::new_v4(), "reviewer");

    harness.ai.respond_with(license_output(1));
    let file_id = upload_csv(&app, &token).await;
    let (_, extraction) = start_extraction(&app, &token, &file_id).await;
    let preview = extraction["preview_id"].as_str().unwrap();

    post_json(
        &app,
        &token,
        &format!("/api/v1/previews/{}/reject", preview),
        json!({ "reason": "Illegible scan" }),
    )
    .await;

    let (status, body) =
        get_json(&app, &token, &format!("/api/v1/files/{}/previews", file_id)).await;
    assert_eq!(status, 200);
    let previews = body["previews"].as_array().unwrap();
    assert_eq!(previews.len(), 1);
    assert_eq!(previews[0]["status"], "rejected");
}
