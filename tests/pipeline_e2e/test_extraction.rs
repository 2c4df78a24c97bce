//! Extraction attempt tests: quality gate, schema contract and status polling.

use super::test_helpers::*;
use esg_extract_lib::db::PipelineStore;
use esg_extract_lib::models::{FileStatus, JobStatus};
use uuid::Uuid;

#[actix_rt::test]
async fn test_successful_extraction_stages_items_and_completes() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "analyst");

    let body = extract_document(&app, &harness, &token, license_output(3)).await;

    assert_eq!(body["ok"], true);
    // license_number, issue_date and three conditions
    assert_eq!(body["items_count"], 5);

    let job_id: Uuid = body["extraction_id"].as_str().unwrap().parse().unwrap();
    let items = harness.staging_items(tenant, job_id).await;
    assert_eq!(items.iter().filter(|i| i.is_row()).count(), 3);
    assert!(items.iter().all(|i| i.field_name != "issuer"));
}

#[actix_rt::test]
async fn test_status_reports_completed_extraction() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let token = token_for(Uuid::new_v4(), "analyst");

    harness.ai.respond_with(license_output(2));
    let file_id = upload_csv(&app, &token).await;

    let (status, body) =
        get_json(&app, &token, &format!("/api/v1/extractions/{}/status", file_id)).await;
    assert_eq!(status, 200);
    assert_eq!(body["state"], "queued");

    let (status, extracted) = start_extraction(&app, &token, &file_id).await;
    assert_eq!(status, 200, "{}", extracted);

    let (status, body) =
        get_json(&app, &token, &format!("/api/v1/extractions/{}/status", file_id)).await;
    assert_eq!(status, 200);
    assert_eq!(body["state"], "completed");
    assert_eq!(body["extraction_id"], extracted["extraction_id"]);
    assert_eq!(body["items_count"], 4);
}

#[actix_rt::test]
async fn test_low_confidence_fails_gate_without_writing_jobs() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "analyst");

    harness.ai.respond_with(output_with_quality(0.4, 1800));
    let file_id = upload_csv(&app, &token).await;
    let (status, body) = start_extraction(&app, &token, &file_id).await;

    assert_eq!(status, 422);
    assert_eq!(body["error"], "QUALITY_GATE_FAILED");
    assert_eq!(body["reason"], "low_confidence");

    let id: Uuid = file_id.parse().unwrap();
    let file = harness.store.get_file(tenant, id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Failed);
    assert!(harness.store.jobs_for_file(id).is_empty());
    assert_eq!(harness.store.staging_item_count(), 0);
    assert_eq!(harness.store.extraction_logs().len(), 1);
}

#[actix_rt::test]
async fn test_thin_evidence_fails_gate_despite_high_confidence() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "analyst");

    harness.ai.respond_with(output_with_quality(0.9, 50));
    let file_id = upload_csv(&app, &token).await;
    let (status, body) = start_extraction(&app, &token, &file_id).await;

    assert_eq!(status, 422);
    assert_eq!(body["reason"], "insufficient_evidence");

    let (_, status_body) =
        get_json(&app, &token, &format!("/api/v1/extractions/{}/status", file_id)).await;
    assert_eq!(status_body["state"], "failed");
    assert_eq!(harness.store.staging_item_count(), 0);
}

#[actix_rt::test]
async fn test_schema_violation_keeps_raw_output_and_fails_file() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "analyst");

    harness
        .ai
        .respond_with_text(r#"{"confidence": 0.9, "_evidence_chars": 900, "surprise": true}"#);
    let file_id = upload_csv(&app, &token).await;
    let (status, body) = start_extraction(&app, &token, &file_id).await;

    assert_eq!(status, 500);
    assert_eq!(body["error"], "SCHEMA_VIOLATION");

    let id: Uuid = file_id.parse().unwrap();
    let jobs = harness.store.jobs_for_file(id);
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].error_message.is_some());
    assert_eq!(harness.store.staging_item_count(), 0);

    let file = harness.store.get_file(tenant, id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Failed);
}

#[actix_rt::test]
async fn test_failed_attempt_can_be_retried() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let token = token_for(Uuid::new_v4(), "analyst");

    harness.ai.fail_with("AI service returned 503");
    let file_id = upload_csv(&app, &token).await;
    let (status, body) = start_extraction(&app, &token, &file_id).await;
    assert_eq!(status, 500);
    assert_eq!(body["error"], "EXTERNAL_SERVICE_FAILED");

    harness.ai.respond_with(license_output(1));
    let (status, body) = start_extraction(&app, &token, &file_id).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(harness.ai.calls(), 2);

    let (_, file) = get_json(&app, &token, &format!("/api/v1/files/{}", file_id)).await;
    assert_eq!(file["status"], "extracted");
    assert_eq!(file["attempt"], 2);
}

#[actix_rt::test]
async fn test_every_attempt_leaves_a_job_in_history() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "analyst");
    let file_id = upload_csv(&app, &token).await;

    for _ in 0..2 {
        harness.ai.fail_with("AI service returned 503");
        let (status, body) = start_extraction(&app, &token, &file_id).await;
        assert_eq!(status, 500, "{}", body);
    }
    harness.ai.respond_with(license_output(1));
    let (status, body) = start_extraction(&app, &token, &file_id).await;
    assert_eq!(status, 200, "{}", body);

    let id: Uuid = file_id.parse().unwrap();
    let jobs = harness.store.jobs_for_file(id);
    let history: Vec<(i32, JobStatus)> = jobs.iter().map(|j| (j.attempt, j.status)).collect();
    assert_eq!(
        history,
        vec![
            (1, JobStatus::Failed),
            (2, JobStatus::Failed),
            (3, JobStatus::Completed)
        ]
    );
    let expected = "Extraction service unavailable: AI service returned 503";
    assert!(
        jobs[..2]
            .iter()
            .all(|j| j.error_message.as_deref() == Some(expected))
    );

    let file = harness.store.get_file(tenant, id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Extracted);
    assert_eq!(file.error_message, None);
}

#[actix_rt::test]
async fn test_extraction_of_unknown_file_is_not_found() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let token = token_for(Uuid::new_v4(), "analyst");

    let (status, body) = start_extraction(&app, &token, &Uuid::new_v4().to_string()).await;

    assert_eq!(status, 404);
    assert_eq!(body["error"], "NOT_FOUND");
    assert_eq!(harness.ai.calls(), 0);
}
