//! Store contract tests: review transitions, replayed commits and tracking
//! number reissue.
//!
//! Every scenario runs against `MemoryStore`. The PostgreSQL variants are
//! ignored by default; run them against a scratch database with
//! `TEST_DATABASE_URL=postgres://... cargo test --test pipeline_e2e -- --ignored`.

use chrono::{NaiveDate, Utc};
use esg_extract_lib::db::{
    ApprovalCommit, DbPool, MemoryStore, NewExtraction, PipelineStore, RejectionCommit,
};
use esg_extract_lib::error::AppError;
use esg_extract_lib::models::{
    AuditAction, DestinationRecord, DestinationTable, FileStatus, HazardClass, NewAuditEntry,
    NewStagingItem, ReviewStatus, StagingItem, SupplierRecord, TrackingSeed, UploadedFile,
    WasteLogRecord,
};
use serde_json::json;
use uuid::Uuid;

/// A stored file with one pending preview.
struct Seeded {
    file_id: Uuid,
    job_id: Uuid,
    preview_id: Uuid,
}

async fn seed_preview(store: &dyn PipelineStore, tenant_id: Uuid, fields: &[&str]) -> Seeded {
    let now = Utc::now();
    let file_id = Uuid::now_v7();
    store
        .insert_file(&UploadedFile {
            id: file_id,
            tenant_id,
            uploaded_by: "uploader".to_string(),
            original_filename: "relatorio.pdf".to_string(),
            storage_path: format!("tenants/{}/files/{}", tenant_id, file_id),
            mime_type: "application/pdf".to_string(),
            size_bytes: 100,
            content_sha256: "0".repeat(64),
            status: FileStatus::Uploaded,
            error_message: None,
            attempt: 0,
            progress: 0,
            progress_message: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("Failed to insert file");

    let file = store
        .begin_attempt(tenant_id, file_id)
        .await
        .expect("Failed to begin attempt")
        .expect("File should accept an attempt");

    let items = fields
        .iter()
        .map(|name| NewStagingItem {
            row_index: None,
            field_name: name.to_string(),
            extracted_value: format!("{} value", name),
            source_snippet: format!("{}: value", name),
            confidence: 0.9,
        })
        .collect();

    let recorded = store
        .record_extraction(NewExtraction {
            tenant_id,
            file_id,
            attempt: file.attempt,
            model: "store-test".to_string(),
            quality_score: 0.9,
            evidence_chars: 800,
            declared_table: None,
            raw_result: json!({}),
            items,
        })
        .await
        .expect("Failed to record extraction");

    Seeded {
        file_id,
        job_id: recorded.job_id,
        preview_id: recorded.preview_id,
    }
}

fn audit(tenant_id: Uuid, seeded: &Seeded, action: AuditAction) -> NewAuditEntry {
    NewAuditEntry {
        tenant_id,
        preview_id: seeded.preview_id,
        file_id: seeded.file_id,
        approved_by: "reviewer".to_string(),
        action,
        original_payload: json!({}),
        edited_payload: None,
        edited_fields_count: 0,
        confidence: 0.9,
        declared_table: None,
        target_table: None,
        records_written: 0,
        records_filtered: 0,
        notes: None,
        processing_ms: 1,
    }
}

fn approval(
    tenant_id: Uuid,
    seeded: &Seeded,
    records: Vec<DestinationRecord>,
    approved_items: Vec<Uuid>,
    rejected_items: Vec<Uuid>,
) -> ApprovalCommit {
    ApprovalCommit {
        tenant_id,
        preview_id: seeded.preview_id,
        file_id: seeded.file_id,
        records,
        approved_items,
        rejected_items,
        audit: audit(tenant_id, seeded, AuditAction::Approved),
    }
}

fn supplier(tax_id: &str) -> DestinationRecord {
    DestinationRecord::Supplier(SupplierRecord {
        legal_name: "Coleta Verde Ltda".to_string(),
        trade_name: None,
        tax_id: tax_id.to_string(),
        email: None,
        phone: None,
        category: None,
        city: Some("Recife".to_string()),
        state: None,
    })
}

fn waste(tracking_number: String, seed: Option<TrackingSeed>) -> DestinationRecord {
    DestinationRecord::WasteLog(WasteLogRecord {
        tracking_number,
        waste_type: "Lodo de ETE".to_string(),
        hazard_class: HazardClass::ClassIIA,
        quantity_kg: 350.0,
        generated_on: march_15(),
        disposal_method: None,
        carrier: None,
        tracking_seed: seed,
    })
}

fn march_15() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

async fn items(store: &dyn PipelineStore, tenant_id: Uuid, job_id: Uuid) -> Vec<StagingItem> {
    store
        .staging_items_for_job(tenant_id, job_id)
        .await
        .expect("Failed to read staging items")
}

fn status_of(items: &[StagingItem], field: &str) -> ReviewStatus {
    items
        .iter()
        .find(|i| i.field_name == field)
        .map(|i| i.review_status)
        .unwrap_or_else(|| panic!("No staging item named {}", field))
}

/// Replaying an approval inserts nothing and leaves terminal items alone.
async fn replayed_approval_is_a_no_op(store: &dyn PipelineStore) {
    let tenant = Uuid::new_v4();
    let seeded = seed_preview(store, tenant, &["tax_id", "city"]).await;
    let staged = items(store, tenant, seeded.job_id).await;
    let tax_id = staged.iter().find(|i| i.field_name == "tax_id").unwrap().id;
    let city = staged.iter().find(|i| i.field_name == "city").unwrap().id;
    let key = Uuid::new_v4().simple().to_string()[..14].to_string();

    let first = store
        .commit_approval(approval(tenant, &seeded, vec![supplier(&key)], vec![tax_id], vec![city]))
        .await
        .expect("First approval failed");
    assert_eq!(first.records_inserted, 1);
    assert_eq!(first.records_filtered, 0);

    // Opposite decisions on already terminal items change nothing
    let replay = store
        .commit_approval(approval(tenant, &seeded, vec![supplier(&key)], vec![city], vec![tax_id]))
        .await
        .expect("Replayed approval failed");
    assert_eq!(replay.records_inserted, 0);
    assert_eq!(replay.records_filtered, 1);
    assert_ne!(replay.audit_id, first.audit_id);

    let staged = items(store, tenant, seeded.job_id).await;
    assert_eq!(status_of(&staged, "tax_id"), ReviewStatus::Approved);
    assert_eq!(status_of(&staged, "city"), ReviewStatus::Rejected);

    let existing = store
        .existing_natural_keys(tenant, DestinationTable::Supplier, &[key.clone()])
        .await
        .unwrap();
    assert!(existing.contains(&key));

    let rejection = store
        .commit_rejection(RejectionCommit {
            tenant_id: tenant,
            preview_id: seeded.preview_id,
            job_id: seeded.job_id,
            audit: audit(tenant, &seeded, AuditAction::Rejected),
        })
        .await;
    assert!(matches!(rejection, Err(AppError::Conflict(_))));
    let staged = items(store, tenant, seeded.job_id).await;
    assert_eq!(status_of(&staged, "tax_id"), ReviewStatus::Approved);
}

/// A second rejection conflicts and rejects no further items.
async fn repeated_rejection_conflicts(store: &dyn PipelineStore) {
    let tenant = Uuid::new_v4();
    let seeded = seed_preview(store, tenant, &["license_number", "issue_date"]).await;
    let rejection = || RejectionCommit {
        tenant_id: tenant,
        preview_id: seeded.preview_id,
        job_id: seeded.job_id,
        audit: audit(tenant, &seeded, AuditAction::Rejected),
    };

    let first = store.commit_rejection(rejection()).await.unwrap();
    assert_eq!(first.items_rejected, 2);

    let again = store.commit_rejection(rejection()).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let tax_id = "55555555000155".to_string();
    let commit = approval(tenant, &seeded, vec![supplier(&tax_id)], vec![], vec![]);
    assert!(matches!(
        store.commit_approval(commit).await,
        Err(AppError::Conflict(_))
    ));
    let existing = store
        .existing_natural_keys(tenant, DestinationTable::Supplier, &[tax_id])
        .await
        .unwrap();
    assert!(existing.is_empty());
}

/// A generated tracking number held by another document is reissued, while
/// a replay of the same document is still filtered.
async fn foreign_tracking_number_is_reissued(store: &dyn PipelineStore) {
    let tenant = Uuid::new_v4();
    let first = seed_preview(store, tenant, &["waste_type"]).await;
    let second = seed_preview(store, tenant, &["waste_type"]).await;

    let first_seed = TrackingSeed::new(first.preview_id, 0);
    let taken = first_seed.number(march_15());
    let outcome = store
        .commit_approval(approval(
            tenant,
            &first,
            vec![waste(taken.clone(), Some(first_seed))],
            vec![],
            vec![],
        ))
        .await
        .unwrap();
    assert_eq!(outcome.records_inserted, 1);

    // Same number generated for a different preview
    let colliding = || waste(taken.clone(), Some(TrackingSeed::new(second.preview_id, 0)));
    let outcome = store
        .commit_approval(approval(tenant, &second, vec![colliding()], vec![], vec![]))
        .await
        .unwrap();
    assert_eq!(outcome.records_inserted, 1);
    assert_eq!(outcome.records_filtered, 0);

    let reissued = TrackingSeed {
        salt: 1,
        ..TrackingSeed::new(second.preview_id, 0)
    }
    .number(march_15());
    let sources = store
        .tracking_number_sources(tenant, &[taken.clone(), reissued.clone()])
        .await
        .unwrap();
    assert_eq!(sources.get(&taken), Some(&Some(first.file_id)));
    assert_eq!(sources.get(&reissued), Some(&Some(second.file_id)));

    let replay = store
        .commit_approval(approval(tenant, &second, vec![colliding()], vec![], vec![]))
        .await
        .unwrap();
    assert_eq!(replay.records_inserted, 0);
    assert_eq!(replay.records_filtered, 1);
}

/// A manifest number from the document is never rewritten.
async fn document_manifest_collision_is_filtered(store: &dyn PipelineStore) {
    let tenant = Uuid::new_v4();
    let first = seed_preview(store, tenant, &["mtr"]).await;
    let second = seed_preview(store, tenant, &["mtr"]).await;
    let manifest = format!("MTR-{}", Uuid::new_v4().simple());

    let from_document = || vec![waste(manifest.clone(), None)];

    let outcome = store
        .commit_approval(approval(tenant, &first, from_document(), vec![], vec![]))
        .await
        .unwrap();
    assert_eq!(outcome.records_inserted, 1);

    let outcome = store
        .commit_approval(approval(tenant, &second, from_document(), vec![], vec![]))
        .await
        .unwrap();
    assert_eq!(outcome.records_inserted, 0);
    assert_eq!(outcome.records_filtered, 1);

    let sources = store
        .tracking_number_sources(tenant, &[manifest.clone()])
        .await
        .unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources.get(&manifest), Some(&Some(first.file_id)));
}

#[actix_rt::test]
async fn test_memory_replayed_approval_is_a_no_op() {
    replayed_approval_is_a_no_op(&MemoryStore::new()).await;
}

#[actix_rt::test]
async fn test_memory_repeated_rejection_conflicts() {
    repeated_rejection_conflicts(&MemoryStore::new()).await;
}

#[actix_rt::test]
async fn test_memory_foreign_tracking_number_is_reissued() {
    foreign_tracking_number_is_reissued(&MemoryStore::new()).await;
}

#[actix_rt::test]
async fn test_memory_document_manifest_collision_is_filtered() {
    document_manifest_collision_is_filtered(&MemoryStore::new()).await;
}

async fn postgres_store() -> DbPool {
    let url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must point at a scratch PostgreSQL database");
    let conn = sea_orm::Database::connect(url)
        .await
        .expect("Failed to connect to test database");
    let pool = DbPool::from_connection(conn);
    pool.run_migrations().await.expect("Failed to run migrations");
    pool
}

#[actix_rt::test]
#[ignore] // Requires PostgreSQL at TEST_DATABASE_URL
async fn test_postgres_replayed_approval_is_a_no_op() {
    replayed_approval_is_a_no_op(&postgres_store().await).await;
}

#[actix_rt::test]
#[ignore] // Requires PostgreSQL at TEST_DATABASE_URL
async fn test_postgres_repeated_rejection_conflicts() {
    repeated_rejection_conflicts(&postgres_store().await).await;
}

#[actix_rt::test]
#[ignore] // Requires PostgreSQL at TEST_DATABASE_URL
async fn test_postgres_foreign_tracking_number_is_reissued() {
    foreign_tracking_number_is_reissued(&postgres_store().await).await;
}

#[actix_rt::test]
#[ignore] // Requires PostgreSQL at TEST_DATABASE_URL
async fn test_postgres_document_manifest_collision_is_filtered() {
    document_manifest_collision_is_filtered(&postgres_store().await).await;
}
