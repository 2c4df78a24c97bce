//! Approval tests: classification, transformation, dedup and audit.

use super::test_helpers::*;
use esg_extract_lib::models::{DestinationRecord, HazardClass, ReviewStatus};
use serde_json::json;
use uuid::Uuid;

fn preview_id(extraction: &serde_json::Value) -> String {
    extraction["preview_id"].as_str().expect("preview id").to_string()
}

#[actix_rt::test]
async fn test_license_conditions_become_one_record_each() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "reviewer");

    let extraction = extract_document(&app, &harness, &token, license_output(3)).await;
    let (status, body) = post_json(
        &app,
        &token,
        &format!("/api/v1/previews/{}/approve", preview_id(&extraction)),
        json!({}),
    )
    .await;

    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["target_table"], "license_conditions");
    assert_eq!(body["records_inserted"], 3);
    assert_eq!(body["records_filtered"], 0);

    let records = harness.store.destination_records(tenant);
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| matches!(
        r,
        DestinationRecord::LicenseConditions(c) if c.license_number == "LO-1234/2024"
    )));
}

#[actix_rt::test]
async fn test_supplier_fields_override_declared_table() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "reviewer");

    let extraction =
        extract_document(&app, &harness, &token, supplier_output("waste_log", 0.9)).await;
    let (status, body) = post_json(
        &app,
        &token,
        &format!("/api/v1/previews/{}/approve", preview_id(&extraction)),
        json!({}),
    )
    .await;

    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["target_table"], "supplier");
    assert_eq!(body["declared_table"], "waste_log");

    let records = harness.store.destination_records(tenant);
    assert_eq!(records.len(), 1);
    match &records[0] {
        DestinationRecord::Supplier(s) => assert_eq!(s.tax_id, "12345678000190"),
        other => panic!("Expected a supplier, got {:?}", other),
    }
}

#[actix_rt::test]
async fn test_replayed_approval_inserts_nothing() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "reviewer");

    let output = waste_output(&[
        ("março", "Sucata de papelão", "1,5 t"),
        ("abril", "Resíduo orgânico", "320 kg"),
    ]);
    let extraction = extract_document(&app, &harness, &token, output).await;
    let uri = format!("/api/v1/previews/{}/approve", preview_id(&extraction));

    let (status, first) = post_json(&app, &token, &uri, json!({})).await;
    assert_eq!(status, 200, "{}", first);
    assert_eq!(first["target_table"], "waste_log");
    assert_eq!(first["records_inserted"], 2);

    let (status, second) = post_json(&app, &token, &uri, json!({})).await;
    assert_eq!(status, 200, "{}", second);
    assert_eq!(second["records_inserted"], 0);
    assert_eq!(second["records_filtered"], 2);

    assert_eq!(harness.store.destination_records(tenant).len(), 2);

    // One audit entry per approval call
    let (status, audit) = get_json(
        &app,
        &token,
        &format!("/api/v1/audit?preview_id={}", preview_id(&extraction)),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(audit["entries"].as_array().unwrap().len(), 2);
    assert_eq!(audit["pagination"]["total"], 2);
}

#[actix_rt::test]
async fn test_dangerous_keyword_wins_over_recyclable() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "reviewer");

    let output = waste_output(&[("03/2024", "Óleo lubrificante com metal", "120 kg")]);
    let extraction = extract_document(&app, &harness, &token, output).await;
    let (status, body) = post_json(
        &app,
        &token,
        &format!("/api/v1/previews/{}/approve", preview_id(&extraction)),
        json!({}),
    )
    .await;
    assert_eq!(status, 200, "{}", body);

    let records = harness.store.destination_records(tenant);
    match &records[..] {
        [DestinationRecord::WasteLog(w)] => {
            assert_eq!(w.hazard_class, HazardClass::ClassI);
            assert_eq!(w.quantity_kg, 120.0);
            assert_eq!(w.generated_on.to_string(), "2024-03-15");
            assert!(w.tracking_number.starts_with("MTR-202403-"));
        }
        other => panic!("Expected one waste log entry, got {:?}", other),
    }
}

#[actix_rt::test]
async fn test_single_edit_is_counted_and_audited() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "reviewer");

    let extraction =
        extract_document(&app, &harness, &token, supplier_output("supplier", 0.9)).await;
    let preview = preview_id(&extraction);

    // Re-sending an unchanged value is not an edit
    let (status, body) = post_json(
        &app,
        &token,
        &format!("/api/v1/previews/{}/approve", preview),
        json!({
            "edited_data": { "city": "Olinda", "legal_name": "Recicla Nordeste Ltda" },
            "approval_notes": "City confirmed by phone",
        }),
    )
    .await;

    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["edited_fields_count"], 1);

    let (_, audit) =
        get_json(&app, &token, &format!("/api/v1/audit?preview_id={}", preview)).await;
    let entry = &audit["entries"][0];
    assert_eq!(entry["action"], "edited");
    assert_eq!(entry["edited_fields_count"], 1);
    assert_eq!(entry["approved_by"], "reviewer");
    assert_eq!(entry["notes"], "City confirmed by phone");
    assert_eq!(entry["edited_payload"]["city"], "Olinda");

    match &harness.store.destination_records(tenant)[..] {
        [DestinationRecord::Supplier(s)] => assert_eq!(s.city.as_deref(), Some("Olinda")),
        other => panic!("Expected one supplier, got {:?}", other),
    }
}

#[actix_rt::test]
async fn test_non_conflicting_mode_leaves_out_uncertain_fields() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "reviewer");

    let extraction =
        extract_document(&app, &harness, &token, supplier_output("supplier", 0.3)).await;
    let preview = preview_id(&extraction);

    let (status, comparison) =
        get_json(&app, &token, &format!("/api/v1/previews/{}", preview)).await;
    assert_eq!(status, 200);
    let city = comparison["fields"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["field_name"] == "city")
        .expect("city comparison");
    assert_eq!(city["change"], "new");
    assert_eq!(city["needs_confirmation"], true);

    let (status, body) = post_json(
        &app,
        &token,
        &format!("/api/v1/previews/{}/approve", preview),
        json!({ "mode": "accept_non_conflicting" }),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["edited_fields_count"], 0);

    match &harness.store.destination_records(tenant)[..] {
        [DestinationRecord::Supplier(s)] => assert_eq!(s.city, None),
        other => panic!("Expected one supplier, got {:?}", other),
    }

    let job_id: Uuid = extraction["extraction_id"].as_str().unwrap().parse().unwrap();
    let items = harness.staging_items(tenant, job_id).await;
    let city_item = items.iter().find(|i| i.field_name == "city").unwrap();
    assert_eq!(city_item.review_status, ReviewStatus::Rejected);
    assert!(
        items
            .iter()
            .filter(|i| i.field_name != "city")
            .all(|i| i.review_status == ReviewStatus::Approved)
    );
}

#[actix_rt::test]
async fn test_invalid_record_writes_nothing() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let tenant = Uuid::new_v4();
    let token = token_for(tenant, "reviewer");

    let extraction =
        extract_document(&app, &harness, &token, supplier_output("supplier", 0.9)).await;
    let (status, body) = post_json(
        &app,
        &token,
        &format!("/api/v1/previews/{}/approve", preview_id(&extraction)),
        json!({ "edited_data": { "email": "not-an-email" } }),
    )
    .await;

    assert_eq!(status, 400, "{}", body);
    assert_eq!(body["error"], "VALIDATION_FAILED");
    assert!(
        body["details"]
            .as_array()
            .unwrap()
            .iter()
            .any(|d| d["field"] == "email")
    );
    assert!(harness.store.destination_records(tenant).is_empty());
    assert!(harness.store.audit_entries().is_empty());

    let job_id: Uuid = extraction["extraction_id"].as_str().unwrap().parse().unwrap();
    assert!(
        harness
            .staging_items(tenant, job_id)
            .await
            .iter()
            .all(|i| i.review_status == ReviewStatus::Pending)
    );
}

#[actix_rt::test]
async fn test_preview_is_invisible_to_other_tenants() {
    let harness = Harness::new();
    let app = create_test_app(&harness).await;
    let owner = token_for(Uuid::new_v4(), "reviewer");
    let stranger = token_for(Uuid::new_v4(), "reviewer");

    let extraction = extract_document(&app, &harness, &owner, license_output(1)).await;
    let preview = preview_id(&extraction);

    let (status, _) = get_json(&app, &stranger, &format!("/api/v1/previews/{}", preview)).await;
    assert_eq!(status, 404);

    let (status, _) = post_json(
        &app,
        &stranger,
        &format!("/api/v1/previews/{}/approve", preview),
        json!({}),
    )
    .await;
    assert_eq!(status, 404);
    assert!(harness.store.audit_entries().is_empty());
}
