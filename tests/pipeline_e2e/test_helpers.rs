//! Shared test helpers for pipeline E2E tests.

use std::sync::{Arc, Mutex};

use actix_web::{App, dev::ServiceResponse, test, web};
use async_trait::async_trait;
use esg_extract_lib::auth::{Claims, TokenVerifier};
use esg_extract_lib::config::{AuthSettings, PipelinePolicy};
use esg_extract_lib::db::{MemoryStore, PipelineStore};
use esg_extract_lib::error::{AppError, AppResult};
use esg_extract_lib::models::StagingItem;
use esg_extract_lib::services::{DocumentAi, DocumentUpload, MemoryObjectStore, PipelineContext};
use jsonwebtoken::{EncodingKey, Header};
use secrecy::SecretString;
use serde_json::{Value, json};
use uuid::Uuid;

/// HS256 secret shared by the test app and the token helper.
pub const TEST_JWT_SECRET: &str = "test-secret";

/// Upload limit of the test app.
pub const MAX_UPLOAD_SIZE: usize = 20 * 1024 * 1024;

const BOUNDARY: &str = "----esg-e2e-boundary";

/// AI service fake that answers every extraction with a scripted output.
pub struct ScriptedAi {
    output: Mutex<Result<String, String>>,
    calls: Mutex<usize>,
}

impl ScriptedAi {
    pub fn new() -> Self {
        Self {
            output: Mutex::new(Err("no output scripted".to_string())),
            calls: Mutex::new(0),
        }
    }

    /// Answer the next extractions with `output`.
    pub fn respond_with(&self, output: Value) {
        *self.output.lock().unwrap() = Ok(output.to_string());
    }

    /// Answer the next extractions with raw text.
    pub fn respond_with_text(&self, output: &str) {
        *self.output.lock().unwrap() = Ok(output.to_string());
    }

    /// Fail the next extractions as an unavailable service.
    pub fn fail_with(&self, message: &str) {
        *self.output.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl DocumentAi for ScriptedAi {
    fn model(&self) -> &str {
        "scripted-test-model"
    }

    async fn extract(&self, _document: DocumentUpload) -> AppResult<String> {
        *self.calls.lock().unwrap() += 1;
        self.output
            .lock()
            .unwrap()
            .clone()
            .map_err(AppError::ExternalServiceFailed)
    }
}

/// Collaborators behind one test app, kept for direct inspection.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub ai: Arc<ScriptedAi>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            objects: Arc::new(MemoryObjectStore::new()),
            ai: Arc::new(ScriptedAi::new()),
        }
    }

    fn context(&self) -> PipelineContext {
        PipelineContext::new(
            self.store.clone(),
            self.objects.clone(),
            self.ai.clone(),
            PipelinePolicy::default(),
            MAX_UPLOAD_SIZE,
        )
    }

    /// Staging items of a job, read through the store.
    pub async fn staging_items(&self, tenant_id: Uuid, job_id: Uuid) -> Vec<StagingItem> {
        self.store
            .staging_items_for_job(tenant_id, job_id)
            .await
            .expect("Failed to read staging items")
    }
}

/// Create a test app over the harness collaborators.
pub async fn create_test_app(
    harness: &Harness,
) -> impl actix_web::dev::Service<
    actix_http::Request,
    Response = ServiceResponse,
    Error = actix_web::Error,
> {
    let verifier = TokenVerifier::new(&AuthSettings {
        jwt_secret: SecretString::from(TEST_JWT_SECRET.to_string()),
        issuer: None,
    });

    test::init_service(
        App::new()
            .app_data(web::Data::new(harness.context()))
            .app_data(web::Data::new(verifier))
            .service(
                web::scope("/api/v1").configure(esg_extract_lib::api::configure_api_routes),
            ),
    )
    .await
}

/// Signed access token for a user of `tenant_id`.
pub fn token_for(tenant_id: Uuid, user: &str) -> String {
    let claims = Claims {
        sub: user.to_string(),
        tenant_id,
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        iss: None,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign test token")
}

/// Build a multipart body with a single `file` field.
pub fn multipart_body(filename: &str, content_type: &str, data: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            BOUNDARY, filename, content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

async fn read_response(resp: ServiceResponse) -> (u16, Value) {
    let status = resp.status().as_u16();
    let bytes = test::read_body(resp).await;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

/// Upload a document.
pub async fn upload_document<S>(
    app: &S,
    token: &str,
    filename: &str,
    content_type: &str,
    data: &[u8],
) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let (header, body) = multipart_body(filename, content_type, data);
    let req = test::TestRequest::post()
        .uri("/api/v1/files")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(("Content-Type", header))
        .set_payload(body)
        .to_request();

    read_response(test::call_service(app, req).await).await
}

/// Upload a small CSV document and return its file id.
pub async fn upload_csv<S>(app: &S, token: &str) -> String
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let (status, body) = upload_document(
        app,
        token,
        "report.csv",
        "text/csv",
        b"mes;residuo;quantidade\nmarco;oleo usado;120 kg\n",
    )
    .await;
    assert_eq!(status, 201, "Upload failed: {}", body);
    body["id"].as_str().expect("file id").to_string()
}

/// Start an extraction for a file.
pub async fn start_extraction<S>(app: &S, token: &str, file_id: &str) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    post_json(app, token, "/api/v1/extractions", json!({ "file_id": file_id })).await
}

/// GET with a Bearer token.
pub async fn get_json<S>(app: &S, token: &str, uri: &str) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::get()
        .uri(uri)
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    read_response(test::call_service(app, req).await).await
}

/// POST a JSON body with a Bearer token.
pub async fn post_json<S>(app: &S, token: &str, uri: &str, body: Value) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::post()
        .uri(uri)
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(body)
        .to_request();

    read_response(test::call_service(app, req).await).await
}

/// Upload a CSV and extract it with the scripted output. Returns the extraction response.
pub async fn extract_document<S>(app: &S, harness: &Harness, token: &str, output: Value) -> Value
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    harness.ai.respond_with(output);
    let file_id = upload_csv(app, token).await;
    let (status, body) = start_extraction(app, token, &file_id).await;
    assert_eq!(status, 200, "Extraction failed: {}", body);
    body
}

fn field(name: &str, value: &str, confidence: f64) -> Value {
    json!({
        "name": name,
        "value": value,
        "source_snippet": format!("{}: {}", name, value),
        "confidence": confidence,
    })
}

/// Monthly waste breakdown with one row per waste description.
pub fn waste_output(rows: &[(&str, &str, &str)]) -> Value {
    let line_items: Vec<Value> = rows
        .iter()
        .map(|(month, waste, quantity)| {
            json!({
                "values": { "month": month, "waste_type": waste, "quantity": quantity },
                "source_snippet": format!("{} {} {}", month, waste, quantity),
                "confidence": 0.92,
            })
        })
        .collect();

    json!({
        "document_type": "waste_report",
        "target_table": "waste_log",
        "confidence": 0.9,
        "_evidence_chars": 1800,
        "fields": [field("reference_year", "2024", 0.95)],
        "line_items": line_items,
    })
}

/// Supplier registration form, declared as `declared_table`.
pub fn supplier_output(declared_table: &str, city_confidence: f64) -> Value {
    json!({
        "document_type": "supplier_form",
        "target_table": declared_table,
        "confidence": 0.88,
        "_evidence_chars": 950,
        "fields": [
            field("legal_name", "Recicla Nordeste Ltda", 0.97),
            field("cnpj", "12.345.678/0001-90", 0.96),
            field("city", "Recife", city_confidence),
            field("email", "contato@reciclane.com.br", 0.9),
        ],
    })
}

/// Operating license with `count` numbered conditions.
pub fn license_output(count: usize) -> Value {
    let conditions: Vec<Value> = (1..=count)
        .map(|i| {
            json!({
                "code": i.to_string(),
                "section_title": "Condicionantes gerais",
                "text": format!("Condicionante {} do empreendimento", i),
                "category": "monitoring",
                "deadline_days": 90,
                "law_refs": ["CONAMA 237/1997"],
                "source_snippet": format!("{}. Condicionante {}", i, i),
                "confidence": 0.91,
            })
        })
        .collect();

    json!({
        "document_type": "operating_license",
        "target_table": "license_conditions",
        "confidence": 0.86,
        "_evidence_chars": 5120,
        "fields": [
            field("license_number", "LO-1234/2024", 0.97),
            field("issue_date", "2024-03-01", 0.93),
        ],
        "conditions": conditions,
    })
}

/// A valid output whose document-level quality is `confidence` / `evidence_chars`.
pub fn output_with_quality(confidence: f64, evidence_chars: i64) -> Value {
    let mut output = license_output(1);
    output["confidence"] = json!(confidence);
    output["_evidence_chars"] = json!(evidence_chars);
    output
}
