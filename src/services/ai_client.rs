//! Client for the external AI document service.
//!
//! A document is uploaded as a temporary remote file, extracted against the
//! versioned output schema, and the remote file is deleted before returning,
//! whatever the outcome of the extraction.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::config::AiSettings;
use crate::error::{AppError, AppResult};

use super::extraction_schema::{INSTRUCTIONS, SCHEMA_VERSION, output_schema};

/// Document handed to the AI service.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Structured extraction capability of the AI document service.
#[async_trait]
pub trait DocumentAi: Send + Sync {
    /// Model identifier recorded on extraction jobs.
    fn model(&self) -> &str;

    /// Run an extraction and return the raw model output text.
    ///
    /// Transport failures and non-success responses are
    /// `AppError::ExternalServiceFailed`.
    async fn extract(&self, document: DocumentUpload) -> AppResult<String>;
}

#[derive(Deserialize)]
struct RemoteFile {
    id: String,
}

#[derive(Serialize)]
struct ExtractionRequest<'a> {
    model: &'a str,
    file_id: &'a str,
    instructions: &'a str,
    schema_version: &'a str,
    json_schema: JsonValue,
}

#[derive(Deserialize)]
struct ExtractionReply {
    output_text: String,
}

/// HTTP implementation of [`DocumentAi`].
pub struct HttpDocumentAi {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl HttpDocumentAi {
    pub fn new(settings: &AiSettings) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::ExternalServiceFailed(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }

    async fn upload_file(&self, document: DocumentUpload) -> AppResult<RemoteFile> {
        let part = Part::bytes(document.data)
            .file_name(document.filename)
            .mime_str(&document.mime_type)
            .map_err(|e| AppError::ExternalServiceFailed(format!("Invalid MIME type: {}", e)))?;
        let form = Form::new().text("purpose", "extraction").part("file", part);

        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceFailed(format!("File upload failed: {}", e)))?;

        check_status(&response, "File upload")?;
        response
            .json::<RemoteFile>()
            .await
            .map_err(|e| AppError::ExternalServiceFailed(format!("Invalid upload reply: {}", e)))
    }

    async fn run_extraction(&self, remote: &RemoteFile) -> AppResult<String> {
        let body = ExtractionRequest {
            model: &self.model,
            file_id: &remote.id,
            instructions: INSTRUCTIONS,
            schema_version: SCHEMA_VERSION,
            json_schema: output_schema(),
        };

        let response = self
            .client
            .post(format!("{}/extractions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceFailed(format!("Extraction failed: {}", e)))?;

        check_status(&response, "Extraction")?;
        let reply = response.json::<ExtractionReply>().await.map_err(|e| {
            AppError::ExternalServiceFailed(format!("Invalid extraction reply: {}", e))
        })?;
        Ok(reply.output_text)
    }

    async fn delete_file(&self, remote: &RemoteFile) -> AppResult<()> {
        let response = self
            .client
            .delete(format!("{}/files/{}", self.base_url, remote.id))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceFailed(format!("File delete failed: {}", e)))?;

        check_status(&response, "File delete")
    }
}

fn check_status(response: &reqwest::Response, what: &str) -> AppResult<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(AppError::ExternalServiceFailed(format!(
            "{} returned HTTP {}",
            what, status
        )))
    }
}

#[async_trait]
impl DocumentAi for HttpDocumentAi {
    fn model(&self) -> &str {
        &self.model
    }

    async fn extract(&self, document: DocumentUpload) -> AppResult<String> {
        let remote = self.upload_file(document).await?;
        debug!(remote_file = %remote.id, "Uploaded document to AI service");

        let result = self.run_extraction(&remote).await;

        if let Err(e) = self.delete_file(&remote).await {
            warn!(remote_file = %remote.id, "Failed to delete remote file: {}", e);
        }

        result
    }
}
