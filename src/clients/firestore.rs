//! Firestore REST client for document records.
//!
//! Records are created with `createDocument` under
//! `users/{userId}/folders/{folderId}/documents`, letting the server pick the
//! document id. The pipeline never updates or deletes records.

use super::{http_client, with_auth, RecordStore};
use crate::error::RecordError;
use crate::output::DocumentRecord;
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Connection settings for [`FirestoreClient`].
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// API root. Default: `https://firestore.googleapis.com`.
    pub endpoint: String,
    pub project_id: String,
    /// Default: `(default)`.
    pub database: String,
    pub access_token: Option<String>,
    /// Per-request timeout in seconds. Default: 30.
    pub timeout_secs: u64,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://firestore.googleapis.com".to_string(),
            project_id: String::new(),
            database: "(default)".to_string(),
            access_token: None,
            timeout_secs: 30,
        }
    }
}

/// [`RecordStore`] backed by the Firestore REST API.
#[derive(Debug, Clone)]
pub struct FirestoreClient {
    http: reqwest::Client,
    config: FirestoreConfig,
}

impl FirestoreClient {
    pub fn new(config: FirestoreConfig) -> Result<Self, RecordError> {
        if config.project_id.is_empty() {
            return Err(RecordError::InvalidResponse(
                "Firestore project id is not configured".into(),
            ));
        }
        let http = http_client(config.timeout_secs)
            .map_err(|e| RecordError::Transport(format!("HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    fn collection_url(&self, user_id: &str, folder_id: &str) -> String {
        format!(
            "{}/v1/projects/{}/databases/{}/documents/users/{}/folders/{}/documents",
            self.config.endpoint.trim_end_matches('/'),
            self.config.project_id,
            self.config.database,
            urlencoding::encode(user_id),
            urlencoding::encode(folder_id),
        )
    }
}

/// Typed Firestore field map for a record.
fn document_fields(record: &DocumentRecord) -> serde_json::Value {
    json!({
        "fields": {
            "name": { "stringValue": record.name },
            "pdfPath": { "stringValue": record.pdf_path },
            "pdfUrl": { "stringValue": record.pdf_url },
            "ocrText": { "stringValue": record.ocr_text },
            "originalImageName": { "stringValue": record.original_image_name },
            "createdAt": {
                "timestampValue": record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
            },
        }
    })
}

#[derive(Debug, Deserialize)]
struct CreatedDocument {
    name: String,
}

/// Document id: the last segment of the returned resource name.
fn document_id(body: &[u8]) -> Result<String, RecordError> {
    let created: CreatedDocument =
        serde_json::from_slice(body).map_err(|e| RecordError::InvalidResponse(e.to_string()))?;
    created
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RecordError::InvalidResponse(format!("bad resource name '{}'", created.name)))
}

#[async_trait]
impl RecordStore for FirestoreClient {
    async fn create_document(
        &self,
        user_id: &str,
        folder_id: &str,
        record: &DocumentRecord,
    ) -> Result<String, RecordError> {
        let request = self
            .http
            .post(self.collection_url(user_id, folder_id))
            .json(&document_fields(record));
        let response = with_auth(request, self.config.access_token.as_deref())
            .send()
            .await
            .map_err(|e| RecordError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RecordError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(RecordError::Rejected {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let id = document_id(&body)?;
        debug!("Created record users/{}/folders/{}/documents/{}", user_id, folder_id, id);
        Ok(id)
    }
}
