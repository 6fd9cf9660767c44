//! Cloud Storage JSON API client.
//!
//! Downloads stream `alt=media` straight into the scratch file so large
//! photos never sit fully in memory. Uploads use a single `multipart/related`
//! request: the first part is the object resource (name, content type,
//! custom metadata), the second is the file body. That keeps the upload and
//! its metadata atomic from the reader's point of view.

use super::{http_client, with_auth, BlobStore, ObjectMetadata};
use crate::error::StorageError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde_json::json;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const BOUNDARY: &str = "scan2pdf-part-boundary-7f3c";

/// Connection settings for [`GcsBlobStore`].
#[derive(Debug, Clone)]
pub struct GcsConfig {
    /// API root. Default: `https://storage.googleapis.com`.
    pub endpoint: String,
    /// OAuth2 bearer token. `None` sends unauthenticated requests (emulators).
    pub access_token: Option<String>,
    /// Per-request timeout in seconds. Default: 120.
    pub timeout_secs: u64,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://storage.googleapis.com".to_string(),
            access_token: None,
            timeout_secs: 120,
        }
    }
}

/// [`BlobStore`] over the Cloud Storage JSON API.
#[derive(Debug, Clone)]
pub struct GcsBlobStore {
    http: reqwest::Client,
    config: GcsConfig,
}

impl GcsBlobStore {
    pub fn new(config: GcsConfig) -> Result<Self, StorageError> {
        let http = http_client(config.timeout_secs)
            .map_err(|e| StorageError::Backend(format!("HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    fn media_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}?alt=media",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(bucket),
            urlencoding::encode(path)
        )
    }

    fn upload_url(&self, bucket: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=multipart",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(bucket)
        )
    }
}

/// Object resource sent as the first multipart section.
fn object_resource(dest_path: &str, metadata: &ObjectMetadata) -> serde_json::Value {
    json!({
        "name": dest_path,
        "contentType": metadata.content_type,
        "metadata": metadata.custom,
    })
}

/// Assemble a `multipart/related` body: JSON resource, then media.
fn multipart_body(resource: &serde_json::Value, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 512);
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(resource.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn status_error(status: StatusCode, what: &str, upload: bool) -> StorageError {
    match status {
        StatusCode::NOT_FOUND => StorageError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StorageError::PermissionDenied(format!("{what} (HTTP {status})"))
        }
        _ if upload => StorageError::UploadFailed(format!("{what}: HTTP {status}")),
        _ => StorageError::DownloadFailed(format!("{what}: HTTP {status}")),
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn download(&self, bucket: &str, path: &str, dest: &Path) -> Result<u64, StorageError> {
        let url = self.media_url(bucket, path);
        let what = format!("gs://{bucket}/{path}");

        let response = with_auth(self.http.get(&url), self.config.access_token.as_deref())
            .send()
            .await
            .map_err(|e| StorageError::DownloadFailed(format!("{what}: {e}")))?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), &what, false));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| StorageError::LocalFile {
                path: dest.to_path_buf(),
                source: e,
            })?;

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StorageError::DownloadFailed(format!("{what}: {e}")))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::LocalFile {
                    path: dest.to_path_buf(),
                    source: e,
                })?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| StorageError::LocalFile {
            path: dest.to_path_buf(),
            source: e,
        })?;

        debug!("Downloaded {} ({} bytes)", what, written);
        Ok(written)
    }

    async fn upload(
        &self,
        bucket: &str,
        local: &Path,
        dest_path: &str,
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError> {
        let what = format!("gs://{bucket}/{dest_path}");
        let data = tokio::fs::read(local)
            .await
            .map_err(|e| StorageError::LocalFile {
                path: local.to_path_buf(),
                source: e,
            })?;

        let body = multipart_body(
            &object_resource(dest_path, metadata),
            &metadata.content_type,
            &data,
        );

        let request = self
            .http
            .post(self.upload_url(bucket))
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={BOUNDARY}"),
            )
            .body(body);

        let response = with_auth(request, self.config.access_token.as_deref())
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{what}: {e}")))?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), &what, true));
        }

        debug!("Uploaded {} ({} bytes)", what, data.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_url_encodes_object_path() {
        let store = GcsBlobStore::new(GcsConfig::default()).unwrap();
        assert_eq!(
            store.media_url("scans", "users/u1/folders/f1/raw_images/my doc.jpg"),
            "https://storage.googleapis.com/storage/v1/b/scans/o/\
users%2Fu1%2Ffolders%2Ff1%2Fraw_images%2Fmy%20doc.jpg?alt=media"
        );
    }

    #[test]
    fn multipart_body_has_resource_then_media() {
        let mut meta = ObjectMetadata {
            content_type: "application/pdf".into(),
            ..Default::default()
        };
        meta.custom.insert("ocrText".into(), "hello".into());
        let resource = object_resource("users/u/folders/f/documents/d.pdf", &meta);
        let body = multipart_body(&resource, "application/pdf", b"%PDF-1.5");
        let text = String::from_utf8(body).unwrap();

        let json_at = text.find("\"ocrText\":\"hello\"").unwrap();
        let media_at = text.find("%PDF-1.5").unwrap();
        assert!(json_at < media_at);
        assert!(text.starts_with(&format!("--{BOUNDARY}\r\n")));
        assert!(text.ends_with(&format!("--{BOUNDARY}--\r\n")));
        assert!(text.contains("Content-Type: application/pdf\r\n\r\n%PDF"));
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "x", false),
            StorageError::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "x", true),
            StorageError::PermissionDenied(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "x", true),
            StorageError::UploadFailed(_)
        ));
    }
}
