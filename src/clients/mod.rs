//! External collaborators the pipeline calls but does not own.
//!
//! Each collaborator is an async trait so the pipeline can be driven by the
//! real cloud services, by the filesystem-backed implementations in
//! [`local`], or by test doubles.
//!
//! | Trait            | Real service                | Local stand-in       |
//! |------------------|-----------------------------|----------------------|
//! | [`BlobStore`]    | [`gcs::GcsBlobStore`]       | [`local::LocalBlobStore`]   |
//! | [`TextDetector`] | [`vision::VisionClient`]    | [`local::NullTextDetector`] (no text) |
//! | [`RecordStore`]  | [`firestore::FirestoreClient`] | [`local::LocalRecordStore`] |

use crate::error::{OcrError, RecordError, StorageError};
use crate::output::DocumentRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub mod firestore;
pub mod gcs;
pub mod local;
pub mod vision;

/// Metadata attached to an uploaded object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_type: String,
    /// Free-form key/value pairs stored alongside the object.
    pub custom: BTreeMap<String, String>,
}

/// Download and upload primitives of the blob store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Copy `bucket/path` to the local file `dest`, returning the bytes written.
    async fn download(&self, bucket: &str, path: &str, dest: &Path) -> Result<u64, StorageError>;

    /// Upload the local file `local` to `bucket/dest_path` with `metadata`.
    async fn upload(
        &self,
        bucket: &str,
        local: &Path,
        dest_path: &str,
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError>;
}

/// The OCR service's document-text-detection operation.
#[async_trait]
pub trait TextDetector: Send + Sync {
    /// Recognise text in the image at `image_path`.
    ///
    /// `Ok(None)` means the service found no text.
    async fn detect_document_text(&self, image_path: &Path) -> Result<Option<String>, OcrError>;
}

/// Append-only metadata store keyed by user → folder → documents.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a new document record and return its id.
    async fn create_document(
        &self,
        user_id: &str,
        folder_id: &str,
        record: &DocumentRecord,
    ) -> Result<String, RecordError>;
}

/// Collaborator handles shared by every invocation of a service.
#[derive(Clone)]
pub struct Clients {
    pub blobs: Arc<dyn BlobStore>,
    pub ocr: Arc<dyn TextDetector>,
    pub records: Arc<dyn RecordStore>,
}

impl Clients {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        ocr: Arc<dyn TextDetector>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self { blobs, ocr, records }
    }
}

/// Build a `reqwest` client with a request timeout. Shared by the HTTP collaborators.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
}

/// Attach a bearer token when one is configured.
pub(crate) fn with_auth(
    request: reqwest::RequestBuilder,
    token: Option<&str>,
) -> reqwest::RequestBuilder {
    match token {
        Some(t) if !t.is_empty() => request.bearer_auth(t),
        _ => request,
    }
}
