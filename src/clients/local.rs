//! Filesystem-backed collaborators for development and tests.
//!
//! Both stores are rooted at a directory. Objects live at
//! `{root}/{bucket}/{path}`; uploaded object metadata is written next to the
//! object as `{path}.metadata.json`. Records live at
//! `{root}/users/{u}/folders/{f}/documents/{id}.json`.
//!
//! There is no local OCR engine; [`NullTextDetector`] reports every image as
//! textless, which yields image-only PDFs.

use super::{BlobStore, ObjectMetadata, RecordStore, TextDetector};
use crate::error::{OcrError, RecordError, StorageError};
use crate::output::DocumentRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Sidecar written next to each uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMetadata {
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

/// Blob store on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of `bucket/key`, rejecting keys that could escape the root.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        for part in [bucket, key] {
            if part.is_empty()
                || part.starts_with('/')
                || part.split('/').any(|seg| seg == ".." || seg == ".")
            {
                return Err(StorageError::InvalidKey(format!("{bucket}/{key}")));
            }
        }
        if bucket.contains('/') {
            return Err(StorageError::InvalidKey(format!("bucket '{bucket}'")));
        }
        Ok(self.root.join(bucket).join(key))
    }

    /// Read back the metadata sidecar of an uploaded object.
    pub async fn read_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<StoredMetadata, StorageError> {
        let path = sidecar_path(&self.object_path(bucket, key)?);
        let raw = fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(format!("{bucket}/{key}")),
            _ => StorageError::LocalFile { path: path.clone(), source: e },
        })?;
        serde_json::from_slice(&raw).map_err(|e| StorageError::Backend(e.to_string()))
    }
}

fn sidecar_path(object: &Path) -> PathBuf {
    let mut name = object.as_os_str().to_owned();
    name.push(".metadata.json");
    PathBuf::from(name)
}

async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::LocalFile {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    Ok(())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn download(&self, bucket: &str, path: &str, dest: &Path) -> Result<u64, StorageError> {
        let src = self.object_path(bucket, path)?;
        let bytes = fs::copy(&src, dest).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound if !src.exists() => {
                StorageError::NotFound(format!("{bucket}/{path}"))
            }
            ErrorKind::PermissionDenied => {
                StorageError::PermissionDenied(format!("{bucket}/{path}"))
            }
            _ => StorageError::DownloadFailed(format!("{}: {e}", src.display())),
        })?;
        debug!("Copied {} → {} ({} bytes)", src.display(), dest.display(), bytes);
        Ok(bytes)
    }

    async fn upload(
        &self,
        bucket: &str,
        local: &Path,
        dest_path: &str,
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError> {
        let dest = self.object_path(bucket, dest_path)?;
        ensure_parent(&dest).await?;

        fs::copy(local, &dest)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {e}", local.display())))?;

        let sidecar = StoredMetadata {
            content_type: metadata.content_type.clone(),
            metadata: metadata.custom.clone(),
        };
        let json = serde_json::to_vec_pretty(&sidecar)
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        let sidecar_path = sidecar_path(&dest);
        fs::write(&sidecar_path, json)
            .await
            .map_err(|e| StorageError::LocalFile {
                path: sidecar_path,
                source: e,
            })?;

        debug!("Stored {}/{} at {}", bucket, dest_path, dest.display());
        Ok(())
    }
}

/// Record store writing one JSON file per record.
#[derive(Debug, Clone)]
pub struct LocalRecordStore {
    root: PathBuf,
}

impl LocalRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the records of one folder.
    pub fn collection_dir(&self, user_id: &str, folder_id: &str) -> PathBuf {
        self.root
            .join("users")
            .join(user_id)
            .join("folders")
            .join(folder_id)
            .join("documents")
    }

    /// Load a record previously written by [`RecordStore::create_document`].
    pub async fn load(
        &self,
        user_id: &str,
        folder_id: &str,
        id: &str,
    ) -> Result<DocumentRecord, RecordError> {
        let path = self.collection_dir(user_id, folder_id).join(format!("{id}.json"));
        let raw = fs::read(&path)
            .await
            .map_err(|e| RecordError::Io { path, source: e })?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[async_trait]
impl RecordStore for LocalRecordStore {
    async fn create_document(
        &self,
        user_id: &str,
        folder_id: &str,
        record: &DocumentRecord,
    ) -> Result<String, RecordError> {
        let dir = self.collection_dir(user_id, folder_id);
        fs::create_dir_all(&dir).await.map_err(|e| RecordError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = dir.join(format!("{id}.json"));
        let json = serde_json::to_vec_pretty(record)?;

        // create_new: records are append-only.
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| RecordError::Io {
                path: path.clone(),
                source: e,
            })?;
        file.write_all(&json).await.map_err(|e| RecordError::Io {
            path: path.clone(),
            source: e,
        })?;
        file.sync_all()
            .await
            .map_err(|e| RecordError::Io { path, source: e })?;

        Ok(id)
    }
}

/// Text detector that never finds text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTextDetector;

#[async_trait]
impl TextDetector for NullTextDetector {
    async fn detect_document_text(&self, image: &Path) -> Result<Option<String>, OcrError> {
        debug!("OCR disabled, skipping {}", image.display());
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn rejects_traversal_keys() {
        let store = LocalBlobStore::new("/srv/blobs");
        assert!(store.object_path("b", "../etc/passwd").is_err());
        assert!(store.object_path("b", "/abs").is_err());
        assert!(store.object_path("b/c", "x").is_err());
        assert!(store.object_path("", "x").is_err());
        assert_eq!(
            store.object_path("b", "users/u/x.jpg").unwrap(),
            PathBuf::from("/srv/blobs/b/users/u/x.jpg")
        );
    }

    #[tokio::test]
    async fn upload_then_download_with_metadata() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(root.path());
        let src = root.path().join("src.bin");
        std::fs::write(&src, b"pdf-bytes").unwrap();

        let mut meta = ObjectMetadata {
            content_type: "application/pdf".into(),
            ..Default::default()
        };
        meta.custom.insert("originalFileName".into(), "doc.jpg".into());
        store.upload("bucket", &src, "a/b/doc.pdf", &meta).await.unwrap();

        let back = root.path().join("back.bin");
        let n = store.download("bucket", "a/b/doc.pdf", &back).await.unwrap();
        assert_eq!(n, 9);
        assert_eq!(std::fs::read(&back).unwrap(), b"pdf-bytes");

        let stored = store.read_metadata("bucket", "a/b/doc.pdf").await.unwrap();
        assert_eq!(stored.content_type, "application/pdf");
        assert_eq!(stored.metadata["originalFileName"], "doc.jpg");
    }

    #[tokio::test]
    async fn download_missing_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(root.path());
        let err = store
            .download("bucket", "nope.jpg", &root.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn records_are_distinct_files() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalRecordStore::new(root.path());
        let rec = DocumentRecord {
            name: "doc".into(),
            pdf_path: "p".into(),
            pdf_url: "u".into(),
            ocr_text: "t".into(),
            original_image_name: "doc.jpg".into(),
            created_at: Utc::now(),
        };
        let a = store.create_document("u1", "f1", &rec).await.unwrap();
        let b = store.create_document("u1", "f1", &rec).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.load("u1", "f1", &a).await.unwrap(), rec);
    }

    #[tokio::test]
    async fn null_detector_finds_nothing() {
        let text = NullTextDetector
            .detect_document_text(Path::new("/nonexistent.png"))
            .await
            .unwrap();
        assert_eq!(text, None);
    }
}
