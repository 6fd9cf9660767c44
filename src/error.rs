//! Error types for the scan2pdf library.
//!
//! Three layers of failure are kept apart:
//!
//! * [`SkipReason`] is **not an error**. The upload event is not something the
//!   pipeline handles (not an image, wrong path shape, missing fields). These
//!   are expected background noise and end the invocation quietly.
//!
//! * [`IngestError`] is **fatal**. A stage failed and the invocation aborted.
//!   There is exactly one variant per stage so logs and callers can tell at a
//!   glance where the run stopped.
//!
//! * [`StorageError`], [`OcrError`], [`RecordError`]: failures reported by
//!   the external collaborators. They are carried as `#[source]` inside the
//!   stage variant that invoked them.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why an upload event was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A required event field (`bucket`, `name`, `contentType`, `size`) was absent.
    MissingField(&'static str),
    /// The object is not an image.
    NotAnImage { content_type: String },
    /// The object path is not `users/{u}/folders/{f}/raw_images/{file}`.
    MalformedPath { path: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingField(field) => write!(f, "event has no '{field}'"),
            SkipReason::NotAnImage { content_type } => {
                write!(f, "content type '{content_type}' is not an image")
            }
            SkipReason::MalformedPath { path } => {
                write!(f, "path '{path}' is not users/<uid>/folders/<fid>/raw_images/<file>")
            }
        }
    }
}

/// All fatal errors returned by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Stage errors ──────────────────────────────────────────────────────
    /// The source object could not be downloaded into the scratch area.
    #[error("Failed to fetch gs://{bucket}/{path}: {source}")]
    FetchFailed {
        bucket: String,
        path: String,
        #[source]
        source: StorageError,
    },

    /// The fetched image could not be decoded, resized or re-encoded.
    #[error("Failed to normalize image '{file}': {detail}")]
    NormalizeFailed { file: String, detail: String },

    /// The OCR collaborator returned an error.
    #[error("OCR failed for '{file}': {source}")]
    OcrFailed {
        file: String,
        #[source]
        source: OcrError,
    },

    /// Building the PDF (image embedding, layout, serialisation) failed.
    #[error("Failed to assemble PDF '{name}': {detail}")]
    AssembleFailed { name: String, detail: String },

    /// The assembled PDF could not be uploaded.
    #[error("Failed to publish PDF to '{dest_path}': {source}")]
    PublishFailed {
        dest_path: String,
        #[source]
        source: StorageError,
    },

    /// The PDF is already published but its metadata record could not be
    /// written. The artifact at `pdf_path` is orphaned.
    #[error("PDF published at '{pdf_path}' but no metadata record was written: {source}")]
    RecordFailed {
        pdf_path: String,
        pdf_url: String,
        #[source]
        source: RecordError,
    },

    // ── Setup errors ──────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The process-wide service was initialised twice.
    #[error("Ingest service is already initialised")]
    AlreadyInitialized,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (scratch area creation, task join, …).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`IngestError`], one tag per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Fetch,
    Normalize,
    Ocr,
    Assemble,
    Publish,
    Record,
    Config,
    Internal,
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::FetchFailed { .. } => ErrorKind::Fetch,
            IngestError::NormalizeFailed { .. } => ErrorKind::Normalize,
            IngestError::OcrFailed { .. } => ErrorKind::Ocr,
            IngestError::AssembleFailed { .. } => ErrorKind::Assemble,
            IngestError::PublishFailed { .. } => ErrorKind::Publish,
            IngestError::RecordFailed { .. } => ErrorKind::Record,
            IngestError::InvalidConfig(_) | IngestError::AlreadyInitialized => ErrorKind::Config,
            IngestError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Blob-store failures (download and upload).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("local file '{path}': {source}")]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// OCR collaborator failures.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The request never got a response (DNS, TLS, timeout, …).
    #[error("transport error: {0}")]
    Transport(String),

    /// Credentials were rejected (HTTP 401/403).
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The service answered with an error status or error payload.
    #[error("OCR API error {code}: {message}")]
    Api { code: i64, message: String },

    /// The response body did not have the expected shape.
    #[error("unexpected OCR response: {0}")]
    InvalidResponse(String),

    /// The image could not be read from disk.
    #[error("cannot read image '{path}': {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Metadata-store failures.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("metadata store rejected record (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected metadata store response: {0}")]
    InvalidResponse(String),

    #[error("failed to serialise record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("record I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_reason_display() {
        let s = SkipReason::NotAnImage {
            content_type: "application/pdf".into(),
        };
        assert!(s.to_string().contains("application/pdf"));
        assert!(SkipReason::MissingField("size").to_string().contains("size"));
    }

    #[test]
    fn record_failed_names_orphan() {
        let e = IngestError::RecordFailed {
            pdf_path: "users/u1/folders/f1/documents/doc.pdf".into(),
            pdf_url: "https://example/doc.pdf".into(),
            source: RecordError::Transport("connection reset".into()),
        };
        let msg = e.to_string();
        assert!(msg.contains("users/u1/folders/f1/documents/doc.pdf"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::Record);
    }

    #[test]
    fn ocr_failed_keeps_source() {
        use std::error::Error as _;
        let e = IngestError::OcrFailed {
            file: "doc.jpg".into(),
            source: OcrError::Transport("timed out".into()),
        };
        assert_eq!(e.kind(), ErrorKind::Ocr);
        assert!(e.source().unwrap().to_string().contains("timed out"));
    }

    #[test]
    fn kinds_cover_setup_errors() {
        assert_eq!(IngestError::AlreadyInitialized.kind(), ErrorKind::Config);
        assert_eq!(IngestError::InvalidConfig("x".into()).kind(), ErrorKind::Config);
        assert_eq!(IngestError::Internal("x".into()).kind(), ErrorKind::Internal);
    }
}
