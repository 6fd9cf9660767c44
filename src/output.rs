//! Results of an ingestion run.

use crate::error::SkipReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata record written once per successfully ingested document.
///
/// Stored under `users/{userId}/folders/{folderId}/documents`. Never updated
/// or deleted by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// Base name of the source image, e.g. `doc`.
    pub name: String,
    /// Object path of the published PDF.
    pub pdf_path: String,
    /// Templated download URL of the published PDF.
    pub pdf_url: String,
    /// Full OCR text (the object metadata only gets an excerpt).
    pub ocr_text: String,
    /// Source file name, e.g. `doc.jpg`.
    pub original_image_name: String,
    pub created_at: DateTime<Utc>,
}

/// Timings and sizes for one completed invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub source_bytes: u64,
    pub normalized_width: u32,
    pub normalized_height: u32,
    pub ocr_chars: usize,
    pub pdf_bytes: u64,
    pub fetch_ms: u64,
    pub normalize_ms: u64,
    pub extract_ms: u64,
    pub assemble_ms: u64,
    pub publish_ms: u64,
    pub record_ms: u64,
    pub total_ms: u64,
}

/// A PDF that was uploaded and recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedDocument {
    /// Id assigned by the metadata store.
    pub record_id: String,
    pub record: DocumentRecord,
    pub stats: IngestStats,
}

/// How an invocation ended when no stage failed.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The event was not for the pipeline. Nothing was read or written.
    Skipped(SkipReason),
    Published(PublishedDocument),
}

impl IngestOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, IngestOutcome::Skipped(_))
    }

    pub fn published(&self) -> Option<&PublishedDocument> {
        match self {
            IngestOutcome::Published(doc) => Some(doc),
            IngestOutcome::Skipped(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn record_serializes_camel_case() {
        let rec = DocumentRecord {
            name: "doc".into(),
            pdf_path: "users/u1/folders/f1/documents/doc.pdf".into(),
            pdf_url: "https://h/v0/b/b/o/x?alt=media".into(),
            ocr_text: "Invoice #42".into(),
            original_image_name: "doc.jpg".into(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        };
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["pdfPath"], "users/u1/folders/f1/documents/doc.pdf");
        assert_eq!(v["originalImageName"], "doc.jpg");
        assert_eq!(v["ocrText"], "Invoice #42");
        assert_eq!(v["createdAt"], "2026-01-02T03:04:05Z");
    }

    #[test]
    fn outcome_helpers() {
        let o = IngestOutcome::Skipped(SkipReason::MissingField("size"));
        assert!(o.is_skipped());
        assert!(o.published().is_none());
    }
}
