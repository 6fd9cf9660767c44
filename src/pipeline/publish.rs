//! Publish: upload the PDF, then record it in the metadata store.
//!
//! The two writes are not atomic. If the upload succeeds and the record
//! write fails, the PDF stays in storage without a record; the returned
//! [`IngestError::RecordFailed`] names the orphaned object so it can be
//! reconciled by hand.

use crate::clients::{BlobStore, ObjectMetadata, RecordStore};
use crate::config::PipelineConfig;
use crate::error::IngestError;
use crate::event::PipelineContext;
use crate::output::DocumentRecord;
use crate::pipeline::assemble::AssembledDocument;
use chrono::Utc;
use tracing::error;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// First `max_chars` characters of `text` (not bytes).
pub fn ocr_excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// `https://{host}/v0/b/{bucket}/o/{urlEncode(path)}?alt=media`
pub fn download_url(host: &str, bucket: &str, dest_path: &str) -> String {
    format!(
        "https://{}/v0/b/{}/o/{}?alt=media",
        host,
        bucket,
        urlencoding::encode(dest_path)
    )
}

/// Metadata attached to the uploaded PDF.
pub fn pdf_metadata(ctx: &PipelineContext, text: &str, config: &PipelineConfig) -> ObjectMetadata {
    let mut meta = ObjectMetadata {
        content_type: PDF_CONTENT_TYPE.to_string(),
        ..Default::default()
    };
    meta.custom.insert(
        "ocrText".to_string(),
        ocr_excerpt(text, config.ocr_excerpt_chars),
    );
    meta.custom
        .insert("originalFileName".to_string(), ctx.original_file_name.clone());
    meta
}

/// The PDF after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPdf {
    pub pdf_path: String,
    pub pdf_url: String,
    pub bytes: u64,
}

/// Upload the assembled PDF. The local PDF is deleted on every outcome.
pub async fn upload_pdf(
    blobs: &dyn BlobStore,
    ctx: &PipelineContext,
    document: AssembledDocument,
    text: &str,
    config: &PipelineConfig,
) -> Result<UploadedPdf, IngestError> {
    let dest_path = ctx.destination_path();
    let metadata = pdf_metadata(ctx, text, config);
    let bytes = document.bytes.len() as u64;

    let result = blobs
        .upload(&ctx.bucket, document.file.path(), &dest_path, &metadata)
        .await;
    document.file.release();

    result.map_err(|source| IngestError::PublishFailed {
        dest_path: dest_path.clone(),
        source,
    })?;

    Ok(UploadedPdf {
        pdf_url: download_url(&config.download_host, &ctx.bucket, &dest_path),
        pdf_path: dest_path,
        bytes,
    })
}

/// Write the metadata record for an uploaded PDF. Returns the record id.
pub async fn record_document(
    records: &dyn RecordStore,
    ctx: &PipelineContext,
    uploaded: &UploadedPdf,
    text: String,
) -> Result<(String, DocumentRecord), IngestError> {
    let record = DocumentRecord {
        name: ctx.base_name.clone(),
        pdf_path: uploaded.pdf_path.clone(),
        pdf_url: uploaded.pdf_url.clone(),
        ocr_text: text,
        original_image_name: ctx.original_file_name.clone(),
        created_at: Utc::now(),
    };

    match records
        .create_document(&ctx.user_id, &ctx.folder_id, &record)
        .await
    {
        Ok(id) => Ok((id, record)),
        Err(source) => {
            error!(
                orphaned_pdf = %uploaded.pdf_path,
                "PDF published without a metadata record: {}", source
            );
            Err(IngestError::RecordFailed {
                pdf_path: uploaded.pdf_path.clone(),
                pdf_url: uploaded.pdf_url.clone(),
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ImageKind;

    fn ctx() -> PipelineContext {
        PipelineContext {
            bucket: "scans".into(),
            object_path: "users/u1/folders/f1/raw_images/doc.jpg".into(),
            content_type: "image/jpeg".into(),
            size_bytes: 10,
            user_id: "u1".into(),
            folder_id: "f1".into(),
            original_file_name: "doc.jpg".into(),
            base_name: "doc".into(),
            image_kind: ImageKind::Jpeg,
        }
    }

    #[test]
    fn url_encodes_whole_path() {
        assert_eq!(
            download_url("example.test", "scans", "users/u1/folders/f1/documents/doc.pdf"),
            "https://example.test/v0/b/scans/o/users%2Fu1%2Ffolders%2Ff1%2Fdocuments%2Fdoc.pdf?alt=media"
        );
    }

    #[test]
    fn excerpt_counts_characters() {
        let text = "é".repeat(1500);
        let ex = ocr_excerpt(&text, 1000);
        assert_eq!(ex.chars().count(), 1000);
        assert_eq!(ocr_excerpt("short", 1000), "short");
    }

    #[test]
    fn metadata_has_type_excerpt_and_name() {
        let config = PipelineConfig::builder().ocr_excerpt_chars(4).build().unwrap();
        let meta = pdf_metadata(&ctx(), "Invoice #42", &config);
        assert_eq!(meta.content_type, "application/pdf");
        assert_eq!(meta.custom["ocrText"], "Invo");
        assert_eq!(meta.custom["originalFileName"], "doc.jpg");
    }
}
