//! Text extraction: run OCR on the normalized image.

use crate::clients::TextDetector;
use crate::error::IngestError;
use crate::event::PipelineContext;
use crate::pipeline::normalize::NormalizedImage;
use tracing::debug;

/// Recognise the text of the normalized image.
///
/// An image without text yields an empty string; only a failed OCR call is
/// an error.
pub async fn extract_text(
    ocr: &dyn TextDetector,
    ctx: &PipelineContext,
    image: &NormalizedImage,
) -> Result<String, IngestError> {
    let text = ocr
        .detect_document_text(image.file.path())
        .await
        .map_err(|source| IngestError::OcrFailed {
            file: ctx.original_file_name.clone(),
            source,
        })?
        .unwrap_or_default();

    if text.is_empty() {
        debug!("No text found in {}", ctx.original_file_name);
    }
    Ok(text)
}
