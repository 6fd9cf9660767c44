//! Trigger input and the per-invocation context derived from it.

use serde::{Deserialize, Deserializer, Serialize};

/// An object-finalize notification from the blob store.
///
/// Every field is optional on the wire: the trigger sometimes delivers
/// partial payloads, and validation turns an absent field into a skip rather
/// than a deserialisation error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    pub bucket: Option<String>,
    /// Object path inside the bucket.
    pub name: Option<String>,
    pub content_type: Option<String>,
    /// Object size in bytes. Storage notifications encode it as a decimal string.
    #[serde(default, deserialize_with = "size_from_number_or_string")]
    pub size: Option<u64>,
}

impl UploadEvent {
    /// Convenience constructor with every field present.
    pub fn new(
        bucket: impl Into<String>,
        object_path: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            bucket: Some(bucket.into()),
            name: Some(object_path.into()),
            content_type: Some(content_type.into()),
            size: Some(size),
        }
    }

    /// The object path, or `""` when absent. Used for log fields.
    pub fn object_path(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

fn size_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Text(String),
    }

    match Option::<Size>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Size::Number(n)) => Ok(Some(n)),
        // Garbage sizes are treated as absent so validation skips the event.
        Some(Size::Text(s)) => Ok(s.trim().parse::<u64>().ok()),
    }
}

/// How the normalized image is encoded and embedded into the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbedFormat {
    Jpeg,
    Png,
}

impl EmbedFormat {
    pub fn extension(self) -> &'static str {
        match self {
            EmbedFormat::Jpeg => "jpg",
            EmbedFormat::Png => "png",
        }
    }
}

/// Image family derived from the upload's content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    /// Any other `image/*` type. Embedded as PNG.
    Unrecognized,
}

impl ImageKind {
    /// Classify a content type. Parameters (`; charset=…`) and case are ignored.
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => ImageKind::Jpeg,
            "image/png" => ImageKind::Png,
            _ => ImageKind::Unrecognized,
        }
    }

    pub fn embed_format(self) -> EmbedFormat {
        match self {
            ImageKind::Jpeg => EmbedFormat::Jpeg,
            ImageKind::Png | ImageKind::Unrecognized => EmbedFormat::Png,
        }
    }
}

/// Everything the stages need to know about one accepted upload.
///
/// Built once by [`crate::pipeline::validate::validate`] and discarded at the
/// end of the invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineContext {
    pub bucket: String,
    pub object_path: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub user_id: String,
    pub folder_id: String,
    /// Last path segment, e.g. `doc.jpg`.
    pub original_file_name: String,
    /// File name without its final extension, e.g. `doc`.
    pub base_name: String,
    pub image_kind: ImageKind,
}

impl PipelineContext {
    /// `users/{userId}/folders/{folderId}/documents/{baseName}.pdf`
    pub fn destination_path(&self) -> String {
        format!(
            "users/{}/folders/{}/documents/{}.pdf",
            self.user_id, self.folder_id, self.base_name
        )
    }
}
