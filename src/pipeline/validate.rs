//! Input validation: turn an [`UploadEvent`] into a [`PipelineContext`] or a skip.
//!
//! Validation performs no I/O. Anything the pipeline does not handle
//! (non-images, objects outside `raw_images/`, partial payloads) comes back
//! as a [`SkipReason`], which the orchestrator logs at debug level.

use crate::error::SkipReason;
use crate::event::{ImageKind, PipelineContext, UploadEvent};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// `users/{userId}/folders/{folderId}/raw_images/[{dir}/...]{fileName}`.
/// Every segment is non-empty; the file name is the last one.
static RAW_IMAGE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^users/(?P<user>[^/]+)/folders/(?P<folder>[^/]+)/raw_images/(?P<dirs>(?:[^/]+/)*)(?P<file>[^/]+)$",
    )
    .expect("static regex")
});

const IMAGE_PREFIX: &str = "image/";

/// Validate an upload event.
pub fn validate(event: &UploadEvent) -> Result<PipelineContext, SkipReason> {
    let bucket = required(&event.bucket, "bucket")?;
    let object_path = required(&event.name, "name")?;
    let content_type = required(&event.content_type, "contentType")?;
    let size_bytes = event.size.ok_or(SkipReason::MissingField("size"))?;

    if !content_type
        .get(..IMAGE_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(IMAGE_PREFIX))
    {
        return Err(SkipReason::NotAnImage {
            content_type: content_type.to_string(),
        });
    }

    let malformed = || SkipReason::MalformedPath {
        path: object_path.to_string(),
    };
    let caps = RAW_IMAGE_PATH.captures(object_path).ok_or_else(malformed)?;
    let user_id = &caps["user"];
    let folder_id = &caps["folder"];
    let file_name = &caps["file"];

    if [user_id, folder_id, file_name]
        .into_iter()
        .chain(caps["dirs"].split('/'))
        .any(|s| s == "." || s == "..")
    {
        return Err(malformed());
    }

    Ok(PipelineContext {
        bucket: bucket.to_string(),
        object_path: object_path.to_string(),
        content_type: content_type.to_string(),
        size_bytes,
        user_id: user_id.to_string(),
        folder_id: folder_id.to_string(),
        original_file_name: file_name.to_string(),
        base_name: base_name(file_name),
        image_kind: ImageKind::from_content_type(content_type),
    })
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, SkipReason> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(SkipReason::MissingField(field)),
    }
}

/// File name without its final extension (`scan.v2.jpg` → `scan.v2`).
fn base_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(path: &str, content_type: &str) -> UploadEvent {
        UploadEvent::new("scans", path, content_type, 1024)
    }

    #[test]
    fn accepts_well_formed_event() {
        let ctx = validate(&event("users/u1/folders/f1/raw_images/doc.jpg", "image/jpeg")).unwrap();
        assert_eq!(ctx.user_id, "u1");
        assert_eq!(ctx.folder_id, "f1");
        assert_eq!(ctx.original_file_name, "doc.jpg");
        assert_eq!(ctx.base_name, "doc");
        assert_eq!(ctx.image_kind, ImageKind::Jpeg);
        assert_eq!(ctx.destination_path(), "users/u1/folders/f1/documents/doc.pdf");
    }

    #[test]
    fn accepts_nested_raw_image_folders() {
        let ctx = validate(&event(
            "users/u1/folders/f1/raw_images/2024/03/receipt.png",
            "image/png",
        ))
        .unwrap();
        assert_eq!(ctx.user_id, "u1");
        assert_eq!(ctx.folder_id, "f1");
        assert_eq!(ctx.original_file_name, "receipt.png");
        assert_eq!(ctx.destination_path(), "users/u1/folders/f1/documents/receipt.pdf");
    }

    #[test]
    fn rejects_non_images() {
        for ct in ["application/pdf", "text/plain", "video/mp4", "imagex/png", ""] {
            let r = validate(&event("users/u1/folders/f1/raw_images/doc.jpg", ct));
            assert!(r.is_err(), "{ct} should be skipped");
        }
        assert_eq!(
            validate(&event("users/u1/folders/f1/raw_images/a.pdf", "application/pdf")),
            Err(SkipReason::NotAnImage {
                content_type: "application/pdf".into()
            })
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        let bad = [
            "users/u1/folders/f1/raw_images",
            "users/u1/folders/f1/raw_images/",
            "users/u1/folders/f1/documents/doc.jpg",
            "people/u1/folders/f1/raw_images/doc.jpg",
            "users/u1/albums/f1/raw_images/doc.jpg",
            "users//folders/f1/raw_images/doc.jpg",
            "users/u1/folders/f1/raw_images//doc.jpg",
            "users/u1/folders/f1/raw_images/../doc.jpg",
            "users/u1/folders/f1/raw_images/2024/./doc.jpg",
            "/users/u1/folders/f1/raw_images/doc.jpg",
            "users/u1/folders/f1/raw_images/..",
            "doc.jpg",
        ];
        for p in bad {
            assert!(
                matches!(validate(&event(p, "image/png")), Err(SkipReason::MalformedPath { .. })),
                "{p} should be malformed"
            );
        }
    }

    #[test]
    fn missing_fields_are_skips() {
        let mut ev = event("users/u1/folders/f1/raw_images/doc.jpg", "image/png");
        ev.size = None;
        assert_eq!(validate(&ev), Err(SkipReason::MissingField("size")));

        let mut ev = event("users/u1/folders/f1/raw_images/doc.jpg", "image/png");
        ev.bucket = Some(String::new());
        assert_eq!(validate(&ev), Err(SkipReason::MissingField("bucket")));

        assert_eq!(
            validate(&UploadEvent::default()),
            Err(SkipReason::MissingField("bucket"))
        );
    }

    #[test]
    fn base_name_strips_last_extension_only() {
        assert_eq!(base_name("scan.v2.jpg"), "scan.v2");
        assert_eq!(base_name("noext"), "noext");
        assert_eq!(base_name(".hidden"), ".hidden");
    }
}
