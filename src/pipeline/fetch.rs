//! Fetch: copy the uploaded object into the scratch area.

use crate::clients::BlobStore;
use crate::error::IngestError;
use crate::event::PipelineContext;
use crate::pipeline::scratch::{ScratchArea, ScratchFile, ScratchKind};
use tracing::debug;

/// The downloaded source image.
#[derive(Debug)]
pub struct FetchedImage {
    pub file: ScratchFile,
    pub bytes: u64,
}

/// Download `ctx.bucket/ctx.object_path` into a scratch file named after the
/// source file.
///
/// A partially written file is removed when the download fails.
pub async fn fetch(
    blobs: &dyn BlobStore,
    ctx: &PipelineContext,
    scratch: &ScratchArea,
) -> Result<FetchedImage, IngestError> {
    let file = scratch.file(ScratchKind::Raw, &ctx.original_file_name);

    let bytes = blobs
        .download(&ctx.bucket, &ctx.object_path, file.path())
        .await
        .map_err(|source| IngestError::FetchFailed {
            bucket: ctx.bucket.clone(),
            path: ctx.object_path.clone(),
            source,
        })?;

    if bytes != ctx.size_bytes {
        debug!(
            "Downloaded {} bytes, event announced {}",
            bytes, ctx.size_bytes
        );
    }

    Ok(FetchedImage { file, bytes })
}
