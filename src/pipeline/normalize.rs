//! Image normalization: cap the width and re-encode.
//!
//! Phone photos routinely arrive at 4000+ px wide. OCR accuracy plateaus well
//! below that and every extra pixel inflates the OCR request and the final
//! PDF, so images are downscaled to at most `max_image_width` (never
//! upscaled) and re-encoded: JPEG at `jpeg_quality` for JPEG uploads, PNG for
//! everything else so the assembler can embed it losslessly.
//!
//! Decoding and encoding are CPU-bound and run under `spawn_blocking`.

use crate::config::PipelineConfig;
use crate::error::IngestError;
use crate::event::{EmbedFormat, PipelineContext};
use crate::pipeline::scratch::{ScratchArea, ScratchFile, ScratchKind};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// The re-encoded image, ready for OCR and embedding.
#[derive(Debug)]
pub struct NormalizedImage {
    pub file: ScratchFile,
    pub width: u32,
    pub height: u32,
    pub format: EmbedFormat,
}

/// Dimensions after capping the width at `max_width`, preserving aspect ratio.
pub fn target_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width {
        return (width, height);
    }
    let scaled = (f64::from(height) * f64::from(max_width) / f64::from(width)).round();
    (max_width, (scaled as u32).max(1))
}

/// Normalize the raw scratch image into a second scratch file.
pub async fn normalize(
    raw: &ScratchFile,
    ctx: &PipelineContext,
    scratch: &ScratchArea,
    config: &PipelineConfig,
) -> Result<NormalizedImage, IngestError> {
    let format = ctx.image_kind.embed_format();
    let file = scratch.file(
        ScratchKind::Normalized,
        &format!("{}.{}", ctx.base_name, format.extension()),
    );

    let src = raw.path().to_path_buf();
    let dst = file.path().to_path_buf();
    let max_width = config.max_image_width;
    let quality = config.jpeg_quality;

    let (width, height) = tokio::task::spawn_blocking(move || {
        normalize_blocking(&src, &dst, max_width, quality, format)
    })
    .await
    .map_err(|e| IngestError::Internal(format!("Normalize task panicked: {e}")))?
    .map_err(|e| IngestError::NormalizeFailed {
        file: ctx.original_file_name.clone(),
        detail: e.to_string(),
    })?;

    Ok(NormalizedImage {
        file,
        width,
        height,
        format,
    })
}

/// Blocking implementation of [`normalize`].
fn normalize_blocking(
    src: &Path,
    dst: &Path,
    max_width: u32,
    quality: u8,
    format: EmbedFormat,
) -> Result<(u32, u32), image::ImageError> {
    let img = ImageReader::open(src)?.with_guessed_format()?.decode()?;
    let (orig_w, orig_h) = (img.width(), img.height());
    let (width, height) = target_dimensions(orig_w, orig_h, max_width);

    let img = if (width, height) == (orig_w, orig_h) {
        img
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3)
    };

    // Neither output path carries alpha: JPEG cannot, and the PDF image
    // XObject is written as DeviceRGB.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut writer = BufWriter::new(std::fs::File::create(dst)?);
    match format {
        EmbedFormat::Jpeg => {
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))?
        }
        EmbedFormat::Png => rgb.write_with_encoder(PngEncoder::new(&mut writer))?,
    }
    writer.flush()?;

    debug!(
        "Normalized {}x{} → {}x{} ({:?})",
        orig_w, orig_h, width, height, format
    );
    Ok((width, height))
}
