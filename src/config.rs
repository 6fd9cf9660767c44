//! Configuration for the ingestion pipeline.
//!
//! Every knob the stages read lives in [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`]. The config is cloned cheaply into each
//! invocation and never mutated after `build()`.

use crate::error::IngestError;
use crate::observer::SharedObserver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default host used in published download URLs.
pub const DEFAULT_DOWNLOAD_HOST: &str = "firebasestorage.googleapis.com";

/// Configuration for one ingestion service.
///
/// # Example
/// ```rust
/// use scan2pdf::{PageSize, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .max_image_width(800)
///     .page_size(PageSize::Letter)
///     .max_concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.jpeg_quality, 80);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Widest normalized image in pixels. Narrower images are never upscaled. Default: 1000.
    pub max_image_width: u32,

    /// JPEG quality (1–100) for normalized JPEG uploads. Default: 80.
    pub jpeg_quality: u8,

    /// Page the image is fitted onto. Default: A4.
    pub page_size: PageSize,

    /// Font size of the invisible OCR text layer in points. Default: 1.0.
    pub text_font_size: f32,

    /// Fill opacity of the OCR text layer. Default: 0.0 (invisible).
    ///
    /// The layer only exists so viewers can search and select the text.
    pub text_opacity: f32,

    /// Distance of the text layer origin from the left and top page edges. Default: 50.0.
    pub text_margin: f32,

    /// Characters of OCR text copied into the uploaded object's metadata. Default: 1000.
    pub ocr_excerpt_chars: usize,

    /// Host of the templated download URL. Default: [`DEFAULT_DOWNLOAD_HOST`].
    pub download_host: String,

    /// Upper bound on concurrently running invocations in [`crate::dispatch`]. Default: 5.
    pub max_concurrency: usize,

    /// Parent directory for per-invocation scratch areas. Default: system temp dir.
    pub scratch_root: Option<PathBuf>,

    /// Optional per-stage event observer.
    pub observer: Option<SharedObserver>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_image_width: 1000,
            jpeg_quality: 80,
            page_size: PageSize::default(),
            text_font_size: 1.0,
            text_opacity: 0.0,
            text_margin: 50.0,
            ocr_excerpt_chars: 1000,
            download_host: DEFAULT_DOWNLOAD_HOST.to_string(),
            max_concurrency: 5,
            scratch_root: None,
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_image_width", &self.max_image_width)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("page_size", &self.page_size)
            .field("text_font_size", &self.text_font_size)
            .field("text_opacity", &self.text_opacity)
            .field("text_margin", &self.text_margin)
            .field("ocr_excerpt_chars", &self.ocr_excerpt_chars)
            .field("download_host", &self.download_host)
            .field("max_concurrency", &self.max_concurrency)
            .field("scratch_root", &self.scratch_root)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_image_width(mut self, px: u32) -> Self {
        self.config.max_image_width = px;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q;
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn text_font_size(mut self, pt: f32) -> Self {
        self.config.text_font_size = pt;
        self
    }

    pub fn text_opacity(mut self, opacity: f32) -> Self {
        self.config.text_opacity = opacity;
        self
    }

    pub fn text_margin(mut self, pt: f32) -> Self {
        self.config.text_margin = pt;
        self
    }

    pub fn ocr_excerpt_chars(mut self, n: usize) -> Self {
        self.config.ocr_excerpt_chars = n;
        self
    }

    pub fn download_host(mut self, host: impl Into<String>) -> Self {
        self.config.download_host = host.into();
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n;
        self
    }

    pub fn scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_root = Some(dir.into());
        self
    }

    pub fn observer(mut self, observer: SharedObserver) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, IngestError> {
        let c = &self.config;
        if c.max_image_width == 0 {
            return Err(IngestError::InvalidConfig(
                "max_image_width must be ≥ 1".into(),
            ));
        }
        if !(1..=100).contains(&c.jpeg_quality) {
            return Err(IngestError::InvalidConfig(format!(
                "jpeg_quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        let (w, h) = c.page_size.dimensions();
        if !(w > 0.0 && h > 0.0 && w.is_finite() && h.is_finite()) {
            return Err(IngestError::InvalidConfig(format!(
                "page size must be positive, got {w}×{h}"
            )));
        }
        if !(c.text_font_size > 0.0 && c.text_font_size.is_finite()) {
            return Err(IngestError::InvalidConfig(format!(
                "text_font_size must be > 0, got {}",
                c.text_font_size
            )));
        }
        if !(0.0..=1.0).contains(&c.text_opacity) {
            return Err(IngestError::InvalidConfig(format!(
                "text_opacity must be 0.0–1.0, got {}",
                c.text_opacity
            )));
        }
        if c.text_margin < 0.0 || c.text_margin >= h {
            return Err(IngestError::InvalidConfig(format!(
                "text_margin must be inside the page, got {}",
                c.text_margin
            )));
        }
        if c.download_host.trim().is_empty() {
            return Err(IngestError::InvalidConfig("download_host is empty".into()));
        }
        if c.max_concurrency == 0 {
            return Err(IngestError::InvalidConfig(
                "max_concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Page geometry of the assembled PDF, in PostScript points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PageSize {
    /// 595.28 × 841.89 pt (default).
    #[default]
    A4,
    /// 612 × 792 pt.
    Letter,
    /// Any other size.
    Custom { width: f32, height: f32 },
}

impl PageSize {
    /// `(width, height)` in points.
    pub fn dimensions(&self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Custom { width, height } => (*width, *height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::builder().build().unwrap();
        assert_eq!(c.max_image_width, 1000);
        assert_eq!(c.jpeg_quality, 80);
        assert_eq!(c.ocr_excerpt_chars, 1000);
        assert_eq!(c.max_concurrency, 5);
        assert_eq!(c.text_opacity, 0.0);
        assert_eq!(c.page_size.dimensions(), (595.28, 841.89));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = PipelineConfig::builder().max_concurrency(0).build().unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn rejects_bad_quality_and_opacity() {
        assert!(PipelineConfig::builder().jpeg_quality(0).build().is_err());
        assert!(PipelineConfig::builder().jpeg_quality(101).build().is_err());
        assert!(PipelineConfig::builder().text_opacity(1.5).build().is_err());
    }

    #[test]
    fn rejects_degenerate_page() {
        let err = PipelineConfig::builder()
            .page_size(PageSize::Custom {
                width: 0.0,
                height: 100.0,
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("page size"));
    }

    #[test]
    fn debug_hides_observer() {
        let c = PipelineConfig::default();
        let s = format!("{c:?}");
        assert!(s.contains("max_image_width"));
        assert!(s.contains("observer: None"));
    }
}
