//! Per-event orchestration and the process-wide service.
//!
//! [`IngestService::handle`] runs one upload event through every stage in
//! order. Each invocation gets its own [`ScratchArea`]; the stage that
//! consumes a scratch artifact last deletes it, and anything left over when a
//! stage fails is removed when its guard drops and the area is closed.
//!
//! A deployment normally builds one service at start-up and registers it with
//! [`init_global`], so every trigger shares the same collaborator handles.

use crate::clients::Clients;
use crate::config::PipelineConfig;
use crate::error::IngestError;
use crate::event::{PipelineContext, UploadEvent};
use crate::observer::{NoopObserver, PipelineObserver, Stage};
use crate::output::{IngestOutcome, IngestStats, PublishedDocument};
use crate::pipeline::scratch::ScratchArea;
use crate::pipeline::{assemble, extract, fetch, normalize, publish, validate};
use once_cell::sync::OnceCell;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Turns upload events into published PDFs.
pub struct IngestService {
    config: PipelineConfig,
    clients: Clients,
}

impl IngestService {
    pub fn new(config: PipelineConfig, clients: Clients) -> Self {
        Self { config, clients }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    /// Process one upload event.
    ///
    /// # Returns
    /// - `Ok(IngestOutcome::Skipped)` when the event is not a raw image
    ///   upload. No collaborator is called.
    /// - `Ok(IngestOutcome::Published)` when the PDF and its record were
    ///   both written.
    ///
    /// # Errors
    /// The first failing stage aborts the run. Scratch files created so far
    /// are deleted before this returns.
    pub async fn handle(&self, event: &UploadEvent) -> Result<IngestOutcome, IngestError> {
        let ctx = match validate::validate(event) {
            Ok(ctx) => ctx,
            Err(reason) => {
                debug!(object = event.object_path(), "Skipping event: {}", reason);
                self.observer().on_skip(event.object_path(), &reason);
                return Ok(IngestOutcome::Skipped(reason));
            }
        };

        let span = info_span!("ingest", bucket = %ctx.bucket, object = %ctx.object_path);
        self.run(ctx)
            .instrument(span)
            .await
            .map(IngestOutcome::Published)
    }

    async fn run(&self, ctx: PipelineContext) -> Result<PublishedDocument, IngestError> {
        info!("Ingesting {} ({} bytes)", ctx.original_file_name, ctx.size_bytes);

        let scratch = ScratchArea::create(self.config.scratch_root.as_deref())
            .map_err(|e| IngestError::Internal(format!("Cannot create scratch area: {e}")))?;

        let result = self.run_stages(&ctx, &scratch).await;

        if let Err(e) = scratch.close() {
            warn!("Failed to remove scratch area: {}", e);
        }

        match &result {
            Ok(doc) => {
                info!(
                    "Published {} in {}ms (record {})",
                    doc.record.pdf_path, doc.stats.total_ms, doc.record_id
                );
                self.observer().on_published(doc);
            }
            Err(e) => error!(kind = ?e.kind(), "Ingestion failed: {}", e),
        }
        result
    }

    async fn run_stages(
        &self,
        ctx: &PipelineContext,
        scratch: &ScratchArea,
    ) -> Result<PublishedDocument, IngestError> {
        let total_start = Instant::now();
        let config = &self.config;
        let mut stats = IngestStats::default();

        // ── Fetch ────────────────────────────────────────────────────────
        let (fetched, ms) = self
            .stage(
                Stage::Fetch,
                fetch::fetch(self.clients.blobs.as_ref(), ctx, scratch),
            )
            .await?;
        stats.fetch_ms = ms;
        stats.source_bytes = fetched.bytes;
        info!("Fetched {} bytes in {}ms", fetched.bytes, ms);

        // ── Normalize ────────────────────────────────────────────────────
        let (normalized, ms) = self
            .stage(
                Stage::Normalize,
                normalize::normalize(&fetched.file, ctx, scratch, config),
            )
            .await?;
        stats.normalize_ms = ms;
        stats.normalized_width = normalized.width;
        stats.normalized_height = normalized.height;
        info!(
            "Normalized to {}x{} {:?} in {}ms",
            normalized.width, normalized.height, normalized.format, ms
        );

        // ── Extract ──────────────────────────────────────────────────────
        let (text, ms) = self
            .stage(
                Stage::Extract,
                extract::extract_text(self.clients.ocr.as_ref(), ctx, &normalized),
            )
            .await?;
        stats.extract_ms = ms;
        stats.ocr_chars = text.chars().count();
        info!("Extracted {} characters in {}ms", stats.ocr_chars, ms);

        // ── Assemble ─────────────────────────────────────────────────────
        let (document, ms) = self
            .stage(
                Stage::Assemble,
                assemble::assemble(ctx, fetched.file, normalized, &text, scratch, config),
            )
            .await?;
        stats.assemble_ms = ms;
        stats.pdf_bytes = document.bytes.len() as u64;
        info!("Assembled {} byte PDF in {}ms", stats.pdf_bytes, ms);

        // ── Publish ──────────────────────────────────────────────────────
        let (uploaded, ms) = self
            .stage(
                Stage::Publish,
                publish::upload_pdf(self.clients.blobs.as_ref(), ctx, document, &text, config),
            )
            .await?;
        stats.publish_ms = ms;
        info!("Uploaded {} in {}ms", uploaded.pdf_path, ms);

        // ── Record ───────────────────────────────────────────────────────
        let ((record_id, record), ms) = self
            .stage(
                Stage::Record,
                publish::record_document(self.clients.records.as_ref(), ctx, &uploaded, text),
            )
            .await?;
        stats.record_ms = ms;
        stats.total_ms = total_start.elapsed().as_millis() as u64;

        Ok(PublishedDocument {
            record_id,
            record,
            stats,
        })
    }

    /// Run one stage, reporting start, completion and failure to the observer.
    async fn stage<T, F>(&self, stage: Stage, fut: F) -> Result<(T, u64), IngestError>
    where
        F: Future<Output = Result<T, IngestError>>,
    {
        let observer = self.observer();
        observer.on_stage_start(stage);
        let start = Instant::now();
        match fut.await {
            Ok(value) => {
                let ms = start.elapsed().as_millis() as u64;
                observer.on_stage_complete(stage, ms);
                Ok((value, ms))
            }
            Err(e) => {
                observer.on_stage_error(stage, &e.to_string());
                Err(e)
            }
        }
    }

    fn observer(&self) -> &dyn PipelineObserver {
        match self.config.observer.as_deref() {
            Some(observer) => observer,
            None => &NoopObserver,
        }
    }
}

static SERVICE: OnceCell<Arc<IngestService>> = OnceCell::new();

/// Register the process-wide service.
///
/// # Errors
/// [`IngestError::AlreadyInitialized`] if a service was already registered;
/// the existing one stays in place.
pub fn init_global(service: IngestService) -> Result<Arc<IngestService>, IngestError> {
    let service = Arc::new(service);
    SERVICE
        .set(Arc::clone(&service))
        .map_err(|_| IngestError::AlreadyInitialized)?;
    Ok(service)
}

/// The process-wide service, if [`init_global`] has been called.
pub fn global() -> Option<Arc<IngestService>> {
    SERVICE.get().cloned()
}

/// Handle an event with the process-wide service.
///
/// # Errors
/// [`IngestError::Internal`] if no service has been registered, otherwise
/// whatever [`IngestService::handle`] returns.
pub async fn handle_global(event: &UploadEvent) -> Result<IngestOutcome, IngestError> {
    let service = global()
        .ok_or_else(|| IngestError::Internal("Ingest service is not initialised".into()))?;
    service.handle(event).await
}
