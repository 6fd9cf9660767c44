//! # scan2pdf
//!
//! Turn photographed documents into searchable PDFs.
//!
//! When an image lands under `users/{userId}/folders/{folderId}/raw_images/`
//! in the blob store, the pipeline downloads it, caps its width, runs OCR,
//! and builds a one-page PDF with the image centred and the recognised text
//! laid over it as an invisible layer, so that viewers can search and copy it.
//! The PDF is uploaded next to the source under `documents/` and a metadata
//! record pointing at it is written to the record store.
//!
//! ## Pipeline Overview
//!
//! ```text
//! UploadEvent
//!  │
//!  ├─ 1. Validate   path shape + image content type, else Skip (no I/O)
//!  ├─ 2. Fetch      download to a per-invocation scratch area
//!  ├─ 3. Normalize  width ≤ 1000 px, JPEG q80 or PNG (spawn_blocking)
//!  ├─ 4. Extract    document-text OCR; empty text is fine
//!  ├─ 5. Assemble   single-page PDF (lopdf) + invisible text layer
//!  └─ 6. Publish    upload PDF with metadata, then write DocumentRecord
//! ```
//!
//! Any stage failure aborts the run; scratch files are removed on every
//! exit path. Nothing is retried.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scan2pdf::clients::local::{LocalBlobStore, LocalRecordStore, NullTextDetector};
//! use scan2pdf::{Clients, IngestService, PipelineConfig, UploadEvent};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let clients = Clients::new(
//!         Arc::new(LocalBlobStore::new("./blobs")),
//!         Arc::new(NullTextDetector),
//!         Arc::new(LocalRecordStore::new("./records")),
//!     );
//!     let service = IngestService::new(PipelineConfig::default(), clients);
//!
//!     let event = UploadEvent::new(
//!         "scans",
//!         "users/u1/folders/f1/raw_images/receipt.jpg",
//!         "image/jpeg",
//!         48_213,
//!     );
//!     if let Some(doc) = service.handle(&event).await?.published() {
//!         println!("{} -> {}", doc.record.pdf_path, doc.record_id);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scan2pdf` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scan2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod clients;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod ingest;
pub mod observer;
pub mod output;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use clients::{BlobStore, Clients, ObjectMetadata, RecordStore, TextDetector};
pub use config::{PageSize, PipelineConfig, PipelineConfigBuilder};
pub use dispatch::{dispatch_all, dispatch_events, EventReport, ReportStream};
pub use error::{ErrorKind, IngestError, OcrError, RecordError, SkipReason, StorageError};
pub use event::{EmbedFormat, ImageKind, PipelineContext, UploadEvent};
pub use ingest::{global, handle_global, init_global, IngestService};
pub use observer::{NoopObserver, PipelineObserver, SharedObserver, Stage};
pub use output::{DocumentRecord, IngestOutcome, IngestStats, PublishedDocument};
