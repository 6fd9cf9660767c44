//! Pipeline stages for photo-to-searchable-PDF ingestion.
//!
//! Each submodule implements exactly one step. Stages hand ownership of
//! their scratch artifacts forward, so the stage that consumes an artifact
//! last is the one that deletes it.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ fetch ──▶ normalize ──▶ extract ──▶ assemble ──▶ publish
//!  (event)    (download)  (resize)      (OCR)       (PDF)       (upload+record)
//! ```
//!
//! 1. [`validate`]: event → [`crate::event::PipelineContext`] or a skip; no I/O
//! 2. [`fetch`]: blob store → raw scratch file
//! 3. [`normalize`]: cap width at 1000 px, re-encode (`spawn_blocking`)
//! 4. [`extract`]: OCR the normalized image; empty text is fine
//! 5. [`assemble`]: one-page PDF, image centred, invisible text layer;
//!    deletes both scratch images
//! 6. [`publish`]: upload the PDF (deleting the local copy), write the record
//!
//! [`scratch`] holds the per-invocation temp directory and file guards.

pub mod assemble;
pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod publish;
pub mod scratch;
pub mod validate;
