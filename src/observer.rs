//! Observer trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive events as an
//! invocation moves through its stages. The pipeline itself only logs; an
//! observer is how a host forwards the same events to metrics, a queue, or a
//! test harness.
//!
//! # Example
//!
//! ```rust
//! use scan2pdf::{PipelineConfig, PipelineObserver, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter {
//!     failures: AtomicUsize,
//! }
//!
//! impl PipelineObserver for FailureCounter {
//!     fn on_stage_error(&self, stage: Stage, error: &str) {
//!         self.failures.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} failed: {error}");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .observer(Arc::new(FailureCounter { failures: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::SkipReason;
use crate::output::PublishedDocument;
use std::fmt;
use std::sync::Arc;

/// The fallible stages of one invocation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Normalize,
    Extract,
    Assemble,
    Publish,
    Record,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Normalize => "normalize",
            Stage::Extract => "extract",
            Stage::Assemble => "assemble",
            Stage::Publish => "publish",
            Stage::Record => "record",
        };
        f.write_str(name)
    }
}

/// Called by the pipeline as it processes an upload event.
///
/// Implementations must be `Send + Sync`: the dispatcher runs several
/// invocations concurrently and they all share one observer. Every method
/// has a no-op default.
pub trait PipelineObserver: Send + Sync {
    /// The event was rejected by validation; no stage ran.
    fn on_skip(&self, object_path: &str, reason: &SkipReason) {
        let _ = (object_path, reason);
    }

    /// A stage is about to run.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// A stage finished successfully.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// A stage failed; the invocation is aborting.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }

    /// The PDF and its metadata record were both written.
    fn on_published(&self, document: &PublishedDocument) {
        let _ = document;
    }
}

/// Used when no observer is configured.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type SharedObserver = Arc<dyn PipelineObserver>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_skip("a/b", &SkipReason::MissingField("size"));
        o.on_stage_start(Stage::Fetch);
        o.on_stage_complete(Stage::Fetch, 12);
        o.on_stage_error(Stage::Extract, "quota");
    }

    #[test]
    fn stage_display_is_lowercase() {
        assert_eq!(Stage::Extract.to_string(), "extract");
        assert_eq!(Stage::Record.to_string(), "record");
    }
}
