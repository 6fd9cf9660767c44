//! Bounded-concurrency fan-out of upload events.
//!
//! Invocations are independent: each has its own scratch area and shares
//! nothing mutable with the others, so the only coordination is the cap on
//! how many run at once ([`PipelineConfig::max_concurrency`]).
//!
//! Reports are yielded in completion order, not submission order.
//!
//! [`PipelineConfig::max_concurrency`]: crate::config::PipelineConfig::max_concurrency

use crate::error::IngestError;
use crate::event::UploadEvent;
use crate::ingest::IngestService;
use crate::output::IngestOutcome;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

/// Result of one dispatched event.
#[derive(Debug)]
pub struct EventReport {
    /// Object path from the event, `""` if the event had none.
    pub object_path: String,
    pub result: Result<IngestOutcome, IngestError>,
}

impl EventReport {
    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }
}

/// A boxed stream of event reports.
pub type ReportStream = Pin<Box<dyn Stream<Item = EventReport> + Send>>;

/// Run every event from `events` through `service`, at most
/// `max_concurrency` at a time.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use scan2pdf::{dispatch_events, IngestService, UploadEvent};
/// use std::sync::Arc;
///
/// # async fn run(service: Arc<IngestService>, events: Vec<UploadEvent>) {
/// let mut reports = dispatch_events(service, futures::stream::iter(events));
/// while let Some(report) = reports.next().await {
///     if let Err(e) = &report.result {
///         eprintln!("{}: {e}", report.object_path);
///     }
/// }
/// # }
/// ```
pub fn dispatch_events<S>(service: Arc<IngestService>, events: S) -> ReportStream
where
    S: Stream<Item = UploadEvent> + Send + 'static,
{
    let concurrency = service.config().max_concurrency.max(1);
    let s = events
        .map(move |event| {
            let service = Arc::clone(&service);
            async move {
                let result = service.handle(&event).await;
                EventReport {
                    object_path: event.object_path().to_string(),
                    result,
                }
            }
        })
        .buffer_unordered(concurrency);
    Box::pin(s)
}

/// Dispatch a batch of events and wait for all of them.
pub async fn dispatch_all(
    service: Arc<IngestService>,
    events: impl IntoIterator<Item = UploadEvent>,
) -> Vec<EventReport> {
    let events: Vec<UploadEvent> = events.into_iter().collect();
    dispatch_events(service, stream::iter(events)).collect().await
}
