//! CLI binary for scan2pdf.
//!
//! A thin shim over the library crate: reads upload events, wires the
//! collaborators selected by flags, and runs every event through the
//! process-wide service.

use anyhow::{bail, Context, Result};
use clap::Parser;
use scan2pdf::clients::firestore::{FirestoreClient, FirestoreConfig};
use scan2pdf::clients::gcs::{GcsBlobStore, GcsConfig};
use scan2pdf::clients::local::{LocalBlobStore, LocalRecordStore, NullTextDetector};
use scan2pdf::clients::vision::{VisionClient, VisionConfig};
use scan2pdf::{
    dispatch_all, init_global, BlobStore, Clients, IngestOutcome, IngestService, PipelineConfig,
    RecordStore, TextDetector, UploadEvent,
};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Replay one object-finalize event against a local directory
  scan2pdf --root ./data event.json

  # Pipe JSON lines, OCR through the Vision API
  cat events.jsonl | scan2pdf --root ./data --ocr vision --vision-api-key $KEY

  # Against the real services
  scan2pdf --backend gcp --project my-project --access-token "$(gcloud auth print-access-token)" event.json

EVENT FORMAT:
  {"bucket":"scans","name":"users/u1/folders/f1/raw_images/doc.jpg",
   "contentType":"image/jpeg","size":"48213"}

LOCAL LAYOUT (--backend local):
  {root}/blobs/{bucket}/{path}                        objects (+ .metadata.json)
  {root}/records/users/{u}/folders/{f}/documents/     records as JSON
"#;

/// Turn uploaded document photos into searchable PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "scan2pdf",
    version,
    about = "Turn uploaded document photos into searchable PDFs",
    long_about = "Process blob-store upload events: download the photo, cap its width, run OCR, \
build a single-page PDF with an invisible text layer, upload it under documents/ and record it.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Event JSON files. Reads JSON lines from stdin when none are given or for `-`.
    events: Vec<String>,

    /// Collaborator backend.
    #[arg(long, env = "SCAN2PDF_BACKEND", value_enum, default_value = "local")]
    backend: BackendArg,

    /// OCR engine. `none` produces image-only PDFs.
    #[arg(long, env = "SCAN2PDF_OCR", value_enum)]
    ocr: Option<OcrArg>,

    /// Data directory for the local backend.
    #[arg(long, env = "SCAN2PDF_ROOT", default_value = "./scan2pdf-data")]
    root: PathBuf,

    /// OAuth2 bearer token for every Google API call.
    #[arg(long, env = "SCAN2PDF_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Vision API key (alternative to a bearer token).
    #[arg(long, env = "SCAN2PDF_VISION_API_KEY", hide_env_values = true)]
    vision_api_key: Option<String>,

    /// Firestore project id (required with `--backend gcp`).
    #[arg(long, env = "SCAN2PDF_PROJECT")]
    project: Option<String>,

    /// Cloud Storage API root.
    #[arg(long, env = "SCAN2PDF_GCS_ENDPOINT")]
    gcs_endpoint: Option<String>,

    /// Vision API root.
    #[arg(long, env = "SCAN2PDF_VISION_ENDPOINT")]
    vision_endpoint: Option<String>,

    /// Firestore API root.
    #[arg(long, env = "SCAN2PDF_FIRESTORE_ENDPOINT")]
    firestore_endpoint: Option<String>,

    /// Host used in the recorded download URL.
    #[arg(long, env = "SCAN2PDF_DOWNLOAD_HOST")]
    download_host: Option<String>,

    /// Maximum width of the normalized image in pixels.
    #[arg(long, env = "SCAN2PDF_MAX_WIDTH", default_value_t = 1000)]
    max_width: u32,

    /// JPEG quality (1–100) for JPEG uploads.
    #[arg(long, env = "SCAN2PDF_JPEG_QUALITY", default_value_t = 80,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Number of events processed concurrently.
    #[arg(short, long, env = "SCAN2PDF_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Directory for per-event scratch areas. Default: system temp dir.
    #[arg(long, env = "SCAN2PDF_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Print each published record as a JSON line on stdout.
    #[arg(long, env = "SCAN2PDF_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCAN2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCAN2PDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum BackendArg {
    /// Filesystem stores under `--root`.
    Local,
    /// Cloud Storage, Vision and Firestore REST APIs.
    Gcp,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OcrArg {
    Vision,
    None,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Read events ──────────────────────────────────────────────────────
    let events = read_events(&cli.events)?;
    if events.is_empty() {
        bail!("No events to process");
    }

    // ── Build service ────────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let clients = build_clients(&cli)?;
    let service = init_global(IngestService::new(config, clients))
        .context("Failed to initialise ingest service")?;

    // ── Dispatch ─────────────────────────────────────────────────────────
    let reports = dispatch_all(service, events).await;

    let mut failed = 0usize;
    for report in &reports {
        match &report.result {
            Ok(IngestOutcome::Published(doc)) => {
                if cli.json {
                    let line =
                        serde_json::to_string(doc).context("Failed to serialise record")?;
                    println!("{line}");
                } else if !cli.quiet {
                    eprintln!(
                        "{} {}  →  {}  {}",
                        green("✓"),
                        report.object_path,
                        doc.record.pdf_path,
                        dim(&format!(
                            "{} chars, {}ms",
                            doc.stats.ocr_chars, doc.stats.total_ms
                        )),
                    );
                }
            }
            Ok(IngestOutcome::Skipped(reason)) => {
                if !cli.quiet {
                    eprintln!("{} {}  {}", dim("-"), report.object_path, dim(&reason.to_string()));
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {}  {}", red("✗"), report.object_path, red(&e.to_string()));
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} events failed", reports.len());
    }
    Ok(())
}

/// Load events from files, or JSON lines from stdin.
fn read_events(sources: &[String]) -> Result<Vec<UploadEvent>> {
    let mut events = Vec::new();
    if sources.is_empty() {
        read_event_lines(io::stdin().lock(), "stdin", &mut events)?;
        return Ok(events);
    }

    for source in sources {
        if source == "-" {
            read_event_lines(io::stdin().lock(), "stdin", &mut events)?;
            continue;
        }
        let text = std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read event file {source}"))?;
        // A file holds one JSON document, or JSON lines.
        match serde_json::from_str::<UploadEvent>(&text) {
            Ok(event) => events.push(event),
            Err(_) => read_event_lines(text.as_bytes(), source, &mut events)?,
        }
    }
    Ok(events)
}

fn read_event_lines(reader: impl BufRead, source: &str, out: &mut Vec<UploadEvent>) -> Result<()> {
    for (n, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {source}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line)
            .with_context(|| format!("{source}:{}: invalid event JSON", n + 1))?;
        out.push(event);
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .max_image_width(cli.max_width)
        .jpeg_quality(cli.jpeg_quality)
        .max_concurrency(cli.concurrency);
    if let Some(ref host) = cli.download_host {
        builder = builder.download_host(host.clone());
    }
    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_root(dir.clone());
    }
    builder.build().context("Invalid configuration")
}

/// Build the collaborators for the selected backend.
fn build_clients(cli: &Cli) -> Result<Clients> {
    let (blobs, records): (Arc<dyn BlobStore>, Arc<dyn RecordStore>) = match cli.backend {
        BackendArg::Local => (
            Arc::new(LocalBlobStore::new(cli.root.join("blobs"))),
            Arc::new(LocalRecordStore::new(cli.root.join("records"))),
        ),
        BackendArg::Gcp => {
            let mut gcs = GcsConfig {
                access_token: cli.access_token.clone(),
                ..Default::default()
            };
            if let Some(ref endpoint) = cli.gcs_endpoint {
                gcs.endpoint = endpoint.clone();
            }

            let project = cli
                .project
                .clone()
                .context("--project is required with --backend gcp")?;
            let mut firestore = FirestoreConfig {
                project_id: project,
                access_token: cli.access_token.clone(),
                ..Default::default()
            };
            if let Some(ref endpoint) = cli.firestore_endpoint {
                firestore.endpoint = endpoint.clone();
            }

            (
                Arc::new(GcsBlobStore::new(gcs).context("Failed to build storage client")?),
                Arc::new(FirestoreClient::new(firestore).context("Failed to build record client")?),
            )
        }
    };

    // Local runs default to no OCR; gcp runs default to Vision.
    let ocr_choice = cli.ocr.unwrap_or(match cli.backend {
        BackendArg::Local => OcrArg::None,
        BackendArg::Gcp => OcrArg::Vision,
    });
    let ocr: Arc<dyn TextDetector> = match ocr_choice {
        OcrArg::None => Arc::new(NullTextDetector),
        OcrArg::Vision => {
            let mut vision = VisionConfig {
                access_token: cli.access_token.clone(),
                api_key: cli.vision_api_key.clone(),
                ..Default::default()
            };
            if let Some(ref endpoint) = cli.vision_endpoint {
                vision.endpoint = endpoint.clone();
            }
            Arc::new(VisionClient::new(vision).context("Failed to build OCR client")?)
        }
    };

    Ok(Clients::new(blobs, ocr, records))
}
