use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use quotemark_core::{
    DocumentRef, DocumentSource, ImmediateVisibility, MatchMode, Phase, PublishedHighlights,
    ViewerConfig, ViewerNotification, ViewerRuntime,
};
use quotemark_render::ExtractedDocumentSource;
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "quotemark",
    version,
    about = "Locate a quoted passage in a document and print its highlight rectangles"
)]
struct Args {
    /// PDF file, or a `.json` file of pre-extracted pages
    file: PathBuf,

    /// Page the quote is expected on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Passage to highlight
    #[arg(short = 'q', long = "quote")]
    quote: Option<String>,

    /// Pages to load on each side of the focal page
    #[arg(long)]
    radius: Option<usize>,

    /// Minimum similarity a strict match must exceed
    #[arg(long)]
    threshold: Option<f32>,

    /// Publish the best candidate even below the threshold
    #[arg(long, conflicts_with = "strict")]
    lenient: bool,

    /// Only publish candidates above the threshold
    #[arg(long)]
    strict: bool,

    /// Output scale applied to highlight rectangles
    #[arg(long)]
    scale: Option<f32>,

    /// TOML file with viewer defaults
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Print every viewer notification instead of only the focal highlights
    #[arg(long)]
    events: bool,
}

impl Args {
    fn viewer_config(&self) -> Result<ViewerConfig> {
        let mut config = match &self.config {
            Some(path) => ViewerConfig::load(path)?,
            None => ViewerConfig::default(),
        };
        if let Some(page) = self.page {
            config.focal_page = page;
        }
        if let Some(quote) = &self.quote {
            config.quote = quote.clone();
        }
        if let Some(radius) = self.radius {
            config.radius = radius;
        }
        if let Some(threshold) = self.threshold {
            config.accept_threshold = threshold;
        }
        if self.lenient {
            config.match_mode = MatchMode::Lenient;
        } else if self.strict {
            config.match_mode = MatchMode::Strict;
        }
        if let Some(scale) = self.scale {
            config.scale = scale;
        }
        Ok(config.normalized())
    }
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    document: String,
    highlights: Option<&'a PublishedHighlights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notifications: Option<&'a [ViewerNotification]>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(ProjectDirs::from("net", "quotemark", "quotemark").as_ref())?;

    let config = args.viewer_config()?;
    let source = document_source(&args.file)?;
    let reference = DocumentRef::Path(args.file.clone());

    let runtime = ViewerRuntime::new(config, source, Arc::new(ImmediateVisibility));
    let handle = runtime.handle();
    let mut phase = runtime.phase();
    let notifications = runtime.notifications();
    let task = tokio::spawn(runtime.run());

    handle.mount(reference.clone())?;
    let settled = phase
        .wait_for(|phase| matches!(phase, Phase::Ready | Phase::Failed(_)))
        .await
        .context("viewer runtime stopped before settling")?
        .clone();
    handle.shutdown()?;
    let controller = task.await.context("viewer runtime panicked")?;

    if let Phase::Failed(reason) = settled {
        return Err(anyhow!("failed to load {}: {}", reference, reason));
    }
    let focal_page = controller.focal_page();
    info!(
        page = focal_page,
        progress = controller.progress(),
        "document settled"
    );

    let log = notifications.lock().clone();
    let report = Report {
        document: reference.to_string(),
        highlights: controller.highlights(focal_page),
        notifications: args.events.then_some(log.as_slice()),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn document_source(path: &Path) -> Result<Arc<dyn DocumentSource>> {
    let is_json = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        return Ok(Arc::new(ExtractedDocumentSource));
    }
    pdf_source()
}

#[cfg(feature = "pdf")]
fn pdf_source() -> Result<Arc<dyn DocumentSource>> {
    Ok(Arc::new(quotemark_render::PdfiumDocumentSource::new()?))
}

#[cfg(not(feature = "pdf"))]
fn pdf_source() -> Result<Arc<dyn DocumentSource>> {
    Err(anyhow!("built without PDF support; pass a .json page dump"))
}

fn init_logging(project_dirs: Option<&ProjectDirs>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    let mut guard = None;
    let mut log_dir_error = None;
    let file_layer = match project_dirs.map(|dirs| dirs.data_local_dir().join("logs")) {
        Some(log_dir) => match fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::never(log_dir, "quotemark.log");
                let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
                guard = Some(file_guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(file_writer),
                )
            }
            Err(err) => {
                log_dir_error = Some((log_dir, err));
                None
            }
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    if let Some((log_dir, err)) = log_dir_error {
        warn!(?log_dir, %err, "logging to stderr only");
    }
    Ok(guard)
}
