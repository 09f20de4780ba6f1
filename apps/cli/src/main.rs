mod commands;
mod config;
mod display;
mod samples;

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    ClientEvent, HttpBackend, ImageSlot, InputFile, OriginStore, Severity, StagingClient,
    StagingError,
};
use shared::domain::ResultRecord;
use storage::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::{
    commands::{Command, HELP},
    config::{load_settings, normalize_database_url},
    display::HttpProbeSurface,
};

#[derive(Parser, Debug)]
#[command(name = "stager", about = "Virtual staging of empty rooms")]
struct Args {
    /// Inference backend base URL.
    #[arg(long)]
    backend_url: Option<String>,
    /// Where history and preferences are kept.
    #[arg(long)]
    database_url: Option<String>,
    /// Initial target resolution in pixels.
    #[arg(long)]
    resolution: Option<u32>,
    #[arg(long)]
    health_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings()?;
    if let Some(v) = args.backend_url {
        settings.backend_url = v;
    }
    if let Some(v) = args.database_url {
        settings.database_url = v;
    }
    if let Some(v) = args.resolution {
        settings.default_resolution = v;
    }
    if let Some(v) = args.health_timeout_ms {
        settings.health_timeout_ms = v;
    }

    let backend_url = Url::parse(&settings.backend_url)
        .with_context(|| format!("invalid backend url '{}'", settings.backend_url))?;
    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await?;
    storage.health_check().await?;
    let store = Arc::new(OriginStore::new(storage, &backend_url));
    info!(database = %database_url, origin = store.origin(), "storage ready");

    let backend = Arc::new(
        HttpBackend::new(backend_url)
            .with_health_timeout(Duration::from_millis(settings.health_timeout_ms)),
    );
    let surface = Arc::new(HttpProbeSurface::new()?);
    let client = StagingClient::open(backend, store, surface.clone()).await?;
    let repl = Repl {
        client,
        surface,
        samples_dir: PathBuf::from(&settings.samples_dir),
    };
    let client = &repl.client;

    let printer = tokio::spawn(print_events(client.subscribe_events()));
    // The failure is printed from the event bus and the default resolution stays.
    if let Err(err) = client.set_resolution(settings.default_resolution).await {
        debug!(error = %err, "configured resolution rejected");
    }
    if client.check_backend().await {
        info!(backend = %client.backend_url(), "backend is healthy");
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("stager> ");
        std::io::stdout().flush().ok();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match commands::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => {
                if let Err(err) = repl.dispatch(command).await {
                    // Session errors were already printed from the event bus.
                    if err.downcast_ref::<StagingError>().is_none() {
                        println!("[error] {err:#}");
                    }
                    debug!(error = %format!("{err:#}"), "command failed");
                }
            }
            Ok(None) => {}
            Err(usage) => println!("{usage}"),
        }
    }

    printer.abort();
    info!("stager exiting");
    Ok(())
}

struct Repl {
    client: Arc<StagingClient>,
    surface: Arc<HttpProbeSurface>,
    samples_dir: PathBuf,
}

impl Repl {
    async fn dispatch(&self, command: Command) -> Result<()> {
        let client = &self.client;
        match command {
            Command::Load { path } => {
                let file = read_input(&path).await?;
                client.accept_file(file).await?;
            }
            Command::Samples => {
                let samples = samples::list_samples(&self.samples_dir).await?;
                if samples.is_empty() {
                    println!("no samples in {}", self.samples_dir.display());
                }
                for (index, path) in samples.iter().enumerate() {
                    let name = path.file_name().unwrap_or_default().to_string_lossy();
                    println!("{:>3}  {name}", index + 1);
                }
            }
            Command::Sample { n } => {
                let path = samples::pick_sample(&self.samples_dir, n).await?;
                let file = read_input(&path).await?;
                client.accept_file(file).await?;
            }
            Command::Unload => client.remove_file().await,
            Command::Describe { text } => client.set_description(&text).await,
            Command::Resolution { px } => client.set_resolution(px).await?,
            Command::Generate => {
                let client = client.clone();
                tokio::spawn(async move {
                    let outcome = client.generate().await;
                    debug!(?outcome, "generation finished");
                });
            }
            Command::Feedback { text } => client.set_feedback(&text).await,
            Command::Refine { feedback } => {
                if let Some(text) = feedback {
                    client.set_feedback(&text).await;
                }
                let client = client.clone();
                tokio::spawn(async move {
                    let outcome = client.refine().await;
                    debug!(?outcome, "refinement finished");
                });
            }
            Command::History => {
                let snapshot = client.snapshot().await;
                if snapshot.history.is_empty() {
                    println!("no results yet");
                }
                for record in &snapshot.history {
                    let marker = if snapshot.current.as_ref().map(|c| c.id) == Some(record.id) {
                        '*'
                    } else {
                        ' '
                    };
                    println!(
                        "{marker} #{:<3} iter {:<2} {}  {}  {}",
                        record.id,
                        record.iteration,
                        record.created_at.format("%Y-%m-%d %H:%M"),
                        record.description,
                        record.staged.path()
                    );
                }
            }
            Command::Select { id } => {
                client.select(id).await?;
            }
            Command::Reset => client.reset().await,
            Command::Theme { theme: None } => println!("theme: {}", client.theme().await.as_str()),
            Command::Theme { theme: Some(theme) } => client.set_theme(theme).await?,
            Command::Export { dir } => {
                client.export_current(&dir).await?;
            }
            Command::View => match client.full_size_url().await {
                Some(url) => {
                    if let Some(original) = self.surface.showing(ImageSlot::Original) {
                        println!("original: {original}");
                    }
                    println!("staged:   {url}");
                }
                None => println!("nothing shown yet"),
            },
            Command::Details => match client.snapshot().await.current {
                Some(record) => print_details(&record),
                None => println!("no current result"),
            },
            Command::Status => {
                let snapshot = client.snapshot().await;
                let healthy = client.check_backend().await;
                println!(
                    "backend {} ({}) | input {} | ready {} | busy {} | iteration {} | {}px",
                    client.backend_url(),
                    if healthy { "online" } else { "offline" },
                    snapshot.input_name.as_deref().unwrap_or("-"),
                    snapshot.ready,
                    snapshot.busy,
                    snapshot.iteration,
                    snapshot.resolution.px()
                );
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
        Ok(())
    }
}

async fn read_input(path: &Path) -> Result<InputFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let media_type = mime_guess::from_path(path).first_or_octet_stream();
    Ok(InputFile::new(name, media_type.essence_str(), bytes))
}

fn print_details(record: &ResultRecord) {
    println!("#{} iteration {}: {}", record.id, record.iteration, record.description);
    if !record.reasoning.is_empty() {
        println!("reasoning: {}", record.reasoning);
    }
    if !record.prompt.is_empty() {
        println!("prompt: {}", record.prompt);
    }
}

async fn print_events(rx: tokio::sync::broadcast::Receiver<ClientEvent>) {
    let mut stream = BroadcastStream::new(rx);
    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "event printer fell behind");
                continue;
            }
        };
        match event {
            ClientEvent::PreviewReady {
                file_name,
                size_bytes,
            } => println!("picked {file_name} ({} KiB)", size_bytes / 1024),
            ClientEvent::InputCleared => println!("input cleared"),
            ClientEvent::ReadinessChanged(ready) => {
                println!("{}", if ready { "ready to generate" } else { "not ready" })
            }
            ClientEvent::StepProgress { step, total, label } => {
                println!("[{step}/{total}] {label}...")
            }
            ClientEvent::Rendered {
                record_id,
                staged_url,
            } => println!("showing #{record_id}: {staged_url}"),
            ClientEvent::ResultReady(record) => print_details(&record),
            ClientEvent::FeedbackCleared => println!("feedback cleared"),
            ClientEvent::ThemeChanged(theme) => println!("theme: {}", theme.as_str()),
            ClientEvent::Notice { severity, message } => {
                let tag = match severity {
                    Severity::Info => "info",
                    Severity::Success => "ok",
                    Severity::Warning => "warn",
                    Severity::Error => "error",
                };
                println!("[{tag}] {message}");
            }
            ClientEvent::Announcement(text) => debug!(%text, "announcement"),
            ClientEvent::BusyChanged(_) | ClientEvent::HistoryChanged { .. } => {}
        }
    }
}
