mod cli;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use url::Url;

use cli::{Cli, Commands};
use pagepack::agent::{HttpFetcher, PageDocument, PageLauncher, ResourceFetcher};
use pagepack::capture::{CoordinatorEvent, TargetContextId};
use pagepack::coordinator::{Coordinator, CoordinatorService, DirectorySink};
use pagepack::snapshot::{write_snapshot, DomSnapshot, SnapshotFormat};
use pagepack::surface::SurfaceView;
use pagepack::util::{self, Clock, SystemClock};
use pagepack::Config;

const CLI_TARGET: &str = "cli";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::paths::init_data_dir(cli.data_dir.clone());

    // Initialize logging to file (~/.pagepack/logs/pagepack.log)
    fs::create_dir_all(util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(log_file)
        .with_ansi(false) // Disable ANSI colors in log file
        .init();

    let config = Config::load();

    match cli.command {
        Commands::Capture {
            url,
            title,
            html_file,
            out,
            timeout,
            concurrency,
            overwrite,
        } => {
            let mut config = config;
            if let Some(secs) = timeout {
                config = config.with_timeout_secs(secs);
            }
            if let Some(n) = concurrency {
                config = config.with_concurrency(n);
            }
            if let Some(dir) = out {
                config = config.with_output_dir(dir);
            }
            if overwrite {
                config = config.with_overwrite(true);
            }
            capture(config, &url, title, html_file.as_deref()).await
        }
        Commands::Snapshot {
            url,
            html_file,
            format,
            out,
        } => snapshot(config, &url, html_file.as_deref(), format, out).await,
    }
}

fn fetcher(config: &Config) -> Result<Arc<HttpFetcher>> {
    let fetcher = HttpFetcher::new(config.fetch_timeout(), &config.fetch.user_agent)
        .context("failed to build HTTP client")?;
    Ok(Arc::new(fetcher))
}

/// Read the page from `html_file` when given, otherwise fetch it.
async fn load_document(
    fetcher: &dyn ResourceFetcher,
    url: &str,
    html_file: Option<&Path>,
) -> Result<PageDocument> {
    let url = Url::parse(url).with_context(|| format!("invalid URL: {}", url))?;
    match html_file {
        Some(path) => {
            let html = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(PageDocument::new(html, url))
        }
        None => {
            let (final_url, html) = fetcher.fetch_document(&url).await?;
            Ok(PageDocument::new(html, final_url))
        }
    }
}

async fn capture(
    config: Config,
    url: &str,
    title: Option<String>,
    html_file: Option<&Path>,
) -> Result<()> {
    let fetcher = fetcher(&config)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let document = load_document(fetcher.as_ref(), url, html_file).await?;
    let title = title
        .or_else(|| document.title())
        .or_else(|| document.url().host_str().map(str::to_string))
        .unwrap_or_default();
    let source_url = document.url().to_string();

    let target = TargetContextId::new(CLI_TARGET);
    let launcher = PageLauncher::new(fetcher, clock.clone(), config.agent_options())
        .with_document(target.clone(), document);
    let sink = DirectorySink::new(config.download.output_dir.clone())
        .with_overwrite(config.download.overwrite);

    let (coordinator, mut events) = Coordinator::new(Arc::new(launcher), Arc::new(sink), clock);
    let handle = CoordinatorService::new(coordinator).spawn();
    let mut view = SurfaceView::new();

    if let Some(command) = view.start(target, source_url, title) {
        handle.send(command).await;
    }

    let outcome: Result<PathBuf> = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break Err(anyhow::anyhow!("capture service stopped unexpectedly"));
                };
                view.apply(&event);
                eprintln!("{}", view.render());
                match event {
                    CoordinatorEvent::Complete(_) => {
                        if let Some(command) = view.download() {
                            handle.send(command).await;
                        }
                    }
                    CoordinatorEvent::Saved { path, .. } => break Ok(path),
                    CoordinatorEvent::Error { message } => break Err(anyhow::anyhow!(message)),
                    CoordinatorEvent::Progress { .. } => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if let Some(command) = view.cancel() {
                    handle.send(command).await;
                }
                eprintln!("{}", view.render());
                break Err(anyhow::anyhow!("capture canceled"));
            }
        }
    };

    if let Err(e) = handle.shutdown().await {
        tracing::error!(error = %e, "Capture service task failed");
    }

    let path = outcome?;
    println!("{}", path.display());
    Ok(())
}

async fn snapshot(
    config: Config,
    url: &str,
    html_file: Option<&Path>,
    format: SnapshotFormat,
    out: Option<PathBuf>,
) -> Result<()> {
    let fetcher = fetcher(&config)?;
    let document = load_document(fetcher.as_ref(), url, html_file).await?;
    let snapshot = DomSnapshot::capture(&document, &SystemClock);

    let path = out.unwrap_or_else(|| {
        config
            .download
            .output_dir
            .join(snapshot.default_filename(format))
    });
    if path.is_dir() {
        bail!("output path is a directory: {}", path.display());
    }

    let written = write_snapshot(&snapshot, format, &path)?;
    println!("{}", written.display());
    Ok(())
}
