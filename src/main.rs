mod app;
mod backend;
mod config;
mod download;
mod error;
mod extract;
mod model;
mod scan;
mod session;
mod shutdown;
mod tg;

use anyhow::{Context, Result};
use app::server::{self, ServerState};
use app::App;
use clap::Parser;
use config::Config;
use download::Downloader;
use extract::Extractor;
use scan::Scanner;
use session::Session;
use shutdown::ShutdownController;
use tg::GrammersBackend;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    let shutdown = ShutdownController::new();
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            log::info!("Received Ctrl+C, initiating graceful shutdown...");
            shutdown_clone.trigger();
        }
    });

    if let Err(e) = run(config, shutdown.clone()).await {
        // Don't report error if we're shutting down gracefully
        if shutdown.is_triggered() {
            std::process::exit(0);
        }
        let msg = format!("{e:#}");
        eprintln!("Error: {msg}");
        std::process::exit(1);
    }
}

async fn run(config: Config, shutdown: ShutdownController) -> Result<()> {
    config.validate()?;
    let session_string = config.session().context("SESSION_STRING is not set")?;

    std::fs::create_dir_all(&config.download_dir).with_context(|| {
        format!(
            "Failed to create download directory {}",
            config.download_dir.display()
        )
    })?;

    let backend = GrammersBackend::new(config.api_id, session_string)
        .context("Failed to load the Telegram session")?;
    let mut session = Session::new(backend, config.channel.clone());

    // Warm up so the first request does not pay for connect and resolve.
    // Failures are retried on demand.
    match session.ensure_connection().await {
        Ok(_) => log::info!("Connected; channel {} resolved", config.channel),
        Err(e) => log::warn!("Initial Telegram connection failed: {}", e),
    }

    let extractor = Extractor::new(config.extract_options())
        .context("Failed to compile extraction patterns")?;
    let scanner = Scanner::new(extractor, config.scan_options());
    let downloader = Downloader::new(config.download_options());
    let download_dir = downloader.dir().to_path_buf();

    let app = App::new(session, scanner, downloader);
    let (worker, worker_task) = app::worker::spawn(app, shutdown.clone());

    let router = server::router(
        ServerState {
            worker,
            channel: config.channel.to_string(),
        },
        download_dir,
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!("Listening on {} (public URL {})", addr, config.public_url());

    let served = server::serve(listener, router, shutdown.clone()).await;

    // Stop the worker whether the server stopped cleanly or not.
    shutdown.trigger();
    if let Err(e) = worker_task.await {
        log::warn!("Worker task ended abnormally: {}", e);
    }

    served.context("HTTP server error")
}
