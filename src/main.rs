use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use repcast::config::{self, Config};
use repcast::http::{self, listen, state::AppState};
use repcast::{cli, media};

/// How long open streams get to finish after Ctrl+C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("path does not exist: {}", .0.display())]
    MissingPath(PathBuf),
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("no media files found in the provided paths")]
    EmptyLibrary,
    #[error("failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &cli::Args) -> Result<(), StartupError> {
    let config = resolve_config(args);
    check_paths(&config.paths)?;

    let server_uuid = server_uuid(&config.name);
    tracing::info!(
        name = %config.name,
        uuid = %server_uuid,
        port = config.port,
        "repcast {}",
        env!("GIT_VERSION")
    );
    for path in &config.paths {
        tracing::info!(path = %path.display(), "Scanning");
    }

    // Nothing is listening yet, so the blocking scan holds up nobody.
    let library = media::scanner::scan(&config.paths);
    if library.items.is_empty() {
        return Err(StartupError::EmptyLibrary);
    }

    let state = AppState::from_config(library, &config);
    tracing::info!(
        items = state.item_count(),
        engines = state.resolver.catalog().all().len(),
        renderers = state.renderers.len(),
        chapter_interval = config.chapter_interval,
        max_transcodes = config.max_transcodes,
        "Library ready"
    );

    let listeners = listen::bind(config.port, config.localhost)
        .await
        .map_err(|source| StartupError::Bind { port: config.port, source })?;
    for listener in &listeners {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Serving on http://{addr}");
        }
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_ctrl_c(shutdown.clone()));
    listen::serve(listeners, http::build_router(state), shutdown, SHUTDOWN_GRACE).await;

    tracing::info!("Goodbye.");
    Ok(())
}

/// Config file first, then command line on top. A broken file is reported
/// and skipped rather than aborting startup.
fn resolve_config(args: &cli::Args) -> Config {
    let file = config::find_config_file(args.config.as_deref()).and_then(|path| {
        match config::load_config(&path) {
            Ok(file) => {
                tracing::debug!(path = %path.display(), "Loaded config file");
                Some(file)
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "Ignoring config file");
                None
            }
        }
    });
    Config::resolve(file, args)
}

fn check_paths(paths: &[PathBuf]) -> Result<(), StartupError> {
    for path in paths {
        if !path.exists() {
            return Err(StartupError::MissingPath(path.clone()));
        }
        if !path.is_dir() {
            return Err(StartupError::NotADirectory(path.clone()));
        }
    }
    Ok(())
}

/// UUIDv5 over hostname and friendly name: stable across restarts, distinct
/// per machine and per configured name.
fn server_uuid(name: &str) -> String {
    let host = hostname::get()
        .ok()
        .and_then(|os| os.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "repcast".to_string());
    let seed = format!("{host}\0{name}");
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_DNS, seed.as_bytes()).to_string()
}

/// The first Ctrl+C starts a graceful shutdown, a second one exits at once.
async fn watch_ctrl_c(shutdown: CancellationToken) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Cannot install Ctrl+C handler");
        return;
    }
    tracing::info!("Shutting down...");
    shutdown.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\nrepcast: forced exit");
        std::process::exit(1);
    }
}
