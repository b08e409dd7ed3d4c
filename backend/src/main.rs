//! YAPI MCP bridge server.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use yapi_mcp::{
    config::{self, Config},
    create_app,
    mcp::SessionRegistry,
    state::AppState,
};

/// yapi-mcp - YAPI interface documentation over MCP (HTTP + SSE)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on [env: PORT] [default: 3001]
    #[arg(long)]
    port: Option<u16>,

    /// Additional TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Interval between SSE keep-alive comments, in milliseconds [default: 25000]
    #[arg(long)]
    keep_alive_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let dotenv = config::load_dotenv().context("Failed to load .env")?;
    let config = Config::from_figment(args.config, args.port, args.keep_alive_ms)
        .context("Missing or invalid configuration. Set YAPI_BASE_URL, YAPI_TOKEN and YAPI_PROJECT_ID")?;

    // Keep the guard alive so the file writer flushes on exit.
    let _log_guard = init_logging(&config)?;

    info!("Starting yapi-mcp server...");
    if let Some(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }
    info!(
        "YAPI: {} (project {})",
        config.yapi.base_url, config.yapi.project_id
    );
    info!("Keep-alive interval: {:?}", config.keep_alive);

    let state = AppState::from_config(&config);
    let app = create_app(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server is running on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.sessions().clone()))
        .await?;

    info!("Server shut down");
    Ok(())
}

/// Wait for Ctrl+C, then close every session so their streams end.
async fn shutdown_signal(sessions: SessionRegistry) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        return;
    }
    info!("Received Ctrl+C, shutting down gracefully...");
    let closed = sessions.close_all();
    info!("Closed {} MCP session(s)", closed);
}

/// Initialize logging - RUST_LOG, else the configured level, else info.
fn init_logging(config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.as_deref().unwrap_or("info")))
        .context("Invalid log level")?;

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .init();

    Ok(guard)
}
