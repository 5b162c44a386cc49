use anyhow::{Context, Result};
use clap::Parser;
use loqa_voice::{create_router, AppState, Config, ServiceBackend};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Hands-free voice conversations against the loqa chat backend
#[derive(Debug, Parser)]
#[command(name = "loqa-voice", version)]
struct Cli {
    /// Config file path (extension optional)
    #[arg(short, long, default_value = "config/loqa-voice")]
    config: String,

    /// Override the HTTP port from the config file
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Loqa Voice v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("NATS: {}", cfg.nats.url);
    info!("Chat backend: {} (agent {})", cfg.backend.base_url, cfg.backend.agent_id);

    let policy = cfg.turns.policy();
    info!(
        "Turn policy: quiet delay {:?}, retry budget {}, reply timeout {:?}",
        policy.quiet_delay, policy.retry_budget, policy.reply_timeout
    );

    let port = cli.port.unwrap_or(cfg.service.http.port);
    let addr = format!("{}:{}", cfg.service.http.bind, port);

    let backend = Arc::new(ServiceBackend::new(cfg)?);
    let app = create_router(AppState::new(backend, policy));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
