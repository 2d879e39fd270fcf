use anyhow::{Context, Result};
use callpilot::{
    create_router, AppState, ClientDirectory, Config, FileNotesStore, MemoryNotesStore,
    NatsClient, NotesStore, SessionDeps, SystemClock,
};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Live call copilot: transcription fan-out and reactive engines per session
#[derive(Debug, Parser)]
#[command(name = "callpilot", version)]
struct Args {
    /// Config file path, without the .toml extension
    #[arg(long, default_value = "config/callpilot")]
    config: String,

    /// Override service.http.bind
    #[arg(long)]
    bind: Option<String>,

    /// Override service.http.port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let nats = Arc::new(NatsClient::connect(&cfg.nats.url).await?);
    let clients = Arc::new(ClientDirectory::load(&cfg.data.clients_path)?);

    let notes: Arc<dyn NotesStore> = if cfg.data.notes_path.is_empty() {
        info!("Notes kept in memory");
        Arc::new(MemoryNotesStore::new())
    } else {
        info!("Notes stored under {}", cfg.data.notes_path);
        Arc::new(
            FileNotesStore::open(&cfg.data.notes_path)
                .await
                .context("Failed to open notes store")?,
        )
    };

    let state = AppState::new(SessionDeps {
        stt: nats.clone(),
        generator: nats,
        clients,
        notes,
        clock: Arc::new(SystemClock),
        settings: cfg.session.clone(),
    });
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);
    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}
