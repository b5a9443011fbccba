//! Lodestar coordination daemon.
//!
//! Wires the crypto engine, session registry, instruction queue and channel
//! protocol together, exposes the beacon and operator HTTP surfaces, and
//! runs the stale-session reaper. The exchange key pair lives and dies with
//! this process: a restart discards every symmetric session and beacons
//! re-handshake on their next check-in.

use clap::Parser;
use lodestar_channel::ChannelService;
use lodestar_crypto::SessionCrypto;
use lodestar_registry::BeaconRegistry;
use lodestar_storage::{AgentStore, InMemoryStorage, PostgresStorage, TaskStore};
use lodestar_tasking::TaskQueue;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod scheduler;

use api::rest::router::create_router;
use api::rest::state::AppState;
use config::DaemonConfig;
use scheduler::Reaper;

/// Lodestar daemon application.
#[derive(Parser)]
#[command(name = "lodestard")]
#[command(about = "Lodestar - beacon fleet coordination daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "LODESTAR_CONFIG")]
    config: Option<String>,

    /// Listen address override
    #[arg(short, long, env = "LODESTAR_BIND")]
    bind: Option<String>,

    /// PostgreSQL connection string override
    #[arg(long, env = "LODESTAR_DATABASE_URL")]
    database_url: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = DaemonConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(url) = cli.database_url {
        config.database_url = Some(url);
    }

    let (agent_store, task_store): (Arc<dyn AgentStore>, Arc<dyn TaskStore>) =
        match &config.database_url {
            Some(url) => {
                let storage = Arc::new(PostgresStorage::connect(url).await?);
                tracing::info!("connected to postgres");
                (storage.clone(), storage)
            }
            None => {
                tracing::warn!(
                    "no database configured; beacon and task state will not survive a restart"
                );
                let storage = Arc::new(InMemoryStorage::new());
                (storage.clone(), storage)
            }
        };

    // One key pair for the whole process lifetime, never persisted.
    let crypto = Arc::new(SessionCrypto::generate());
    let registry = Arc::new(BeaconRegistry::new(agent_store.clone()));
    let queue = Arc::new(TaskQueue::new(task_store, agent_store));
    let channel = Arc::new(ChannelService::new(
        crypto.clone(),
        registry.clone(),
        queue.clone(),
        config.idle_interval_secs,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reaper = Reaper::new(
        registry.clone(),
        config.reap_interval_secs,
        config.stale_threshold_secs,
    );
    let reaper_handle = tokio::spawn(reaper.run(shutdown_rx.clone()));

    let state = AppState {
        channel,
        crypto,
        registry,
        queue,
        config: Arc::new(config.clone()),
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "lodestard listening");

    let mut signal_rx = shutdown_rx.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, shutting down");
            }
            _ = signal_rx.changed() => {}
        }
    })
    .await?;

    let _ = shutdown_tx.send(true);
    let _ = reaper_handle.await;
    tracing::info!("lodestard stopped");
    Ok(())
}
