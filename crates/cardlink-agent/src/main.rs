//! cardlink agent entry point.
//!
//! Loads the terminal registration, starts the reader, the queue client
//! and the orchestrator, and runs until Ctrl-C.

use anyhow::Context;
use cardlink_agent::{
    AgentError, ConfigWatcher, LogObserver, Orchestrator, OrchestratorConfig, Services, TcpProbe,
};
use cardlink_core::ConfigStore;
use cardlink_hardware::{CardReader, InputBackend, ReaderConfig};
use cardlink_queue::{AmqpPublisher, BrokerSettings, QueueClient, QueueClientConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Scan commands buffered between the consumer and the orchestrator.
const COMMAND_BUFFER: usize = 8;

/// Bound on draining in-flight publishes at shutdown.
const ORCHESTRATOR_STOP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "cardlink-agent", version, about = "Card scanner bridge for shop terminals")]
struct Args {
    /// Directory holding config.json and credentials.json [default: ~/.cardlink]
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Log level, used when RUST_LOG is not set
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!(version = cardlink_core::VERSION, "Starting cardlink agent");

    let store = match args.config_dir {
        Some(dir) => ConfigStore::new(dir),
        None => ConfigStore::default_location()?,
    };
    let config = store.load_config();
    let credentials = store
        .load_credentials()
        .ok_or_else(|| AgentError::NotRegistered {
            path: store.credentials_path(),
        })?;
    info!(
        terminal_id = credentials.terminal_id,
        queue = %credentials.queue_name(),
        config_dir = %store.dir().display(),
        "Loaded terminal registration"
    );

    let mut watcher = ConfigWatcher::new(store.clone(), &config);
    watcher.start();

    let backend = InputBackend::detect()?;
    info!(%backend, "Selected input backend");
    let mut reader = CardReader::new(backend, watcher.subscribe(), ReaderConfig::default());
    reader.start();

    let settings = BrokerSettings::from_config(&config, &credentials);
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let mut queue = QueueClient::new(settings.clone(), commands_tx, QueueClientConfig::default());

    let mut orchestrator = Orchestrator::new(
        reader.handle(),
        AmqpPublisher::new(settings),
        TcpProbe::from_url(&config.backend_url)?,
        Arc::new(LogObserver),
        OrchestratorConfig::new(credentials.auth_token.clone())
            .with_scan_timeout(config.scan_timeout()),
    );
    orchestrator.start(commands_rx, queue.subscribe_status());
    queue.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutting down");

    Services {
        watcher,
        reader,
        queue,
        orchestrator,
    }
    .shutdown(ORCHESTRATOR_STOP_TIMEOUT)
    .await;

    info!("cardlink agent stopped");
    Ok(())
}
