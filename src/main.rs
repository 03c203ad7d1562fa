//! replication-agent - content replication with queued multi-endpoint delivery
//!
//! This is the composition root that wires together all the components.

use replication_agent::adapters::inbound::{ApiServer, ApiState};
use replication_agent::adapters::outbound::{
    InMemoryPackageBuilder, InMemoryQueueProvider, MultipleEndpointTransportHandler,
    UserCredentialsAuthenticationProviderFactory,
};
use replication_agent::domain::ports::QueueProvider;
use replication_agent::infrastructure::{shutdown_signal, ShutdownController};
use replication_agent::{load_config, LocalPackageExporter, PackageImporter, ReplicationAgent};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

/// Longest wait for in-flight deliveries on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting replication agent {} strategy={} endpoints={} api={}",
        cfg.agent_name,
        cfg.endpoint_strategy,
        cfg.endpoints.len(),
        cfg.api_listen_addr
    );

    // ===== COMPOSITION ROOT =====

    let shutdown = ShutdownController::new();

    // 1. Outbound adapters
    let builder = Arc::new(InMemoryPackageBuilder::new());
    let queues = Arc::new(InMemoryQueueProvider::new(cfg.queue_processing()));

    // 2. Inbound state; always able to receive packages
    let importer = PackageImporter::new(builder.clone(), cfg.import_retention);
    let state = ApiState::with_importer(Arc::new(importer));

    // 3. Delivering agent, only when endpoints are configured
    let agent = if cfg.endpoints.is_empty() {
        tracing::warn!("no endpoints configured, running receive-only");
        None
    } else {
        let transport = MultipleEndpointTransportHandler::http(
            builder.clone(),
            &UserCredentialsAuthenticationProviderFactory::new(),
            &cfg.transport_settings()?,
        )?;
        let agent = Arc::new(
            ReplicationAgent::new(
                cfg.agent_name.clone(),
                Arc::new(LocalPackageExporter::new(builder.clone())),
                queues.clone(),
                Arc::new(transport),
                builder.clone(),
            )
            .with_shutdown(shutdown.clone()),
        );
        agent.enable_processing()?;
        state.register_agent(agent.clone());
        Some(agent)
    };

    // 4. Run the API until a signal arrives
    tokio::spawn(shutdown_signal(shutdown.clone()));
    let server = ApiServer::new(cfg.api_listen_addr.clone(), state);
    let served = server.run(shutdown.clone()).await;

    // 5. Stop processing and let in-flight deliveries finish
    shutdown.shutdown();
    if let Some(agent) = &agent {
        agent.disable_processing();
    }
    if !shutdown.wait_for_drain(DRAIN_TIMEOUT).await {
        tracing::warn!("exiting with deliveries still in flight");
    }
    queues.shutdown().await;

    let pending: usize = queues.get_all_queues().iter().map(|q| q.len()).sum();
    if pending > 0 {
        tracing::warn!("{} packages left undelivered", pending);
    }

    served
}
