//! Replication Agent - Main application use case
//!
//! Ties an exporter, a queue provider and a delivery transport together:
//! requests are exported into packages and queued on the agent's default
//! queue, and the agent's queue processor delivers queued packages.

use crate::domain::entities::{Package, QueueItem, ReplicationRequest};
use crate::domain::errors::{PackageBuildingError, QueueError};
use crate::domain::ports::{PackageBuilder, PackageExporter, QueueProcessor, QueueProvider, TransportHandler};
use crate::domain::queue::QueueStatus;
use crate::infrastructure::ShutdownController;
use async_trait::async_trait;
use std::sync::Arc;

/// Failure of an agent-level operation.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid replication request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Export(#[from] PackageBuildingError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// A named replication agent.
pub struct ReplicationAgent {
    name: String,
    exporter: Arc<dyn PackageExporter>,
    queues: Arc<dyn QueueProvider>,
    transport: Arc<dyn TransportHandler>,
    builder: Arc<dyn PackageBuilder>,
    shutdown: Option<ShutdownController>,
}

impl ReplicationAgent {
    /// Create an agent.
    ///
    /// # Arguments
    /// * `exporter` - turns requests into packages
    /// * `queues` - owner of the agent's queues
    /// * `transport` - target of queued deliveries
    /// * `builder` - registry that delivered packages are released from
    pub fn new(
        name: impl Into<String>,
        exporter: Arc<dyn PackageExporter>,
        queues: Arc<dyn QueueProvider>,
        transport: Arc<dyn TransportHandler>,
        builder: Arc<dyn PackageBuilder>,
    ) -> Self {
        Self {
            name: name.into(),
            exporter,
            queues,
            transport,
            builder,
            shutdown: None,
        }
    }

    /// Track deliveries with a shutdown controller so they can be drained.
    pub fn with_shutdown(mut self, controller: ShutdownController) -> Self {
        self.shutdown = Some(controller);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Export a request and queue the resulting packages on the default queue.
    ///
    /// Returns the queued items in queue order.
    pub async fn execute(&self, request: &ReplicationRequest) -> Result<Vec<QueueItem>, AgentError> {
        request.validate().map_err(AgentError::InvalidRequest)?;

        let queue = self.queues.get_default_queue(&self.name)?;
        let packages = self.exporter.export_package(request).await?;

        let items: Vec<QueueItem> = packages.into_iter().map(|p| queue.add(p)).collect();
        tracing::info!(
            "agent {} queued {} packages for {} {:?}",
            self.name,
            items.len(),
            request.action,
            request.paths
        );
        Ok(items)
    }

    /// Look up a package exported by this agent.
    pub async fn package(&self, id: &str) -> Option<Package> {
        self.exporter.export_package_by_id(id).await
    }

    /// Start delivering queued packages in the background.
    pub fn enable_processing(&self) -> Result<(), AgentError> {
        let processor = DeliveryProcessor {
            agent: self.name.clone(),
            transport: self.transport.clone(),
            builder: self.builder.clone(),
            shutdown: self.shutdown.clone(),
        };
        self.queues
            .enable_queue_processing(&self.name, Arc::new(processor))?;
        tracing::info!(
            "agent {} delivering via {}",
            self.name,
            self.transport.name()
        );
        Ok(())
    }

    pub fn disable_processing(&self) {
        self.queues.disable_queue_processing(&self.name);
    }

    /// Status of every queue of this agent.
    pub fn queue_status(&self) -> Vec<QueueStatus> {
        self.queues
            .get_all_queues()
            .iter()
            .filter(|q| q.agent() == self.name)
            .map(|q| q.status())
            .collect()
    }
}

/// Queue processor delivering each head through the agent's transport.
struct DeliveryProcessor {
    agent: String,
    transport: Arc<dyn TransportHandler>,
    builder: Arc<dyn PackageBuilder>,
    shutdown: Option<ShutdownController>,
}

#[async_trait]
impl QueueProcessor for DeliveryProcessor {
    async fn process(&self, queue_name: &str, item: &QueueItem) -> bool {
        let _guard = self.shutdown.as_ref().map(|s| s.delivery_guard());

        match self.transport.deliver_package(item.package()).await {
            Ok(()) => {
                self.builder.release_package(item.id()).await;
                tracing::info!(
                    "agent {} delivered {} from queue {}",
                    self.agent,
                    item.id(),
                    queue_name
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    "agent {} failed to deliver {} from queue {}: {}",
                    self.agent,
                    item.id(),
                    queue_name,
                    e
                );
                false
            }
        }
    }
}
