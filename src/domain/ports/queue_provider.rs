//! Queue Provider Port
//!
//! Defines the interface for owning per-agent queues and driving their
//! background processing.

use crate::domain::entities::QueueItem;
use crate::domain::errors::QueueError;
use crate::domain::queue::ReplicationQueue;
use async_trait::async_trait;
use std::sync::Arc;

/// Callback invoked by the processing loop for the head of a queue.
///
/// Returning `true` acknowledges delivery and removes the item. Returning
/// `false` leaves it at the head for a later attempt.
#[async_trait]
pub trait QueueProcessor: Send + Sync {
    async fn process(&self, queue_name: &str, item: &QueueItem) -> bool;
}

/// Owner of the named queues of every agent.
pub trait QueueProvider: Send + Sync {
    /// Return the named queue of an agent, creating it on first use.
    fn get_queue(&self, agent: &str, name: &str) -> Result<Arc<ReplicationQueue>, QueueError>;

    /// Return the canonical queue of an agent, creating it on first use.
    fn get_default_queue(&self, agent: &str) -> Result<Arc<ReplicationQueue>, QueueError>;

    /// Snapshot of every queue across all agents.
    fn get_all_queues(&self) -> Vec<Arc<ReplicationQueue>>;

    /// Delete a queue together with its undelivered items.
    fn remove_queue(&self, queue: &ReplicationQueue) -> Result<(), QueueError>;

    /// Start (or restart with a new processor) background processing for an agent.
    ///
    /// Processing runs on the current tokio runtime. Without one this returns
    /// `QueueError::NoRuntime` and nothing is started.
    fn enable_queue_processing(
        &self,
        agent: &str,
        processor: Arc<dyn QueueProcessor>,
    ) -> Result<(), QueueError>;

    /// Stop background processing for an agent. No-op if already disabled.
    fn disable_queue_processing(&self, agent: &str);
}
