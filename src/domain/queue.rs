//! Replication Queue
//!
//! Ordered, per-agent holding area for packages awaiting delivery.
//! Items leave the queue only on acknowledged delivery or when the whole
//! queue is removed.

use crate::domain::entities::{Package, QueueItem};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

/// Name of the queue returned by `get_default_queue`.
pub const DEFAULT_QUEUE_NAME: &str = "default";

/// Point-in-time view of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub agent: String,
    pub name: String,
    /// Number of items waiting
    pub pending: usize,
    /// Failed attempts on the current head
    pub head_attempts: u32,
}

/// FIFO queue of packages for one agent.
#[derive(Debug)]
pub struct ReplicationQueue {
    agent: String,
    name: String,
    provider_id: Uuid,
    items: Mutex<VecDeque<QueueItem>>,
}

impl ReplicationQueue {
    pub(crate) fn new(agent: &str, name: &str, provider_id: Uuid) -> Self {
        Self {
            agent: agent.to_string(),
            name: name.to_string(),
            provider_id,
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier of the provider that created this queue.
    pub fn provider_id(&self) -> Uuid {
        self.provider_id
    }

    /// Append a package at the tail.
    pub fn add(&self, package: Package) -> QueueItem {
        let item = QueueItem::new(package);
        self.items.lock().push_back(item.clone());
        tracing::debug!(
            "queued package {} on {}/{}",
            item.id(),
            self.agent,
            self.name
        );
        item
    }

    /// Current head, without removing it.
    pub fn peek(&self) -> Option<QueueItem> {
        self.items.lock().front().cloned()
    }

    /// Snapshot of all items in order.
    pub fn items(&self) -> Vec<QueueItem> {
        self.items.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn status(&self) -> QueueStatus {
        let items = self.items.lock();
        QueueStatus {
            agent: self.agent.clone(),
            name: self.name.clone(),
            pending: items.len(),
            head_attempts: items.front().map(|i| i.attempts()).unwrap_or(0),
        }
    }

    /// Remove the head, but only if it is still the item with this id.
    pub(crate) fn remove_head(&self, id: &str) -> bool {
        let mut items = self.items.lock();
        match items.front() {
            Some(head) if head.id() == id => {
                items.pop_front();
                true
            }
            _ => false,
        }
    }

    /// Count a failed attempt on the head. Returns the new attempt count.
    pub(crate) fn record_head_failure(&self, id: &str) -> Option<u32> {
        let mut items = self.items.lock();
        match items.front_mut() {
            Some(head) if head.id() == id => {
                head.record_attempt();
                Some(head.attempts())
            }
            _ => None,
        }
    }

    /// Drop every item. Returns how many were discarded.
    pub(crate) fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let count = items.len();
        items.clear();
        count
    }
}
