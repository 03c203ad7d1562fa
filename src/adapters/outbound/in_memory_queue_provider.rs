//! In-Memory Queue Provider
//!
//! Implements QueueProvider with a DashMap of queues and one tokio worker
//! per agent. Workers are stopped through a watch channel and are never
//! aborted, so an in-flight delivery always finishes: the item is either
//! removed on success or stays at the head.

use crate::domain::errors::QueueError;
use crate::domain::ports::{QueueProcessor, QueueProvider};
use crate::domain::queue::{ReplicationQueue, DEFAULT_QUEUE_NAME};
use crate::domain::services::RetryBackoff;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Longest accepted agent or queue name.
pub const MAX_NAME_LEN: usize = 255;

const RESERVED_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Check an agent or queue name.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || RESERVED_CHARS.contains(&c))
}

/// Queue processing configuration.
#[derive(Debug, Clone)]
pub struct QueueProcessingConfig {
    /// Interval between two passes over an agent's queues
    pub poll_interval: Duration,
    /// Backoff applied to a head that keeps failing
    pub backoff: RetryBackoff,
}

impl Default for QueueProcessingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            backoff: RetryBackoff::default(),
        }
    }
}

impl QueueProcessingConfig {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn backoff(mut self, backoff: RetryBackoff) -> Self {
        self.backoff = backoff;
        self
    }
}

type QueueKey = (String, String);
type QueueMap = DashMap<QueueKey, Arc<ReplicationQueue>>;

/// Running processing loop of one agent.
struct AgentWorker {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl AgentWorker {
    /// Ask the loop to stop after its current attempt.
    fn stop(self) -> JoinHandle<()> {
        let _ = self.stop_tx.send(true);
        self.handle
    }
}

#[derive(Default)]
struct Workers {
    active: HashMap<String, AgentWorker>,
    /// Loops that were asked to stop but may still finish an attempt
    retiring: HashMap<String, JoinHandle<()>>,
}

/// DashMap-backed queue provider.
pub struct InMemoryQueueProvider {
    id: Uuid,
    queues: Arc<QueueMap>,
    workers: Mutex<Workers>,
    config: QueueProcessingConfig,
}

impl InMemoryQueueProvider {
    /// Create a new provider.
    pub fn new(config: QueueProcessingConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            queues: Arc::new(DashMap::new()),
            workers: Mutex::new(Workers::default()),
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether background processing is enabled for an agent.
    pub fn is_processing(&self, agent: &str) -> bool {
        self.workers.lock().active.contains_key(agent)
    }

    /// Agents with processing enabled.
    pub fn processing_agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.workers.lock().active.keys().cloned().collect();
        agents.sort();
        agents
    }

    /// Queues of one agent, sorted by name.
    pub fn agent_queues(&self, agent: &str) -> Vec<Arc<ReplicationQueue>> {
        Self::snapshot(&self.queues, agent)
    }

    /// Stop every processing loop and wait for in-flight attempts.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock();
            let mut handles: Vec<JoinHandle<()>> =
                workers.active.drain().map(|(_, w)| w.stop()).collect();
            handles.extend(workers.retiring.drain().map(|(_, h)| h));
            handles
        };
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("queue provider {} shut down", self.id);
    }

    fn snapshot(queues: &QueueMap, agent: &str) -> Vec<Arc<ReplicationQueue>> {
        let mut found: Vec<Arc<ReplicationQueue>> = queues
            .iter()
            .filter(|e| e.key().0 == agent)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.name().cmp(b.name()));
        found
    }

    fn check_agent(agent: &str) -> Result<(), QueueError> {
        if is_valid_name(agent) {
            Ok(())
        } else {
            Err(QueueError::InvalidAgentName(agent.to_string()))
        }
    }

    /// Processing loop of one agent.
    async fn run_worker(
        agent: String,
        queues: Arc<QueueMap>,
        processor: Arc<dyn QueueProcessor>,
        config: QueueProcessingConfig,
        mut stop_rx: watch::Receiver<bool>,
        previous: Option<JoinHandle<()>>,
    ) {
        // Never overlap with the loop being replaced.
        if let Some(previous) = previous {
            let _ = previous.await;
        }
        tracing::info!("queue processing started for agent {}", agent);

        let mut ticker = tokio::time::interval(config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if is_stopped(&stop_rx) {
                break;
            }

            let agent_queues = Self::snapshot(&queues, &agent);
            let drains = agent_queues
                .iter()
                .map(|queue| drain_queue(queue, processor.as_ref(), &config.backoff, &stop_rx));
            join_all(drains).await;
        }

        tracing::info!("queue processing stopped for agent {}", agent);
    }
}

impl Default for InMemoryQueueProvider {
    fn default() -> Self {
        Self::new(QueueProcessingConfig::default())
    }
}

fn is_stopped(stop_rx: &watch::Receiver<bool>) -> bool {
    *stop_rx.borrow()
}

/// Hand heads of one queue to the processor until the queue is empty, an
/// attempt fails, or the loop is stopped.
async fn drain_queue(
    queue: &ReplicationQueue,
    processor: &dyn QueueProcessor,
    backoff: &RetryBackoff,
    stop_rx: &watch::Receiver<bool>,
) {
    while !is_stopped(stop_rx) {
        let Some(item) = queue.peek() else {
            break;
        };
        if let Some(last) = item.last_attempt() {
            if last.elapsed() < backoff.delay_for(item.attempts()) {
                break;
            }
        }

        if processor.process(queue.name(), &item).await {
            queue.remove_head(item.id());
            tracing::debug!(
                "processed {} from {}/{}",
                item.id(),
                queue.agent(),
                queue.name()
            );
        } else {
            let attempts = queue
                .record_head_failure(item.id())
                .unwrap_or_else(|| item.attempts().saturating_add(1));
            tracing::warn!(
                "processing of {} from {}/{} failed (attempt {}), retrying in {:?}",
                item.id(),
                queue.agent(),
                queue.name(),
                attempts,
                backoff.delay_for(attempts)
            );
            break;
        }
    }
}

impl QueueProvider for InMemoryQueueProvider {
    fn get_queue(&self, agent: &str, name: &str) -> Result<Arc<ReplicationQueue>, QueueError> {
        Self::check_agent(agent)?;
        if !is_valid_name(name) {
            return Err(QueueError::InvalidQueueName(name.to_string()));
        }

        let entry = self
            .queues
            .entry((agent.to_string(), name.to_string()))
            .or_insert_with(|| {
                tracing::info!("created queue {}/{}", agent, name);
                Arc::new(ReplicationQueue::new(agent, name, self.id))
            });
        Ok(Arc::clone(entry.value()))
    }

    fn get_default_queue(&self, agent: &str) -> Result<Arc<ReplicationQueue>, QueueError> {
        self.get_queue(agent, DEFAULT_QUEUE_NAME)
    }

    fn get_all_queues(&self) -> Vec<Arc<ReplicationQueue>> {
        let mut all: Vec<Arc<ReplicationQueue>> =
            self.queues.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| (a.agent(), a.name()).cmp(&(b.agent(), b.name())));
        all
    }

    fn remove_queue(&self, queue: &ReplicationQueue) -> Result<(), QueueError> {
        if queue.provider_id() != self.id {
            return Err(QueueError::NotOwned {
                agent: queue.agent().to_string(),
                queue: queue.name().to_string(),
            });
        }

        let key = (queue.agent().to_string(), queue.name().to_string());
        match self
            .queues
            .remove_if(&key, |_, registered| std::ptr::eq(registered.as_ref(), queue))
        {
            Some((_, removed)) => {
                let discarded = removed.clear();
                tracing::info!(
                    "removed queue {}/{} (discarded {} items)",
                    queue.agent(),
                    queue.name(),
                    discarded
                );
                Ok(())
            }
            None => Err(QueueError::UnknownQueue {
                agent: queue.agent().to_string(),
                queue: queue.name().to_string(),
            }),
        }
    }

    fn enable_queue_processing(
        &self,
        agent: &str,
        processor: Arc<dyn QueueProcessor>,
    ) -> Result<(), QueueError> {
        Self::check_agent(agent)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| QueueError::NoRuntime {
            agent: agent.to_string(),
        })?;

        let mut workers = self.workers.lock();
        let previous = match workers.active.remove(agent) {
            Some(worker) => {
                tracing::info!("replacing queue processor for agent {}", agent);
                Some(worker.stop())
            }
            None => workers.retiring.remove(agent),
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(Self::run_worker(
            agent.to_string(),
            self.queues.clone(),
            processor,
            self.config.clone(),
            stop_rx,
            previous,
        ));
        workers
            .active
            .insert(agent.to_string(), AgentWorker { stop_tx, handle });
        Ok(())
    }

    fn disable_queue_processing(&self, agent: &str) {
        let mut workers = self.workers.lock();
        if let Some(worker) = workers.active.remove(agent) {
            tracing::info!("disabling queue processing for agent {}", agent);
            let handle = worker.stop();
            workers.retiring.insert(agent.to_string(), handle);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::entities::{Package, QueueItem, ReplicationActionType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn package(id: &str) -> Package {
        Package::new(id, "json", ReplicationActionType::Add, vec!["/a".to_string()], b"{}".to_vec())
    }

    fn fast_config() -> QueueProcessingConfig {
        QueueProcessingConfig::default()
            .poll_interval(Duration::from_millis(10))
            .backoff(RetryBackoff::new(Duration::from_millis(10), Duration::from_millis(20)))
    }

    /// Records processed ids; can be switched to fail.
    struct RecordingProcessor {
        seen: Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    impl RecordingProcessor {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().clone()
        }
    }

    #[async_trait]
    impl QueueProcessor for RecordingProcessor {
        async fn process(&self, _queue_name: &str, item: &QueueItem) -> bool {
            if self.fail.load(Ordering::SeqCst) {
                return false;
            }
            self.seen.lock().push(item.id().to_string());
            true
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    // ===== Name Validation Tests =====

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("publish"));
        assert!(is_valid_name("agent-1.eu_west"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a/b"));
        assert!(!is_valid_name("a b"));
        assert!(!is_valid_name("a:b"));
        assert!(!is_valid_name("tab\there"));
        assert!(!is_valid_name(&"x".repeat(MAX_NAME_LEN + 1)));
    }

    // ===== Queue Management Tests =====

    #[test]
    fn test_get_queue_creates_once() {
        let provider = InMemoryQueueProvider::default();
        let q1 = provider.get_queue("publish", "main").unwrap();
        let q2 = provider.get_queue("publish", "main").unwrap();
        assert!(Arc::ptr_eq(&q1, &q2));
        assert_eq!(provider.get_all_queues().len(), 1);
        assert_eq!(q1.provider_id(), provider.id());
    }

    #[test]
    fn test_get_queue_invalid_names() {
        let provider = InMemoryQueueProvider::default();
        assert_eq!(
            provider.get_queue("", "main").unwrap_err(),
            QueueError::InvalidAgentName(String::new())
        );
        assert_eq!(
            provider.get_queue("publish", "a/b").unwrap_err(),
            QueueError::InvalidQueueName("a/b".to_string())
        );
        assert!(provider.get_all_queues().is_empty());
    }

    #[test]
    fn test_default_queue_is_idempotent() {
        let provider = InMemoryQueueProvider::default();
        let q1 = provider.get_default_queue("publish").unwrap();
        q1.add(package("p1"));

        let q2 = provider.get_default_queue("publish").unwrap();
        assert_eq!(q2.name(), DEFAULT_QUEUE_NAME);
        assert_eq!(q2.len(), 1);
        assert_eq!(q2.peek().unwrap().id(), "p1");
    }

    #[test]
    fn test_get_all_queues_is_snapshot() {
        let provider = InMemoryQueueProvider::default();
        provider.get_default_queue("b-agent").unwrap();
        provider.get_queue("a-agent", "x").unwrap();
        provider.get_default_queue("a-agent").unwrap();

        let all = provider.get_all_queues();
        let names: Vec<(String, String)> = all
            .iter()
            .map(|q| (q.agent().to_string(), q.name().to_string()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a-agent".to_string(), "default".to_string()),
                ("a-agent".to_string(), "x".to_string()),
                ("b-agent".to_string(), "default".to_string()),
            ]
        );

        provider.get_queue("c-agent", "later").unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_remove_queue() {
        let provider = InMemoryQueueProvider::default();
        let queue = provider.get_default_queue("publish").unwrap();
        queue.add(package("p1"));

        provider.remove_queue(&queue).unwrap();
        assert!(provider.get_all_queues().is_empty());
        assert!(queue.is_empty());

        assert!(matches!(
            provider.remove_queue(&queue),
            Err(QueueError::UnknownQueue { .. })
        ));

        let fresh = provider.get_default_queue("publish").unwrap();
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_remove_foreign_queue_fails() {
        let provider = InMemoryQueueProvider::default();
        let other = InMemoryQueueProvider::default();
        provider.get_default_queue("publish").unwrap();
        let foreign = other.get_default_queue("publish").unwrap();
        foreign.add(package("p1"));

        let err = provider.remove_queue(&foreign).unwrap_err();
        assert!(matches!(err, QueueError::NotOwned { .. }));
        assert_eq!(provider.get_all_queues().len(), 1);
        assert_eq!(foreign.len(), 1);
    }

    // ===== Processing Tests =====

    #[tokio::test]
    async fn test_processing_drains_in_order() {
        let provider = InMemoryQueueProvider::new(fast_config());
        let queue = provider.get_default_queue("publish").unwrap();
        for i in 0..5 {
            queue.add(package(&format!("p{}", i)));
        }

        let processor = RecordingProcessor::new();
        provider
            .enable_queue_processing("publish", processor.clone())
            .unwrap();
        assert!(provider.is_processing("publish"));

        assert!(wait_until(|| queue.is_empty()).await);
        assert_eq!(processor.seen(), vec!["p0", "p1", "p2", "p3", "p4"]);
        provider.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_head_stays_and_counts_attempts() {
        let provider = InMemoryQueueProvider::new(fast_config());
        let queue = provider.get_default_queue("publish").unwrap();
        queue.add(package("p1"));
        queue.add(package("p2"));

        let processor = RecordingProcessor::new();
        processor.fail.store(true, Ordering::SeqCst);
        provider
            .enable_queue_processing("publish", processor.clone())
            .unwrap();

        assert!(wait_until(|| queue.status().head_attempts >= 2).await);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek().unwrap().id(), "p1");

        processor.fail.store(false, Ordering::SeqCst);
        assert!(wait_until(|| queue.is_empty()).await);
        assert_eq!(processor.seen(), vec!["p1", "p2"]);
        provider.shutdown().await;
    }

    #[tokio::test]
    async fn test_disable_is_idempotent() {
        let provider = InMemoryQueueProvider::new(fast_config());
        provider.disable_queue_processing("publish");

        provider
            .enable_queue_processing("publish", RecordingProcessor::new())
            .unwrap();
        provider.disable_queue_processing("publish");
        provider.disable_queue_processing("publish");
        assert!(!provider.is_processing("publish"));
        provider.shutdown().await;
    }

    #[tokio::test]
    async fn test_enable_rejects_invalid_agent() {
        let provider = InMemoryQueueProvider::default();
        let result = provider.enable_queue_processing("bad/agent", RecordingProcessor::new());
        assert!(matches!(result, Err(QueueError::InvalidAgentName(_))));
        assert!(provider.processing_agents().is_empty());
    }

    #[test]
    fn test_enable_outside_runtime() {
        let provider = InMemoryQueueProvider::default();
        let result = provider.enable_queue_processing("publish", RecordingProcessor::new());
        assert_eq!(
            result,
            Err(QueueError::NoRuntime {
                agent: "publish".to_string()
            })
        );
        assert!(!provider.is_processing("publish"));
    }
}
