//! Multiple Endpoint Transport
//!
//! Composes several single-endpoint handlers behind one endpoint strategy
//! and presents them as a single TransportHandler.
//!
//! - `All`: concurrent fan-out, fails only if every endpoint failed
//! - `One`: exactly one endpoint per call, round-robin across calls
//! - `Fallback`: declaration order, stops at the first success

use crate::adapters::outbound::HttpTransportHandler;
use crate::domain::entities::{Package, ReplicationRequest};
use crate::domain::errors::{AuthenticationError, TransportError};
use crate::domain::ports::{AuthenticationProviderFactory, PackageBuilder, TransportHandler};
use crate::domain::services::{attempt_order, DispatchOutcome, DispatchReport, RoundRobinSelector};
use crate::domain::value_objects::{Endpoint, EndpointStrategy, DEFAULT_POLL_ITEMS};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Settings for building an HTTP multi-endpoint handler.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Endpoint URIs; empty entries are skipped
    pub endpoints: Vec<String>,
    pub strategy: EndpointStrategy,
    /// Pull batch size per endpoint
    pub poll_items: usize,
    /// Flat credential properties for the authentication factory
    pub authentication_properties: HashMap<String, String>,
    /// Timeout of a single endpoint attempt
    pub timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            strategy: EndpointStrategy::All,
            poll_items: DEFAULT_POLL_ITEMS,
            authentication_properties: HashMap::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl TransportSettings {
    pub fn new<I, S>(endpoints: I, strategy: EndpointStrategy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            strategy,
            ..Default::default()
        }
    }

    pub fn poll_items(mut self, poll_items: usize) -> Self {
        self.poll_items = poll_items;
        self
    }

    pub fn authentication_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.authentication_properties.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Failure while assembling transport handlers from settings.
#[derive(Debug, thiserror::Error)]
pub enum TransportSetupError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error("{0}")]
    InvalidEndpoint(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Transport handler fanning out over several endpoints.
pub struct MultipleEndpointTransportHandler {
    handlers: Vec<Arc<dyn TransportHandler>>,
    strategy: EndpointStrategy,
    selector: RoundRobinSelector,
    attempt_timeout: Duration,
    name: String,
}

impl MultipleEndpointTransportHandler {
    /// Compose existing handlers. Fails when `handlers` is empty.
    pub fn new(
        handlers: Vec<Arc<dyn TransportHandler>>,
        strategy: EndpointStrategy,
    ) -> Result<Self, TransportError> {
        if handlers.is_empty() {
            return Err(TransportError::NoEndpoints);
        }
        let name = format!(
            "{}[{}]",
            strategy,
            handlers
                .iter()
                .map(|h| h.name())
                .collect::<Vec<_>>()
                .join(",")
        );
        Ok(Self {
            handlers,
            strategy,
            selector: RoundRobinSelector::new(),
            attempt_timeout: Duration::from_secs(30),
            name,
        })
    }

    /// Build one HTTP handler per configured endpoint, sharing a single
    /// authentication provider.
    pub fn http(
        builder: Arc<dyn PackageBuilder>,
        authentication_factory: &dyn AuthenticationProviderFactory,
        settings: &TransportSettings,
    ) -> Result<Self, TransportSetupError> {
        let authentication =
            authentication_factory.create_authentication_provider(&settings.authentication_properties)?;

        let mut handlers: Vec<Arc<dyn TransportHandler>> = Vec::new();
        for uri in settings.endpoints.iter().filter(|e| !e.trim().is_empty()) {
            let endpoint = Endpoint::parse(uri)
                .map_err(TransportSetupError::InvalidEndpoint)?
                .with_poll_items(settings.poll_items);
            handlers.push(Arc::new(HttpTransportHandler::new(
                endpoint,
                authentication.clone(),
                builder.clone(),
                settings.timeout,
            )?));
        }

        tracing::info!(
            "transport configured strategy={} endpoints={}",
            settings.strategy,
            handlers.len()
        );
        Ok(Self::new(handlers, settings.strategy)?.attempt_timeout(settings.timeout))
    }

    /// Bound the duration of each endpoint attempt.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn strategy(&self) -> EndpointStrategy {
        self.strategy
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run one attempt against one handler, bounded by the attempt timeout.
    async fn attempt(&self, handler: &dyn TransportHandler, operation: Operation<'_>) -> Result<Vec<Package>, TransportError> {
        let call = async {
            match operation {
                Operation::Deliver(package) => handler.deliver_package(package).await.map(|_| Vec::new()),
                Operation::Retrieve(request) => handler.retrieve_packages(request).await,
            }
        };
        match tokio::time::timeout(self.attempt_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                endpoint: handler.name().to_string(),
                after: self.attempt_timeout,
            }),
        }
    }

    /// Apply the strategy to an operation and collect every attempt.
    async fn dispatch(&self, operation: Operation<'_>) -> DispatchReport<Vec<Package>> {
        let order = attempt_order(self.strategy, self.handlers.len(), &self.selector);
        let mut report = DispatchReport::new();

        match self.strategy {
            EndpointStrategy::All => {
                let attempts = order
                    .iter()
                    .map(|&i| self.attempt(self.handlers[i].as_ref(), operation));
                let results = join_all(attempts).await;
                for (&i, result) in order.iter().zip(results) {
                    Self::log_attempt(operation, self.handlers[i].name(), &result);
                    report.record(self.handlers[i].name(), result);
                }
            }
            EndpointStrategy::One | EndpointStrategy::Fallback => {
                for i in order {
                    let handler = self.handlers[i].as_ref();
                    let result = self.attempt(handler, operation).await;
                    Self::log_attempt(operation, handler.name(), &result);
                    let done = result.is_ok();
                    report.record(handler.name(), result);
                    if done {
                        break;
                    }
                }
            }
        }

        if let DispatchOutcome::PartialSuccess { failed } = report.outcome() {
            tracing::warn!(
                "{} partially succeeded via {}: failed endpoints {:?}",
                operation.name(),
                self.strategy,
                failed
            );
        }
        report
    }

    fn log_attempt<T>(operation: Operation<'_>, endpoint: &str, result: &Result<T, TransportError>) {
        match result {
            Ok(_) => tracing::debug!("{} via {} succeeded", operation.name(), endpoint),
            Err(e) => tracing::warn!("{} via {} failed: {}", operation.name(), endpoint, e),
        }
    }

    /// Deliver a package and return the per-endpoint report.
    pub async fn dispatch_delivery(&self, package: &Package) -> DispatchReport<()> {
        self.dispatch(Operation::Deliver(package)).await.map(|_| ())
    }

    /// Retrieve packages and return the per-endpoint report.
    pub async fn dispatch_retrieval(&self, request: &ReplicationRequest) -> DispatchReport<Vec<Package>> {
        self.dispatch(Operation::Retrieve(request)).await
    }
}

/// What a dispatch asks of each endpoint.
#[derive(Debug, Clone, Copy)]
enum Operation<'r> {
    Deliver(&'r Package),
    Retrieve(&'r ReplicationRequest),
}

impl Operation<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::Deliver(_) => "deliver",
            Self::Retrieve(_) => "retrieve",
        }
    }
}

#[async_trait]
impl TransportHandler for MultipleEndpointTransportHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver_package(&self, package: &Package) -> Result<(), TransportError> {
        self.dispatch_delivery(package).await.into_result().map(|_| ())
    }

    async fn retrieve_packages(&self, request: &ReplicationRequest) -> Result<Vec<Package>, TransportError> {
        let batches = self.dispatch_retrieval(request).await.into_result()?;
        Ok(batches.into_iter().flatten().collect())
    }
}
