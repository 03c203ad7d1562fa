//! Replication Agent Library
//!
//! Packages content changes, queues them per destination agent and
//! delivers them to one or more remote endpoints under a configurable
//! endpoint strategy.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{
    AgentError, ImportError, LocalPackageExporter, PackageImporter, RemotePackageExporter,
    ReplicationAgent,
};
pub use config::{load_config, Config, ConfigError};
pub use domain::entities::{Package, QueueItem, ReplicationActionType, ReplicationRequest};
pub use domain::errors::{AuthenticationError, PackageBuildingError, QueueError, TransportError};
pub use domain::ports::{
    AuthenticationProviderFactory, PackageBuilder, PackageExporter, QueueProcessor, QueueProvider,
    TransportAuthenticationProvider, TransportHandler,
};
pub use domain::queue::{QueueStatus, ReplicationQueue};
pub use domain::value_objects::{Credentials, Endpoint, EndpointStrategy};
