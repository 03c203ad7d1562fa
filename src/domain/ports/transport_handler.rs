//! Transport Handler Port
//!
//! Defines the contract shared by single-endpoint handlers and the
//! multi-endpoint composer.

use crate::domain::entities::{Package, ReplicationRequest};
use crate::domain::errors::TransportError;
use async_trait::async_trait;

/// Moves packages to or from remote endpoints.
///
/// A single attempt per call: implementations never retry internally.
/// Retry belongs to the queue processing loop or the endpoint strategy.
#[async_trait]
pub trait TransportHandler: Send + Sync {
    /// Human readable target, used in logs and error messages.
    fn name(&self) -> &str;

    /// Push a package. Either the remote accepts the complete artifact or
    /// the call fails.
    async fn deliver_package(&self, package: &Package) -> Result<(), TransportError>;

    /// Pull pending packages matching the request. An empty vector means
    /// nothing was pending.
    async fn retrieve_packages(&self, request: &ReplicationRequest) -> Result<Vec<Package>, TransportError>;
}
