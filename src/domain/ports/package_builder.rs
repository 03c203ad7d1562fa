//! Package Builder Port
//!
//! Defines the interface for turning replication requests into packages.
//! Implementations may export from a content repository, a file system,
//! or keep everything in memory.

use crate::domain::entities::{Package, ReplicationRequest};
use crate::domain::errors::PackageBuildingError;
use async_trait::async_trait;
use bytes::Bytes;

/// Builder and registry of packages.
///
/// This is an outbound port. The exporters call it to create packages
/// locally, and transport handlers call it to materialize packages received
/// from a remote endpoint.
#[async_trait]
pub trait PackageBuilder: Send + Sync {
    /// Build exactly one package for the request.
    async fn create_package(&self, request: &ReplicationRequest) -> Result<Package, PackageBuildingError>;

    /// Look up a package previously built or read by this builder.
    async fn get_package(&self, id: &str) -> Option<Package>;

    /// Decode a package from raw bytes without registering it.
    fn decode_package(&self, data: Bytes) -> Result<Package, PackageBuildingError>;

    /// Register a decoded package. Returns false if its id was already known,
    /// in which case the entry is refreshed.
    async fn register_package(&self, package: Package) -> bool;

    /// Materialize and register a package received over the wire.
    async fn read_package(&self, data: Bytes) -> Result<Package, PackageBuildingError> {
        let package = self.decode_package(data)?;
        self.register_package(package.clone()).await;
        Ok(package)
    }

    /// Release a package and its resources. Returns false if it was unknown.
    async fn release_package(&self, id: &str) -> bool;
}
