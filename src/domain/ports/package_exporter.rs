//! Package Exporter Port
//!
//! Request-facing API used by agents to obtain packages for a request.

use crate::domain::entities::{Package, ReplicationRequest};
use crate::domain::errors::PackageBuildingError;
use async_trait::async_trait;

/// Exports packages for replication requests.
#[async_trait]
pub trait PackageExporter: Send + Sync {
    /// Export the packages for a request.
    async fn export_package(&self, request: &ReplicationRequest) -> Result<Vec<Package>, PackageBuildingError>;

    /// Look up an already exported package.
    async fn export_package_by_id(&self, id: &str) -> Option<Package>;
}
