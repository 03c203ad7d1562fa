//! Remote Package Exporter
//!
//! Pulls packages from remote endpoints through a transport handler
//! (normally a MultipleEndpointTransportHandler). This is the boundary
//! where transport failures become build failures.

use crate::adapters::outbound::{MultipleEndpointTransportHandler, TransportSettings, TransportSetupError};
use crate::domain::entities::{Package, ReplicationRequest};
use crate::domain::errors::PackageBuildingError;
use crate::domain::ports::{AuthenticationProviderFactory, PackageBuilder, PackageExporter, TransportHandler};
use async_trait::async_trait;
use std::sync::Arc;

/// Exporter retrieving packages from remote endpoints.
pub struct RemotePackageExporter {
    builder: Arc<dyn PackageBuilder>,
    transport: Arc<dyn TransportHandler>,
}

impl RemotePackageExporter {
    /// Create an exporter over an existing transport.
    ///
    /// `builder` is the local registry that received packages are tracked
    /// in; `export_package_by_id` reads from it.
    pub fn new(builder: Arc<dyn PackageBuilder>, transport: Arc<dyn TransportHandler>) -> Self {
        Self { builder, transport }
    }

    /// Create an exporter over HTTP endpoints.
    pub fn from_settings(
        builder: Arc<dyn PackageBuilder>,
        authentication: &dyn AuthenticationProviderFactory,
        settings: &TransportSettings,
    ) -> Result<Self, TransportSetupError> {
        let transport = MultipleEndpointTransportHandler::http(builder.clone(), authentication, settings)?;
        Ok(Self::new(builder, Arc::new(transport)))
    }
}

#[async_trait]
impl PackageExporter for RemotePackageExporter {
    async fn export_package(&self, request: &ReplicationRequest) -> Result<Vec<Package>, PackageBuildingError> {
        let packages = self
            .transport
            .retrieve_packages(request)
            .await
            .map_err(|e| {
                tracing::warn!("remote export via {} failed: {}", self.transport.name(), e);
                PackageBuildingError::Transport(e)
            })?;

        tracing::debug!(
            "exported {} packages from {}",
            packages.len(),
            self.transport.name()
        );
        Ok(packages)
    }

    async fn export_package_by_id(&self, id: &str) -> Option<Package> {
        self.builder.get_package(id).await
    }
}
