//! Local Package Exporter
//!
//! Build-only exporter: every request is turned into exactly one package by
//! the builder. No network is involved.

use crate::domain::entities::{Package, ReplicationRequest};
use crate::domain::errors::PackageBuildingError;
use crate::domain::ports::{PackageBuilder, PackageExporter};
use async_trait::async_trait;
use std::sync::Arc;

/// Exporter delegating straight to a package builder.
pub struct LocalPackageExporter {
    builder: Arc<dyn PackageBuilder>,
}

impl LocalPackageExporter {
    pub fn new(builder: Arc<dyn PackageBuilder>) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl PackageExporter for LocalPackageExporter {
    async fn export_package(&self, request: &ReplicationRequest) -> Result<Vec<Package>, PackageBuildingError> {
        let package = self.builder.create_package(request).await?;
        tracing::debug!(
            "exported package {} for {} {:?}",
            package.id(),
            request.action,
            request.paths
        );
        Ok(vec![package])
    }

    async fn export_package_by_id(&self, id: &str) -> Option<Package> {
        self.builder.get_package(id).await
    }
}
