//! In-Memory Package Builder
//!
//! Implements PackageBuilder by encoding requests as JSON envelopes and
//! keeping every built or received package in a DashMap keyed by id.

use crate::domain::entities::{Package, ReplicationActionType, ReplicationRequest};
use crate::domain::errors::PackageBuildingError;
use crate::domain::ports::PackageBuilder;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Package type produced by this builder.
pub const JSON_PACKAGE_TYPE: &str = "json";

/// Wire representation of a package.
#[derive(Debug, Serialize, Deserialize)]
struct PackageEnvelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    action: ReplicationActionType,
    paths: Vec<String>,
    time: u64,
}

/// DashMap-backed package builder.
pub struct InMemoryPackageBuilder {
    packages: Arc<DashMap<String, Package>>,
}

impl InMemoryPackageBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            packages: Arc::new(DashMap::new()),
        }
    }

    /// Number of packages currently held.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn envelope_to_package(envelope: PackageEnvelope, data: Bytes) -> Package {
        Package::new(envelope.id, envelope.kind, envelope.action, envelope.paths, data)
    }
}

impl Default for InMemoryPackageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PackageBuilder for InMemoryPackageBuilder {
    async fn create_package(&self, request: &ReplicationRequest) -> Result<Package, PackageBuildingError> {
        request
            .validate()
            .map_err(PackageBuildingError::InvalidRequest)?;
        // A poll asks a remote for its packages and carries no content.
        if request.action == ReplicationActionType::Poll {
            return Err(PackageBuildingError::InvalidRequest(
                "POLL requests are retrieved from a remote, not built".to_string(),
            ));
        }

        let envelope = PackageEnvelope {
            id: format!("pkg-{}", uuid::Uuid::new_v4()),
            kind: JSON_PACKAGE_TYPE.to_string(),
            action: request.action,
            paths: request.paths.clone(),
            time: request.time,
        };
        let data = serde_json::to_vec(&envelope)
            .map_err(|e| PackageBuildingError::Storage(e.to_string()))?;

        let package = Self::envelope_to_package(envelope, Bytes::from(data));
        self.packages.insert(package.id().to_string(), package.clone());

        tracing::debug!(
            "built package {} action={} paths={}",
            package.id(),
            package.action(),
            package.paths().len()
        );
        Ok(package)
    }

    async fn get_package(&self, id: &str) -> Option<Package> {
        self.packages.get(id).map(|e| e.value().clone())
    }

    fn decode_package(&self, data: Bytes) -> Result<Package, PackageBuildingError> {
        let envelope: PackageEnvelope = serde_json::from_slice(&data)
            .map_err(|e| PackageBuildingError::Malformed(e.to_string()))?;
        if envelope.id.is_empty() {
            return Err(PackageBuildingError::Malformed("package without id".to_string()));
        }
        Ok(Self::envelope_to_package(envelope, data))
    }

    async fn register_package(&self, package: Package) -> bool {
        self.packages
            .insert(package.id().to_string(), package)
            .is_none()
    }

    async fn release_package(&self, id: &str) -> bool {
        self.packages.remove(id).is_some()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn add_request() -> ReplicationRequest {
        ReplicationRequest::new(ReplicationActionType::Add, ["/content/site/en"])
    }

    // ===== create_package Tests =====

    #[tokio::test]
    async fn test_create_package() {
        let builder = InMemoryPackageBuilder::new();
        let pkg = builder.create_package(&add_request()).await.unwrap();

        assert!(pkg.id().starts_with("pkg-"));
        assert_eq!(pkg.kind(), JSON_PACKAGE_TYPE);
        assert_eq!(pkg.action(), ReplicationActionType::Add);
        assert_eq!(pkg.paths(), ["/content/site/en".to_string()]);
        assert!(pkg.len() > 0);
        assert_eq!(builder.len(), 1);
    }

    #[tokio::test]
    async fn test_create_package_ids_unique() {
        let builder = InMemoryPackageBuilder::new();
        let a = builder.create_package(&add_request()).await.unwrap();
        let b = builder.create_package(&add_request()).await.unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_create_package_invalid_request() {
        let builder = InMemoryPackageBuilder::new();
        let req = ReplicationRequest::new(ReplicationActionType::Delete, Vec::<String>::new());
        let result = builder.create_package(&req).await;
        assert!(matches!(result, Err(PackageBuildingError::InvalidRequest(_))));
        assert!(builder.is_empty());
    }

    #[tokio::test]
    async fn test_create_package_rejects_poll() {
        let builder = InMemoryPackageBuilder::new();
        let req = ReplicationRequest::new(ReplicationActionType::Poll, Vec::<String>::new());
        let result = builder.create_package(&req).await;
        assert!(matches!(result, Err(PackageBuildingError::InvalidRequest(_))));
        assert!(builder.is_empty());
    }

    // ===== get / release Tests =====

    #[tokio::test]
    async fn test_get_and_release() {
        let builder = InMemoryPackageBuilder::new();
        let pkg = builder.create_package(&add_request()).await.unwrap();

        assert_eq!(builder.get_package(pkg.id()).await, Some(pkg.clone()));
        assert!(builder.release_package(pkg.id()).await);
        assert!(builder.get_package(pkg.id()).await.is_none());
        assert!(!builder.release_package(pkg.id()).await);
    }

    // ===== read_package Tests =====

    #[tokio::test]
    async fn test_read_package_preserves_id() {
        let source = InMemoryPackageBuilder::new();
        let pkg = source.create_package(&add_request()).await.unwrap();

        let target = InMemoryPackageBuilder::new();
        let read = target.read_package(pkg.bytes()).await.unwrap();
        assert_eq!(read, pkg);
        assert!(target.get_package(pkg.id()).await.is_some());
    }

    #[tokio::test]
    async fn test_decode_does_not_register() {
        let source = InMemoryPackageBuilder::new();
        let pkg = source.create_package(&add_request()).await.unwrap();

        let target = InMemoryPackageBuilder::new();
        assert_eq!(target.decode_package(pkg.bytes()).unwrap(), pkg);
        assert!(target.is_empty());

        assert!(target.register_package(pkg.clone()).await);
        assert!(!target.register_package(pkg).await);
        assert_eq!(target.len(), 1);
    }

    #[tokio::test]
    async fn test_read_package_malformed() {
        let builder = InMemoryPackageBuilder::new();
        let result = builder.read_package(Bytes::from_static(b"not json")).await;
        assert!(matches!(result, Err(PackageBuildingError::Malformed(_))));
    }
}
