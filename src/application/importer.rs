//! Package Importer
//!
//! Receiving side of a replication transport. Incoming packages are decoded,
//! checked against the id announced by the sender and registered with the
//! builder. Only the most recent imports are retained; older ones are
//! released from the builder as new packages arrive.

use crate::domain::entities::Package;
use crate::domain::errors::PackageBuildingError;
use crate::domain::ports::PackageBuilder;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Imported packages kept by default.
pub const DEFAULT_IMPORT_RETENTION: usize = 1024;

/// Failure to import an incoming package.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("package id {announced} does not match payload id {payload}")]
    IdMismatch { announced: String, payload: String },

    #[error(transparent)]
    Package(#[from] PackageBuildingError),
}

/// Importer registering received packages with a bounded retention.
pub struct PackageImporter {
    builder: Arc<dyn PackageBuilder>,
    retention: usize,
    // Ids of retained imports, oldest first
    retained: Mutex<VecDeque<String>>,
}

impl PackageImporter {
    pub fn new(builder: Arc<dyn PackageBuilder>, retention: usize) -> Self {
        Self {
            builder,
            retention,
            retained: Mutex::new(VecDeque::new()),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Ids of the imports still held by the builder, oldest first.
    pub fn retained_ids(&self) -> Vec<String> {
        self.retained.lock().iter().cloned().collect()
    }

    /// Import one package.
    ///
    /// # Arguments
    /// * `data` - package bytes as received
    /// * `announced_id` - id the sender announced for the package, if any
    pub async fn import(&self, data: Bytes, announced_id: Option<&str>) -> Result<Package, ImportError> {
        let package = self.builder.decode_package(data)?;
        if let Some(announced) = announced_id {
            if announced != package.id() {
                return Err(ImportError::IdMismatch {
                    announced: announced.to_string(),
                    payload: package.id().to_string(),
                });
            }
        }

        let is_new = self.builder.register_package(package.clone()).await;
        let evicted: Vec<String> = {
            let mut retained = self.retained.lock();
            if is_new {
                retained.push_back(package.id().to_string());
            }
            let excess = retained.len().saturating_sub(self.retention);
            retained.drain(..excess).collect()
        };

        for id in &evicted {
            self.builder.release_package(id).await;
        }
        if !evicted.is_empty() {
            tracing::debug!("released {} older imported packages", evicted.len());
        }

        tracing::info!(
            "imported package {} ({} bytes, {})",
            package.id(),
            package.len(),
            package.action()
        );
        Ok(package)
    }
}
