//! Application Layer
//!
//! Use cases built on the domain ports: local and remote package export,
//! the replication agent that queues and delivers packages, and the importer
//! on the receiving side.

mod agent;
mod importer;
mod local_exporter;
mod remote_exporter;

pub use agent::{AgentError, ReplicationAgent};
pub use importer::{ImportError, PackageImporter, DEFAULT_IMPORT_RETENTION};
pub use local_exporter::LocalPackageExporter;
pub use remote_exporter::RemotePackageExporter;
