mod authentication;
mod package_builder;
mod package_exporter;
mod queue_provider;
mod transport_handler;

pub use authentication::{AuthenticationProviderFactory, TransportAuthenticationProvider};
pub use package_builder::PackageBuilder;
pub use package_exporter::PackageExporter;
pub use queue_provider::{QueueProcessor, QueueProvider};
pub use transport_handler::TransportHandler;
