mod http_transport_handler;
mod in_memory_package_builder;
mod in_memory_queue_provider;
mod multi_endpoint_transport;
mod user_credentials_auth;

pub use http_transport_handler::{
    HttpTransportHandler, DEFAULT_TRANSPORT_TIMEOUT, HEADER_ACTION, HEADER_PACKAGE_ID, HEADER_PATH,
    HEADER_TYPE,
};
pub use in_memory_package_builder::{InMemoryPackageBuilder, JSON_PACKAGE_TYPE};
pub use in_memory_queue_provider::{is_valid_name, InMemoryQueueProvider, QueueProcessingConfig, MAX_NAME_LEN};
pub use multi_endpoint_transport::{MultipleEndpointTransportHandler, TransportSettings, TransportSetupError};
pub use user_credentials_auth::{
    StaticCredentialsProvider, UserCredentialsAuthenticationProviderFactory, PASSWORD_PROPERTY,
    TOKEN_PROPERTY, USER_PROPERTY,
};
