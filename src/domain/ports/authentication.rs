//! Transport Authentication Port
//!
//! Defines how transport handlers obtain credentials for an endpoint.

use crate::domain::errors::{AuthenticationError, TransportError};
use crate::domain::value_objects::{Credentials, Endpoint};
use std::collections::HashMap;
use std::sync::Arc;

/// Produces the credentials to attach to requests against an endpoint.
pub trait TransportAuthenticationProvider: Send + Sync {
    /// Authenticate a transport attempt against the given endpoint.
    fn authenticate(&self, endpoint: &Endpoint) -> Result<Credentials, TransportError>;
}

/// Creates authentication providers from flat credential properties.
pub trait AuthenticationProviderFactory: Send + Sync {
    fn create_authentication_provider(
        &self,
        properties: &HashMap<String, String>,
    ) -> Result<Arc<dyn TransportAuthenticationProvider>, AuthenticationError>;
}
