//! User Credentials Authentication
//!
//! Builds authentication providers from flat `user` / `password` / `token`
//! properties. Credentials are resolved once and attached to every attempt.

use crate::domain::errors::{AuthenticationError, TransportError};
use crate::domain::ports::{AuthenticationProviderFactory, TransportAuthenticationProvider};
use crate::domain::value_objects::{Credentials, Endpoint};
use std::collections::HashMap;
use std::sync::Arc;

pub const USER_PROPERTY: &str = "user";
pub const PASSWORD_PROPERTY: &str = "password";
pub const TOKEN_PROPERTY: &str = "token";

/// Provider handing out the same credentials for every endpoint.
#[derive(Debug, Clone)]
pub struct StaticCredentialsProvider {
    credentials: Credentials,
}

impl StaticCredentialsProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn anonymous() -> Self {
        Self::new(Credentials::Anonymous)
    }
}

impl TransportAuthenticationProvider for StaticCredentialsProvider {
    fn authenticate(&self, _endpoint: &Endpoint) -> Result<Credentials, TransportError> {
        Ok(self.credentials.clone())
    }
}

/// Factory reading user credentials from properties.
///
/// - `user` + `password` gives HTTP basic authentication
/// - `token` gives bearer authentication
/// - no properties gives anonymous access
#[derive(Debug, Clone, Copy, Default)]
pub struct UserCredentialsAuthenticationProviderFactory;

impl UserCredentialsAuthenticationProviderFactory {
    pub fn new() -> Self {
        Self
    }

    fn non_empty<'a>(properties: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
        properties
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    fn resolve(properties: &HashMap<String, String>) -> Result<Credentials, AuthenticationError> {
        let user = Self::non_empty(properties, USER_PROPERTY);
        let password = Self::non_empty(properties, PASSWORD_PROPERTY);
        let token = Self::non_empty(properties, TOKEN_PROPERTY);

        match (user, password, token) {
            (Some(_), _, Some(_)) => Err(AuthenticationError::Conflicting(
                "both user and token are set".to_string(),
            )),
            (Some(user), Some(password), None) => Ok(Credentials::Basic {
                username: user.to_string(),
                password: password.to_string(),
            }),
            (Some(_), None, None) => Err(AuthenticationError::MissingProperty(
                PASSWORD_PROPERTY.to_string(),
            )),
            (None, Some(_), _) => Err(AuthenticationError::MissingProperty(
                USER_PROPERTY.to_string(),
            )),
            (None, None, Some(token)) => Ok(Credentials::Bearer {
                token: token.to_string(),
            }),
            (None, None, None) => Ok(Credentials::Anonymous),
        }
    }
}

impl AuthenticationProviderFactory for UserCredentialsAuthenticationProviderFactory {
    fn create_authentication_provider(
        &self,
        properties: &HashMap<String, String>,
    ) -> Result<Arc<dyn TransportAuthenticationProvider>, AuthenticationError> {
        let credentials = Self::resolve(properties)?;
        tracing::debug!("created authentication provider {:?}", credentials);
        Ok(Arc::new(StaticCredentialsProvider::new(credentials)))
    }
}
