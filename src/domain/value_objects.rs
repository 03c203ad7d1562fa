//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};

/// Default number of packages fetched per endpoint in pull mode.
pub const DEFAULT_POLL_ITEMS: usize = 1;

/// Policy governing how a package is delivered or retrieved across
/// multiple endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStrategy {
    /// Attempt every endpoint, fail only if every endpoint failed
    #[default]
    All,
    /// Use exactly one endpoint, chosen round-robin across calls
    One,
    /// Try endpoints in declared order, stop at the first success
    Fallback,
}

impl EndpointStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::One => "one",
            Self::Fallback => "fallback",
        }
    }
}

impl std::str::FromStr for EndpointStrategy {
    type Err = String;

    /// Parse a strategy name, ignoring case.
    ///
    /// # Examples
    /// ```
    /// use replication_agent::EndpointStrategy;
    ///
    /// assert_eq!("ALL".parse::<EndpointStrategy>(), Ok(EndpointStrategy::All));
    /// assert_eq!("first_success".parse::<EndpointStrategy>(), Ok(EndpointStrategy::Fallback));
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "one" => Ok(Self::One),
            "fallback" | "firstsuccess" | "first_success" | "first-success" => Ok(Self::Fallback),
            other => Err(format!("unknown endpoint strategy {:?}", other)),
        }
    }
}

impl std::fmt::Display for EndpointStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remote transport target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    uri: String,
    poll_items: usize,
}

impl Endpoint {
    /// Parse an http(s) endpoint URI.
    pub fn parse(uri: &str) -> Result<Self, String> {
        let url = reqwest::Url::parse(uri.trim())
            .map_err(|e| format!("invalid endpoint {:?}: {}", uri, e))?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(format!(
                    "unsupported scheme {:?} for endpoint {:?}",
                    scheme, uri
                ))
            }
        }
        if url.host_str().is_none() {
            return Err(format!("endpoint {:?} has no host", uri));
        }
        Ok(Self {
            uri: url.to_string(),
            poll_items: DEFAULT_POLL_ITEMS,
        })
    }

    /// Set how many packages a single pull may fetch (at least one).
    pub fn with_poll_items(mut self, poll_items: usize) -> Self {
        self.poll_items = poll_items.max(1);
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn poll_items(&self) -> usize {
        self.poll_items
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Credential material attached to an outgoing transport request.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    #[default]
    Anonymous,
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
        }
    }
}
