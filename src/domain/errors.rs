//! Domain Errors
//!
//! Error taxonomy for the dispatch engine. Build failures surface to the
//! exporter's caller, transport failures are reclassified by the endpoint
//! strategy, queue failures are always returned synchronously.

use std::time::Duration;

/// Failure while building, reading or exporting a package.
#[derive(Debug, thiserror::Error)]
pub enum PackageBuildingError {
    #[error("invalid replication request: {0}")]
    InvalidRequest(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("package storage unavailable: {0}")]
    Storage(String),

    #[error("malformed package: {0}")]
    Malformed(String),

    /// A remote export failed. The exporter is the boundary that normalizes
    /// transport failures into build failures.
    #[error("remote export failed: {0}")]
    Transport(#[source] TransportError),
}

/// Failure of a single endpoint or of a whole endpoint strategy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    #[error("endpoint {endpoint} rejected the request with status {status}")]
    Rejected { endpoint: String, status: u16 },

    #[error("authentication against {endpoint} failed: {message}")]
    Authentication { endpoint: String, message: String },

    #[error("attempt against {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    #[error("endpoint {endpoint} returned an unreadable package: {message}")]
    InvalidPackage { endpoint: String, message: String },

    #[error("no transport endpoints configured")]
    NoEndpoints,

    #[error("all {} endpoints failed: {}", failures.len(), failures.join("; "))]
    AllEndpointsFailed { failures: Vec<String> },
}

impl TransportError {
    /// Endpoint the failure is attributed to, if it is endpoint-scoped.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Connection { endpoint, .. }
            | Self::Rejected { endpoint, .. }
            | Self::Authentication { endpoint, .. }
            | Self::Timeout { endpoint, .. }
            | Self::InvalidPackage { endpoint, .. } => Some(endpoint),
            Self::NoEndpoints | Self::AllEndpointsFailed { .. } => None,
        }
    }
}

/// Failure to build an authentication provider from its properties.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthenticationError {
    #[error("missing authentication property {0:?}")]
    MissingProperty(String),

    #[error("conflicting authentication properties: {0}")]
    Conflicting(String),
}

/// Failure of a queue provider operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("invalid agent name {0:?}")]
    InvalidAgentName(String),

    #[error("invalid queue name {0:?}")]
    InvalidQueueName(String),

    #[error("queue {queue} of agent {agent} is not owned by this provider")]
    NotOwned { agent: String, queue: String },

    #[error("queue {queue} of agent {agent} does not exist")]
    UnknownQueue { agent: String, queue: String },

    #[error("cannot process queues of agent {agent} outside a tokio runtime")]
    NoRuntime { agent: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_endpoint() {
        let err = TransportError::Rejected {
            endpoint: "http://a/".to_string(),
            status: 500,
        };
        assert_eq!(err.endpoint(), Some("http://a/"));
        assert_eq!(TransportError::NoEndpoints.endpoint(), None);
    }

    #[test]
    fn test_all_endpoints_failed_display() {
        let err = TransportError::AllEndpointsFailed {
            failures: vec!["a down".to_string(), "b down".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("all 2 endpoints failed"));
        assert!(msg.contains("a down; b down"));
    }

    #[test]
    fn test_package_building_error_keeps_transport_source() {
        use std::error::Error;

        let err = PackageBuildingError::Transport(TransportError::NoEndpoints);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("no transport endpoints"));
    }

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::NotOwned {
            agent: "publish".to_string(),
            queue: "default".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "queue default of agent publish is not owned by this provider"
        );
    }
}
