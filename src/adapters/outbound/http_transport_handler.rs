//! HTTP Transport Handler
//!
//! Single-endpoint transport over HTTP using reqwest. Delivery is one POST
//! carrying the whole package; retrieval polls the endpoint up to the
//! configured batch size. No retries happen here.

use crate::domain::entities::{Package, ReplicationActionType, ReplicationRequest};
use crate::domain::errors::TransportError;
use crate::domain::ports::{PackageBuilder, TransportAuthenticationProvider, TransportHandler};
use crate::domain::value_objects::{Credentials, Endpoint};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;

pub const HEADER_ACTION: &str = "X-Replication-Action";
pub const HEADER_TYPE: &str = "X-Replication-Type";
pub const HEADER_PATH: &str = "X-Replication-Path";
pub const HEADER_PACKAGE_ID: &str = "X-Replication-Package-Id";

/// Default per-request timeout.
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport handler for one HTTP endpoint.
pub struct HttpTransportHandler {
    endpoint: Endpoint,
    client: Client,
    timeout: Duration,
    authentication: Arc<dyn TransportAuthenticationProvider>,
    builder: Arc<dyn PackageBuilder>,
}

impl HttpTransportHandler {
    /// Create a handler for an endpoint.
    pub fn new(
        endpoint: Endpoint,
        authentication: Arc<dyn TransportAuthenticationProvider>,
        builder: Arc<dyn PackageBuilder>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection {
                endpoint: endpoint.uri().to_string(),
                message: format!("client error: {}", e),
            })?;

        Ok(Self {
            endpoint,
            client,
            timeout,
            authentication,
            builder,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn apply_credentials(request: RequestBuilder, credentials: Credentials) -> RequestBuilder {
        match credentials {
            Credentials::Anonymous => request,
            Credentials::Basic { username, password } => request.basic_auth(username, Some(password)),
            Credentials::Bearer { token } => request.bearer_auth(token),
        }
    }

    /// Build an authenticated POST with the replication headers.
    fn request(&self, action: ReplicationActionType, paths: &[String]) -> Result<RequestBuilder, TransportError> {
        let credentials = self.authentication.authenticate(&self.endpoint)?;

        let mut request = self
            .client
            .post(self.endpoint.uri())
            .header(HEADER_ACTION, action.as_str());
        for path in paths {
            request = request.header(HEADER_PATH, path.as_str());
        }
        Ok(Self::apply_credentials(request, credentials))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        let response = request.send().await.map_err(|e| self.classify(e))?;
        self.check_status(response.status())?;
        Ok(response)
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        let endpoint = self.endpoint.uri().to_string();
        if err.is_timeout() {
            TransportError::Timeout {
                endpoint,
                after: self.timeout,
            }
        } else {
            TransportError::Connection {
                endpoint,
                message: err.to_string(),
            }
        }
    }

    fn check_status(&self, status: StatusCode) -> Result<(), TransportError> {
        if status.is_success() {
            return Ok(());
        }
        let endpoint = self.endpoint.uri().to_string();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TransportError::Authentication {
                endpoint,
                message: format!("remote answered {}", status),
            }),
            _ => Err(TransportError::Rejected {
                endpoint,
                status: status.as_u16(),
            }),
        }
    }

    /// Fetch a single pending package. `None` when the endpoint has nothing.
    async fn poll_once(&self, request: &ReplicationRequest) -> Result<Option<Package>, TransportError> {
        let response = self
            .send(self.request(ReplicationActionType::Poll, &request.paths)?)
            .await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        if body.is_empty() {
            return Ok(None);
        }

        let package = self
            .builder
            .read_package(body)
            .await
            .map_err(|e| TransportError::InvalidPackage {
                endpoint: self.endpoint.uri().to_string(),
                message: e.to_string(),
            })?;
        Ok(Some(package))
    }
}

#[async_trait]
impl TransportHandler for HttpTransportHandler {
    fn name(&self) -> &str {
        self.endpoint.uri()
    }

    async fn deliver_package(&self, package: &Package) -> Result<(), TransportError> {
        let request = self
            .request(package.action(), package.paths())?
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(HEADER_TYPE, package.kind())
            .header(HEADER_PACKAGE_ID, package.id())
            .body(package.bytes());

        self.send(request).await?;

        tracing::debug!(
            "delivered package {} ({} bytes) to {}",
            package.id(),
            package.len(),
            self.endpoint
        );
        Ok(())
    }

    async fn retrieve_packages(&self, request: &ReplicationRequest) -> Result<Vec<Package>, TransportError> {
        let mut packages = Vec::new();

        for _ in 0..self.endpoint.poll_items() {
            match self.poll_once(request).await {
                Ok(Some(package)) => packages.push(package),
                Ok(None) => break,
                // Packages already handed over by the remote must not be lost.
                Err(e) if !packages.is_empty() => {
                    tracing::warn!(
                        "poll of {} stopped after {} packages: {}",
                        self.endpoint,
                        packages.len(),
                        e
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!("retrieved {} packages from {}", packages.len(), self.endpoint);
        Ok(packages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::{InMemoryPackageBuilder, StaticCredentialsProvider};

    fn handler(uri: &str) -> HttpTransportHandler {
        HttpTransportHandler::new(
            Endpoint::parse(uri).unwrap(),
            Arc::new(StaticCredentialsProvider::anonymous()),
            Arc::new(InMemoryPackageBuilder::new()),
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[test]
    fn test_name_is_endpoint_uri() {
        let h = handler("http://127.0.0.1:9/import");
        assert_eq!(h.name(), "http://127.0.0.1:9/import");
        assert_eq!(h.endpoint().poll_items(), 1);
    }

    #[test]
    fn test_check_status_classification() {
        let h = handler("http://127.0.0.1:9/import");
        assert!(h.check_status(StatusCode::OK).is_ok());
        assert!(h.check_status(StatusCode::ACCEPTED).is_ok());
        assert!(matches!(
            h.check_status(StatusCode::UNAUTHORIZED),
            Err(TransportError::Authentication { .. })
        ));
        assert!(matches!(
            h.check_status(StatusCode::FORBIDDEN),
            Err(TransportError::Authentication { .. })
        ));
        assert_eq!(
            h.check_status(StatusCode::INTERNAL_SERVER_ERROR),
            Err(TransportError::Rejected {
                endpoint: "http://127.0.0.1:9/import".to_string(),
                status: 500
            })
        );
    }

    #[tokio::test]
    async fn test_deliver_to_closed_port_is_connection_error() {
        let h = handler("http://127.0.0.1:9/import");
        let pkg = Package::new("p1", "json", ReplicationActionType::Add, vec!["/a".to_string()], b"{}".to_vec());
        let err = h.deliver_package(&pkg).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connection { .. } | TransportError::Timeout { .. }
        ));
        assert_eq!(err.endpoint(), Some("http://127.0.0.1:9/import"));
    }
}
