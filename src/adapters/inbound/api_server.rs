//! Replication API Server
//!
//! HTTP API to trigger replication on an agent, inspect its queues and
//! receive packages delivered by a remote agent's HttpTransportHandler.

use crate::adapters::outbound::{HEADER_ACTION, HEADER_PACKAGE_ID};
use crate::application::{
    AgentError, PackageImporter, ReplicationAgent, DEFAULT_IMPORT_RETENTION,
};
use crate::domain::entities::{ReplicationActionType, ReplicationRequest};
use crate::domain::errors::{PackageBuildingError, QueueError};
use crate::domain::ports::PackageBuilder;
use crate::domain::queue::QueueStatus;
use crate::infrastructure::ShutdownController;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Replication trigger body.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicateRequest {
    pub action: ReplicationActionType,
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Replication trigger response.
#[derive(Debug, Serialize)]
pub struct ReplicateResponse {
    pub agent: String,
    pub queued: Vec<String>,
}

/// Queues of one agent.
#[derive(Debug, Serialize)]
pub struct QueuesResponse {
    pub agent: String,
    pub queues: Vec<QueueStatus>,
    pub total_pending: usize,
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub agents: Vec<String>,
    pub pending: usize,
}

/// Imported package response.
#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub id: String,
    pub action: ReplicationActionType,
    pub paths: Vec<String>,
}

/// API Server state.
#[derive(Clone)]
pub struct ApiState {
    /// Agents served by this process (name -> agent)
    agents: Arc<DashMap<String, Arc<ReplicationAgent>>>,
    /// Receiving side for delivered packages
    importer: Arc<PackageImporter>,
}

impl ApiState {
    /// State importing into `builder` with the default retention.
    pub fn new(builder: Arc<dyn PackageBuilder>) -> Self {
        Self::with_importer(Arc::new(PackageImporter::new(builder, DEFAULT_IMPORT_RETENTION)))
    }

    pub fn with_importer(importer: Arc<PackageImporter>) -> Self {
        Self {
            agents: Arc::new(DashMap::new()),
            importer,
        }
    }

    pub fn importer(&self) -> Arc<PackageImporter> {
        self.importer.clone()
    }

    /// Serve an agent under its name. Replaces an agent with the same name.
    pub fn register_agent(&self, agent: Arc<ReplicationAgent>) {
        self.agents.insert(agent.name().to_string(), agent);
    }

    pub fn agent(&self, name: &str) -> Option<Arc<ReplicationAgent>> {
        self.agents.get(name).map(|e| e.value().clone())
    }

    /// Names of all served agents, sorted.
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Items waiting across all served agents.
    pub fn pending(&self) -> usize {
        self.agents
            .iter()
            .flat_map(|e| e.value().queue_status())
            .map(|s| s.pending)
            .sum()
    }
}

/// API Server for replication.
pub struct ApiServer {
    listen_addr: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(listen_addr: String, state: ApiState) -> Self {
        Self { listen_addr, state }
    }

    pub fn state(&self) -> ApiState {
        self.state.clone()
    }

    /// Router with every route, for serving or for tests.
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Run the API server until shutdown is initiated.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(&self, shutdown: ShutdownController) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("replication API listening on {}", self.listen_addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
            .await?;
        tracing::info!("replication API stopped");
        Ok(())
    }
}

fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/agents/:agent/replicate", post(replicate_handler))
        .route("/api/v1/agents/:agent/queues", get(queues_handler))
        .route("/api/v1/packages", post(import_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn agent_not_found(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "agent": name,
            "error": "agent not found"
        })),
    )
        .into_response()
}

fn error_status(err: &AgentError) -> StatusCode {
    match err {
        AgentError::Queue(QueueError::NoRuntime { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        AgentError::InvalidRequest(_)
        | AgentError::Queue(_)
        | AgentError::Export(PackageBuildingError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
        AgentError::Export(_) => StatusCode::BAD_GATEWAY,
    }
}

// Handler functions

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        agents: state.agent_names(),
        pending: state.pending(),
    })
}

async fn replicate_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(req): Json<ReplicateRequest>,
) -> Response {
    let Some(agent) = state.agent(&name) else {
        return agent_not_found(&name);
    };

    let request = ReplicationRequest::new(req.action, req.paths);
    match agent.execute(&request).await {
        Ok(items) => {
            let queued: Vec<String> = items.iter().map(|i| i.id().to_string()).collect();
            (
                StatusCode::ACCEPTED,
                Json(ReplicateResponse { agent: name, queued }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!("replication on agent {} failed: {}", name, e);
            (
                error_status(&e),
                Json(serde_json::json!({
                    "agent": name,
                    "error": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

async fn queues_handler(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    let Some(agent) = state.agent(&name) else {
        return agent_not_found(&name);
    };

    let queues = agent.queue_status();
    let total_pending = queues.iter().map(|q| q.pending).sum();
    Json(QueuesResponse {
        agent: name,
        queues,
        total_pending,
    })
    .into_response()
}

async fn import_handler(State(state): State<ApiState>, headers: HeaderMap, body: Bytes) -> Response {
    let action = headers
        .get(HEADER_ACTION)
        .and_then(|v| v.to_str().ok())
        .and_then(ReplicationActionType::parse);

    // This side never queues packages for pickup, so polls find nothing.
    if action == Some(ReplicationActionType::Poll) {
        return StatusCode::NO_CONTENT.into_response();
    }

    let announced = headers.get(HEADER_PACKAGE_ID).and_then(|v| v.to_str().ok());
    match state.importer.import(body, announced).await {
        Ok(package) => (
            StatusCode::OK,
            Json(ImportResponse {
                id: package.id().to_string(),
                action: package.action(),
                paths: package.paths().to_vec(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("rejected incoming package: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::outbound::{InMemoryPackageBuilder, InMemoryQueueProvider};
    use crate::application::LocalPackageExporter;
    use crate::domain::entities::Package;
    use crate::domain::errors::TransportError;
    use crate::domain::ports::{PackageExporter, TransportHandler};
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct NullTransport;

    #[async_trait]
    impl TransportHandler for NullTransport {
        fn name(&self) -> &str {
            "null"
        }

        async fn deliver_package(&self, _package: &Package) -> Result<(), TransportError> {
            Ok(())
        }

        async fn retrieve_packages(&self, _request: &ReplicationRequest) -> Result<Vec<Package>, TransportError> {
            Ok(Vec::new())
        }
    }

    /// Exporter whose remote side is down.
    struct FailingExporter;

    #[async_trait]
    impl PackageExporter for FailingExporter {
        async fn export_package(&self, _request: &ReplicationRequest) -> Result<Vec<Package>, PackageBuildingError> {
            Err(PackageBuildingError::Transport(TransportError::NoEndpoints))
        }

        async fn export_package_by_id(&self, _id: &str) -> Option<Package> {
            None
        }
    }

    fn create_test_state() -> (ApiState, Arc<InMemoryPackageBuilder>) {
        let builder = Arc::new(InMemoryPackageBuilder::new());
        let state = ApiState::new(builder.clone());
        let agent = ReplicationAgent::new(
            "publish",
            Arc::new(LocalPackageExporter::new(builder.clone())),
            Arc::new(InMemoryQueueProvider::default()),
            Arc::new(NullTransport),
            builder.clone(),
        );
        state.register_agent(Arc::new(agent));
        (state, builder)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn replicate(agent: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/api/v1/agents/{}/replicate", agent))
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    // ===== Error Mapping Tests =====

    #[test]
    fn test_error_status() {
        assert_eq!(
            error_status(&AgentError::InvalidRequest("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&AgentError::Queue(QueueError::InvalidAgentName("x".to_string()))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&AgentError::Export(PackageBuildingError::Transport(
                TransportError::NoEndpoints
            ))),
            StatusCode::BAD_GATEWAY
        );
    }

    // ===== Handler Tests =====

    #[tokio::test]
    async fn test_health_handler() {
        let (state, _) = create_test_state();
        let app = router(state);

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["agents"], serde_json::json!(["publish"]));
        assert_eq!(body["pending"], 0);
    }

    #[tokio::test]
    async fn test_replicate_handler_queues_package() {
        let (state, _) = create_test_state();
        let app = router(state.clone());

        let response = app
            .oneshot(replicate(
                "publish",
                serde_json::json!({"action": "ADD", "paths": ["/content/a"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = json_body(response).await;
        assert_eq!(body["queued"].as_array().unwrap().len(), 1);
        assert_eq!(state.pending(), 1);
    }

    #[tokio::test]
    async fn test_replicate_handler_invalid_request() {
        let (state, _) = create_test_state();
        let app = router(state);

        let response = app
            .oneshot(replicate("publish", serde_json::json!({"action": "DELETE"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_replicate_handler_poll_on_local_agent() {
        let (state, builder) = create_test_state();
        let app = router(state.clone());

        let response = app
            .oneshot(replicate("publish", serde_json::json!({"action": "POLL"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.pending(), 0);
        assert!(builder.is_empty());
    }

    #[tokio::test]
    async fn test_replicate_handler_unknown_agent() {
        let (state, _) = create_test_state();
        let app = router(state);

        let response = app
            .oneshot(replicate(
                "author",
                serde_json::json!({"action": "ADD", "paths": ["/a"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_replicate_handler_export_failure() {
        let builder = Arc::new(InMemoryPackageBuilder::new());
        let state = ApiState::new(builder.clone());
        state.register_agent(Arc::new(ReplicationAgent::new(
            "reverse",
            Arc::new(FailingExporter),
            Arc::new(InMemoryQueueProvider::default()),
            Arc::new(NullTransport),
            builder,
        )));
        let app = router(state);

        let response = app
            .oneshot(replicate("reverse", serde_json::json!({"action": "POLL"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_queues_handler() {
        let (state, _) = create_test_state();
        let agent = state.agent("publish").unwrap();
        agent
            .execute(&ReplicationRequest::new(ReplicationActionType::Add, ["/a"]))
            .await
            .unwrap();
        let app = router(state);

        let request = Request::builder()
            .uri("/api/v1/agents/publish/queues")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["total_pending"], 1);
        assert_eq!(body["queues"][0]["name"], "default");
        assert_eq!(body["queues"][0]["head_attempts"], 0);
    }

    #[tokio::test]
    async fn test_import_handler_reads_package() {
        let (state, builder) = create_test_state();
        let source = InMemoryPackageBuilder::new();
        let package = source
            .create_package(&ReplicationRequest::new(ReplicationActionType::Add, ["/content/x"]))
            .await
            .unwrap();
        let app = router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/packages")
            .header(HEADER_ACTION, "ADD")
            .header(HEADER_PACKAGE_ID, package.id())
            .body(Body::from(package.bytes()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["id"], package.id());
        assert!(builder.get_package(package.id()).await.is_some());
    }

    fn import(package: &Package, announced_id: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/packages")
            .header(HEADER_ACTION, "ADD")
            .header(HEADER_PACKAGE_ID, announced_id)
            .body(Body::from(package.bytes()))
            .unwrap()
    }

    async fn wire_package(path: &str) -> Package {
        InMemoryPackageBuilder::new()
            .create_package(&ReplicationRequest::new(ReplicationActionType::Add, [path]))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_import_handler_rejects_id_mismatch() {
        let (state, builder) = create_test_state();
        let existing = wire_package("/content/existing").await;
        let other = wire_package("/content/other").await;

        let response = router(state.clone())
            .oneshot(import(&existing, existing.id()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router(state)
            .oneshot(import(&other, existing.id()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(builder.get_package(existing.id()).await, Some(existing));
        assert!(builder.get_package(other.id()).await.is_none());
    }

    #[tokio::test]
    async fn test_import_handler_retention_is_bounded() {
        let builder = Arc::new(InMemoryPackageBuilder::new());
        let state = ApiState::with_importer(Arc::new(PackageImporter::new(builder.clone(), 2)));

        for i in 0..20 {
            let package = wire_package(&format!("/content/{}", i)).await;
            let response = router(state.clone())
                .oneshot(import(&package, package.id()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(builder.len(), 2);
        assert_eq!(state.importer().retained_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_import_handler_rejects_garbage() {
        let (state, _) = create_test_state();
        let app = router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/packages")
            .body(Body::from("not a package"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_import_handler_poll_has_nothing() {
        let (state, _) = create_test_state();
        let app = router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/packages")
            .header(HEADER_ACTION, "POLL")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
