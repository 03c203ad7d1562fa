mod api_server;

pub use api_server::ApiServer;

// Re-export for external use (e.g., integration tests)
pub use api_server::{ApiState, HealthResponse, ImportResponse, QueuesResponse, ReplicateRequest, ReplicateResponse};
