/// Health check endpoint
///
/// ```text
/// GET /health
/// ```
///
/// ```json
/// { "status": "healthy", "version": "0.1.0", "storage": "connected", "backend": "postgres" }
/// ```
///
/// Always answers `200`; a failed storage ping reports `degraded`.

use crate::app::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,

    pub version: String,

    /// `connected` or `disconnected`
    pub storage: String,

    /// `postgres` or `memory`
    pub backend: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Storage health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        version: kinship_shared::VERSION.to_string(),
        storage: if connected { "connected" } else { "disconnected" }.to_string(),
        backend: state.store.backend().to_string(),
    })
}
