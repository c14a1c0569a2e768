use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use geochat_db::repositories::ConversationRepository;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    repository: Arc<dyn ConversationRepository>,
}

impl HealthState {
    pub fn new(repository: Arc<dyn ConversationRepository>) -> Self {
        Self { repository }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub store: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let store = store_check(state.repository.as_ref()).await;
    let ready = store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "geochat-server runtime initialized".to_string(),
        },
        store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn store_check(repository: &dyn ConversationRepository) -> HealthCheck {
    match repository.ping().await {
        Ok(()) => HealthCheck { status: "ready", detail: "key-value store answered".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("key-value store ping failed: {error}") }
        }
    }
}
