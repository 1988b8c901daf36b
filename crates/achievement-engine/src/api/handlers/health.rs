//! 健康检查

use axum::{Json, extract::State};
use serde::Serialize;

use crate::api::state::AppState;
use crate::repository::AchievementStore;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
}

/// GET /health
pub async fn health_check<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: state.service_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
