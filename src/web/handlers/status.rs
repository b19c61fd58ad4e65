use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub ai_provider: String,
    pub connection_count: usize,
    pub history_count: usize,
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    let connection_count = state.registry.list().await.len();
    let history_count = state.history.len().await;

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        ai_provider: state.config.llm.provider.clone(),
        connection_count,
        history_count,
    })
}
