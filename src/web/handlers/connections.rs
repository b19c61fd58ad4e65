use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::db::{ConnectionSpec, Dialect};
use crate::web::handlers::error_response;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateConnectionRequest {
    pub connection_id: String,
    pub db_type: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connection_string: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub connection_id: String,
    pub db_type: String,
    pub database: String,
    pub status: String,
}

pub async fn create_connection(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateConnectionRequest>,
) -> Result<Json<ConnectionResponse>, (StatusCode, String)> {
    let dialect: Dialect = payload.db_type.parse().map_err(|err| {
        error!("connection creation failed: {}", err);
        error_response(err)
    })?;

    let spec = ConnectionSpec {
        dialect,
        host: payload.host,
        port: payload.port,
        database: payload.database.clone(),
        username: payload.username,
        password: payload.password,
        connection_string: payload.connection_string,
    };

    state
        .registry
        .register(&payload.connection_id, &spec)
        .await
        .map_err(|err| {
            error!("connection creation failed: {}", err);
            error_response(err)
        })?;

    Ok(Json(ConnectionResponse {
        connection_id: payload.connection_id,
        db_type: payload.db_type,
        database: payload.database,
        status: "connected".to_string(),
    }))
}

pub async fn list_connections(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<ConnectionResponse>> {
    let mut connections = Vec::new();
    for connection_id in state.registry.list().await {
        if let Some(connection) = state.registry.get(&connection_id).await {
            let status = if connection.test().await {
                "connected"
            } else {
                "disconnected"
            };
            connections.push(ConnectionResponse {
                connection_id,
                db_type: connection.dialect.to_string(),
                database: connection.database.clone(),
                status: status.to_string(),
            });
        }
    }
    Json(connections)
}

pub async fn delete_connection(
    State(state): State<Arc<AppState>>,
    Path(connection_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if state.registry.get(&connection_id).await.is_none() {
        return Err((StatusCode::NOT_FOUND, "Connection not found".to_string()));
    }

    state.registry.remove(&connection_id).await;
    info!(connection_id, "connection deleted");
    Ok(Json(json!({
        "message": format!("Connection {} deleted successfully", connection_id)
    })))
}

pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    Path(connection_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if state.registry.get(&connection_id).await.is_none() {
        return Err((StatusCode::NOT_FOUND, "Connection not found".to_string()));
    }

    let is_connected = state.registry.test(&connection_id).await;
    Ok(Json(json!({
        "connection_id": connection_id,
        "status": if is_connected { "connected" } else { "disconnected" }
    })))
}
