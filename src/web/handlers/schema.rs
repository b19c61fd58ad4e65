use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

use crate::db::introspect::{SchemaInfo, TableInfo};
use crate::db::registry::Connection;
use crate::db::Dialect;
use crate::web::handlers::error_response;
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub tables: BTreeMap<String, TableInfo>,
    pub database_type: Dialect,
    pub last_updated: DateTime<Utc>,
}

impl From<SchemaInfo> for SchemaResponse {
    fn from(schema: SchemaInfo) -> Self {
        Self {
            tables: schema.tables,
            database_type: schema.database_type,
            last_updated: Utc::now(),
        }
    }
}

async fn lookup(
    state: &AppState,
    connection_id: &str,
) -> Result<Arc<Connection>, (StatusCode, String)> {
    state
        .registry
        .get(connection_id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "Connection not found".to_string()))
}

pub async fn get_schema(
    State(state): State<Arc<AppState>>,
    Path(connection_id): Path<String>,
) -> Result<Json<SchemaResponse>, (StatusCode, String)> {
    let connection = lookup(&state, &connection_id).await?;

    let schema = connection.introspect().await.map_err(|err| {
        error!("schema retrieval failed: {}", err);
        error_response(err)
    })?;

    Ok(Json(schema.into()))
}

pub async fn list_tables(
    State(state): State<Arc<AppState>>,
    Path(connection_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let connection = lookup(&state, &connection_id).await?;

    let schema = connection.introspect().await.map_err(|err| {
        error!("table listing failed: {}", err);
        error_response(err)
    })?;

    let tables: Vec<&String> = schema.tables.keys().collect();
    Ok(Json(json!({
        "tables": tables,
        "count": schema.tables.len()
    })))
}

pub async fn get_table_info(
    State(state): State<Arc<AppState>>,
    Path((connection_id, table_name)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let connection = lookup(&state, &connection_id).await?;

    let schema = connection.introspect().await.map_err(|err| {
        error!("table info retrieval failed: {}", err);
        error_response(err)
    })?;

    let table = schema.tables.get(&table_name).ok_or((
        StatusCode::NOT_FOUND,
        format!("Table '{}' not found", table_name),
    ))?;

    Ok(Json(json!({
        "table_name": table_name,
        "table_info": table
    })))
}
