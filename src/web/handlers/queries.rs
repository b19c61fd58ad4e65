use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

use crate::history::{HistoryEntry, RAW_SQL_QUERY};
use crate::llm::AiStatus;
use crate::viz::VisualizationType;
use crate::web::handlers::error_response;
use crate::web::state::{AppState, ExecutedQuery};

#[derive(Debug, Deserialize)]
pub struct NlQueryRequest {
    pub query: String,
    pub connection_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RawSqlRequest {
    pub connection_id: String,
    pub sql: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub connection_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueryResult {
    pub query_id: String,
    pub original_query: String,
    pub generated_sql: String,
    pub data: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub execution_time: f64,
    pub visualization_type: VisualizationType,
    pub timestamp: DateTime<Utc>,
}

impl From<ExecutedQuery> for QueryResult {
    fn from(executed: ExecutedQuery) -> Self {
        let ExecutedQuery {
            entry,
            data,
            columns,
        } = executed;
        Self {
            query_id: entry.query_id,
            original_query: entry.original_query,
            generated_sql: entry.generated_sql,
            data,
            columns,
            row_count: entry.row_count,
            execution_time: entry.execution_time,
            visualization_type: entry.visualization_type,
            timestamp: entry.timestamp,
        }
    }
}

/// AI service status and connectivity probe.
pub async fn ai_status(State(state): State<Arc<AppState>>) -> Json<AiStatus> {
    Json(state.llm.test_connectivity().await)
}

/// The main entry point: natural language in, executed result out.
pub async fn execute_natural_language_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NlQueryRequest>,
) -> Result<Json<QueryResult>, (StatusCode, String)> {
    debug!(connection_id = %payload.connection_id, "NL query: {}", payload.query);

    let connection = state
        .registry
        .get(&payload.connection_id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "Connection not found".to_string()))?;

    if !connection.test().await {
        return Err((
            StatusCode::BAD_REQUEST,
            "Database connection is not available".to_string(),
        ));
    }

    let schema = connection.introspect().await.map_err(|err| {
        error!("query execution failed: {}", err);
        error_response(err)
    })?;

    let generated = state
        .llm
        .generate(&payload.query, &schema)
        .await
        .map_err(|err| {
            error!("query execution failed: {}", err);
            error_response(err)
        })?;

    let executed = state
        .execute_recorded(
            &payload.connection_id,
            &payload.query,
            &generated.sql,
            Some(&generated.visualization_hint),
        )
        .await
        .map_err(|err| {
            error!("query execution failed: {}", err);
            error_response(err)
        })?;

    Ok(Json(executed.into()))
}

pub async fn get_query_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<HistoryEntry>> {
    let limit = params.limit.unwrap_or(50);
    let history = state
        .history
        .list(params.connection_id.as_deref(), limit)
        .await;
    Json(history)
}

pub async fn get_query_by_id(
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<String>,
) -> Result<Json<HistoryEntry>, (StatusCode, String)> {
    state
        .history
        .get(&query_id)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Query not found".to_string()))
}

/// Re-executes the stored SQL — not a fresh generation — and records the
/// result under a new id. The original entry stays as it was.
pub async fn rerun_query(
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<String>,
) -> Result<Json<QueryResult>, (StatusCode, String)> {
    let entry = state
        .history
        .get(&query_id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "Query not found".to_string()))?;

    let executed = state
        .execute_recorded(
            &entry.connection_id,
            &entry.original_query,
            &entry.generated_sql,
            Some(entry.visualization_type.as_str()),
        )
        .await
        .map_err(|err| {
            error!("query rerun failed: {}", err);
            error_response(err)
        })?;

    Ok(Json(executed.into()))
}

pub async fn delete_query(
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if !state.history.delete(&query_id).await {
        return Err((StatusCode::NOT_FOUND, "Query not found".to_string()));
    }

    Ok(Json(json!({
        "message": format!("Query {} deleted from history", query_id)
    })))
}

/// Raw SQL for advanced users; bypasses the NL engine but not the read-only
/// gate, and is recorded under the sentinel natural-language text.
pub async fn execute_raw_sql(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RawSqlRequest>,
) -> Result<Json<QueryResult>, (StatusCode, String)> {
    let executed = state
        .execute_recorded(&payload.connection_id, RAW_SQL_QUERY, &payload.sql, None)
        .await
        .map_err(|err| {
            error!("raw SQL execution failed: {}", err);
            error_response(err)
        })?;

    Ok(Json(executed.into()))
}
