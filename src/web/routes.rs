use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use super::handlers::{connections, exports, queries, schema, status};
use super::state::AppState;

// REST API, one nested router per concern
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            .route("/status", get(status::system_status))
            .nest(
                "/connections",
                Router::new()
                    .route(
                        "/",
                        post(connections::create_connection).get(connections::list_connections),
                    )
                    .route("/{connection_id}", delete(connections::delete_connection))
                    .route("/{connection_id}/test", get(connections::test_connection)),
            )
            .nest(
                "/schema",
                Router::new()
                    .route("/{connection_id}", get(schema::get_schema))
                    .route("/{connection_id}/tables", get(schema::list_tables))
                    .route(
                        "/{connection_id}/tables/{table_name}",
                        get(schema::get_table_info),
                    ),
            )
            .nest(
                "/queries",
                Router::new()
                    .route("/", post(queries::execute_natural_language_query))
                    .route("/ai/status", get(queries::ai_status))
                    .route("/history", get(queries::get_query_history))
                    .route("/sql", post(queries::execute_raw_sql))
                    .route(
                        "/{query_id}",
                        get(queries::get_query_by_id).delete(queries::delete_query),
                    )
                    .route("/{query_id}/rerun", post(queries::rerun_query)),
            )
            .nest(
                "/exports",
                Router::new()
                    .route("/csv/{query_id}", post(exports::export_to_csv))
                    .route("/json/{query_id}", post(exports::export_to_json))
                    .route("/templates", get(exports::get_query_templates)),
            ),
    )
}
