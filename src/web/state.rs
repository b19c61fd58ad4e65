use chrono::Utc;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::time::Instant;
use tracing::info;

use crate::config::AppConfig;
use crate::db::registry::ConnectionRegistry;
use crate::error::{AppError, AppResult};
use crate::history::{HistoryEntry, HistoryStore};
use crate::llm::LlmManager;
use crate::viz::{self, VisualizationType};

/// Shared application state: the connection registry, the NL-to-SQL engine
/// and the query history, owned here and handed to handlers behind an Arc.
pub struct AppState {
    pub config: AppConfig,
    pub registry: ConnectionRegistry,
    pub llm: LlmManager,
    pub history: HistoryStore,
    pub startup_time: chrono::DateTime<Utc>,
}

/// A completed execution: the recorded history entry plus the fresh rows it
/// was derived from. History itself never caches row data.
#[derive(Debug)]
pub struct ExecutedQuery {
    pub entry: HistoryEntry,
    pub data: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
}

impl AppState {
    pub fn new(config: AppConfig, llm: LlmManager) -> Self {
        let history = HistoryStore::new(config.history.max_entries);
        Self {
            config,
            registry: ConnectionRegistry::new(),
            llm,
            history,
            startup_time: Utc::now(),
        }
    }

    /// The shared execution pipeline behind natural-language queries, raw
    /// SQL and history reruns: re-validate the connection, probe liveness,
    /// execute read-only, time it, resolve the visualization and record a
    /// fresh history entry.
    pub async fn execute_recorded(
        &self,
        connection_id: &str,
        original_query: &str,
        sql: &str,
        visualization_hint: Option<&str>,
    ) -> AppResult<ExecutedQuery> {
        let connection = self
            .registry
            .get(connection_id)
            .await
            .ok_or_else(|| AppError::UnknownConnection(connection_id.to_string()))?;

        if !connection.test().await {
            return Err(AppError::ConnectionFailure(
                "Database connection is not available".to_string(),
            ));
        }

        let start = Instant::now();
        let data = connection.pool.execute(sql).await?;
        let execution_time = start.elapsed().as_secs_f64();

        let columns: Vec<String> = data
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();

        // Trust the model's hint only if it names a known chart type;
        // otherwise fall back to the shape heuristic.
        let visualization_type = visualization_hint
            .and_then(|hint| VisualizationType::from_str(hint).ok())
            .unwrap_or_else(|| viz::suggest(&data, &columns));

        let entry = HistoryEntry {
            query_id: uuid::Uuid::new_v4().to_string(),
            original_query: original_query.to_string(),
            generated_sql: sql.to_string(),
            connection_id: connection_id.to_string(),
            timestamp: Utc::now(),
            execution_time,
            row_count: data.len(),
            visualization_type,
        };
        self.history.record(entry.clone()).await;

        info!(
            connection_id,
            query_id = %entry.query_id,
            rows = entry.row_count,
            "query executed and recorded"
        );

        Ok(ExecutedQuery {
            entry,
            data,
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ConnectionSpec, Dialect};

    fn test_state() -> AppState {
        let config = AppConfig::default();
        // lmstudio mode never validates credentials at construction time
        let llm_config = crate::config::LlmConfig {
            provider: "lmstudio".to_string(),
            model: "local-model".to_string(),
            api_key: None,
            api_url: None,
            temperature: 0.1,
            max_tokens: 1000,
        };
        let llm = LlmManager::new(&llm_config).unwrap();
        AppState::new(config, llm)
    }

    fn temp_db_path() -> String {
        std::env::temp_dir()
            .join(format!("nl_lens_state_{}.db", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned()
    }

    async fn register_sqlite(state: &AppState, id: &str, path: &str) {
        let spec = ConnectionSpec {
            dialect: Dialect::Sqlite,
            host: None,
            port: None,
            database: path.to_string(),
            username: None,
            password: None,
            connection_string: None,
        };
        state.registry.register(id, &spec).await.unwrap();
    }

    #[tokio::test]
    async fn records_an_entry_per_execution() {
        let state = test_state();
        let path = temp_db_path();
        register_sqlite(&state, "db", &path).await;

        let connection = state.registry.get("db").await.unwrap();
        if let crate::db::pool::DbPool::Sqlite(raw) = &connection.pool {
            sqlx::query("CREATE TABLE t (n INTEGER)")
                .execute(raw)
                .await
                .unwrap();
            sqlx::query("INSERT INTO t (n) VALUES (42)")
                .execute(raw)
                .await
                .unwrap();
        }

        let executed = state
            .execute_recorded("db", crate::history::RAW_SQL_QUERY, "SELECT n FROM t", None)
            .await
            .unwrap();

        assert_eq!(executed.entry.row_count, 1);
        assert_eq!(executed.columns, vec!["n"]);
        // one row, one column: the heuristic calls it a KPI
        assert_eq!(executed.entry.visualization_type, VisualizationType::Kpi);
        assert!(state.history.get(&executed.entry.query_id).await.is_some());

        state.registry.remove("db").await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn rerun_style_execution_mints_a_new_id() {
        let state = test_state();
        let path = temp_db_path();
        register_sqlite(&state, "db", &path).await;

        let first = state
            .execute_recorded("db", "q", "SELECT 1 AS one", None)
            .await
            .unwrap();
        let second = state
            .execute_recorded(
                "db",
                &first.entry.original_query,
                &first.entry.generated_sql,
                Some(first.entry.visualization_type.as_str()),
            )
            .await
            .unwrap();

        assert_ne!(first.entry.query_id, second.entry.query_id);
        assert_eq!(first.entry.generated_sql, second.entry.generated_sql);
        // the original entry is untouched
        assert!(state.history.get(&first.entry.query_id).await.is_some());

        state.registry.remove("db").await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn unknown_connection_is_reported_as_such() {
        let state = test_state();
        let err = state
            .execute_recorded("ghost", "q", "SELECT 1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownConnection(_)));
    }
}
