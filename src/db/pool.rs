use serde_json::{Map, Value};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::db::{ConnectionSpec, Dialect, value};
use crate::error::{AppError, AppResult};

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
/// Recycle pooled connections after an hour so we never sit on a server-side
/// connection limit with stale sockets.
const MAX_LIFETIME: Duration = Duration::from_secs(3600);

/// A pooled connection to one database, dispatched by dialect.
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    /// Opens a pool for the spec's target. Pools verify connections before
    /// handing them out (pre-ping), so a dropped socket is replaced instead
    /// of surfacing as a query failure.
    pub async fn connect(spec: &ConnectionSpec) -> AppResult<Self> {
        let url = spec.descriptor();
        debug!(dialect = %spec.dialect, "opening connection pool");

        let pool = match spec.dialect {
            Dialect::Mysql | Dialect::Mariadb => MySqlPoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .acquire_timeout(ACQUIRE_TIMEOUT)
                .max_lifetime(MAX_LIFETIME)
                .test_before_acquire(true)
                .connect(&url)
                .await
                .map(DbPool::MySql),
            Dialect::Postgresql => PgPoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .acquire_timeout(ACQUIRE_TIMEOUT)
                .max_lifetime(MAX_LIFETIME)
                .test_before_acquire(true)
                .connect(&url)
                .await
                .map(DbPool::Postgres),
            Dialect::Sqlite => {
                let options = SqliteConnectOptions::from_str(&url)
                    .map_err(|e| AppError::ConnectionFailure(e.to_string()))?
                    .create_if_missing(true);
                SqlitePoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .max_lifetime(MAX_LIFETIME)
                    .test_before_acquire(true)
                    .connect_with(options)
                    .await
                    .map(DbPool::Sqlite)
            }
        };

        pool.map_err(|e| AppError::ConnectionFailure(e.to_string()))
    }

    /// Trivial liveness probe.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        match self {
            DbPool::MySql(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
            DbPool::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
            DbPool::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
        }
    }

    /// Executes a read-only query and materializes every row as a mapping of
    /// column name to plain JSON scalar.
    pub async fn execute(&self, sql: &str) -> AppResult<Vec<Map<String, Value>>> {
        ensure_select(sql)?;

        match self {
            DbPool::MySql(pool) => {
                let rows = sqlx::query(sql)
                    .fetch_all(pool)
                    .await
                    .map_err(|e| AppError::QueryFailed(e.to_string()))?;
                rows.iter().map(value::mysql_row_to_object).collect()
            }
            DbPool::Postgres(pool) => {
                let rows = sqlx::query(sql)
                    .fetch_all(pool)
                    .await
                    .map_err(|e| AppError::QueryFailed(e.to_string()))?;
                rows.iter().map(value::pg_row_to_object).collect()
            }
            DbPool::Sqlite(pool) => {
                let rows = sqlx::query(sql)
                    .fetch_all(pool)
                    .await
                    .map_err(|e| AppError::QueryFailed(e.to_string()))?;
                rows.iter().map(value::sqlite_row_to_object).collect()
            }
        }
    }

    /// Disposes the pool, releasing all held sockets.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::Sqlite(pool) => pool.close().await,
        }
    }
}

/// The read-only gate: whitespace-normalized, case-folded text must start
/// with SELECT. This is a textual check, not a parser. Crafted input such as
/// multi-statement payloads can pass it; backends without multi-statement
/// support reject those at execution.
pub fn ensure_select(sql: &str) -> AppResult<()> {
    let canonical = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if canonical.to_uppercase().starts_with("SELECT") {
        Ok(())
    } else {
        Err(AppError::PolicyViolation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_accepts_leading_whitespace_and_lowercase() {
        assert!(ensure_select("  select * from t").is_ok());
        assert!(ensure_select("\n\tSELECT 1").is_ok());
    }

    #[test]
    fn gate_rejects_non_select_statements() {
        assert!(matches!(
            ensure_select("DELETE FROM t"),
            Err(AppError::PolicyViolation)
        ));
        assert!(matches!(
            ensure_select("DROP TABLE t"),
            Err(AppError::PolicyViolation)
        ));
        assert!(matches!(ensure_select(""), Err(AppError::PolicyViolation)));
    }

    #[test]
    fn gate_is_textual_only() {
        // Multi-statement payloads pass the gate; that weakness is part of
        // the contract and documented, not silently hardened.
        assert!(ensure_select("SELECT 1; DROP TABLE t").is_ok());
    }

    fn temp_db_path() -> String {
        std::env::temp_dir()
            .join(format!("nl_lens_pool_{}.db", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned()
    }

    fn sqlite_spec(path: &str) -> ConnectionSpec {
        ConnectionSpec {
            dialect: Dialect::Sqlite,
            host: None,
            port: None,
            database: path.to_string(),
            username: None,
            password: None,
            connection_string: None,
        }
    }

    #[tokio::test]
    async fn executes_select_and_materializes_rows() {
        let path = temp_db_path();
        let pool = DbPool::connect(&sqlite_spec(&path)).await.unwrap();

        if let DbPool::Sqlite(raw) = &pool {
            sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
                .execute(raw)
                .await
                .unwrap();
            sqlx::query("INSERT INTO users (id, name) VALUES (1, 'ada'), (2, 'grace')")
                .execute(raw)
                .await
                .unwrap();
        }

        let rows = pool.execute("SELECT id, name FROM users ORDER BY id").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], serde_json::json!(1));
        assert_eq!(rows[0]["name"], serde_json::json!("ada"));
        // column order survives materialization
        let columns: Vec<&String> = rows[0].keys().collect();
        assert_eq!(columns, vec!["id", "name"]);

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn execute_rejects_writes_before_touching_the_database() {
        let path = temp_db_path();
        let pool = DbPool::connect(&sqlite_spec(&path)).await.unwrap();

        let err = pool.execute("DELETE FROM anything").await.unwrap_err();
        assert!(matches!(err, AppError::PolicyViolation));

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
