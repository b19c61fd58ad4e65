use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::db::introspect::{self, SchemaInfo};
use crate::db::pool::DbPool;
use crate::db::{ConnectionSpec, Dialect};
use crate::error::{AppError, AppResult};

/// One registered database, fully usable by construction: it only enters the
/// registry after the pool opened and the liveness probe passed.
#[derive(Debug)]
pub struct Connection {
    pub dialect: Dialect,
    pub database: String,
    pub pool: DbPool,
}

impl Connection {
    /// Re-runs the liveness probe. Never errors; failure is `false`.
    pub async fn test(&self) -> bool {
        self.pool.ping().await.is_ok()
    }

    pub async fn introspect(&self) -> AppResult<SchemaInfo> {
        introspect::introspect(&self.pool, self.dialect).await
    }
}

/// Registry of live connections, keyed by caller-supplied id. All mutation
/// goes through the lock; concurrent query execution on distinct connections
/// never contends beyond the brief map read.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection under `id`, all-or-nothing: the pool is opened
    /// and probed before anything is stored, so a failed registration leaves
    /// no entry behind. Re-registering an existing id closes the displaced
    /// pool before the new one takes its place.
    pub async fn register(&self, id: &str, spec: &ConnectionSpec) -> AppResult<()> {
        let pool = DbPool::connect(spec).await?;
        pool.ping()
            .await
            .map_err(|e| AppError::ConnectionFailure(e.to_string()))?;

        let connection = Arc::new(Connection {
            dialect: spec.dialect,
            database: spec.database.clone(),
            pool,
        });

        let displaced = {
            let mut connections = self.connections.write().await;
            connections.insert(id.to_string(), connection)
        };

        if let Some(old) = displaced {
            warn!(connection_id = id, "replacing existing connection");
            old.pool.close().await;
        }

        info!(connection_id = id, dialect = %spec.dialect, "connection registered");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.read().await.get(id).cloned()
    }

    /// Disposes the pool and drops the entry. Idempotent when absent.
    pub async fn remove(&self, id: &str) {
        let removed = self.connections.write().await.remove(id);
        if let Some(connection) = removed {
            connection.pool.close().await;
            info!(connection_id = id, "connection removed");
        }
    }

    pub async fn list(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    /// Liveness probe by id; absent ids are simply not alive.
    pub async fn test(&self, id: &str) -> bool {
        match self.get(id).await {
            Some(connection) => connection.test().await,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn temp_db_path() -> String {
        std::env::temp_dir()
            .join(format!("nl_lens_registry_{}.db", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned()
    }

    #[tokio::test]
    async fn register_then_test_then_remove_round_trip() {
        let registry = ConnectionRegistry::new();
        let path = temp_db_path();

        registry.register("demo", &sqlite_spec(&path)).await.unwrap();
        assert!(registry.test("demo").await);
        assert_eq!(registry.list().await, vec!["demo".to_string()]);

        registry.remove("demo").await;
        assert!(registry.get("demo").await.is_none());
        assert!(!registry.test("demo").await);

        // idempotent removal
        registry.remove("demo").await;

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn failed_registration_stores_nothing() {
        let registry = ConnectionRegistry::new();
        let spec = ConnectionSpec {
            dialect: Dialect::Postgresql,
            host: Some("127.0.0.1".to_string()),
            port: Some(1), // nothing listens here
            database: "nope".to_string(),
            username: Some("u".to_string()),
            password: Some("p".to_string()),
            connection_string: None,
        };

        let result = registry.register("broken", &spec).await;
        assert!(matches!(result, Err(AppError::ConnectionFailure(_))));
        assert!(registry.get("broken").await.is_none());
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn re_registering_replaces_the_entry() {
        let registry = ConnectionRegistry::new();
        let first = temp_db_path();
        let second = temp_db_path();

        registry.register("demo", &sqlite_spec(&first)).await.unwrap();
        registry.register("demo", &sqlite_spec(&second)).await.unwrap();

        let connection = registry.get("demo").await.unwrap();
        assert_eq!(connection.database, second);
        assert_eq!(registry.list().await.len(), 1);

        registry.remove("demo").await;
        let _ = std::fs::remove_file(&first);
        let _ = std::fs::remove_file(&second);
    }
}
