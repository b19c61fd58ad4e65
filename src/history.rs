use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::viz::VisualizationType;

/// Natural-language text recorded for queries that bypassed the NL engine.
pub const RAW_SQL_QUERY: &str = "Raw SQL Query";

/// Immutable record of one executed query. Reruns mint a fresh id; the
/// original entry is never touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query_id: String,
    pub original_query: String,
    pub generated_sql: String,
    pub connection_id: String,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock execution time in seconds.
    pub execution_time: f64,
    pub row_count: usize,
    pub visualization_type: VisualizationType,
}

/// In-memory query history. Entries live for the process lifetime unless
/// deleted, or evicted oldest-first when a retention cap is configured.
pub struct HistoryStore {
    entries: RwLock<HashMap<String, HistoryEntry>>,
    max_entries: Option<usize>,
}

impl HistoryStore {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    pub async fn record(&self, entry: HistoryEntry) {
        let mut entries = self.entries.write().await;
        entries.insert(entry.query_id.clone(), entry);

        if let Some(cap) = self.max_entries {
            while entries.len() > cap {
                let oldest = entries
                    .values()
                    .min_by_key(|e| e.timestamp)
                    .map(|e| e.query_id.clone());
                match oldest {
                    Some(id) => {
                        debug!(query_id = %id, "evicting oldest history entry");
                        entries.remove(&id);
                    }
                    None => break,
                }
            }
        }
    }

    pub async fn get(&self, query_id: &str) -> Option<HistoryEntry> {
        self.entries.read().await.get(query_id).cloned()
    }

    /// Entries sorted newest-first, optionally filtered by connection id.
    pub async fn list(&self, connection_id: Option<&str>, limit: usize) -> Vec<HistoryEntry> {
        let entries = self.entries.read().await;
        let mut listed: Vec<HistoryEntry> = entries
            .values()
            .filter(|entry| {
                connection_id
                    .map(|id| entry.connection_id == id)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        listed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        listed.truncate(limit);
        listed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Removes an entry; reports whether it existed.
    pub async fn delete(&self, query_id: &str) -> bool {
        self.entries.write().await.remove(query_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(id: &str, connection: &str, age_secs: i64) -> HistoryEntry {
        HistoryEntry {
            query_id: id.to_string(),
            original_query: "how many users".to_string(),
            generated_sql: "SELECT COUNT(*) FROM users".to_string(),
            connection_id: connection.to_string(),
            timestamp: Utc::now() - Duration::seconds(age_secs),
            execution_time: 0.01,
            row_count: 1,
            visualization_type: VisualizationType::Kpi,
        }
    }

    #[tokio::test]
    async fn record_get_delete_round_trip() {
        let store = HistoryStore::new(None);
        store.record(entry("a", "db1", 0)).await;

        assert!(store.get("a").await.is_some());
        assert!(store.delete("a").await);
        assert!(store.get("a").await.is_none());
        assert!(!store.delete("a").await);
    }

    #[tokio::test]
    async fn list_sorts_newest_first_and_filters_by_connection() {
        let store = HistoryStore::new(None);
        store.record(entry("old", "db1", 30)).await;
        store.record(entry("new", "db1", 0)).await;
        store.record(entry("other", "db2", 10)).await;

        let all = store.list(None, 50).await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].query_id, "new");
        assert_eq!(all[2].query_id, "old");

        let db1 = store.list(Some("db1"), 50).await;
        assert_eq!(db1.len(), 2);
        assert!(db1.iter().all(|e| e.connection_id == "db1"));

        let limited = store.list(None, 1).await;
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].query_id, "new");
    }

    #[tokio::test]
    async fn retention_cap_evicts_oldest() {
        let store = HistoryStore::new(Some(2));
        store.record(entry("a", "db1", 20)).await;
        store.record(entry("b", "db1", 10)).await;
        store.record(entry("c", "db1", 0)).await;

        assert!(store.get("a").await.is_none());
        assert!(store.get("b").await.is_some());
        assert!(store.get("c").await.is_some());
    }
}
