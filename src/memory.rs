use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// Tuning for interaction recall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Records older than this window are dropped from search results.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Maximum number of records returned per lookup.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

fn default_retention_days() -> u32 {
    30
}

fn default_search_limit() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            search_limit: default_search_limit(),
        }
    }
}

/// Record-oriented storage behind the memory manager. Records are free-form
/// JSON objects; the `type` field names the collection they belong to.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn insert(&self, record: Value) -> Result<()>;

    async fn search(&self, collection: &str, query: &str, limit: usize) -> Result<Vec<Value>>;

    async fn clear(&self) -> Result<()>;
}

/// Keyword-overlap store for development and tests.
///
/// A collection name is the plural of the record `type` field: a record
/// with `"type": "interaction"` belongs to the `interactions` collection.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<Value>>,
    retention: Option<Duration>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits search results to records younger than `days`.
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention = Some(Duration::from_secs(u64::from(days) * 86_400));
        self
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn insert(&self, record: Value) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn search(&self, collection: &str, query: &str, limit: usize) -> Result<Vec<Value>> {
        let cutoff = self
            .retention
            .map(|window| unix_now().saturating_sub(window.as_secs()));
        let records = self.records.read().await;

        let mut scored: Vec<(usize, &Value)> = records
            .iter()
            .filter(|record| in_collection(record, collection))
            .filter(|record| cutoff.map_or(true, |cutoff| timestamp(record) >= cutoff))
            .filter_map(|record| {
                let score = keyword_overlap(record, query);
                (score > 0).then_some((score, record))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }
}

fn in_collection(record: &Value, collection: &str) -> bool {
    record
        .get("type")
        .and_then(Value::as_str)
        .map_or(false, |kind| collection.trim_end_matches('s') == kind)
}

fn timestamp(record: &Value) -> u64 {
    record.get("timestamp").and_then(Value::as_u64).unwrap_or(0)
}

fn keyword_overlap(record: &Value, query: &str) -> usize {
    let haystack = record
        .as_object()
        .map(|fields| {
            fields
                .values()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase()
        })
        .unwrap_or_default();

    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|token| haystack.contains(token.as_str()))
        .count()
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Interaction history for one agent, kept in a pluggable store.
pub struct MemoryManager {
    store: Arc<dyn MemoryStore>,
    config: MemoryConfig,
}

impl MemoryManager {
    pub fn new(store: Arc<dyn MemoryStore>, config: MemoryConfig) -> Self {
        Self { store, config }
    }

    /// Manager over a process-local store.
    pub fn in_memory(config: MemoryConfig) -> Self {
        let store = InMemoryStore::new().with_retention_days(config.retention_days);
        Self::new(Arc::new(store), config)
    }

    pub async fn add_interaction(&self, user_message: &str, agent_response: &str) -> Result<()> {
        self.store
            .insert(json!({
                "id": Uuid::new_v4(),
                "type": "interaction",
                "user_message": user_message,
                "agent_response": agent_response,
                "timestamp": unix_now(),
            }))
            .await
    }

    pub async fn get_relevant_memories(&self, query: &str) -> Result<Vec<Value>> {
        self.store
            .search("interactions", query, self.config.search_limit)
            .await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recalls_matching_interactions() {
        let manager = MemoryManager::in_memory(MemoryConfig::default());
        manager
            .add_interaction("what is the capital of France?", "Paris.")
            .await
            .unwrap();
        manager
            .add_interaction("explain the borrow checker", "It tracks ownership.")
            .await
            .unwrap();

        let memories = manager.get_relevant_memories("France capital").await.unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(
            memories[0]["user_message"],
            json!("what is the capital of France?")
        );
        assert_eq!(memories[0]["type"], json!("interaction"));
    }

    #[tokio::test]
    async fn respects_search_limit() {
        let config = MemoryConfig {
            search_limit: 1,
            ..MemoryConfig::default()
        };
        let manager = MemoryManager::in_memory(config);
        manager.add_interaction("rust traits", "first").await.unwrap();
        manager.add_interaction("rust lifetimes", "second").await.unwrap();

        let memories = manager.get_relevant_memories("rust").await.unwrap();
        assert_eq!(memories.len(), 1);
    }

    #[tokio::test]
    async fn retention_window_drops_stale_records() {
        let store = Arc::new(InMemoryStore::new().with_retention_days(1));
        store
            .insert(json!({
                "id": "stale",
                "type": "interaction",
                "user_message": "old rust question",
                "agent_response": "old answer",
                "timestamp": 0,
            }))
            .await
            .unwrap();

        let manager = MemoryManager::new(store, MemoryConfig::default());
        manager.add_interaction("new rust question", "fresh").await.unwrap();

        let memories = manager.get_relevant_memories("rust question").await.unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0]["user_message"], json!("new rust question"));
    }

    #[tokio::test]
    async fn unrelated_collections_stay_separate() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert(json!({"type": "note", "text": "rust is fast"}))
            .await
            .unwrap();

        let hits = store.search("interactions", "rust", 5).await.unwrap();
        assert!(hits.is_empty());
        let notes = store.search("notes", "rust", 5).await.unwrap();
        assert_eq!(notes.len(), 1);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let manager = MemoryManager::in_memory(MemoryConfig::default());
        manager.add_interaction("hello", "hi").await.unwrap();
        manager.clear().await.unwrap();

        let memories = manager.get_relevant_memories("hello").await.unwrap();
        assert!(memories.is_empty());
    }
}
