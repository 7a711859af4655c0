//! In-process row store. Backs `STORE_BACKEND=memory` and the test suite.

use super::gateway::{Filter, Record, StoreGateway};
use crate::error::BillingResult;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<Record>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert rows as-is (ids included), for fixtures.
    pub async fn seed(&self, collection: &str, rows: impl IntoIterator<Item = Record>) {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(rows);
    }

    pub async fn rows(&self, collection: &str) -> Vec<Record> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn next_id(rows: &[Record]) -> i64 {
        rows.iter()
            .filter_map(|row| row.get("id").and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1
    }
}

#[async_trait]
impl StoreGateway for InMemoryStore {
    async fn get(&self, collection: &str, filter: &Filter) -> BillingResult<Vec<Record>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, mut record: Record) -> BillingResult<Record> {
        let mut collections = self.collections.write().await;
        let rows = collections.entry(collection.to_string()).or_default();

        if record.get("id").map_or(true, Value::is_null) {
            record.insert("id".to_string(), Value::from(Self::next_id(rows)));
        }
        record
            .entry("version".to_string())
            .or_insert_with(|| Value::from(1));

        rows.push(record.clone());
        Ok(record)
    }

    async fn update_where(
        &self,
        collection: &str,
        filter: &Filter,
        partial: Record,
    ) -> BillingResult<Vec<Record>> {
        // Match and write under one lock so a guard cannot go stale in between.
        let mut collections = self.collections.write().await;
        let Some(rows) = collections.get_mut(collection) else {
            return Ok(Vec::new());
        };

        let mut changed = Vec::new();
        for row in rows.iter_mut().filter(|r| filter.matches(r)) {
            for (key, value) in &partial {
                row.insert(key.clone(), value.clone());
            }
            changed.push(row.clone());
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids_and_version() {
        let store = InMemoryStore::new();

        let first = store.insert("tickets_tb", record(json!({"a": 1}))).await.unwrap();
        let second = store.insert("tickets_tb", record(json!({"a": 2}))).await.unwrap();

        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
        assert_eq!(second["version"], 1);
    }

    #[tokio::test]
    async fn test_get_one_and_missing() {
        let store = InMemoryStore::new();
        store.insert("bills", record(json!({"status": "Open"}))).await.unwrap();

        assert!(store.get_one("bills", 1).await.unwrap().is_some());
        assert!(store.get_one("bills", 2).await.unwrap().is_none());
        assert!(store.get_one("payments", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_guarded_update_applies_once() {
        let store = InMemoryStore::new();
        store
            .insert("payments", record(json!({"status": "Pending"})))
            .await
            .unwrap();

        let guard = Filter::by_id(1).eq("status", "Pending");
        let approve = record(json!({"status": "Approved"}));

        let first = store
            .update_where("payments", &guard, approve.clone())
            .await
            .unwrap();
        let second = store.update_where("payments", &guard, approve).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0]["status"], "Approved");
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_row_changes_nothing() {
        let store = InMemoryStore::new();
        let updated = store
            .update_where("bills", &Filter::by_id(9), record(json!({"status": "Paid"})))
            .await
            .unwrap();
        assert!(updated.is_empty());
    }
}
