//! In-process document store
//!
//! Backs the development server and every test suite. Each call counts as
//! one operation, which lets tests assert that a rejected request never
//! reached the store.

use crate::errors::StoreError;
use crate::store::{Collection, Document, DocumentStore, Filter, FindOptions};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, Document>>>,
    operations: AtomicU64,
    failure: RwLock<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store calls served so far
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail with `message`, or recover with `None`
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.write() = message.map(str::to_string);
    }

    fn begin(&self, collection: Collection, operation: &'static str) -> Result<(), StoreError> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        match self.failure.read().as_ref() {
            Some(message) => Err(StoreError {
                collection: collection.as_str().to_string(),
                operation,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.begin(collection, "findById")?;
        let collections = self.collections.read();
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.begin(collection, "find")?;
        let collections = self.collections.read();
        let mut matched: Vec<Document> = collections
            .get(&collection)
            .map(|docs| docs.values().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();

        if let Some(sort) = &options.sort {
            matched.sort_by(|a, b| sort.compare(a, b));
        }

        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(options.skip).take(limit).collect())
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        self.begin(collection, "count")?;
        let collections = self.collections.read();
        Ok(collections
            .get(&collection)
            .map(|docs| docs.values().filter(|d| filter.matches(d)).count() as u64)
            .unwrap_or(0))
    }

    async fn insert(
        &self,
        collection: Collection,
        document: Document,
    ) -> Result<Document, StoreError> {
        self.begin(collection, "insert")?;
        let id = match document.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                return Err(StoreError {
                    collection: collection.as_str().to_string(),
                    operation: "insert",
                    message: "document has no string id".to_string(),
                })
            }
        };

        let mut collections = self.collections.write();
        let docs = collections.entry(collection).or_default();
        if docs.contains_key(&id) {
            return Err(StoreError {
                collection: collection.as_str().to_string(),
                operation: "insert",
                message: format!("duplicate id {id}"),
            });
        }
        docs.insert(id, document.clone());
        Ok(document)
    }

    async fn update_by_id(
        &self,
        collection: Collection,
        id: &str,
        patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        self.begin(collection, "updateById")?;
        let mut collections = self.collections.write();
        let Some(existing) = collections.get_mut(&collection).and_then(|d| d.get_mut(id)) else {
            return Ok(None);
        };
        for (key, value) in patch {
            if key != "id" {
                existing.insert(key, value);
            }
        }
        Ok(Some(existing.clone()))
    }

    async fn delete_by_id(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        self.begin(collection, "deleteById")?;
        let mut collections = self.collections.write();
        Ok(collections
            .get_mut(&collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn delete_many(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        self.begin(collection, "deleteMany")?;
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|_, d| !filter.matches(d));
        Ok((before - docs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Sort;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_find_update_delete() {
        let store = MemoryStore::new();
        store
            .insert(Collection::Posts, doc(json!({"id": "p1", "title": "a"})))
            .await
            .unwrap();

        let found = store.find_by_id(Collection::Posts, "p1").await.unwrap();
        assert_eq!(found.unwrap()["title"], "a");

        let updated = store
            .update_by_id(Collection::Posts, "p1", doc(json!({"title": "b", "id": "zz"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["title"], "b");
        assert_eq!(updated["id"], "p1");

        assert!(store.delete_by_id(Collection::Posts, "p1").await.unwrap());
        assert!(!store.delete_by_id(Collection::Posts, "p1").await.unwrap());
        assert_eq!(store.operation_count(), 5);
    }

    #[tokio::test]
    async fn test_find_sorts_skips_and_limits() {
        let store = MemoryStore::new();
        for (id, at) in [("a", 1), ("b", 3), ("c", 2), ("d", 4)] {
            store
                .insert(Collection::Posts, doc(json!({"id": id, "at": at, "author": "u"})))
                .await
                .unwrap();
        }

        let page = store
            .find(
                Collection::Posts,
                &Filter::new().with("author", "u"),
                FindOptions::default()
                    .sort(Sort::descending("at"))
                    .skip(1)
                    .limit(2),
            )
            .await
            .unwrap();
        let ids: Vec<_> = page.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_ids_are_rejected() {
        let store = MemoryStore::new();
        assert!(store
            .insert(Collection::Users, doc(json!({"name": "x"})))
            .await
            .is_err());
        store
            .insert(Collection::Users, doc(json!({"id": "u1"})))
            .await
            .unwrap();
        assert!(store
            .insert(Collection::Users, doc(json!({"id": "u1"})))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_delete_many_and_count() {
        let store = MemoryStore::new();
        for (id, post) in [("c1", "p1"), ("c2", "p1"), ("c3", "p2")] {
            store
                .insert(Collection::Comments, doc(json!({"id": id, "postId": post})))
                .await
                .unwrap();
        }
        let filter = Filter::new().with("postId", "p1");
        assert_eq!(store.count(Collection::Comments, &filter).await.unwrap(), 2);
        assert_eq!(store.delete_many(Collection::Comments, &filter).await.unwrap(), 2);
        assert_eq!(
            store.count(Collection::Comments, &Filter::new()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryStore::new();
        store.set_failure(Some("disk on fire"));
        let err = store.find_by_id(Collection::Users, "u1").await.unwrap_err();
        assert_eq!(err.operation, "findById");
        assert_eq!(err.collection, "users");
        store.set_failure(None);
        assert!(store.find_by_id(Collection::Users, "u1").await.is_ok());
    }
}
