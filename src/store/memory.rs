use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Cursor, KvStore, ListPage, StoreError};

/// Reference [`KvStore`] backed by an in-process ordered map.
///
/// Stands in for the embedding host's key-value storage (spec'd but not
/// owned by this crate) so the graph and identity layers are exercisable
/// and testable on their own. `BTreeMap` gives ascending lexicographic
/// iteration without extra sorting work on every `list` call.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKvStore {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn list(
        &self,
        prefix: &str,
        limit: usize,
        cursor: Option<Cursor>,
    ) -> Result<ListPage, StoreError> {
        let data = self.data.read().await;
        let start = match &cursor {
            Some(Cursor(last_key)) => Bound::Excluded(last_key.clone()),
            None => Bound::Included(prefix.to_string()),
        };

        // fetch one past `limit` so we can tell whether more keys remain
        // without a second round trip.
        let mut fetched: Vec<String> = Vec::new();
        for (key, _) in data.range((start, Bound::Unbounded)) {
            if !key.starts_with(prefix) {
                break;
            }
            fetched.push(key.clone());
            if fetched.len() > limit {
                break;
            }
        }

        let complete = fetched.len() <= limit;
        fetched.truncate(limit);
        let next_cursor = if complete {
            None
        } else {
            fetched.last().cloned().map(Cursor)
        };

        Ok(ListPage {
            keys: fetched,
            next_cursor,
            complete,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_paginates_within_prefix() {
        let store = InMemoryKvStore::new();
        for i in 0..5 {
            store.put(&format!("n:{i}"), vec![i as u8]).await.unwrap();
        }
        store.put("z:other", vec![9]).await.unwrap();

        let page1 = store.list("n:", 2, None).await.unwrap();
        assert_eq!(page1.keys, vec!["n:0", "n:1"]);
        assert!(!page1.complete);
        let cursor = page1.next_cursor.expect("has more");

        let page2 = store.list("n:", 2, Some(cursor)).await.unwrap();
        assert_eq!(page2.keys, vec!["n:2", "n:3"]);
        assert!(!page2.complete);

        let page3 = store.list("n:", 2, page2.next_cursor).await.unwrap();
        assert_eq!(page3.keys, vec!["n:4"]);
        assert!(page3.complete);
        assert!(page3.next_cursor.is_none());
    }

    #[tokio::test]
    async fn get_put_delete_roundtrip() {
        let store = InMemoryKvStore::new();
        assert!(store.get("k").await.unwrap().is_none());
        store.put("k", b"v".to_vec()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        // delete of an absent key does not error
        store.delete("k").await.unwrap();
    }
}
