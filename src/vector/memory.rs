use crate::error::Result;
use crate::vector::{cosine_similarity, VectorMatch, VectorRecord, VectorStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process vector store with exhaustive cosine search
#[derive(Default)]
pub struct MemoryStore {
    namespaces: RwLock<HashMap<String, HashMap<String, VectorRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .await
            .get(namespace)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, records: &[VectorRecord], namespace: &str) -> Result<usize> {
        let mut namespaces = self.namespaces.write().await;
        let entries = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            entries.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    async fn query(&self, vector: &[f32], namespace: &str, top_k: usize) -> Result<Vec<VectorMatch>> {
        let namespaces = self.namespaces.read().await;
        let Some(entries) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<VectorMatch> = entries
            .values()
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.values),
                metadata: record.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn fetch(&self, id: &str, namespace: &str) -> Result<Option<VectorRecord>> {
        Ok(self
            .namespaces
            .read()
            .await
            .get(namespace)
            .and_then(|entries| entries.get(id))
            .cloned())
    }

    async fn delete_all(&self, namespace: &str) -> Result<()> {
        self.namespaces.write().await.remove(namespace);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Metadata;

    fn record(id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let store = MemoryStore::new();
        store
            .upsert(
                &[
                    record("east", vec![1.0, 0.0]),
                    record("north", vec![0.0, 1.0]),
                    record("north-east", vec![1.0, 1.0]),
                ],
                "title",
            )
            .await
            .unwrap();

        let matches = store.query(&[1.0, 0.1], "title", 2).await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["east", "north-east"]);

        assert!(store.query(&[1.0, 0.0], "other", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_delete_all_clears_namespace() {
        let store = MemoryStore::new();
        store.upsert(&[record("a", vec![1.0])], "title").await.unwrap();
        store.upsert(&[record("a", vec![2.0])], "title").await.unwrap();
        store.upsert(&[record("b", vec![1.0])], "other").await.unwrap();

        assert_eq!(store.len("title").await, 1);
        assert_eq!(
            store.fetch("a", "title").await.unwrap().unwrap().values,
            vec![2.0]
        );

        store.delete_all("title").await.unwrap();
        assert_eq!(store.len("title").await, 0);
        assert_eq!(store.len("other").await, 1);
    }
}
