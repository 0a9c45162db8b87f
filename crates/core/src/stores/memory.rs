use crate::error::StoreError;
use crate::models::{ContentRecord, RecordFilter, VectorEntry, VectorFilter, VectorHit};
use crate::traits::{RecordStore, VectorStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<Uuid, ContentRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, record: &ContentRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ContentRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &RecordFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContentRecord>, StoreError> {
        let mut matching = self
            .records
            .read()
            .await
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect::<Vec<_>>();

        matching.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });

        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(&id).is_some())
    }
}

/// Brute-force cosine index.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<HashMap<Uuid, VectorEntry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.entries.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn add(&self, entries: &[VectorEntry]) -> Result<(), StoreError> {
        let mut stored = self.entries.write().await;
        for entry in entries {
            stored.insert(entry.id, entry.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>, StoreError> {
        let stored = self.entries.read().await;
        let mut hits = stored
            .values()
            .filter(|entry| matches_filter(entry, filter))
            .map(|entry| {
                if entry.embedding.len() != embedding.len() {
                    return Err(StoreError::Request(format!(
                        "query dimension {} != stored dimension {}",
                        embedding.len(),
                        entry.embedding.len()
                    )));
                }
                Ok(VectorHit {
                    id: entry.id,
                    distance: cosine_distance(embedding, &entry.embedding),
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        hits.sort_by(|left, right| {
            left.distance
                .total_cmp(&right.distance)
                .then_with(|| left.id.cmp(&right.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        let mut stored = self.entries.write().await;
        for id in ids {
            stored.remove(id);
        }
        Ok(())
    }
}

fn matches_filter(entry: &VectorEntry, filter: &VectorFilter) -> bool {
    filter
        .content_type
        .map_or(true, |wanted| entry.metadata.content_type == wanted)
}

fn cosine_distance(left: &[f32], right: &[f32]) -> f64 {
    let dot = left
        .iter()
        .zip(right)
        .map(|(a, b)| f64::from(*a) * f64::from(*b))
        .sum::<f64>();
    let norm = |values: &[f32]| values.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();
    let denominator = norm(left) * norm(right);
    if denominator == 0.0 {
        return 1.0;
    }
    1.0 - dot / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentMetadata, ContentType, VectorMetadata};
    use chrono::Duration;

    fn record(manufacturer: &str, content: &str, age_minutes: i64) -> ContentRecord {
        let mut record = ContentRecord::new(
            content.to_string(),
            "title".to_string(),
            ContentMetadata {
                manufacturer: manufacturer.to_string(),
                model_series: "Unknown".to_string(),
                content_type: ContentType::Maintenance,
                source_manual: "manual.pdf".to_string(),
            },
            0.8,
            1,
        );
        record.created_at -= Duration::minutes(age_minutes);
        record
    }

    #[tokio::test]
    async fn list_is_newest_first_and_paginated() {
        let store = InMemoryRecordStore::new();
        let old = record("Whirlpool", "old text", 30);
        let mid = record("Whirlpool", "mid text", 20);
        let new = record("Samsung", "new text", 10);
        for item in [&old, &mid, &new] {
            store.insert(item).await.expect("insert");
        }

        let all = store.list(&RecordFilter::default(), 10, 0).await.expect("list");
        let ids = all.iter().map(|item| item.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![new.id, mid.id, old.id]);

        let page = store.list(&RecordFilter::default(), 1, 1).await.expect("list");
        assert_eq!(page[0].id, mid.id);

        let filter = RecordFilter {
            manufacturer: Some("whirl".to_string()),
            ..RecordFilter::default()
        };
        assert_eq!(store.list(&filter, 10, 0).await.expect("list").len(), 2);

        assert!(store.delete(old.id).await.expect("delete"));
        assert!(store.get(old.id).await.expect("get").is_none());
        assert_eq!(store.len().await, 2);
    }

    fn entry(content_type: ContentType, embedding: Vec<f32>) -> VectorEntry {
        let id = Uuid::new_v4();
        VectorEntry {
            id,
            document: "text".to_string(),
            embedding,
            metadata: VectorMetadata {
                content_id: id,
                manufacturer: "LG".to_string(),
                model_series: "Unknown".to_string(),
                content_type,
                source_manual: "manual.pdf".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn query_ranks_by_cosine_distance_and_filters() {
        let store = InMemoryVectorStore::new();
        let close = entry(ContentType::Safety, vec![1.0, 0.1]);
        let far = entry(ContentType::Safety, vec![0.0, 1.0]);
        let other = entry(ContentType::Warranty, vec![1.0, 0.0]);
        store
            .add(&[close.clone(), far.clone(), other.clone()])
            .await
            .expect("add");

        let filter = VectorFilter {
            content_type: Some(ContentType::Safety),
        };
        let hits = store.query(&[1.0, 0.0], 5, &filter).await.expect("query");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, close.id);
        assert_eq!(hits[1].id, far.id);
        assert!((hits[1].distance - 1.0).abs() < 1e-9);

        store.delete(&[close.id]).await.expect("delete");
        assert!(!store.contains(close.id).await);
        assert_eq!(store.len().await, 2);
    }
}
