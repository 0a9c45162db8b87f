use crate::error::StoreError;
use crate::models::{ContentRecord, Job, RecordFilter, VectorEntry, VectorFilter, VectorHit};
use async_trait::async_trait;
use uuid::Uuid;

/// Durable home of every accepted chunk, keyed by record id.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &ContentRecord) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<ContentRecord>, StoreError>;

    /// Records matching `filter`, newest first.
    async fn list(
        &self,
        filter: &RecordFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContentRecord>, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Nearest-neighbour index over chunk embeddings. Entry ids equal record ids.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collection(&self) -> Result<(), StoreError>;

    async fn add(&self, entries: &[VectorEntry]) -> Result<(), StoreError>;

    /// Up to `k` hits ordered by ascending distance.
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>, StoreError>;

    async fn delete(&self, ids: &[Uuid]) -> Result<(), StoreError>;
}

/// Keyed job status storage shared by the orchestrator and status readers.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    async fn set(&self, job: Job) -> Result<(), StoreError>;

    async fn delete(&self, job_id: &str) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<Job>, StoreError>;
}
