//! Dual-store persistence for accepted chunks.
//!
//! Every record is written to the structured store first and then indexed in
//! the vector store under the same id. The structured store is the source of
//! truth: a missing vector entry only costs ranking quality, because search
//! falls back to a filtered scan of the structured store.

use crate::duplicates::DuplicateDetector;
use crate::embeddings::{embed_off_thread, Embedder};
use crate::error::{IngestError, StoreError};
use crate::metadata::MetadataExtractor;
use crate::models::{
    ContentRecord, PipelineConfig, RecordFilter, SearchHit, SearchRequest, SearchResponse,
    SimilarityPair, VectorEntry, VectorFilter, VectorMetadata,
};
use crate::quality::{QualityReport, QualityScorer};
use crate::traits::{RecordStore, VectorStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Upper bound on records pulled into a quality report.
const REPORT_SCAN_LIMIT: usize = 10_000;

/// Extra vector hits fetched per requested result when the manufacturer
/// filter has to be applied after the query.
const MANUFACTURER_OVERFETCH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredChunk {
    pub id: Uuid,
    pub vector_stored: bool,
}

pub struct ContentStore {
    records: Arc<dyn RecordStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    metadata: MetadataExtractor,
    scorer: QualityScorer,
    config: PipelineConfig,
}

impl ContentStore {
    pub fn new(
        records: Arc<dyn RecordStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: PipelineConfig,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            records,
            vectors,
            embedder,
            metadata: MetadataExtractor::new()?,
            scorer: QualityScorer::new(config.min_text_length),
            config,
        })
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn ensure_ready(&self) -> Result<(), StoreError> {
        self.vectors.ensure_collection().await
    }

    /// Writes `record` to both stores.
    ///
    /// A structured-store failure is returned. A vector-store failure is
    /// logged and reported through [`StoredChunk::vector_stored`].
    pub async fn store_chunk(
        &self,
        record: &ContentRecord,
        embedding: Vec<f32>,
    ) -> Result<StoredChunk, StoreError> {
        self.records.insert(record).await?;

        let entry = VectorEntry {
            id: record.id,
            document: record.content.clone(),
            embedding,
            metadata: VectorMetadata::from(record),
        };
        let vector_stored = match self.vectors.add(std::slice::from_ref(&entry)).await {
            Ok(()) => true,
            Err(error) => {
                warn!(content_id = %record.id, error = %error, "vector write failed, record kept");
                false
            }
        };

        debug!(content_id = %record.id, page = %record.page_reference, "content chunk stored");
        Ok(StoredChunk {
            id: record.id,
            vector_stored,
        })
    }

    /// Similarity search, degrading to a filtered structured-store scan when
    /// the vector path fails.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, StoreError> {
        let started = Instant::now();

        let (results, fallback) = match self.vector_search(request).await {
            Ok(results) => (results, false),
            Err(error) => {
                warn!(error = %error, query = %request.query, "vector search failed, using text fallback");
                (self.fallback_search(request).await?, true)
            }
        };

        let elapsed = started.elapsed().as_secs_f64() * 1_000.0;
        Ok(SearchResponse {
            query: request.query.clone(),
            total_results: results.len(),
            results,
            search_time_ms: (elapsed * 100.0).round() / 100.0,
            fallback,
        })
    }

    async fn vector_search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, IngestError> {
        let embedding = embed_off_thread(self.embedder(), vec![request.query.clone()])
            .await?
            .pop()
            .ok_or_else(|| IngestError::Embedding("no embedding for query".to_string()))?;

        let filter = VectorFilter {
            content_type: request.content_type,
        };
        let manufacturer = RecordFilter {
            manufacturer: request.manufacturer.clone(),
            ..RecordFilter::default()
        };
        let k = if request.manufacturer.is_some() {
            request.max_results.saturating_mul(MANUFACTURER_OVERFETCH)
        } else {
            request.max_results
        };
        let hits = self.vectors.query(&embedding, k, &filter).await?;

        let mut results = Vec::with_capacity(request.max_results.min(hits.len()));
        for hit in hits {
            if results.len() == request.max_results {
                break;
            }
            let similarity = (1.0 - hit.distance).max(0.0);
            if similarity < request.min_confidence {
                continue;
            }
            match self.records.get(hit.id).await? {
                Some(record) if manufacturer.matches(&record) => results.push(SearchHit {
                    record,
                    similarity_score: (similarity * 10_000.0).round() / 10_000.0,
                }),
                Some(_) => {}
                None => debug!(content_id = %hit.id, "vector hit without a structured record"),
            }
        }

        Ok(results)
    }

    async fn fallback_search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, StoreError> {
        let filter = RecordFilter {
            manufacturer: request.manufacturer.clone(),
            content_type: request.content_type,
            min_confidence: request.min_confidence,
            terms: request.query_terms(),
        };

        let records = self.records.list(&filter, request.max_results, 0).await?;
        Ok(records
            .into_iter()
            .map(|record| SearchHit {
                record,
                similarity_score: self.config.fallback_similarity,
            })
            .collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ContentRecord>, StoreError> {
        self.records.get(id).await
    }

    /// Newest first, with content cut to the configured preview length.
    pub async fn list(
        &self,
        filter: &RecordFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContentRecord>, StoreError> {
        let records = self.records.list(filter, limit, offset).await?;
        Ok(records
            .iter()
            .map(|record| record.preview(self.config.list_preview_chars))
            .collect())
    }

    /// Removes a record from both stores. Returns false when the structured
    /// store has no such record or could not delete it.
    pub async fn delete(&self, id: Uuid) -> bool {
        match self.records.delete(id).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(error) => {
                error!(content_id = %id, error = %error, "failed to delete content");
                return false;
            }
        }

        if let Err(error) = self.vectors.delete(&[id]).await {
            warn!(content_id = %id, error = %error, "failed to delete vector entry");
        }

        info!(content_id = %id, "content deleted");
        true
    }

    /// Re-scores a stored record and rewrites it under a new id.
    ///
    /// The replacement is written to both stores before the legacy record is
    /// removed, so a failed embedding or insert leaves the legacy record in
    /// place. Content that no longer passes the readability threshold is only
    /// removed and `None` is returned.
    pub async fn reprocess(&self, id: Uuid) -> Result<Option<ContentRecord>, IngestError> {
        let legacy = self
            .records
            .get(id)
            .await?
            .ok_or(IngestError::ContentNotFound(id))?;

        let score = self.scorer.score(&legacy.content);
        if !self.scorer.passes(score, self.config.min_readability_score) {
            self.remove_legacy(id).await?;
            info!(content_id = %id, score, "reprocessed content fell below threshold and was removed");
            return Ok(None);
        }

        let metadata = self.metadata.extract(&legacy.source_manual, &legacy.content);
        let record = ContentRecord::new(
            legacy.content.clone(),
            legacy.section_title.clone(),
            metadata,
            score,
            legacy.page_number().unwrap_or(1),
        );
        let embedding = embed_off_thread(self.embedder(), vec![record.content.clone()])
            .await?
            .pop()
            .ok_or_else(|| IngestError::Embedding("no embedding for record".to_string()))?;
        self.store_chunk(&record, embedding).await?;
        self.remove_legacy(id).await?;

        info!(legacy_id = %id, content_id = %record.id, score, "content reprocessed");
        Ok(Some(record))
    }

    async fn remove_legacy(&self, id: Uuid) -> Result<(), IngestError> {
        if self.delete(id).await {
            Ok(())
        } else {
            Err(IngestError::Storage(StoreError::Request(format!(
                "could not remove legacy record {id}"
            ))))
        }
    }

    pub async fn quality_report(&self) -> Result<QualityReport, StoreError> {
        let records = self
            .records
            .list(&RecordFilter::default(), REPORT_SCAN_LIMIT, 0)
            .await?;
        Ok(QualityReport::from_records(
            &records,
            self.config.min_readability_score,
            &self.metadata,
        ))
    }

    /// Advisory near-duplicate scan over the most recent records.
    pub async fn find_duplicates(&self) -> Result<Vec<SimilarityPair>, StoreError> {
        DuplicateDetector::new(
            self.config.duplicate_similarity_threshold,
            self.config.duplicate_window,
        )
        .scan(self.records.as_ref())
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
    use crate::models::{ContentMetadata, ContentType, VectorHit};
    use crate::stores::{InMemoryRecordStore, InMemoryVectorStore};
    use async_trait::async_trait;

    /// Vector backend that is always down.
    pub(crate) struct UnavailableVectorStore;

    #[async_trait]
    impl VectorStore for UnavailableVectorStore {
        async fn ensure_collection(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn add(&self, _entries: &[VectorEntry]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("vector store".to_string()))
        }

        async fn query(
            &self,
            _embedding: &[f32],
            _k: usize,
            _filter: &VectorFilter,
        ) -> Result<Vec<VectorHit>, StoreError> {
            Err(StoreError::Unavailable("vector store".to_string()))
        }

        async fn delete(&self, _ids: &[Uuid]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("vector store".to_string()))
        }
    }

    /// Embedding service that always errors.
    struct OfflineEmbedder;

    impl Embedder for OfflineEmbedder {
        fn dimensions(&self) -> usize {
            DEFAULT_EMBEDDING_DIMENSIONS
        }

        fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
            Err(IngestError::Embedding("service down".to_string()))
        }
    }

    const LINT: &str = "Clean the lint filter after every load. A blocked lint filter \
slows drying and can overheat the dryer, so rinse it with warm water once a month.";

    fn record(content: &str, manufacturer: &str) -> ContentRecord {
        ContentRecord::new(
            content.to_string(),
            "Lint Filter".to_string(),
            ContentMetadata {
                manufacturer: manufacturer.to_string(),
                model_series: "WED4815".to_string(),
                content_type: ContentType::Maintenance,
                source_manual: "whirlpool-dryer.pdf".to_string(),
            },
            0.9,
            5,
        )
    }

    fn content_store(vectors: Arc<dyn VectorStore>) -> (ContentStore, Arc<InMemoryRecordStore>) {
        let records = Arc::new(InMemoryRecordStore::new());
        let store = ContentStore::new(
            records.clone(),
            vectors,
            Arc::new(CharacterNgramEmbedder::default()),
            PipelineConfig::default(),
        )
        .expect("content store");
        (store, records)
    }

    fn embed(text: &str) -> Vec<f32> {
        CharacterNgramEmbedder::default().embed(text)
    }

    #[tokio::test]
    async fn vector_search_returns_ranked_records() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let (store, _) = content_store(vectors.clone());
        let lint = record(LINT, "Whirlpool");
        let other = record("Level the washer by turning the front feet.", "Whirlpool");
        store.store_chunk(&lint, embed(&lint.content)).await.expect("store");
        store.store_chunk(&other, embed(&other.content)).await.expect("store");

        let response = store.search(&SearchRequest::new(LINT)).await.expect("search");

        assert!(!response.fallback);
        assert_eq!(response.total_results, response.results.len());
        assert_eq!(response.results[0].record.id, lint.id);
        assert!(response.results[0].similarity_score > 0.99);
        assert!(vectors.contains(lint.id).await);
    }

    #[tokio::test]
    async fn min_confidence_filters_vector_hits() {
        let (store, _) = content_store(Arc::new(InMemoryVectorStore::new()));
        let other = record("Level the washer by turning the front feet.", "Whirlpool");
        store.store_chunk(&other, embed(&other.content)).await.expect("store");

        let mut request = SearchRequest::new("zzzz qqqq xxxx");
        request.min_confidence = 0.99;
        let response = store.search(&request).await.expect("search");
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn vector_outage_keeps_record_and_falls_back() {
        let (store, _) = content_store(Arc::new(UnavailableVectorStore));
        let lint = record(LINT, "Whirlpool");

        let stored = store.store_chunk(&lint, embed(&lint.content)).await.expect("store");
        assert!(!stored.vector_stored);
        assert_eq!(store.get(lint.id).await.expect("get"), Some(lint.clone()));

        let mut request = SearchRequest::new("lint filter");
        request.manufacturer = Some("whirl".to_string());
        let response = store.search(&request).await.expect("search");

        assert!(response.fallback);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].record.id, lint.id);
        assert_eq!(response.results[0].similarity_score, 0.5);
    }

    #[tokio::test]
    async fn delete_tolerates_vector_failure() {
        let (store, records) = content_store(Arc::new(UnavailableVectorStore));
        let lint = record(LINT, "Whirlpool");
        store.store_chunk(&lint, embed(&lint.content)).await.expect("store");

        assert!(store.delete(lint.id).await);
        assert!(records.is_empty().await);
        assert!(!store.delete(lint.id).await);
    }

    #[tokio::test]
    async fn list_truncates_previews() {
        let (store, _) = content_store(Arc::new(InMemoryVectorStore::new()));
        let long = record(&"Check the pump. ".repeat(60), "Whirlpool");
        store.store_chunk(&long, embed(&long.content)).await.expect("store");

        let listed = store
            .list(&RecordFilter::default(), 10, 0)
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content.chars().count(), 503);
        assert!(listed[0].content.ends_with("..."));
    }

    #[tokio::test]
    async fn reprocess_rewrites_passing_content_under_new_id() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let (store, records) = content_store(vectors.clone());
        let lint = record(LINT, "Unknown");
        store.store_chunk(&lint, embed(&lint.content)).await.expect("store");

        let renewed = store
            .reprocess(lint.id)
            .await
            .expect("reprocess")
            .expect("still passing");

        assert_ne!(renewed.id, lint.id);
        assert_eq!(renewed.content, lint.content);
        assert_eq!(renewed.page_reference, "page_5");
        assert_eq!(renewed.manufacturer, "Whirlpool");
        assert!(store.get(lint.id).await.expect("get").is_none());
        assert!(!vectors.contains(lint.id).await);
        assert!(vectors.contains(renewed.id).await);
        assert_eq!(records.len().await, 1);
    }

    #[tokio::test]
    async fn failed_reprocess_keeps_the_legacy_record() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let records = Arc::new(InMemoryRecordStore::new());
        let store = ContentStore::new(
            records.clone(),
            vectors.clone(),
            Arc::new(OfflineEmbedder),
            PipelineConfig::default(),
        )
        .expect("content store");
        let lint = record(LINT, "Whirlpool");
        store.store_chunk(&lint, embed(LINT)).await.expect("store");

        let result = store.reprocess(lint.id).await;

        assert!(matches!(result, Err(IngestError::Embedding(_))));
        assert_eq!(store.get(lint.id).await.expect("get"), Some(lint.clone()));
        assert!(vectors.contains(lint.id).await);
        assert_eq!(records.len().await, 1);
    }

    #[tokio::test]
    async fn vector_search_matches_manufacturer_by_substring() {
        let (store, _) = content_store(Arc::new(InMemoryVectorStore::new()));
        let whirlpool = record(LINT, "Whirlpool");
        let bosch = record(LINT, "Bosch");
        store.store_chunk(&whirlpool, embed(LINT)).await.expect("store");
        store.store_chunk(&bosch, embed(LINT)).await.expect("store");

        let mut request = SearchRequest::new(LINT);
        request.manufacturer = Some("WHIRL".to_string());
        request.max_results = 1;
        let response = store.search(&request).await.expect("search");

        assert!(!response.fallback);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].record.id, whirlpool.id);
    }

    #[tokio::test]
    async fn reprocess_drops_content_below_threshold() {
        let (store, records) = content_store(Arc::new(InMemoryVectorStore::new()));
        let noisy = record(&"#$%^ &*@! ".repeat(10), "Unknown");
        store.store_chunk(&noisy, embed(&noisy.content)).await.expect("store");

        assert!(store.reprocess(noisy.id).await.expect("reprocess").is_none());
        assert!(records.is_empty().await);

        let missing = store.reprocess(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(IngestError::ContentNotFound(_))));
    }

    #[tokio::test]
    async fn report_and_duplicates_read_the_structured_store() {
        let (store, _) = content_store(Arc::new(InMemoryVectorStore::new()));
        let first = record(LINT, "Whirlpool");
        let second = record(LINT, "Whirlpool");
        store.store_chunk(&first, embed(LINT)).await.expect("store");
        store.store_chunk(&second, embed(LINT)).await.expect("store");

        let report = store.quality_report().await.expect("report");
        assert_eq!(report.total_content_items, 2);

        let pairs = store.find_duplicates().await.expect("duplicates");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].score, 1.0);
    }
}
