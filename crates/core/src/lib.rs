pub mod chunking;
pub mod duplicates;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod jobs;
pub mod metadata;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod quality;
pub mod store;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_page, ChunkingConfig};
pub use duplicates::{similarity, DuplicateDetector};
pub use embeddings::{
    embed_off_thread, CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, StoreError};
pub use extractor::{DocumentExtractor, FileExtractor, LopdfExtractor, PageText, PlainTextExtractor};
pub use ingest::{discover_documents, ingest_folder, FolderReport, SkippedDocument};
pub use jobs::InMemoryJobStore;
pub use metadata::{classify_content, MetadataExtractor};
pub use models::{
    Chunk, ContentMetadata, ContentRecord, ContentType, Job, JobStatus, PipelineConfig,
    RecordFilter, SearchHit, SearchRequest, SearchResponse, SimilarityPair, VectorEntry,
    VectorFilter, VectorHit, VectorMetadata,
};
pub use normalize::TextNormalizer;
pub use orchestrator::{IngestionPipeline, IngestionSummary};
pub use quality::{HealthStatus, QualityMetrics, QualityReport, QualityScorer};
pub use store::{ContentStore, StoredChunk};
pub use stores::{ChromaStore, InMemoryRecordStore, InMemoryVectorStore, OpenSearchStore};
pub use traits::{JobStore, RecordStore, VectorStore};
