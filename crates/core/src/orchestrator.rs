//! Per-document job state machine.
//!
//! A job moves `queued -> processing -> completed | failed` and never leaves
//! a terminal state. Progress is checkpointed at stage boundaries and only
//! ever increases.

use crate::chunking::{chunk_page, ChunkingConfig};
use crate::embeddings::embed_off_thread;
use crate::error::{IngestError, StoreError};
use crate::extractor::{DocumentExtractor, PageText};
use crate::metadata::MetadataExtractor;
use crate::models::{Chunk, ContentRecord, Job, JobStatus, PipelineConfig};
use crate::normalize::TextNormalizer;
use crate::quality::QualityScorer;
use crate::store::ContentStore;
use crate::traits::JobStore;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_SECTION_TITLE: &str = "Manual Content";

const EXTRACTION_PROGRESS: f64 = 10.0;
const CHUNKING_PROGRESS: f64 = 30.0;
const CHUNKED_PROGRESS: f64 = 50.0;
const EMBEDDING_PROGRESS: f64 = 60.0;
const STORAGE_CEILING: f64 = 95.0;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionSummary {
    pub job_id: String,
    pub pages: usize,
    pub chunks: usize,
    pub stored: usize,
    pub rejected: usize,
    pub store_failures: usize,
    pub vector_failures: usize,
    pub duplicates: usize,
}

/// Writes job updates through to the job store.
struct JobTracker<'a> {
    store: &'a dyn JobStore,
    job: Job,
}

impl JobTracker<'_> {
    async fn save(&self) -> Result<(), StoreError> {
        self.store.set(self.job.clone()).await
    }

    async fn checkpoint(&mut self, progress: f64, message: impl Into<String>) -> Result<(), StoreError> {
        self.job.progress_percent = self.job.progress_percent.max(progress.min(100.0));
        self.job.message = message.into();
        debug!(
            job_id = %self.job.job_id,
            progress = self.job.progress_percent,
            message = %self.job.message,
            "job checkpoint"
        );
        self.save().await
    }

    async fn complete(&mut self, stored: usize) -> Result<(), StoreError> {
        self.job.status = JobStatus::Completed;
        self.job.progress_percent = 100.0;
        self.job.message = format!("Processing completed - {stored} chunks stored");
        self.job.completed_at = Some(Utc::now());
        self.save().await
    }

    async fn fail(&mut self, error: &IngestError) -> Result<(), StoreError> {
        self.job.status = JobStatus::Failed;
        self.job.error_details = Some(error.to_string());
        self.job.message = format!("Processing failed: {error}");
        self.job.completed_at = Some(Utc::now());
        self.save().await
    }
}

pub struct IngestionPipeline {
    jobs: Arc<dyn JobStore>,
    extractor: Arc<dyn DocumentExtractor>,
    content: Arc<ContentStore>,
    normalizer: TextNormalizer,
    metadata: MetadataExtractor,
    scorer: QualityScorer,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        extractor: Arc<dyn DocumentExtractor>,
        content: Arc<ContentStore>,
    ) -> Result<Self, IngestError> {
        let config = content.config().clone();
        Ok(Self {
            jobs,
            extractor,
            normalizer: TextNormalizer::new()?,
            metadata: MetadataExtractor::new()?,
            scorer: QualityScorer::new(config.min_text_length),
            content,
            config,
        })
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    /// Validates and stages an upload, registers a queued job and processes
    /// it in the background. Returns the job id without waiting.
    pub async fn accept_upload(
        self: &Arc<Self>,
        bytes: &[u8],
        filename: &str,
    ) -> Result<String, IngestError> {
        let (job_id, staged) = self.stage_upload(bytes, filename).await?;

        let pipeline = Arc::clone(self);
        let background_id = job_id.clone();
        tokio::spawn(async move {
            if let Err(error) = pipeline.process_document(&staged, &background_id).await {
                debug!(job_id = %background_id, error = %error, "background job ended with error");
            }
        });

        Ok(job_id)
    }

    /// Stages a local file the same way as an upload and processes it inline.
    /// The original file is left in place.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestionSummary, IngestError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::InvalidArgument(format!("no file name in {}", path.display())))?;
        let bytes = tokio::fs::read(path).await?;

        let (job_id, staged) = self.stage_upload(&bytes, filename).await?;
        self.process_document(&staged, &job_id).await
    }

    async fn stage_upload(&self, bytes: &[u8], filename: &str) -> Result<(String, PathBuf), IngestError> {
        let name = Path::new(filename)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| IngestError::InvalidArgument(format!("invalid file name: {filename:?}")))?;

        if !self.config.is_allowed_file(name) {
            return Err(IngestError::UnsupportedFile(format!(
                "{name} (allowed: {})",
                self.config.allowed_extensions.join(", ")
            )));
        }

        let size_bytes = bytes.len() as u64;
        if size_bytes > self.config.max_file_size_mb * 1024 * 1024 {
            return Err(IngestError::FileTooLarge {
                filename: name.to_string(),
                size_bytes,
                limit_mb: self.config.max_file_size_mb,
            });
        }

        let job_id = Uuid::new_v4().to_string();
        tokio::fs::create_dir_all(&self.config.upload_directory).await?;
        let staged = self.config.upload_directory.join(format!("{job_id}_{name}"));
        tokio::fs::write(&staged, bytes).await?;

        self.jobs.set(Job::new(job_id.clone(), name)).await?;
        info!(job_id = %job_id, filename = %name, size_bytes, "upload accepted");
        Ok((job_id, staged))
    }

    /// Runs every stage for `job_id` against the document at `path`.
    ///
    /// A known job is reused; an unknown id gets a fresh job named after the
    /// file. Any stage error, or running past the job timeout, fails the job
    /// with the error text in `error_details`.
    pub async fn process_document(
        &self,
        path: &Path,
        job_id: &str,
    ) -> Result<IngestionSummary, IngestError> {
        let job = match self.jobs.get(job_id).await? {
            Some(job) if job.is_terminal() => return Err(IngestError::JobFinished(job_id.to_string())),
            Some(job) => job,
            None => {
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Job::new(job_id, filename)
            }
        };

        let mut tracker = JobTracker {
            store: self.jobs.as_ref(),
            job,
        };
        tracker.job.status = JobStatus::Processing;
        tracker
            .checkpoint(EXTRACTION_PROGRESS, "Extracting text")
            .await?;
        info!(job_id, path = %path.display(), "document processing started");

        let budget = self.config.job_timeout;
        let outcome = match tokio::time::timeout(budget, self.run_stages(path, &mut tracker)).await {
            Ok(result) => result,
            Err(_) => Err(IngestError::Timeout {
                seconds: budget.as_secs(),
            }),
        };

        match outcome {
            Ok(summary) => {
                if let Err(error) = tokio::fs::remove_file(path).await {
                    warn!(job_id, path = %path.display(), error = %error, "failed to clean up source file");
                }
                tracker.complete(summary.stored).await?;
                info!(
                    job_id,
                    stored = summary.stored,
                    rejected = summary.rejected,
                    store_failures = summary.store_failures,
                    "document processing completed"
                );
                Ok(summary)
            }
            Err(error) => {
                error!(job_id, error = %error, "document processing failed");
                tracker.fail(&error).await?;
                Err(error)
            }
        }
    }

    async fn run_stages(
        &self,
        path: &Path,
        tracker: &mut JobTracker<'_>,
    ) -> Result<IngestionSummary, IngestError> {
        let mut summary = IngestionSummary {
            job_id: tracker.job.job_id.clone(),
            ..IngestionSummary::default()
        };
        let job_id = summary.job_id.clone();
        let filename = tracker.job.filename.clone();

        let pages = self.extract(path).await?;
        summary.pages = pages.len();
        tracker
            .checkpoint(CHUNKING_PROGRESS, "Cleaning and chunking text")
            .await?;

        let chunks = self.chunk_pages(&pages);
        if chunks.is_empty() {
            return Err(IngestError::NoChunks(filename));
        }
        summary.chunks = chunks.len();
        tracker
            .checkpoint(
                CHUNKED_PROGRESS,
                format!("Processing {} text chunks", chunks.len()),
            )
            .await?;
        tracker
            .checkpoint(EMBEDDING_PROGRESS, "Generating embeddings")
            .await?;

        let total = chunks.len();
        let mut processed = 0usize;
        for batch in chunks.chunks(self.config.embedding_batch_size) {
            let texts = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let embeddings = embed_off_thread(self.content.embedder(), texts).await?;

            for (chunk, embedding) in batch.iter().zip(embeddings) {
                self.store_chunk(&job_id, &filename, chunk, embedding, &mut summary)
                    .await;
            }

            processed += batch.len();
            let progress = EMBEDDING_PROGRESS
                + (100.0 - EMBEDDING_PROGRESS) * processed as f64 / total as f64;
            tracker
                .checkpoint(progress.min(STORAGE_CEILING), "Generating embeddings")
                .await?;
        }

        if summary.stored == 0 && summary.store_failures > 0 {
            return Err(IngestError::Storage(StoreError::Request(format!(
                "all {} chunk writes failed",
                summary.store_failures
            ))));
        }

        let progress = tracker.job.progress_percent;
        tracker
            .checkpoint(progress, "Running quality validation")
            .await?;
        summary.duplicates = match self.content.find_duplicates().await {
            Ok(pairs) => pairs.len(),
            Err(error) => {
                warn!(job_id = %job_id, error = %error, "duplicate scan failed");
                0
            }
        };

        Ok(summary)
    }

    async fn extract(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let extractor = Arc::clone(&self.extractor);
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || extractor.extract_pages(&owned))
            .await
            .map_err(|error| IngestError::Task(error.to_string()))?
    }

    fn chunk_pages(&self, pages: &[PageText]) -> Vec<Chunk> {
        let config = ChunkingConfig::from(&self.config);
        pages
            .iter()
            .flat_map(|page| {
                let normalized = self.normalizer.normalize(&page.text);
                chunk_page(&normalized, page.number, config)
            })
            .collect()
    }

    /// Scores one chunk and persists it if it passes. Failures are counted.
    async fn store_chunk(
        &self,
        job_id: &str,
        filename: &str,
        chunk: &Chunk,
        embedding: Vec<f32>,
        summary: &mut IngestionSummary,
    ) {
        let score = self.scorer.score(&chunk.content);
        if !self.scorer.passes(score, self.config.min_readability_score) {
            debug!(job_id, page = chunk.page_number, score, "chunk below readability threshold");
            summary.rejected += 1;
            return;
        }

        let title = self.normalizer.extract_section_title(&chunk.content);
        let title = if title.is_empty() {
            DEFAULT_SECTION_TITLE.to_string()
        } else {
            title
        };
        let record = ContentRecord::new(
            chunk.content.clone(),
            title,
            self.metadata.extract(filename, &chunk.content),
            score,
            chunk.page_number,
        );

        match self.content.store_chunk(&record, embedding).await {
            Ok(stored) => {
                summary.stored += 1;
                if !stored.vector_stored {
                    summary.vector_failures += 1;
                }
            }
            Err(error) => {
                error!(job_id, page = chunk.page_number, error = %error, "failed to store content chunk");
                summary.store_failures += 1;
            }
        }
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job, IngestError> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or_else(|| IngestError::JobNotFound(job_id.to_string()))
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>, IngestError> {
        Ok(self.jobs.list().await?)
    }

    pub async fn delete_job(&self, job_id: &str) -> Result<bool, IngestError> {
        Ok(self.jobs.delete(job_id).await?)
    }
}
