use crate::error::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded document's end-to-end processing run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub filename: String,
    pub status: JobStatus,
    pub progress_percent: f64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_details: Option<String>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            filename: filename.into(),
            status: JobStatus::Queued,
            progress_percent: 0.0,
            message: "Job queued for processing".to_string(),
            created_at: Utc::now(),
            completed_at: None,
            error_details: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A bounded span of normalized text from one page, before scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub page_number: u32,
    pub chunk_size: usize,
}

impl Chunk {
    pub fn new(content: String, page_number: u32) -> Self {
        let chunk_size = content.chars().count();
        Self {
            content,
            page_number,
            chunk_size,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Troubleshooting,
    Maintenance,
    Safety,
    Warranty,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Troubleshooting,
        ContentType::Maintenance,
        ContentType::Safety,
        ContentType::Warranty,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Troubleshooting => "troubleshooting",
            ContentType::Maintenance => "maintenance",
            ContentType::Safety => "safety",
            ContentType::Warranty => "warranty",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| IngestError::InvalidArgument(format!("unknown content type: {value}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentMetadata {
    pub manufacturer: String,
    pub model_series: String,
    pub content_type: ContentType,
    pub source_manual: String,
}

/// A persisted chunk. Shares its id with exactly one vector-store entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentRecord {
    pub id: Uuid,
    pub manufacturer: String,
    pub model_series: String,
    pub section_title: String,
    pub content: String,
    pub content_type: ContentType,
    pub confidence_score: f64,
    pub source_manual: String,
    pub page_reference: String,
    pub created_at: DateTime<Utc>,
}

impl ContentRecord {
    pub fn new(
        content: String,
        section_title: String,
        metadata: ContentMetadata,
        confidence_score: f64,
        page_number: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            manufacturer: metadata.manufacturer,
            model_series: metadata.model_series,
            section_title,
            content,
            content_type: metadata.content_type,
            confidence_score,
            source_manual: metadata.source_manual,
            page_reference: page_reference(page_number),
            created_at: Utc::now(),
        }
    }

    pub fn page_number(&self) -> Option<u32> {
        self.page_reference
            .strip_prefix("page_")
            .and_then(|number| number.parse().ok())
    }

    /// Copy of the record whose content is cut to `max_chars` for listings.
    pub fn preview(&self, max_chars: usize) -> Self {
        let mut preview = self.clone();
        if self.content.chars().count() > max_chars {
            preview.content = self.content.chars().take(max_chars).collect::<String>() + "...";
        }
        preview
    }
}

pub fn page_reference(page_number: u32) -> String {
    format!("page_{page_number}")
}

/// Near-duplicate report entry. Not persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SimilarityPair {
    pub id_a: Uuid,
    pub id_b: Uuid,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RecordFilter {
    pub manufacturer: Option<String>,
    pub content_type: Option<ContentType>,
    pub min_confidence: f64,
    pub terms: Vec<String>,
}

impl RecordFilter {
    pub fn matches(&self, record: &ContentRecord) -> bool {
        if let Some(manufacturer) = &self.manufacturer {
            if !record
                .manufacturer
                .to_lowercase()
                .contains(&manufacturer.to_lowercase())
            {
                return false;
            }
        }
        if let Some(content_type) = self.content_type {
            if record.content_type != content_type {
                return false;
            }
        }
        if record.confidence_score < self.min_confidence {
            return false;
        }

        let lowered = record.content.to_lowercase();
        self.terms
            .iter()
            .all(|term| lowered.contains(&term.to_lowercase()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub manufacturer: Option<String>,
    pub content_type: Option<ContentType>,
    pub min_confidence: f64,
    pub max_results: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            manufacturer: None,
            content_type: None,
            min_confidence: 0.0,
            max_results: 10,
        }
    }

    /// Lower-cased tokens longer than two characters. A query made only of
    /// short tokens is kept whole so the fallback still narrows the results.
    pub fn query_terms(&self) -> Vec<String> {
        let terms = self
            .query
            .split_whitespace()
            .map(|token| token.to_lowercase())
            .filter(|token| token.chars().count() > 2)
            .collect::<Vec<_>>();
        if !terms.is_empty() {
            return terms;
        }

        let whole = self.query.trim().to_lowercase();
        if whole.is_empty() {
            Vec::new()
        } else {
            vec![whole]
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub record: ContentRecord,
    pub similarity_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total_results: usize,
    pub search_time_ms: f64,
    /// Set when the vector store could not answer and the structured store was scanned instead.
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorMetadata {
    pub content_id: Uuid,
    pub manufacturer: String,
    pub model_series: String,
    pub content_type: ContentType,
    pub source_manual: String,
}

impl From<&ContentRecord> for VectorMetadata {
    fn from(record: &ContentRecord) -> Self {
        Self {
            content_id: record.id,
            manufacturer: record.manufacturer.clone(),
            model_series: record.model_series.clone(),
            content_type: record.content_type,
            source_manual: record.source_manual.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub id: Uuid,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// Metadata filter pushed down to the vector store. Manufacturer is matched
/// by substring on the structured record instead, since vector backends only
/// offer exact metadata equality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorFilter {
    pub content_type: Option<ContentType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: Uuid,
    pub distance: f64,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_text_length: usize,
    pub min_readability_score: f64,
    pub duplicate_similarity_threshold: f64,
    pub duplicate_window: usize,
    pub embedding_batch_size: usize,
    pub job_timeout: Duration,
    pub max_file_size_mb: u64,
    pub allowed_extensions: Vec<String>,
    pub upload_directory: PathBuf,
    pub list_preview_chars: usize,
    pub fallback_similarity: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1_000,
            chunk_overlap: 200,
            min_text_length: 50,
            min_readability_score: 0.3,
            duplicate_similarity_threshold: 0.9,
            duplicate_window: 100,
            embedding_batch_size: 32,
            job_timeout: Duration::from_secs(300),
            max_file_size_mb: 50,
            allowed_extensions: vec![".pdf".to_string(), ".txt".to_string()],
            upload_directory: std::env::temp_dir().join("manual-uploads"),
            list_preview_chars: 500,
            fallback_similarity: 0.5,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chunk_size <= 2 {
            return Err(IngestError::InvalidConfig(format!(
                "max_chunk_size {} is too small",
                self.max_chunk_size
            )));
        }
        if self.chunk_overlap >= self.max_chunk_size {
            return Err(IngestError::InvalidConfig(format!(
                "chunk_overlap {} must be below max_chunk_size {}",
                self.chunk_overlap, self.max_chunk_size
            )));
        }
        if self.min_text_length > self.max_chunk_size {
            return Err(IngestError::InvalidConfig(format!(
                "min_text_length {} exceeds max_chunk_size {}",
                self.min_text_length, self.max_chunk_size
            )));
        }
        if self.embedding_batch_size == 0 {
            return Err(IngestError::InvalidConfig(
                "embedding_batch_size must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("min_readability_score", self.min_readability_score),
            ("duplicate_similarity_threshold", self.duplicate_similarity_threshold),
            ("fallback_similarity", self.fallback_similarity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(IngestError::InvalidConfig(format!(
                    "{name} {value} is outside [0, 1]"
                )));
            }
        }
        Ok(())
    }

    pub fn is_allowed_file(&self, filename: &str) -> bool {
        let lowered = filename.to_lowercase();
        self.allowed_extensions
            .iter()
            .any(|extension| lowered.ends_with(&extension.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let config = PipelineConfig {
            max_chunk_size: 100,
            chunk_overlap: 100,
            min_text_length: 10,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(IngestError::InvalidConfig(_))));
    }

    #[test]
    fn query_terms_count_characters_and_keep_short_queries() {
        assert_eq!(
            SearchRequest::new("Drain the pump").query_terms(),
            vec!["drain", "the", "pump"]
        );
        assert_eq!(SearchRequest::new("é à ün").query_terms(), vec!["é à ün"]);
        assert_eq!(SearchRequest::new("öl ab wäsche").query_terms(), vec!["wäsche"]);
        assert_eq!(SearchRequest::new("E1 F2").query_terms(), vec!["e1 f2"]);
        assert!(SearchRequest::new("   ").query_terms().is_empty());
    }

    #[test]
    fn filter_manufacturer_is_case_insensitive_substring() {
        let record = ContentRecord::new(
            "Check the drain pump filter".to_string(),
            "Drain".to_string(),
            ContentMetadata {
                manufacturer: "Whirlpool".to_string(),
                model_series: "WTW5000".to_string(),
                content_type: ContentType::Maintenance,
                source_manual: "whirlpool.pdf".to_string(),
            },
            0.8,
            4,
        );

        let filter = RecordFilter {
            manufacturer: Some("whirl".to_string()),
            terms: vec!["DRAIN".to_string()],
            ..RecordFilter::default()
        };
        assert!(filter.matches(&record));
        assert_eq!(record.page_number(), Some(4));

        let strict = RecordFilter {
            min_confidence: 0.9,
            ..RecordFilter::default()
        };
        assert!(!strict.matches(&record));
    }

    #[test]
    fn preview_truncates_long_content() {
        let metadata = ContentMetadata {
            manufacturer: "Unknown".to_string(),
            model_series: "Unknown".to_string(),
            content_type: ContentType::Safety,
            source_manual: "m.pdf".to_string(),
        };
        let record = ContentRecord::new("x".repeat(20), "t".to_string(), metadata, 0.5, 1);
        let preview = record.preview(5);
        assert_eq!(preview.content, "xxxxx...");
        assert_eq!(record.preview(50).content.len(), 20);
    }

    #[test]
    fn content_type_parses_case_insensitively() {
        assert_eq!("Safety".parse::<ContentType>().ok(), Some(ContentType::Safety));
        assert!("recipes".parse::<ContentType>().is_err());
    }
}
