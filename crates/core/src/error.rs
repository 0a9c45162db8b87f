use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("no readable text found in document: {0}")]
    NoReadableText(String),

    #[error("no valid text chunks extracted from {0}")]
    NoChunks(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("file {filename} is {size_bytes} bytes, limit is {limit_mb}MB")]
    FileTooLarge {
        filename: String,
        size_bytes: u64,
        limit_mb: u64,
    },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("processing exceeded the {seconds}s job timeout")]
    Timeout { seconds: u64 },

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job {0} already reached a terminal state")]
    JobFinished(String),

    #[error("content not found: {0}")]
    ContentNotFound(uuid::Uuid),

    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store request failed: {0}")]
    Request(String),

    #[error("store not available yet: {0}")]
    NotReady(String),

    #[error("{0} is unavailable")]
    Unavailable(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
