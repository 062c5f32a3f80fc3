use thiserror::Error;

/// Failures talking to an embedding or generation backend. Never retried here.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("malformed response from {backend}: missing {field}")]
    MalformedResponse { backend: String, field: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid topic id: {0:?}")]
    InvalidTopicId(String),

    #[error("refusing to overwrite {path}: it belongs to topic {existing}")]
    TopicConflict { path: String, existing: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding dimension {actual} != {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding failed: {0}")]
    Service(#[from] ServiceError),

    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(String),

    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("query vector dim {actual} is not {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("external service failed: {0}")]
    Service(#[from] ServiceError),

    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),

    #[error("index rebuild failed: {0}")]
    Ingest(#[from] IngestError),
}
