use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Malformed record: {0}")]
    Record(#[from] RecordError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Operation timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failures of the remote hashtag search.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Hashtag not found: {hashtag}")]
    HashtagNotFound { hashtag: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Circuit breaker is open")]
    CircuitOpen,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Corrupt dataset at {path}: {reason}")]
    CorruptData { path: PathBuf, reason: String },

    #[error("Failed to write dataset {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("Failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },
}

/// A fetched record that cannot take part in deduplication.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("record at position {index} is not a JSON object")]
    NotAnObject { index: usize },

    #[error("record at position {index} has no id")]
    MissingId { index: usize },

    #[error("record at position {index} has an unusable id: {value}")]
    InvalidId { index: usize, value: String },
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Media for post {post_id} unavailable: {reason}")]
    Unavailable { post_id: String, reason: String },

    #[error("Unsupported content type for post {post_id}: {content_type}")]
    UnsupportedContentType {
        post_id: String,
        content_type: String,
    },

    #[error("External downloader failed for post {post_id}: {details}")]
    ToolFailed { post_id: String, details: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Output directory is not writable: {path}")]
    NotWritable { path: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
