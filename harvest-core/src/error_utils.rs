use crate::error::*;
use std::fmt;
use std::time::Duration;
use tracing::{error, warn};

/// Classification and reporting shared by every error in the workspace.
pub trait ErrorExt: fmt::Display {
    /// Stable machine-readable code, logged next to the message.
    fn error_code(&self) -> String;

    fn user_friendly_message(&self) -> String;

    /// Whether repeating the same request may succeed.
    fn is_retryable(&self) -> bool {
        false
    }

    /// Wait the remote side asked for before the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn log_error(&self) -> &Self {
        error!(code = %self.error_code(), "{}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!(code = %self.error_code(), "{}", self);
        self
    }
}

impl ErrorExt for CoreError {
    fn error_code(&self) -> String {
        match self {
            CoreError::Fetch(e) => e.error_code(),
            CoreError::Store(e) => e.error_code(),
            CoreError::Record(e) => e.error_code(),
            CoreError::Media(e) => e.error_code(),
            CoreError::Config(e) => e.error_code(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Timeout { .. } => "TIMEOUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Fetch(e) => e.user_friendly_message(),
            CoreError::Store(e) => e.user_friendly_message(),
            CoreError::Record(e) => e.user_friendly_message(),
            CoreError::Media(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            CoreError::Timeout { .. } => {
                "The operation took too long to complete. Please try again.".to_string()
            }
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Fetch(e) => e.is_retryable(),
            CoreError::Network(e) => e.is_timeout() || e.is_connect(),
            CoreError::Timeout { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::Fetch(e) => e.retry_after(),
            _ => None,
        }
    }
}

impl ErrorExt for FetchError {
    fn error_code(&self) -> String {
        match self {
            FetchError::RateLimitExceeded { .. } => "FETCH_RATE_LIMIT".to_string(),
            FetchError::Forbidden { .. } => "FETCH_FORBIDDEN".to_string(),
            FetchError::HashtagNotFound { .. } => "FETCH_HASHTAG_NOT_FOUND".to_string(),
            FetchError::RequestTimeout => "FETCH_TIMEOUT".to_string(),
            FetchError::InvalidResponse { .. } => "FETCH_INVALID_RESPONSE".to_string(),
            FetchError::ServerError { .. } => "FETCH_SERVER_ERROR".to_string(),
            FetchError::CircuitOpen => "FETCH_CIRCUIT_OPEN".to_string(),
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            FetchError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            FetchError::Forbidden { resource } => format!(
                "Access denied to {}. The msToken may be missing or expired.",
                resource
            ),
            FetchError::HashtagNotFound { hashtag } => {
                format!("Hashtag '#{}' was not found.", hashtag)
            }
            FetchError::RequestTimeout => "Search request timed out. Please try again.".to_string(),
            FetchError::CircuitOpen => {
                "Too many consecutive failures; searches are paused for a while.".to_string()
            }
            _ => "The search service returned an error. Please try again later.".to_string(),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            FetchError::RateLimitExceeded { .. } => true,
            FetchError::RequestTimeout => true,
            FetchError::ServerError { status_code } => *status_code >= 500,
            FetchError::InvalidResponse { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }
}

impl ErrorExt for StoreError {
    fn error_code(&self) -> String {
        match self {
            StoreError::CorruptData { .. } => "STORE_CORRUPT_DATA".to_string(),
            StoreError::WriteFailed { .. } => "STORE_WRITE_FAILED".to_string(),
            StoreError::ReadFailed { .. } => "STORE_READ_FAILED".to_string(),
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            StoreError::CorruptData { path, .. } => format!(
                "The dataset at {} could not be parsed. It has been left untouched for inspection.",
                path.display()
            ),
            StoreError::WriteFailed { path, .. } => {
                format!("Could not save the dataset to {}.", path.display())
            }
            StoreError::ReadFailed { path, .. } => {
                format!("Could not read {}.", path.display())
            }
        }
    }
}

impl ErrorExt for RecordError {
    fn error_code(&self) -> String {
        match self {
            RecordError::NotAnObject { .. } => "RECORD_NOT_AN_OBJECT".to_string(),
            RecordError::MissingId { .. } => "RECORD_MISSING_ID".to_string(),
            RecordError::InvalidId { .. } => "RECORD_INVALID_ID".to_string(),
        }
    }

    fn user_friendly_message(&self) -> String {
        "A fetched post had no usable id and was dropped.".to_string()
    }
}

impl ErrorExt for MediaError {
    fn error_code(&self) -> String {
        match self {
            MediaError::Unavailable { .. } => "MEDIA_UNAVAILABLE".to_string(),
            MediaError::UnsupportedContentType { .. } => "MEDIA_UNSUPPORTED_TYPE".to_string(),
            MediaError::ToolFailed { .. } => "MEDIA_TOOL_FAILED".to_string(),
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            MediaError::Unavailable { post_id, .. } => {
                format!("Media for post {} is no longer available.", post_id)
            }
            MediaError::UnsupportedContentType { content_type, .. } => {
                format!("Media type '{}' is not supported.", content_type)
            }
            MediaError::ToolFailed { .. } => {
                "The external video downloader failed. Is it installed?".to_string()
            }
        }
    }
}

impl ErrorExt for ConfigError {
    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::NotWritable { .. } => "CONFIG_NOT_WRITABLE".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' was not found.", path)
            }
            ConfigError::InvalidValue { field, value } => {
                format!("Invalid value '{}' for setting '{}'.", value, field)
            }
            ConfigError::NotWritable { path } => format!(
                "You don't have write permissions for the output directory `{}`. \
                 Please specify an output directory that you have write access to.",
                path
            ),
            ConfigError::Parse(e) => format!("Configuration file could not be parsed: {}", e),
        }
    }
}
