//! Error kinds surfaced by the catalog core

use axum::http::StatusCode;

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, MediaError>;

/// Error types for catalog, search and ingestion operations
#[derive(thiserror::Error, Debug)]
pub enum MediaError {
    /// Fatal startup problem: unset depot root, unreadable store path
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller-correctable input problem
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Metadata extraction failed for item {item_id} ({path}): {reason}")]
    MetadataExtraction {
        item_id: u64,
        path: String,
        reason: String,
    },

    #[error("IO error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Copy failed for item {item_id}: {reason}")]
    CopyFailed { item_id: u64, reason: String },

    #[error("Thumbnail generation failed for item {item_id}: {reason}")]
    Thumbnail { item_id: u64, reason: String },

    #[error("Item {item_id} is {state}; cannot {operation}")]
    InvalidTransition {
        item_id: u64,
        state: String,
        operation: &'static str,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl MediaError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        MediaError::Io {
            context: context.into(),
            source,
        }
    }

    /// Short machine-readable kind, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            MediaError::Configuration(_) => "ConfigurationError",
            MediaError::Validation(_) => "ValidationError",
            MediaError::Storage(_) => "StorageError",
            MediaError::MetadataExtraction { .. } => "MetadataExtractionError",
            MediaError::Io { .. } | MediaError::CopyFailed { .. } => "IOError",
            MediaError::Thumbnail { .. } => "ThumbnailError",
            MediaError::InvalidTransition { .. } => "InvalidTransition",
            MediaError::NotFound(_) => "NotFound",
        }
    }

    /// HTTP status the request layer reports for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            MediaError::Validation(_) => StatusCode::BAD_REQUEST,
            MediaError::NotFound(_) => StatusCode::NOT_FOUND,
            MediaError::InvalidTransition { .. } => StatusCode::CONFLICT,
            MediaError::MetadataExtraction { .. } | MediaError::Thumbnail { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            MediaError::Configuration(_)
            | MediaError::Storage(_)
            | MediaError::Io { .. }
            | MediaError::CopyFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
