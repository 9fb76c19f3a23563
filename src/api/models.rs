//! API data models

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::media::MediaKind;

/// Error body returned for every failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub kind: String,
}

/// A set of record identifiers
#[derive(Debug, Serialize, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EnqueueRequest {
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Queue every file under this directory as well
    pub folder: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CopyRequest {
    /// Overrides the depot subdirectory picked from the file type
    pub category: Option<MediaKind>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitRequest {
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateFieldRequest {
    pub file_id: String,
    pub field: String,
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    pub top: Option<usize>,
}
