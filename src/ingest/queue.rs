use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{MediaError, Result};
use crate::media::MediaKind;

/// Lifecycle of one queued file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ItemState {
    Queued,
    MetadataExtracted,
    /// Copy running or failed; `percent` never decreases
    Copying { token: String, percent: u8 },
    ReadyForReview,
    ThumbnailsGenerated,
    Committed,
    Skipped,
}

impl ItemState {
    pub fn name(&self) -> &'static str {
        match self {
            ItemState::Queued => "Queued",
            ItemState::MetadataExtracted => "MetadataExtracted",
            ItemState::Copying { .. } => "Copying",
            ItemState::ReadyForReview => "ReadyForReview",
            ItemState::ThumbnailsGenerated => "ThumbnailsGenerated",
            ItemState::Committed => "Committed",
            ItemState::Skipped => "Skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Committed | ItemState::Skipped)
    }
}

/// Technical metadata read from the source file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub file_id: String,
    pub file_name: String,
    /// Lowercased extension
    pub file_type: String,
    /// Image format or video codec
    pub file_format: Option<String>,
    /// `WIDTHxHEIGHT`
    pub file_resolution: Option<String>,
    /// `MM:SS` or `HH:MM:SS`
    pub file_duration: Option<String>,
    pub duration_secs: Option<f64>,
    pub container: Option<String>,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionItem {
    pub id: u64,
    pub source_path: PathBuf,
    #[serde(flatten)]
    pub state: ItemState,
    pub kind: Option<MediaKind>,
    pub metadata: Option<ExtractedMetadata>,
    /// Copy destination inside the depot
    pub dest_path: Option<PathBuf>,
    /// Progress token of the latest copy, kept after it completes
    pub copy_token: Option<String>,
    /// Depot-relative preview images
    pub thumbnails: Vec<String>,
    pub last_error: Option<String>,
}

impl IngestionItem {
    fn new(id: u64, source_path: PathBuf) -> Self {
        Self {
            id,
            source_path,
            state: ItemState::Queued,
            kind: None,
            metadata: None,
            dest_path: None,
            copy_token: None,
            thumbnails: Vec::new(),
            last_error: None,
        }
    }

    /// Error for an operation not allowed in the current state
    pub fn reject(&self, operation: &'static str) -> MediaError {
        MediaError::InvalidTransition {
            item_id: self.id,
            state: self.state.name().to_string(),
            operation,
        }
    }
}

/// Point-in-time view of a session's queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub items: Vec<IngestionItem>,
    /// Item the user is expected to handle next
    pub current: Option<u64>,
    pub counts: BTreeMap<String, usize>,
    pub remaining: usize,
}

/// Per-session list of files moving through ingestion
#[derive(Debug, Clone, Default)]
pub struct IngestionQueue {
    items: Vec<IngestionItem>,
    next_id: u64,
    cursor: usize,
}

impl IngestionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append files in `Queued` state; duplicates get their own items
    pub fn enqueue<I>(&mut self, paths: I) -> Vec<u64>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        paths
            .into_iter()
            .map(|path| {
                self.next_id += 1;
                self.items.push(IngestionItem::new(self.next_id, path));
                self.next_id
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[IngestionItem] {
        &self.items
    }

    pub fn get(&self, id: u64) -> Result<&IngestionItem> {
        self.items
            .iter()
            .find(|item| item.id == id)
            .ok_or_else(|| MediaError::NotFound(format!("ingestion item {}", id)))
    }

    pub fn get_mut(&mut self, id: u64) -> Result<&mut IngestionItem> {
        self.items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| MediaError::NotFound(format!("ingestion item {}", id)))
    }

    /// Item currently copying under `token`
    pub fn find_by_token_mut(&mut self, token: &str) -> Option<&mut IngestionItem> {
        self.items
            .iter_mut()
            .find(|item| matches!(&item.state, ItemState::Copying { token: t, .. } if t == token))
    }

    /// Progress tokens still referenced by items
    pub fn copy_tokens(&self) -> Vec<String> {
        self.items.iter().filter_map(|item| item.copy_token.clone()).collect()
    }

    pub fn current(&self) -> Option<&IngestionItem> {
        self.items.get(self.cursor)
    }

    /// Move the cursor past `id` if it is not already beyond it
    pub fn advance_past(&mut self, id: u64) {
        if let Some(index) = self.items.iter().position(|item| item.id == id) {
            self.cursor = self.cursor.max(index + 1);
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.cursor = 0;
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let mut counts = BTreeMap::new();
        for item in &self.items {
            *counts.entry(item.state.name().to_string()).or_insert(0) += 1;
        }

        QueueSnapshot {
            items: self.items.clone(),
            current: self.current().map(|item| item.id),
            remaining: self.items.iter().filter(|item| !item.state.is_terminal()).count(),
            counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_allows_duplicates() {
        let mut queue = IngestionQueue::new();
        let ids = queue.enqueue(vec![PathBuf::from("/in/a.mp4"), PathBuf::from("/in/a.mp4")]);
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get(2).unwrap().state, ItemState::Queued);
    }

    #[test]
    fn test_cursor_only_moves_forward() {
        let mut queue = IngestionQueue::new();
        queue.enqueue((0..3).map(|i| PathBuf::from(format!("/in/{}.jpg", i))));
        assert_eq!(queue.current().map(|i| i.id), Some(1));

        queue.advance_past(2);
        assert_eq!(queue.current().map(|i| i.id), Some(3));
        queue.advance_past(1);
        assert_eq!(queue.current().map(|i| i.id), Some(3));
        queue.advance_past(3);
        assert!(queue.current().is_none());
    }

    #[test]
    fn test_snapshot_counts() {
        let mut queue = IngestionQueue::new();
        queue.enqueue(vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")]);
        queue.get_mut(1).unwrap().state = ItemState::Skipped;

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.counts.get("Queued"), Some(&1));
        assert_eq!(snapshot.counts.get("Skipped"), Some(&1));
        assert_eq!(snapshot.remaining, 1);

        queue.clear();
        assert!(queue.is_empty());
        assert!(matches!(queue.get(1), Err(MediaError::NotFound(_))));
    }

    #[test]
    fn test_state_serialises_with_tag() {
        let state = ItemState::Copying { token: "copy_x".into(), percent: 40 };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["state"], "copying");
        assert_eq!(value["percent"], 40);
    }
}
