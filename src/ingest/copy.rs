//! Background file copy with pollable progress
//!
//! Each copy runs as its own tokio task and reports into a shared map
//! keyed by an opaque token. Pollers only ever read that map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Copying,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyProgress {
    pub token: String,
    pub item_id: u64,
    pub percent: u8,
    pub status: CopyStatus,
    pub bytes_copied: u64,
    pub total_bytes: u64,
    pub destination: PathBuf,
    pub error: Option<String>,
    /// Owner no longer needs the record; dropped once the copy stops
    #[serde(skip)]
    released: bool,
}

/// Shared progress records for all running and finished copies
#[derive(Debug, Clone, Default)]
pub struct CopyTracker {
    progress: Arc<RwLock<HashMap<String, CopyProgress>>>,
}

/// Whole-number percentage of a copy, 100 for empty files
pub fn percent_of(copied: u64, total: u64) -> u8 {
    if total == 0 {
        100
    } else {
        (copied.saturating_mul(100) / total).min(100) as u8
    }
}

/// Claim a free file name in `dir`, appending `_1`, `_2`, ... to the stem
/// when `file_name` is taken. The returned path exists and is empty.
pub async fn reserve_destination(dir: &Path, file_name: &str) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let original = Path::new(file_name);
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let extension = original.extension().map(|e| e.to_string_lossy().into_owned());

    let mut counter = 0u32;
    loop {
        let candidate_name = match (counter, &extension) {
            (0, _) => file_name.to_string(),
            (n, Some(ext)) => format!("{}_{}.{}", stem, n, ext),
            (n, None) => format!("{}_{}", stem, n),
        };
        let candidate = dir.join(candidate_name);

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e),
        }
    }
}

impl CopyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start copying `source` to the reserved `destination`; returns the token
    pub async fn start(
        &self,
        item_id: u64,
        source: PathBuf,
        destination: PathBuf,
        total_bytes: u64,
        chunk_size: usize,
    ) -> String {
        let token = format!("copy_{}", Uuid::now_v7().simple());

        self.progress.write().await.insert(
            token.clone(),
            CopyProgress {
                token: token.clone(),
                item_id,
                percent: 0,
                status: CopyStatus::Copying,
                bytes_copied: 0,
                total_bytes,
                destination: destination.clone(),
                error: None,
                released: false,
            },
        );

        info!("📦 Copying {} -> {}", source.display(), destination.display());

        let tracker = self.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            let result = tracker
                .copy_chunks(&task_token, &source, &destination, chunk_size.max(1))
                .await;
            tracker.finish(&task_token, result).await;
        });

        token
    }

    pub async fn get(&self, token: &str) -> Option<CopyProgress> {
        self.progress.read().await.get(token).cloned()
    }

    /// Forget a copy's record. A running copy keeps reporting until it
    /// stops and is forgotten then.
    pub async fn release(&self, token: &str) {
        let mut map = self.progress.write().await;
        let finished = match map.get_mut(token) {
            Some(progress) if progress.status == CopyStatus::Copying => {
                progress.released = true;
                false
            }
            Some(_) => true,
            None => false,
        };
        if finished {
            map.remove(token);
        }
    }

    pub async fn release_all<I>(&self, tokens: I)
    where
        I: IntoIterator<Item = String>,
    {
        for token in tokens {
            self.release(&token).await;
        }
    }

    /// Number of records held, running or finished
    pub async fn len(&self) -> usize {
        self.progress.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Poll until the copy leaves the `copying` status
    pub async fn wait(&self, token: &str) -> Option<CopyProgress> {
        loop {
            match self.get(token).await {
                Some(progress) if progress.status == CopyStatus::Copying => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                other => return other,
            }
        }
    }

    async fn copy_chunks(
        &self,
        token: &str,
        source: &Path,
        destination: &Path,
        chunk_size: usize,
    ) -> std::io::Result<()> {
        let mut reader = tokio::fs::File::open(source).await?;
        let total = reader.metadata().await?.len();
        let mut writer = tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(destination)
            .await?;

        let mut buffer = vec![0u8; chunk_size];
        let mut copied = 0u64;
        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            writer.write_all(&buffer[..read]).await?;
            copied += read as u64;
            self.record(token, copied, total).await;
        }

        writer.flush().await?;
        writer.sync_all().await?;
        Ok(())
    }

    async fn record(&self, token: &str, copied: u64, total: u64) {
        if let Some(progress) = self.progress.write().await.get_mut(token) {
            progress.bytes_copied = copied;
            progress.total_bytes = total;
            progress.percent = progress.percent.max(percent_of(copied, total));
        }
    }

    async fn finish(&self, token: &str, result: std::io::Result<()>) {
        let mut map = self.progress.write().await;
        let Some(progress) = map.get_mut(token) else {
            return;
        };

        match result {
            Ok(()) => {
                progress.percent = 100;
                progress.status = CopyStatus::Complete;
                info!("✅ Copy complete: {}", progress.destination.display());
            }
            Err(e) => {
                progress.status = CopyStatus::Failed;
                progress.error = Some(e.to_string());
                error!("❌ Copy to {} failed: {}", progress.destination.display(), e);
                if let Err(remove_err) = tokio::fs::remove_file(&progress.destination).await {
                    tracing::debug!("Partial copy not removed: {}", remove_err);
                }
            }
        }

        if progress.released {
            map.remove(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(0, 0), 100);
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(3, 3), 100);
        assert_eq!(percent_of(5, 3), 100);
    }

    #[tokio::test]
    async fn test_reserve_destination_appends_counter() {
        let temp_dir = TempDir::new().unwrap();
        let first = reserve_destination(temp_dir.path(), "clip.mp4").await.unwrap();
        let second = reserve_destination(temp_dir.path(), "clip.mp4").await.unwrap();
        let third = reserve_destination(temp_dir.path(), "clip.mp4").await.unwrap();

        assert_eq!(first.file_name().unwrap(), "clip.mp4");
        assert_eq!(second.file_name().unwrap(), "clip_1.mp4");
        assert_eq!(third.file_name().unwrap(), "clip_2.mp4");
    }

    #[tokio::test]
    async fn test_copy_completes_in_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&source, &data).unwrap();

        let destination = reserve_destination(&temp_dir.path().join("out"), "source.bin")
            .await
            .unwrap();
        let tracker = CopyTracker::new();
        let token = tracker
            .start(7, source, destination.clone(), data.len() as u64, 1024)
            .await;

        let progress = tracker.wait(&token).await.unwrap();
        assert_eq!(progress.status, CopyStatus::Complete);
        assert_eq!(progress.percent, 100);
        assert_eq!(progress.bytes_copied, 10_000);
        assert_eq!(std::fs::read(&destination).unwrap(), data);
    }

    #[tokio::test]
    async fn test_missing_source_reports_failure() {
        let temp_dir = TempDir::new().unwrap();
        let destination = reserve_destination(temp_dir.path(), "gone.bin").await.unwrap();
        let tracker = CopyTracker::new();
        let token = tracker
            .start(1, temp_dir.path().join("nope.bin"), destination.clone(), 0, 1024)
            .await;

        let progress = tracker.wait(&token).await.unwrap();
        assert_eq!(progress.status, CopyStatus::Failed);
        assert!(progress.error.is_some());
        assert!(!destination.exists());
        assert!(tracker.get("copy_unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_release_drops_finished_and_running_copies() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.bin");
        std::fs::write(&source, vec![7u8; 64 * 1024]).unwrap();
        let tracker = CopyTracker::new();

        let done = reserve_destination(temp_dir.path(), "done.bin").await.unwrap();
        let done_token = tracker.start(1, source.clone(), done, 64 * 1024, 4096).await;
        tracker.wait(&done_token).await.unwrap();
        tracker.release(&done_token).await;
        assert!(tracker.get(&done_token).await.is_none());

        let running = reserve_destination(temp_dir.path(), "running.bin").await.unwrap();
        let running_token = tracker.start(2, source, running.clone(), 64 * 1024, 16).await;
        tracker.release(&running_token).await;
        assert_eq!(
            tracker.get(&running_token).await.map(|p| p.status),
            Some(CopyStatus::Copying)
        );

        while tracker.get(&running_token).await.is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(tracker.is_empty().await);
        assert_eq!(std::fs::metadata(&running).unwrap().len(), 64 * 1024);
    }
}
