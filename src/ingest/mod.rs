//! Session-scoped ingestion: extract, copy, thumbnail, commit
//!
//! Every operation takes the caller's [`IngestionQueue`] explicitly. Per-item
//! failures leave the item in its pre-failure state and never touch the
//! rest of the queue.

pub mod copy;
pub mod queue;

pub use copy::{CopyProgress, CopyStatus, CopyTracker};
pub use queue::{ExtractedMetadata, IngestionItem, IngestionQueue, ItemState, QueueSnapshot};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{MediaError, Result};
use crate::media::{extension_lowercase, format_duration, MediaKind, MediaRecord, EDITABLE_FIELDS};
use crate::paths::PathResolver;
use crate::probe::{image_decodable, MediaProbe};
use crate::store::MetadataStore;

/// Number of preview frames per video
pub const THUMBNAIL_COUNT: usize = 4;

/// Gap kept before the end of the video for the last preview frame
const END_MARGIN: Duration = Duration::from_millis(100);

/// Sample points at 25%, 50%, 75% and 100% of the duration
pub fn thumbnail_timestamps(duration: Duration) -> Vec<Duration> {
    (1..=THUMBNAIL_COUNT as u32)
        .map(|quarter| {
            let at = duration * quarter / THUMBNAIL_COUNT as u32;
            if quarter as usize == THUMBNAIL_COUNT {
                at.saturating_sub(END_MARGIN.min(duration / 10))
            } else {
                at
            }
        })
        .collect()
}

/// `<stem>.jpg` beside the video, then `<stem>.thumbs/2.jpg` .. `4.jpg`.
///
/// The extra previews live in a per-video directory so they can never
/// take the name of another video's `<stem>_N.jpg` first preview.
pub fn thumbnail_paths(video: &Path) -> Vec<PathBuf> {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = video.parent().unwrap_or_else(|| Path::new(""));
    let extras = dir.join(format!("{}.thumbs", stem));

    (1..=THUMBNAIL_COUNT)
        .map(|n| match n {
            1 => dir.join(format!("{}.jpg", stem)),
            n => extras.join(format!("{}.jpg", n)),
        })
        .collect()
}

pub struct IngestionPipeline {
    config: Arc<Config>,
    resolver: Arc<PathResolver>,
    store: Arc<dyn MetadataStore>,
    probe: Arc<dyn MediaProbe>,
    tracker: CopyTracker,
}

impl IngestionPipeline {
    pub fn new(
        config: Arc<Config>,
        resolver: Arc<PathResolver>,
        store: Arc<dyn MetadataStore>,
        probe: Arc<dyn MediaProbe>,
    ) -> Self {
        Self {
            config,
            resolver,
            store,
            probe,
            tracker: CopyTracker::new(),
        }
    }

    pub fn tracker(&self) -> &CopyTracker {
        &self.tracker
    }

    /// Queue files; every path must name an existing file
    pub fn enqueue(&self, queue: &mut IngestionQueue, paths: Vec<PathBuf>) -> Result<QueueSnapshot> {
        if let Some(missing) = paths.iter().find(|p| !p.is_file()) {
            return Err(MediaError::Validation(format!("not a file: {}", missing.display())));
        }

        let ids = queue.enqueue(paths);
        info!("📥 Queued {} files for ingestion", ids.len());
        Ok(queue.snapshot())
    }

    /// Queue every regular, non-hidden file under `dir`, in path order
    pub fn enqueue_folder(&self, queue: &mut IngestionQueue, dir: &Path) -> Result<QueueSnapshot> {
        let files = self.folder_files(dir)?;
        self.enqueue(queue, files)
    }

    /// Regular, non-hidden files under `dir`, in path order
    pub fn folder_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(MediaError::Validation(format!("not a directory: {}", dir.display())));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                MediaError::io(
                    format!("scanning {}", dir.display()),
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
                )
            })?;
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if entry.file_type().is_file() && !hidden {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Read technical metadata and assign the item its catalog identifier
    pub async fn extract_metadata(&self, queue: &mut IngestionQueue, item_id: u64) -> Result<IngestionItem> {
        let source = {
            let item = queue.get(item_id)?;
            if !matches!(item.state, ItemState::Queued | ItemState::MetadataExtracted) {
                return Err(item.reject("extract metadata"));
            }
            item.source_path.clone()
        };

        let kind = MediaKind::from_path(&source, &self.config.ingestion);
        match self.read_metadata(&source, kind).await {
            Ok(metadata) => {
                let item = queue.get_mut(item_id)?;
                debug!("Extracted metadata for item {}: {:?}", item_id, metadata);
                item.kind = Some(kind);
                item.metadata = Some(metadata);
                item.state = ItemState::MetadataExtracted;
                item.last_error = None;
                Ok(item.clone())
            }
            Err(reason) => {
                warn!("⚠️ Metadata extraction failed for {}: {:#}", source.display(), reason);
                let reason = format!("{:#}", reason);
                queue.get_mut(item_id)?.last_error = Some(reason.clone());
                queue.advance_past(item_id);
                Err(MediaError::MetadataExtraction {
                    item_id,
                    path: source.display().to_string(),
                    reason,
                })
            }
        }
    }

    async fn read_metadata(&self, source: &Path, kind: MediaKind) -> anyhow::Result<ExtractedMetadata> {
        let file_size = tokio::fs::metadata(source).await?.len();
        let file_type = extension_lowercase(source);
        let mut metadata = ExtractedMetadata {
            file_id: Uuid::now_v7().to_string(),
            file_name: source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_type: file_type.clone(),
            file_size,
            ..Default::default()
        };

        match kind {
            MediaKind::Video => {
                let info = self.probe.probe_video(source).await?;
                let seconds = info.duration.as_secs_f64();
                metadata.file_format = Some(info.codec);
                metadata.container = Some(info.container);
                metadata.file_resolution = Some(format!("{}x{}", info.width, info.height));
                metadata.file_duration = Some(format_duration(seconds));
                metadata.duration_secs = Some(seconds);
            }
            MediaKind::Image if image_decodable(source) => {
                let info = self.probe.probe_image(source).await?;
                metadata.file_format = Some(info.format);
                metadata.file_resolution = Some(format!("{}x{}", info.width, info.height));
            }
            MediaKind::Image | MediaKind::Other => {
                metadata.file_format = Some(file_type).filter(|t| !t.is_empty());
            }
        }

        Ok(metadata)
    }

    /// Start copying into the depot; returns the progress token.
    ///
    /// The destination subdirectory follows the detected kind unless
    /// `category` overrides it. An item whose previous copy failed can be
    /// copied again.
    pub async fn copy_file(
        &self,
        queue: &mut IngestionQueue,
        item_id: u64,
        category: Option<MediaKind>,
    ) -> Result<String> {
        self.refresh_copy_state(queue, item_id).await?;
        let failed_token = match &queue.get(item_id)?.state {
            ItemState::Copying { token, .. } => match self.tracker.get(token).await {
                Some(progress) if progress.status == CopyStatus::Failed => Some(token.clone()),
                _ => None,
            },
            _ => None,
        };

        let item = queue.get(item_id)?;
        let (kind, metadata) = match (&item.state, item.kind, &item.metadata) {
            (ItemState::MetadataExtracted, Some(kind), Some(metadata)) => (kind, metadata),
            (ItemState::Copying { .. }, Some(kind), Some(metadata)) if failed_token.is_some() => {
                (kind, metadata)
            }
            _ => return Err(item.reject("copy")),
        };
        let source = item.source_path.clone();
        let file_name = metadata.file_name.clone();

        let total_bytes = tokio::fs::metadata(&source)
            .await
            .map_err(|e| MediaError::CopyFailed {
                item_id,
                reason: format!("source unreadable: {}", e),
            })?
            .len();

        let dir = self
            .resolver
            .root()
            .join(&self.config.depot.archive_dir)
            .join(category.unwrap_or(kind).subdir());
        let destination = copy::reserve_destination(&dir, &file_name)
            .await
            .map_err(|e| MediaError::CopyFailed {
                item_id,
                reason: format!("cannot create {} in {}: {}", file_name, dir.display(), e),
            })?;

        let token = self
            .tracker
            .start(
                item_id,
                source,
                destination.clone(),
                total_bytes,
                self.config.ingestion.copy_chunk_size,
            )
            .await;

        if let Some(previous) = failed_token {
            info!("🔁 Retrying copy for item {}", item_id);
            self.tracker.release(&previous).await;
        }

        let item = queue.get_mut(item_id)?;
        item.dest_path = Some(destination);
        item.copy_token = Some(token.clone());
        item.last_error = None;
        item.state = ItemState::Copying {
            token: token.clone(),
            percent: 0,
        };
        Ok(token)
    }

    /// Current progress for a token, synchronised into the owning item.
    ///
    /// Completion moves the item to `ReadyForReview`; a failed copy leaves it
    /// in `Copying` with `last_error` set.
    pub async fn poll_copy(&self, queue: &mut IngestionQueue, token: &str) -> Result<CopyProgress> {
        let progress = self.copy_progress(token).await?;
        sync_copy_progress(queue, &progress);
        Ok(progress)
    }

    /// Progress for a token without touching any queue
    pub async fn copy_progress(&self, token: &str) -> Result<CopyProgress> {
        self.tracker
            .get(token)
            .await
            .ok_or_else(|| MediaError::NotFound(format!("copy token {}", token)))
    }

    /// Sample four preview frames from the copied video
    pub async fn generate_thumbnails(&self, queue: &mut IngestionQueue, item_id: u64) -> Result<Vec<String>> {
        self.refresh_copy_state(queue, item_id).await?;

        let item = queue.get(item_id)?;
        if item.state != ItemState::ReadyForReview {
            return Err(item.reject("generate thumbnails"));
        }
        if item.kind != Some(MediaKind::Video) {
            return Err(MediaError::Validation(format!(
                "item {} is not a video; thumbnails are only generated for videos",
                item_id
            )));
        }

        let video = item.dest_path.clone().ok_or_else(|| item.reject("generate thumbnails"))?;
        let duration = item
            .metadata
            .as_ref()
            .and_then(|m| m.duration_secs)
            .filter(|secs| secs.is_finite() && *secs > 0.0);

        let Some(duration) = duration else {
            let reason = "video duration is zero or unknown".to_string();
            warn!("⚠️ Skipping thumbnails for item {}: {}", item_id, reason);
            queue.get_mut(item_id)?.last_error = Some(reason.clone());
            return Err(MediaError::Thumbnail { item_id, reason });
        };

        let outputs = thumbnail_paths(&video);
        let extras = outputs
            .last()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.resolver.root().to_path_buf());
        if let Err(e) = tokio::fs::create_dir_all(&extras).await {
            let reason = format!("cannot create {}: {}", extras.display(), e);
            queue.get_mut(item_id)?.last_error = Some(reason.clone());
            return Err(MediaError::Thumbnail { item_id, reason });
        }

        let timestamps = thumbnail_timestamps(Duration::from_secs_f64(duration));
        let mut written: Vec<&Path> = Vec::with_capacity(outputs.len());
        for (at, output) in timestamps.iter().zip(&outputs) {
            // The failing frame's output may be partially written too
            written.push(output.as_path());
            if let Err(e) = self.probe.grab_frame(&video, *at, output).await {
                remove_previews(&written, &extras).await;
                let reason = format!("{:#}", e);
                warn!("⚠️ Thumbnail generation failed for item {}: {}", item_id, reason);
                queue.get_mut(item_id)?.last_error = Some(reason.clone());
                return Err(MediaError::Thumbnail { item_id, reason });
            }
        }

        let thumbnails: Vec<String> = outputs
            .iter()
            .filter_map(|p| self.resolver.relative_to_depot(p))
            .collect();

        info!("🖼️ Generated {} thumbnails for item {}", thumbnails.len(), item_id);
        let item = queue.get_mut(item_id)?;
        item.thumbnails = thumbnails.clone();
        item.state = ItemState::ThumbnailsGenerated;
        item.last_error = None;
        Ok(thumbnails)
    }

    /// Write the finished record; `fields` holds user-editable columns
    pub async fn commit(
        &self,
        queue: &mut IngestionQueue,
        item_id: u64,
        fields: &HashMap<String, String>,
    ) -> Result<MediaRecord> {
        self.refresh_copy_state(queue, item_id).await?;

        let item = queue.get(item_id)?;
        if !matches!(item.state, ItemState::ReadyForReview | ItemState::ThumbnailsGenerated) {
            return Err(item.reject("commit"));
        }

        if let Some(unknown) = fields.keys().find(|k| !EDITABLE_FIELDS.contains(&k.as_str())) {
            return Err(MediaError::Validation(format!("unknown field: {}", unknown)));
        }

        let missing: Vec<&str> = self
            .config
            .ingestion
            .required_fields
            .iter()
            .map(String::as_str)
            .filter(|f| fields.get(*f).map_or(true, |v| v.trim().is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(MediaError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let (Some(metadata), Some(dest)) = (&item.metadata, &item.dest_path) else {
            return Err(item.reject("commit"));
        };

        let mut record = MediaRecord {
            file_id: metadata.file_id.clone(),
            file_name: dest
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| metadata.file_name.clone()),
            file_path: self.resolver.to_stored(dest)?,
            file_type: metadata.file_type.clone(),
            file_format: metadata.file_format.clone(),
            file_resolution: metadata.file_resolution.clone(),
            file_duration: metadata.file_duration.clone(),
            ..Default::default()
        };
        for (field, value) in fields {
            let value = value.trim();
            record.set_field(field, (!value.is_empty()).then(|| value.to_string()));
        }

        let store = self.store.clone();
        let row = record.clone();
        tokio::task::spawn_blocking(move || store.insert(&row))
            .await
            .map_err(|e| MediaError::io("writing the catalog record", std::io::Error::other(e)))??;
        info!("✅ Committed {} as {}", record.file_name, record.file_id);

        let item = queue.get_mut(item_id)?;
        item.state = ItemState::Committed;
        item.last_error = None;
        let token = item.copy_token.take();
        queue.advance_past(item_id);
        self.tracker.release_all(token).await;
        Ok(record)
    }

    /// Discard an item without writing a record
    pub async fn skip(&self, queue: &mut IngestionQueue, item_id: u64) -> Result<QueueSnapshot> {
        let item = queue.get_mut(item_id)?;
        if item.state == ItemState::Committed {
            return Err(item.reject("skip"));
        }
        item.state = ItemState::Skipped;
        let token = item.copy_token.take();
        queue.advance_past(item_id);
        self.tracker.release_all(token).await;
        debug!("Skipped item {}", item_id);
        Ok(queue.snapshot())
    }

    /// Drop the whole queue; running copies still finish
    pub async fn clear(&self, queue: &mut IngestionQueue) {
        let dropped = queue.len();
        let tokens = queue.copy_tokens();
        queue.clear();
        self.tracker.release_all(tokens).await;
        info!("🧹 Cleared ingestion queue ({} items)", dropped);
    }

    async fn refresh_copy_state(&self, queue: &mut IngestionQueue, item_id: u64) -> Result<()> {
        let token = match &queue.get(item_id)?.state {
            ItemState::Copying { token, .. } => token.clone(),
            _ => return Ok(()),
        };
        if let Some(progress) = self.tracker.get(&token).await {
            apply_progress(queue.get_mut(item_id)?, &progress);
        }
        Ok(())
    }
}

/// Apply a progress record to the item copying under its token, if any
pub fn sync_copy_progress(queue: &mut IngestionQueue, progress: &CopyProgress) {
    if let Some(item) = queue.find_by_token_mut(&progress.token) {
        apply_progress(item, progress);
    }
}

/// Remove previews written by one failed run, plus their directory if empty
async fn remove_previews(paths: &[&Path], extras: &Path) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            debug!("Preview {} not removed: {}", path.display(), e);
        }
    }
    if let Err(e) = tokio::fs::remove_dir(extras).await {
        debug!("Preview directory {} kept: {}", extras.display(), e);
    }
}

fn apply_progress(item: &mut IngestionItem, progress: &CopyProgress) {
    match progress.status {
        CopyStatus::Complete => {
            item.state = ItemState::ReadyForReview;
            item.last_error = None;
        }
        CopyStatus::Failed => {
            item.last_error = progress.error.clone();
        }
        CopyStatus::Copying => {
            if let ItemState::Copying { percent, .. } = &mut item.state {
                *percent = (*percent).max(progress.percent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_timestamps() {
        let stamps = thumbnail_timestamps(Duration::from_secs(100));
        assert_eq!(stamps.len(), 4);
        assert_eq!(stamps[0], Duration::from_secs(25));
        assert_eq!(stamps[1], Duration::from_secs(50));
        assert_eq!(stamps[2], Duration::from_secs(75));
        assert!(stamps[3] < Duration::from_secs(100));
        assert!(stamps[3] > Duration::from_secs(99));
    }

    #[test]
    fn test_short_video_last_sample_stays_inside() {
        let stamps = thumbnail_timestamps(Duration::from_millis(500));
        assert!(stamps[3] < Duration::from_millis(500));
        assert!(stamps[3] >= stamps[2]);
    }

    #[test]
    fn test_thumbnail_paths_follow_naming() {
        let paths = thumbnail_paths(Path::new("/depot/videos/clip_1.mp4"));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/depot/videos/clip_1.jpg"),
                PathBuf::from("/depot/videos/clip_1.thumbs/2.jpg"),
                PathBuf::from("/depot/videos/clip_1.thumbs/3.jpg"),
                PathBuf::from("/depot/videos/clip_1.thumbs/4.jpg"),
            ]
        );
    }

    #[test]
    fn test_previews_of_deduplicated_copies_never_overlap() {
        let mut seen = std::collections::HashSet::new();
        for video in ["clip.mp4", "clip_1.mp4", "clip_2.mp4", "clip_2_2.mp4"] {
            for path in thumbnail_paths(&Path::new("/depot/videos").join(video)) {
                assert!(seen.insert(path.clone()), "{} produced twice", path.display());
            }
        }
    }
}
