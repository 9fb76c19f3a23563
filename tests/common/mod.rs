#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use media_depot::probe::{ImageInfo, VideoInfo};
use media_depot::{
    ConfigBuilder, Config, FfmpegProbe, IngestionPipeline, MediaProbe, MediaRecord, MetadataStore, PathResolver,
    SqliteStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Depot in a temp dir with an opened store
pub struct Fixture {
    pub temp_dir: TempDir,
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub resolver: Arc<PathResolver>,
}

impl Fixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigBuilder::new()
            .with_depot_root(temp_dir.path().join("depot"))
            .with_copy_chunk_size(64)
            .build();
        std::fs::create_dir_all(config.depot_root().unwrap()).unwrap();
        config.validate().unwrap();

        let store = Arc::new(SqliteStore::from_config(&config).unwrap());
        store.ensure_indexes(&config.database.indexed_fields).unwrap();
        let resolver = Arc::new(PathResolver::new(&config).unwrap());

        Self {
            temp_dir,
            config: Arc::new(config),
            store,
            resolver,
        }
    }

    pub fn depot(&self) -> &Path {
        self.resolver.root()
    }

    /// Directory outside the depot holding files to ingest
    pub fn inbox(&self) -> PathBuf {
        let inbox = self.temp_dir.path().join("inbox");
        std::fs::create_dir_all(&inbox).unwrap();
        inbox
    }

    pub fn pipeline(&self, probe: FakeProbe) -> IngestionPipeline {
        let store: Arc<dyn MetadataStore> = self.store.clone();
        IngestionPipeline::new(self.config.clone(), self.resolver.clone(), store, Arc::new(probe))
    }
}

pub fn record(id: &str, file_type: &str) -> MediaRecord {
    MediaRecord {
        file_id: id.to_string(),
        file_name: format!("{}.{}", id, file_type),
        file_path: format!("$DEPOT_ALL/assetdepot/media/archive/other/{}.{}", id, file_type),
        file_type: file_type.to_string(),
        ..Default::default()
    }
}

/// Write a small PNG and return its path
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::new(width, height).save(&path).unwrap();
    path
}

/// Probe reporting a fixed video duration and writing placeholder frames
#[derive(Debug, Clone)]
pub struct FakeProbe {
    pub duration: Duration,
    frame_delay: Duration,
    fail_from: Option<Duration>,
    images: FfmpegProbe,
}

impl FakeProbe {
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration,
            frame_delay: Duration::ZERO,
            fail_from: None,
            images: FfmpegProbe::new(&Config::default().tools),
        }
    }

    /// Each frame grab takes `delay`
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    /// Frame grabs at or after `at` fail after writing a partial file
    pub fn failing_from(mut self, at: Duration) -> Self {
        self.fail_from = Some(at);
        self
    }
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self::with_duration(Duration::from_secs(40))
    }
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe_video(&self, path: &Path) -> anyhow::Result<VideoInfo> {
        let bytes = std::fs::read(path)?;
        if bytes.starts_with(b"corrupt") {
            return Err(anyhow!("moov atom not found"));
        }
        Ok(VideoInfo {
            width: 1280,
            height: 720,
            duration: self.duration,
            codec: "h264".to_string(),
            container: "mov,mp4,m4a".to_string(),
            fps: 25.0,
        })
    }

    async fn probe_image(&self, path: &Path) -> anyhow::Result<ImageInfo> {
        self.images.probe_image(path).await
    }

    async fn grab_frame(&self, _video: &Path, at: Duration, output: &Path) -> anyhow::Result<()> {
        if !self.frame_delay.is_zero() {
            tokio::time::sleep(self.frame_delay).await;
        }
        if self.fail_from.is_some_and(|limit| at >= limit) {
            std::fs::write(output, b"partial")?;
            return Err(anyhow!("decoder error at {:.2}s", at.as_secs_f64()));
        }
        std::fs::write(output, format!("frame@{:.2}", at.as_secs_f64()))?;
        Ok(())
    }
}
