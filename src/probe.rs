//! Technical metadata extraction for ingested files
//!
//! Videos are probed with `ffprobe` and sampled with `ffmpeg`; still
//! images are read with the `image` crate. The pipeline only depends on
//! the [`MediaProbe`] trait.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ToolsConfig;

/// Video stream properties
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub duration: Duration,
    pub codec: String,
    pub container: String,
    pub fps: f64,
}

/// Still image properties
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: String,
}

#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe_video(&self, path: &Path) -> Result<VideoInfo>;

    async fn probe_image(&self, path: &Path) -> Result<ImageInfo>;

    /// Write one frame at `at` to `output` as JPEG
    async fn grab_frame(&self, video: &Path, at: Duration, output: &Path) -> Result<()>;
}

/// True when the `image` crate can decode this file type
pub fn image_decodable(path: &Path) -> bool {
    image::ImageFormat::from_path(path).is_ok()
}

/// Production probe backed by the FFmpeg command line tools
#[derive(Debug, Clone)]
pub struct FfmpegProbe {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegProbe {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
        }
    }

    /// Whether both tools can be launched
    pub async fn tools_available(&self) -> bool {
        for tool in [&self.ffprobe, &self.ffmpeg] {
            let status = tokio::process::Command::new(tool)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if !matches!(status, Ok(s) if s.success()) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl MediaProbe for FfmpegProbe {
    async fn probe_video(&self, path: &Path) -> Result<VideoInfo> {
        let output = tokio::process::Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .await
            .with_context(|| format!("failed to launch {}", self.ffprobe))?;

        if !output.status.success() {
            return Err(anyhow!("ffprobe failed for {}", path.display()));
        }

        let probe: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        let info = parse_ffprobe(&probe)?;

        info!(
            "📹 Probed video: {} ({}x{}, {}, {:.1}s)",
            path.display(),
            info.width,
            info.height,
            info.codec,
            info.duration.as_secs_f64()
        );
        Ok(info)
    }

    async fn probe_image(&self, path: &Path) -> Result<ImageInfo> {
        let path = path.to_path_buf();
        let info = tokio::task::spawn_blocking(move || -> Result<ImageInfo> {
            let reader = image::ImageReader::open(&path)?.with_guessed_format()?;
            let format = reader
                .format()
                .map(|f| format!("{:?}", f).to_lowercase())
                .ok_or_else(|| anyhow!("unrecognised image format: {}", path.display()))?;
            let (width, height) = reader.into_dimensions()?;
            Ok(ImageInfo { width, height, format })
        })
        .await??;

        debug!("🖼️ Probed image: {}x{} {}", info.width, info.height, info.format);
        Ok(info)
    }

    async fn grab_frame(&self, video: &Path, at: Duration, output: &Path) -> Result<()> {
        let timestamp = format!("{:.2}", at.as_secs_f64());

        let status = tokio::process::Command::new(&self.ffmpeg)
            .args(["-y", "-ss", &timestamp, "-i"])
            .arg(video)
            .args(["-frames:v", "1", "-q:v", "2"])
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("failed to launch {}", self.ffmpeg))?;

        if !status.success() || !output.is_file() {
            return Err(anyhow!("frame extraction at {}s failed", timestamp));
        }
        Ok(())
    }
}

/// Pull the first video stream out of `ffprobe -print_format json` output
fn parse_ffprobe(probe: &serde_json::Value) -> Result<VideoInfo> {
    let format = &probe["format"];
    let streams = probe["streams"]
        .as_array()
        .ok_or_else(|| anyhow!("ffprobe reported no streams"))?;

    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"] == "video")
        .ok_or_else(|| anyhow!("No video stream found"))?;

    let duration_seconds: f64 = format["duration"]
        .as_str()
        .or_else(|| video_stream["duration"].as_str())
        .and_then(|s| s.parse().ok())
        .filter(|d: &f64| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    Ok(VideoInfo {
        width: video_stream["width"].as_u64().unwrap_or(0) as u32,
        height: video_stream["height"].as_u64().unwrap_or(0) as u32,
        duration: Duration::from_secs_f64(duration_seconds),
        codec: video_stream["codec_name"].as_str().unwrap_or("unknown").to_string(),
        container: format["format_name"].as_str().unwrap_or("unknown").to_string(),
        fps: video_stream["r_frame_rate"]
            .as_str()
            .and_then(|s| match s.split_once('/') {
                Some((num, den)) => {
                    let num: f64 = num.parse().ok()?;
                    let den: f64 = den.parse().ok()?;
                    (den != 0.0).then(|| num / den)
                }
                None => s.parse().ok(),
            })
            .unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_ffprobe_output() {
        let probe = json!({
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "r_frame_rate": "30000/1001"}
            ],
            "format": {"duration": "75.500000", "format_name": "mov,mp4,m4a"}
        });

        let info = parse_ffprobe(&probe).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.codec, "h264");
        assert_eq!(info.container, "mov,mp4,m4a");
        assert_eq!(info.duration, Duration::from_secs_f64(75.5));
        assert!((info.fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_ffprobe_without_video_stream() {
        let probe = json!({"streams": [{"codec_type": "audio"}], "format": {}});
        assert!(parse_ffprobe(&probe).is_err());
    }

    #[test]
    fn test_missing_duration_is_zero() {
        let probe = json!({"streams": [{"codec_type": "video"}], "format": {}});
        assert_eq!(parse_ffprobe(&probe).unwrap().duration, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_probe_image_reads_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("still.png");
        image::RgbImage::new(8, 5).save(&path).unwrap();

        let probe = FfmpegProbe::new(&crate::config::Config::default().tools);
        let info = probe.probe_image(&path).await.unwrap();
        assert_eq!(info, ImageInfo { width: 8, height: 5, format: "png".into() });
    }

    #[tokio::test]
    async fn test_probe_image_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.jpg");
        std::fs::write(&path, b"not really a jpeg").unwrap();

        let probe = FfmpegProbe::new(&crate::config::Config::default().tools);
        assert!(probe.probe_image(&path).await.is_err());
    }

    #[test]
    fn test_image_decodable() {
        assert!(image_decodable(Path::new("a.JPG")));
        assert!(!image_decodable(Path::new("a.psd")));
    }
}
