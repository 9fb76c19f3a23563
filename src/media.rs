//! Media record model and file-type classification

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::IngestionConfig;

/// All catalog columns, in table order
pub const COLUMNS: [&str; 18] = [
    "file_id",
    "file_name",
    "file_path",
    "file_type",
    "file_format",
    "file_resolution",
    "file_duration",
    "shot_size",
    "shot_type",
    "source",
    "source_id",
    "genre",
    "subject",
    "category",
    "lighting",
    "setting",
    "tags",
    "captions",
];

/// Fields a user may supply when committing an ingested item
pub const EDITABLE_FIELDS: [&str; 13] = [
    "file_format",
    "file_duration",
    "shot_size",
    "shot_type",
    "source",
    "source_id",
    "genre",
    "subject",
    "category",
    "lighting",
    "setting",
    "tags",
    "captions",
];

/// Fields that may be edited on already-catalogued records
pub const UPDATABLE_FIELDS: [&str; 5] = ["subject", "genre", "setting", "captions", "tags"];

/// One catalogued asset
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaRecord {
    pub file_id: String,
    pub file_name: String,
    /// Placeholder-prefixed path; resolve before any I/O
    pub file_path: String,
    pub file_type: String,
    pub file_format: Option<String>,
    pub file_resolution: Option<String>,
    /// Videos only
    pub file_duration: Option<String>,
    pub shot_size: Option<String>,
    pub shot_type: Option<String>,
    pub source: Option<String>,
    pub source_id: Option<String>,
    pub genre: Option<String>,
    pub subject: Option<String>,
    pub category: Option<String>,
    pub lighting: Option<String>,
    pub setting: Option<String>,
    pub tags: Option<String>,
    pub captions: Option<String>,
}

impl MediaRecord {
    /// Set an editable field by column name. Returns false for unknown names.
    pub fn set_field(&mut self, field: &str, value: Option<String>) -> bool {
        let slot = match field {
            "file_format" => &mut self.file_format,
            "file_duration" => &mut self.file_duration,
            "shot_size" => &mut self.shot_size,
            "shot_type" => &mut self.shot_type,
            "source" => &mut self.source,
            "source_id" => &mut self.source_id,
            "genre" => &mut self.genre,
            "subject" => &mut self.subject,
            "category" => &mut self.category,
            "lighting" => &mut self.lighting,
            "setting" => &mut self.setting,
            "tags" => &mut self.tags,
            "captions" => &mut self.captions,
            _ => return false,
        };
        *slot = value;
        true
    }
}

/// Broad file category, deciding the depot subdirectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
    Other,
}

impl MediaKind {
    /// Classify a file by its extension
    pub fn from_path(path: &Path, config: &IngestionConfig) -> Self {
        let ext = extension_lowercase(path);
        if config.video_extensions.iter().any(|e| *e == ext) {
            MediaKind::Video
        } else if config.image_extensions.iter().any(|e| *e == ext) {
            MediaKind::Image
        } else {
            MediaKind::Other
        }
    }

    /// Depot subdirectory for this kind
    pub fn subdir(&self) -> &'static str {
        match self {
            MediaKind::Video => "videos",
            MediaKind::Image => "images",
            MediaKind::Other => "other",
        }
    }
}

/// Lowercased extension without the dot, empty when absent
pub fn extension_lowercase(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Format seconds as `MM:SS`, or `HH:MM:SS` past the hour
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_kind_classification() {
        let config = Config::default().ingestion;
        assert_eq!(MediaKind::from_path(Path::new("a/clip.MP4"), &config), MediaKind::Video);
        assert_eq!(MediaKind::from_path(Path::new("still.jpeg"), &config), MediaKind::Image);
        assert_eq!(MediaKind::from_path(Path::new("scene.hip"), &config), MediaKind::Other);
        assert_eq!(MediaKind::from_path(Path::new("noext"), &config), MediaKind::Other);
        assert_eq!(MediaKind::Video.subdir(), "videos");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "00:00");
        assert_eq!(format_duration(75.9), "01:15");
        assert_eq!(format_duration(3725.0), "01:02:05");
        assert_eq!(format_duration(f64::NAN), "00:00");
    }

    #[test]
    fn test_set_field_rejects_unknown() {
        let mut record = MediaRecord::default();
        assert!(record.set_field("genre", Some("noir".into())));
        assert!(!record.set_field("file_id", Some("x".into())));
        assert_eq!(record.genre.as_deref(), Some("noir"));
    }
}
