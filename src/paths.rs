//! Depot path rewriting
//!
//! Stored paths begin with a placeholder token standing in for the depot
//! root. Everything that touches the filesystem or builds a URL goes
//! through [`PathResolver`] first.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::config::Config;
use crate::error::{MediaError, Result};
use crate::media::MediaRecord;

/// Sibling image extensions tried for video thumbnails, in precedence order
pub const THUMBNAIL_EXTENSIONS: [&str; 2] = ["jpg", "png"];

/// Image types a browser can show directly
const VIEWABLE_IMAGE_TYPES: [&str; 3] = ["jpg", "jpeg", "png"];

/// Static icons for types without a visual preview
const TYPE_ICONS: [(&str, &str); 7] = [
    ("afx", "adobe_afx.png"),
    ("prproj", "adobe_prm.png"),
    ("psd", "adobe_psd.png"),
    ("xlsx", "ms_excel.png"),
    ("pptx", "ms_ppt.png"),
    ("docx", "ms_word.png"),
    ("hip", "sidefx_hou.png"),
];

const GENERIC_ICON: &str = "thumb_generic.png";

/// Prefix under which the request layer serves depot files
pub const STATIC_PREFIX: &str = "/static";

/// A stored path resolved against the depot root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub absolute: PathBuf,
    /// Depot-relative, `/`-separated
    pub relative: String,
}

/// Record projection handed to the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// `file_path` holds the depot-relative path here, never the placeholder form
    #[serde(flatten)]
    pub record: MediaRecord,
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub url: String,
    pub thumbnail_relative_path: String,
    pub thumbnail_url: String,
    pub is_viewable: bool,
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    placeholder: String,
    icons_dir: String,
    video_types: Vec<String>,
}

impl PathResolver {
    /// Build a resolver; fails when the depot root is unset
    pub fn new(config: &Config) -> Result<Self> {
        let root = config.depot_root()?.to_path_buf();
        if config.depot.placeholder.is_empty() {
            return Err(MediaError::Configuration("depot placeholder must not be empty".into()));
        }

        Ok(Self {
            root,
            placeholder: config.depot.placeholder.clone(),
            icons_dir: to_slash(&config.depot.icons_dir),
            video_types: config.ingestion.video_extensions.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Rewrite a stored path into absolute and depot-relative forms.
    ///
    /// Only a leading placeholder followed by a separator (or nothing) is
    /// substituted; the same text appearing later in the path is data.
    pub fn resolve(&self, stored: &str) -> Result<ResolvedPath> {
        let rest = match stored.strip_prefix(&self.placeholder) {
            Some(rest) if rest.is_empty() || rest.starts_with(|c: char| c == '/' || c == '\\') => rest,
            _ => {
                return Err(MediaError::Validation(format!(
                    "stored path does not start with {}: {}",
                    self.placeholder, stored
                )))
            }
        };

        self.join_relative(&rest.replace('\\', "/"), stored)
    }

    fn join_relative(&self, rest: &str, stored: &str) -> Result<ResolvedPath> {
        let mut parts = Vec::new();
        for component in Path::new(rest).components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir | Component::RootDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(MediaError::Validation(format!(
                        "stored path escapes the depot: {}",
                        stored
                    )))
                }
            }
        }

        if parts.is_empty() {
            return Err(MediaError::Validation(format!("stored path has no file component: {}", stored)));
        }

        let relative = parts.join("/");
        let absolute = parts.iter().fold(self.root.clone(), |acc, part| acc.join(part));
        Ok(ResolvedPath { absolute, relative })
    }

    /// Inverse of [`resolve`](Self::resolve): placeholder form of a depot file
    pub fn to_stored(&self, absolute: &Path) -> Result<String> {
        let relative = self.relative_to_depot(absolute).ok_or_else(|| {
            MediaError::Validation(format!("{} is outside the depot", absolute.display()))
        })?;
        Ok(format!("{}/{}", self.placeholder, relative))
    }

    /// Depot-relative `/`-separated form of an absolute path under the root
    pub fn relative_to_depot(&self, absolute: &Path) -> Option<String> {
        absolute
            .strip_prefix(&self.root)
            .ok()
            .map(to_slash)
            .filter(|s| !s.is_empty())
    }

    /// Same-basename image next to a video, `.jpg` preferred over `.png`
    pub fn resolve_thumbnail(&self, video_absolute: &Path) -> Option<String> {
        THUMBNAIL_EXTENSIONS
            .iter()
            .map(|ext| video_absolute.with_extension(ext))
            .find(|candidate| candidate.is_file())
            .and_then(|candidate| self.relative_to_depot(&candidate))
    }

    /// Server URL for a depot-relative path
    pub fn static_url(relative: &str) -> String {
        let encoded: Vec<String> = relative
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", STATIC_PREFIX, encoded.join("/"))
    }

    /// Thumbnail path and viewability for a resolved record
    pub fn thumbnail_for(&self, file_type: &str, resolved: &ResolvedPath) -> (String, bool) {
        let file_type = file_type.to_lowercase();

        if self.video_types.iter().any(|t| *t == file_type) {
            let thumb = self
                .resolve_thumbnail(&resolved.absolute)
                .unwrap_or_else(|| resolved.relative.clone());
            return (thumb, true);
        }

        if VIEWABLE_IMAGE_TYPES.contains(&file_type.as_str()) {
            return (resolved.relative.clone(), true);
        }

        let icon = TYPE_ICONS
            .iter()
            .find(|(ext, _)| *ext == file_type)
            .map(|(_, icon)| *icon)
            .unwrap_or(GENERIC_ICON);
        (format!("{}/{}", self.icons_dir, icon), false)
    }

    /// Project a stored record for presentation
    pub fn enrich(&self, mut record: MediaRecord) -> Result<EnrichedRecord> {
        let resolved = self.resolve(&record.file_path)?;
        let (thumbnail_relative_path, is_viewable) = self.thumbnail_for(&record.file_type, &resolved);
        record.file_path = resolved.relative.clone();

        Ok(EnrichedRecord {
            record,
            url: Self::static_url(&resolved.relative),
            thumbnail_url: Self::static_url(&thumbnail_relative_path),
            absolute_path: resolved.absolute,
            relative_path: resolved.relative,
            thumbnail_relative_path,
            is_viewable,
        })
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
