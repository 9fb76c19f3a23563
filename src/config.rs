use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MediaError, Result};

/// Configuration for the media depot server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Depot layout and placeholder settings
    pub depot: DepotConfig,

    /// Metadata store settings
    pub database: DatabaseConfig,

    /// Search and pagination settings
    pub search: SearchConfig,

    /// Ingestion pipeline settings
    pub ingestion: IngestionConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// External tool locations
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepotConfig {
    /// Absolute depot root. Required; usually supplied by `DEPOT_ALL`
    pub root: Option<PathBuf>,

    /// Marker stored in the database in place of the depot root
    pub placeholder: String,

    /// Archive directory (relative to the root) receiving ingested files
    pub archive_dir: PathBuf,

    /// Directory (relative to the root) holding icons for non-viewable types
    pub icons_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Store location override; defaults to a path under the depot root
    pub path: Option<PathBuf>,

    /// Default store location relative to the depot root
    pub default_relative_path: PathBuf,

    /// Metadata table name
    pub table: String,

    /// Columns that get an `idx_<field>` index at startup
    pub indexed_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Page size for the table view
    pub table_page_size: usize,

    /// Page size for the grid view
    pub grid_page_size: usize,

    /// Number of entries returned by category counts
    pub top_topics: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Extensions routed to the `videos` subdirectory
    pub video_extensions: Vec<String>,

    /// Extensions routed to the `images` subdirectory
    pub image_extensions: Vec<String>,

    /// Copy chunk size in bytes
    pub copy_chunk_size: usize,

    /// Editable fields that must be present on commit
    pub required_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Sequential ports tried when `port` is taken
    pub port_attempts: u16,

    /// Idle time after which a session's cart and queue are dropped
    pub session_ttl_secs: u64,

    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Config {
    /// Load configuration from file, then apply environment overrides
    pub fn load() -> anyhow::Result<Self> {
        let config_paths = [
            "media-depot.toml",
            "config/media-depot.toml",
            "~/.config/media-depot/config.toml",
            "/etc/media-depot/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config) = Self::load_from(Path::new(path)) {
                tracing::info!("📄 Loaded configuration from: {}", path);
                return Ok(config.apply_env());
            }
        }

        Ok(Self::from_env())
    }

    /// Load configuration from one TOML file with environment overrides
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let config_str = std::fs::read_to_string(path)?;
        match toml::from_str::<Config>(&config_str) {
            Ok(config) => Ok(config.apply_env()),
            Err(e) => {
                tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                Err(e.into())
            }
        }
    }

    /// Defaults with environment overrides
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Override fields from environment variables
    pub fn apply_env(mut self) -> Self {
        if let Ok(root) = std::env::var("DEPOT_ALL") {
            if !root.trim().is_empty() {
                self.depot.root = Some(PathBuf::from(root));
            }
        }

        if let Ok(db) = std::env::var("MEDIA_DEPOT_DB") {
            self.database.path = Some(PathBuf::from(db));
        }

        if let Ok(port) = std::env::var("MEDIA_DEPOT_PORT") {
            self.server.port = port.parse().unwrap_or(self.server.port);
        }

        if let Ok(log_level) = std::env::var("MEDIA_DEPOT_LOG_LEVEL") {
            self.server.log_level = log_level;
        }

        self
    }

    /// Depot root, or a configuration error when unset
    pub fn depot_root(&self) -> Result<&Path> {
        self.depot
            .root
            .as_deref()
            .ok_or_else(|| MediaError::Configuration("depot root is not set (DEPOT_ALL)".into()))
    }

    /// Resolved metadata store location
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.depot_root()?.join(&self.database.default_relative_path)),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let root = self.depot_root()?;
        if !root.is_dir() {
            return Err(MediaError::Configuration(format!(
                "depot root does not exist: {}",
                root.display()
            )));
        }

        if self.depot.placeholder.is_empty() {
            return Err(MediaError::Configuration("depot placeholder must not be empty".into()));
        }

        let db_path = self.database_path()?;
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MediaError::Configuration(format!(
                        "cannot create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        if self.search.table_page_size == 0 || self.search.grid_page_size == 0 {
            return Err(MediaError::Configuration("page sizes must be greater than 0".into()));
        }

        if self.ingestion.copy_chunk_size == 0 {
            return Err(MediaError::Configuration("copy_chunk_size must be greater than 0".into()));
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Media Depot Configuration:\n\
            - Depot Root: {}\n\
            - Store: {}\n\
            - Table: {}\n\
            - Page Sizes: table={} grid={}\n\
            - Listen: {}:{}",
            self.depot
                .root
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            self.database_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "<unset>".to_string()),
            self.database.table,
            self.search.table_page_size,
            self.search.grid_page_size,
            self.server.host,
            self.server.port,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            depot: DepotConfig {
                root: None,
                placeholder: "$DEPOT_ALL".to_string(),
                archive_dir: PathBuf::from("assetdepot/media/archive"),
                icons_dir: PathBuf::from("assetdepot/media/dummy/thumbnails"),
            },
            database: DatabaseConfig {
                path: None,
                default_relative_path: PathBuf::from("assetdepot/media/dummy/db/media_dummy.sqlite"),
                table: "media_arch".to_string(),
                indexed_fields: vec![
                    "file_type".to_string(),
                    "genre".to_string(),
                    "subject".to_string(),
                    "category".to_string(),
                    "lighting".to_string(),
                    "setting".to_string(),
                ],
            },
            search: SearchConfig {
                table_page_size: 10,
                grid_page_size: 30,
                top_topics: 20,
            },
            ingestion: IngestionConfig {
                video_extensions: ["mp4", "mov", "avi", "mkv", "webm", "m4v"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                image_extensions: ["jpg", "jpeg", "png", "psd", "tif", "tiff", "bmp"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                copy_chunk_size: 1024 * 1024,
                required_fields: vec!["genre".to_string(), "subject".to_string()],
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
                port_attempts: 10,
                session_ttl_secs: 6 * 3600,
                log_level: "info".to_string(),
            },
            tools: ToolsConfig {
                ffmpeg: "ffmpeg".to_string(),
                ffprobe: "ffprobe".to_string(),
            },
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_depot_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.depot.root = Some(root.into());
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database.path = Some(path.into());
        self
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.config.database.table = table.to_string();
        self
    }

    pub fn with_page_sizes(mut self, table: usize, grid: usize) -> Self {
        self.config.search.table_page_size = table;
        self.config.search.grid_page_size = grid;
        self
    }

    pub fn with_copy_chunk_size(mut self, size: usize) -> Self {
        self.config.ingestion.copy_chunk_size = size;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.depot.placeholder, "$DEPOT_ALL");
        assert_eq!(config.search.table_page_size, 10);
        assert_eq!(config.search.grid_page_size, 30);
        assert!(config.depot.root.is_none());
    }

    #[test]
    fn test_missing_depot_root_is_configuration_error() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(MediaError::Configuration(_))));
        assert!(matches!(config.database_path(), Err(MediaError::Configuration(_))));
    }

    #[test]
    fn test_database_path_defaults_under_depot() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigBuilder::new().with_depot_root(temp_dir.path()).build();

        assert!(config.validate().is_ok());
        assert_eq!(
            config.database_path().unwrap(),
            temp_dir.path().join("assetdepot/media/dummy/db/media_dummy.sqlite")
        );
        assert!(temp_dir.path().join("assetdepot/media/dummy/db").is_dir());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_depot_root("/depot")
            .with_database_path("/tmp/catalog.sqlite")
            .with_page_sizes(5, 12)
            .build();

        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/catalog.sqlite"));
        assert_eq!(config.search.table_page_size, 5);
        assert_eq!(config.search.grid_page_size, 12);
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.database.table, "media_arch");
        assert_eq!(parsed.ingestion.required_fields, vec!["genre", "subject"]);
    }
}
