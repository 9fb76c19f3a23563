use anyhow::{Context, Result};
use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use media_depot::api::{ApiServer, AppState};
use media_depot::store::MetadataStore;
use media_depot::{Config, FfmpegProbe, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("Media Depot")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Local media catalog with caption search and session-tracked ingestion")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)")
        )
        .arg(
            Arg::new("depot")
                .short('d')
                .long("depot")
                .value_name("DIR")
                .help("Depot root directory (overrides DEPOT_ALL)")
        )
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("FILE")
                .help("Metadata store location (overrides MEDIA_DEPOT_DB)")
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Address to listen on")
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("First port to try")
                .value_parser(clap::value_parser!(u16))
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue)
        )
        .get_matches();

    // Load configuration
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(&PathBuf::from(path))
            .with_context(|| format!("failed to load config {}", path))?,
        None => Config::load()?,
    };

    if let Some(depot) = matches.get_one::<String>("depot") {
        config.depot.root = Some(PathBuf::from(depot));
    }
    if let Some(db) = matches.get_one::<String>("db") {
        config.database.path = Some(PathBuf::from(db));
    }
    if let Some(host) = matches.get_one::<String>("host") {
        config.server.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }

    // Initialize logging
    let level = if matches.get_flag("verbose") {
        "debug".to_string()
    } else {
        config.server.log_level.clone()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("media_depot={level},tower_http={level},warn")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 Media Depot starting...");
    config.validate()?;
    info!("{}", config.summary());

    let store = Arc::new(SqliteStore::from_config(&config)?);
    let created = store.ensure_indexes(&config.database.indexed_fields)?;
    if !created.is_empty() {
        info!("📇 Created {} indexes", created.len());
    }

    let probe = FfmpegProbe::new(&config.tools);
    if !probe.tools_available().await {
        warn!("⚠️ ffmpeg/ffprobe not found; video metadata and thumbnails will fail");
    }

    let state = AppState::new(Arc::new(config), store, Arc::new(probe))?;
    ApiServer::new(state).start().await
}
