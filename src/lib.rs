//! Media Depot
//!
//! Local media catalog: filtered search with whole-word caption matching,
//! placeholder path rewriting for static delivery, and a session-scoped
//! ingestion pipeline writing into a SQLite metadata store.

pub mod api;
pub mod bundle;
pub mod caption;
pub mod config;
pub mod error;
pub mod ingest;
pub mod media;
pub mod paths;
pub mod probe;
pub mod search;
pub mod session;
pub mod store;

// Re-export main types for easy access
pub use crate::bundle::CartBundle;
pub use crate::caption::CaptionMatcher;
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{MediaError, Result};
pub use crate::ingest::{IngestionItem, IngestionPipeline, IngestionQueue, ItemState};
pub use crate::media::{MediaKind, MediaRecord};
pub use crate::paths::{EnrichedRecord, PathResolver, ResolvedPath};
pub use crate::probe::{FfmpegProbe, MediaProbe};
pub use crate::search::{SearchEngine, SearchQuery, SearchResult, ViewMode};
pub use crate::session::{CartState, SessionContext, SessionRegistry};
pub use crate::store::{MetadataStore, Predicate, SqliteStore};
