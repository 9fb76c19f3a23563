//! Filtered, paginated catalog search
//!
//! Two stages: a SQL predicate built from field filters, then an optional
//! in-memory caption pass. Pagination happens at the storage layer when
//! there is no caption term and over the filtered list when there is.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::caption::CaptionMatcher;
use crate::config::SearchConfig;
use crate::error::{MediaError, Result};
use crate::media::MediaRecord;
use crate::paths::{EnrichedRecord, PathResolver};
use crate::store::{MetadataStore, Page, Predicate};

/// Columns searched by the free-text `query` term
const FREE_TEXT_COLUMNS: [&str; 4] = ["genre", "category", "subject", "tags"];

/// How a filter value is compared against its column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Equals,
    Contains,
}

/// Filterable search fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Type,
    Genre,
    Subject,
    Setting,
    Lighting,
    Category,
    Tags,
    Source,
}

impl SearchField {
    pub fn column(&self) -> &'static str {
        match self {
            SearchField::Type => "file_type",
            SearchField::Genre => "genre",
            SearchField::Subject => "subject",
            SearchField::Setting => "setting",
            SearchField::Lighting => "lighting",
            SearchField::Category => "category",
            SearchField::Tags => "tags",
            SearchField::Source => "source",
        }
    }

    pub fn match_kind(&self) -> MatchKind {
        match self {
            SearchField::Type | SearchField::Genre => MatchKind::Equals,
            _ => MatchKind::Contains,
        }
    }
}

impl FromStr for SearchField {
    type Err = MediaError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "type" | "file_type" => Ok(SearchField::Type),
            "genre" => Ok(SearchField::Genre),
            "subject" => Ok(SearchField::Subject),
            "setting" => Ok(SearchField::Setting),
            "lighting" => Ok(SearchField::Lighting),
            "category" => Ok(SearchField::Category),
            "tags" => Ok(SearchField::Tags),
            "source" => Ok(SearchField::Source),
            other => Err(MediaError::Validation(format!("unknown search field: {}", other))),
        }
    }
}

/// Presentation mode; decides the page size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Table,
    #[default]
    Grid,
}

impl ViewMode {
    pub fn page_size(&self, config: &SearchConfig) -> usize {
        match self {
            ViewMode::Table => config.table_page_size,
            ViewMode::Grid => config.grid_page_size,
        }
    }
}

impl FromStr for ViewMode {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(ViewMode::Table),
            "grid" => Ok(ViewMode::Grid),
            other => Err(MediaError::Validation(format!("unknown view mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Field name to filter value
    pub filters: BTreeMap<String, String>,

    /// Whole-word caption term
    pub caption: Option<String>,

    /// Free-text term over genre, category, subject and tags
    pub query: Option<String>,

    /// 1-indexed; 0 is read as 1
    pub page: usize,

    pub view: ViewMode,
}

impl SearchQuery {
    /// Build a query from request parameters.
    ///
    /// `caption`, `query`, `page` and `view` are reserved; every other key
    /// is a field filter and is validated when the search runs.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let mut query = SearchQuery {
            page: 1,
            ..Default::default()
        };

        for (key, value) in params {
            match key.as_str() {
                "caption" => query.caption = Some(value.clone()),
                "query" => query.query = Some(value.clone()),
                "page" => {
                    query.page = value
                        .trim()
                        .parse()
                        .map_err(|_| MediaError::Validation(format!("invalid page number: {}", value)))?;
                }
                "view" => query.view = value.parse()?,
                _ => {
                    query.filters.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(query)
    }

    pub fn with_filter(mut self, field: &str, value: &str) -> Self {
        self.filters.insert(field.to_string(), value.to_string());
        self
    }

    pub fn with_caption(mut self, term: &str) -> Self {
        self.caption = Some(term.to_string());
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn with_view(mut self, view: ViewMode) -> Self {
        self.view = view;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub records: Vec<EnrichedRecord>,
    pub total: usize,
    pub page_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub view: ViewMode,
}

/// Number of pages needed for `total` rows
pub fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        0
    } else {
        total.div_ceil(page_size)
    }
}

/// Clamp a requested page into `[1, page_count]`, or 1 when there are no pages
pub fn clamp_page(requested: usize, page_count: usize) -> usize {
    requested.clamp(1, page_count.max(1))
}

fn offset_of(page: usize, page_size: usize) -> usize {
    (page - 1).saturating_mul(page_size)
}

pub struct SearchEngine {
    store: Arc<dyn MetadataStore>,
    resolver: Arc<PathResolver>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn MetadataStore>, resolver: Arc<PathResolver>, config: SearchConfig) -> Self {
        Self {
            store,
            resolver,
            config,
        }
    }

    /// SQL stage of the search
    pub fn predicate(&self, query: &SearchQuery) -> Result<Predicate> {
        let mut predicate = Predicate::new();

        for (name, value) in &query.filters {
            let field: SearchField = name.parse()?;
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match field.match_kind() {
                MatchKind::Equals => predicate.equals(field.column(), value),
                MatchKind::Contains => predicate.contains(field.column(), value),
            };
        }

        if let Some(term) = query.query.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            predicate.any_contains(&FREE_TEXT_COLUMNS, term);
        }

        Ok(predicate)
    }

    pub fn search(&self, query: &SearchQuery) -> Result<SearchResult> {
        let page_size = query.view.page_size(&self.config);
        let requested = query.page.max(1);
        let predicate = self.predicate(query)?;

        let matcher = match query.caption.as_deref() {
            Some(term) => Some(CaptionMatcher::new(term)?).filter(|m| !m.is_empty()),
            None => None,
        };

        let (rows, total, page) = match matcher {
            Some(matcher) => {
                let candidates = self.store.query(&predicate, None)?;
                let candidate_count = candidates.total;
                let matched: Vec<MediaRecord> = candidates
                    .rows
                    .into_iter()
                    .filter(|r| r.captions.as_deref().is_some_and(|c| matcher.matches(c)))
                    .collect();
                debug!(
                    "Caption '{}' kept {} of {} candidates",
                    matcher.term(),
                    matched.len(),
                    candidate_count
                );

                let total = matched.len();
                let page = clamp_page(requested, page_count(total, page_size));
                let rows = matched
                    .into_iter()
                    .skip(offset_of(page, page_size))
                    .take(page_size)
                    .collect();
                (rows, total, page)
            }
            None => {
                let window = Page {
                    limit: page_size,
                    offset: offset_of(requested, page_size),
                };
                let mut result = self.store.query(&predicate, Some(window))?;
                let page = clamp_page(requested, page_count(result.total, page_size));
                if page != requested {
                    let window = Page {
                        limit: page_size,
                        offset: offset_of(page, page_size),
                    };
                    result = self.store.query(&predicate, Some(window))?;
                }
                (result.rows, result.total, page)
            }
        };

        Ok(SearchResult {
            records: self.enrich_all(rows)?,
            total,
            page_count: page_count(total, page_size),
            page,
            page_size,
            view: query.view,
        })
    }

    /// Resolve paths and thumbnails for a batch of records
    pub fn enrich_all(&self, rows: Vec<MediaRecord>) -> Result<Vec<EnrichedRecord>> {
        rows.into_iter().map(|r| self.resolver.enrich(r)).collect()
    }
}
