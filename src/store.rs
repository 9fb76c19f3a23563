//! SQLite-backed metadata store
//!
//! The search engine and ingestion pipeline only see the [`MetadataStore`]
//! trait. [`SqliteStore`] adds the catalog maintenance operations used by
//! the request layer (cart lookups, category counts, edits, pruning).

use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{MediaError, Result};
use crate::media::{MediaRecord, COLUMNS, UPDATABLE_FIELDS};

/// Columns that may be grouped for category counts
pub const CATEGORY_FIELDS: [&str; 7] = [
    "file_type", "genre", "subject", "category", "lighting", "setting", "tags",
];

/// SQL filter built from whitelisted columns and bound parameters
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    clauses: Vec<String>,
    params: Vec<String>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value`
    pub fn equals(&mut self, column: &'static str, value: &str) -> &mut Self {
        debug_assert!(COLUMNS.contains(&column));
        self.clauses.push(format!("{} = ?", column));
        self.params.push(value.to_string());
        self
    }

    /// `column LIKE %value%` with wildcards in `value` taken literally
    pub fn contains(&mut self, column: &'static str, value: &str) -> &mut Self {
        debug_assert!(COLUMNS.contains(&column));
        self.clauses.push(format!("{} LIKE ? ESCAPE '\\'", column));
        self.params.push(like_pattern(value));
        self
    }

    /// Substring match against any of `columns`
    pub fn any_contains(&mut self, columns: &[&'static str], value: &str) -> &mut Self {
        if columns.is_empty() {
            return self;
        }
        let alternatives: Vec<String> = columns
            .iter()
            .map(|column| {
                debug_assert!(COLUMNS.contains(column));
                self.params.push(like_pattern(value));
                format!("{} LIKE ? ESCAPE '\\'", column)
            })
            .collect();
        self.clauses.push(format!("({})", alternatives.join(" OR ")));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

fn like_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Storage-level pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

/// Rows for one window plus the unpaginated match count
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub rows: Vec<MediaRecord>,
    pub total: usize,
}

/// Value/occurrence pair for category summaries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryCount {
    pub value: String,
    pub count: i64,
}

/// Persistence boundary consumed by search and ingestion
pub trait MetadataStore: Send + Sync {
    /// Insert one record atomically
    fn insert(&self, record: &MediaRecord) -> Result<()>;

    /// Matching rows ordered by identifier; all rows when `page` is `None`
    fn query(&self, predicate: &Predicate, page: Option<Page>) -> Result<QueryPage>;

    /// Create missing `idx_<field>` indexes; returns the names created
    fn ensure_indexes(&self, fields: &[String]) -> Result<Vec<String>>;
}

/// The catalog database
pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the store named by the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let path = config.database_path()?;
        Self::open(&path, &config.database.table)
    }

    /// Open or create a database file and make sure the table exists
    pub fn open(path: &Path, table: &str) -> Result<Self> {
        validate_identifier(table)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MediaError::Configuration(format!(
                        "cannot create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            MediaError::Configuration(format!("cannot open store {}: {}", path.display(), e))
        })?;
        info!("📁 Metadata store opened at: {}", path.display());

        let store = Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            db_path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Private in-memory store
    pub fn open_in_memory(table: &str) -> Result<Self> {
        validate_identifier(table)?;
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            table: table.to_string(),
            db_path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                file_id         TEXT PRIMARY KEY,
                file_name       TEXT NOT NULL,
                file_path       TEXT NOT NULL,
                file_type       TEXT NOT NULL,
                file_format     TEXT,
                file_resolution TEXT,
                file_duration   TEXT,
                shot_size       TEXT,
                shot_type       TEXT,
                source          TEXT,
                source_id       TEXT,
                genre           TEXT,
                subject         TEXT,
                category        TEXT,
                lighting        TEXT,
                setting         TEXT,
                tags            TEXT,
                captions        TEXT
            )",
            self.table
        );
        self.conn().execute(&sql, [])?;
        Ok(())
    }

    /// Number of rows matching a predicate
    pub fn count(&self, predicate: &Predicate) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}{}", self.table, predicate.where_sql());
        let count: i64 = self
            .conn()
            .query_row(&sql, params_from_iter(predicate.params()), |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Single record by identifier
    pub fn get(&self, file_id: &str) -> Result<Option<MediaRecord>> {
        let sql = format!("SELECT * FROM {} WHERE file_id = ?1", self.table);
        let record = self.conn().query_row(&sql, [file_id], row_to_record).optional()?;
        Ok(record)
    }

    /// Records for a set of identifiers, ordered by identifier
    pub fn get_by_ids(&self, ids: &[String]) -> Result<Vec<MediaRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT * FROM {} WHERE file_id IN ({}) ORDER BY file_id ASC",
            self.table, placeholders
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(ids), row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Most frequent non-empty values of a categorical column
    pub fn category_counts(&self, field: &str, top_n: usize) -> Result<Vec<CategoryCount>> {
        if !CATEGORY_FIELDS.contains(&field) {
            return Err(MediaError::Validation(format!("not a category field: {}", field)));
        }
        let sql = format!(
            "SELECT {field}, COUNT(*) AS count FROM {table}
             WHERE {field} IS NOT NULL AND {field} != ''
             GROUP BY {field}
             ORDER BY count DESC, {field} ASC
             LIMIT ?1",
            field = field,
            table = self.table
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let counts = stmt
            .query_map([top_n as i64], |row| {
                Ok(CategoryCount {
                    value: text(row, 0)?.unwrap_or_default(),
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// One record picked at random, if the catalog is not empty
    pub fn random_record(&self) -> Result<Option<MediaRecord>> {
        let sql = format!("SELECT * FROM {} ORDER BY RANDOM() LIMIT 1", self.table);
        let record = self.conn().query_row(&sql, [], row_to_record).optional()?;
        Ok(record)
    }

    /// Change one editable field of a catalogued record
    pub fn update_field(&self, file_id: &str, field: &str, value: &str) -> Result<usize> {
        if !UPDATABLE_FIELDS.contains(&field) {
            return Err(MediaError::Validation(format!("field cannot be edited: {}", field)));
        }
        let sql = format!("UPDATE {} SET {} = ?1 WHERE file_id = ?2", self.table, field);
        let changed = self.conn().execute(&sql, [value, file_id])?;
        debug!("✏️ Updated {} on {} ({} rows)", field, file_id, changed);
        Ok(changed)
    }

    /// Remove records by identifier; returns the number deleted
    pub fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let sql = format!("DELETE FROM {} WHERE file_id = ?1", self.table);
            let mut stmt = tx.prepare(&sql)?;
            for id in ids {
                deleted += stmt.execute([id])?;
            }
        }
        tx.commit()?;
        info!("🗑️ Pruned {} records from {}", deleted, self.table);
        Ok(deleted)
    }
}

impl MetadataStore for SqliteStore {
    fn insert(&self, record: &MediaRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            COLUMNS.join(", "),
            (1..=COLUMNS.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
        );
        self.conn().execute(
            &sql,
            rusqlite::params![
                record.file_id,
                record.file_name,
                record.file_path,
                record.file_type,
                record.file_format,
                record.file_resolution,
                record.file_duration,
                record.shot_size,
                record.shot_type,
                record.source,
                record.source_id,
                record.genre,
                record.subject,
                record.category,
                record.lighting,
                record.setting,
                record.tags,
                record.captions,
            ],
        )?;
        debug!("💾 Inserted record {} ({})", record.file_id, record.file_name);
        Ok(())
    }

    fn query(&self, predicate: &Predicate, page: Option<Page>) -> Result<QueryPage> {
        let where_sql = predicate.where_sql();
        let conn = self.conn();

        let count_sql = format!("SELECT COUNT(*) FROM {}{}", self.table, where_sql);
        let total: i64 = conn.query_row(&count_sql, params_from_iter(predicate.params()), |row| row.get(0))?;

        let mut sql = format!("SELECT * FROM {}{} ORDER BY file_id ASC", self.table, where_sql);
        let mut params: Vec<Value> = predicate.params().iter().cloned().map(Value::Text).collect();
        if let Some(page) = page {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::Integer(i64::try_from(page.limit).unwrap_or(i64::MAX)));
            params.push(Value::Integer(i64::try_from(page.offset).unwrap_or(i64::MAX)));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(QueryPage {
            rows,
            total: total as usize,
        })
    }

    fn ensure_indexes(&self, fields: &[String]) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut created = Vec::new();

        for field in fields {
            if !COLUMNS.contains(&field.as_str()) {
                return Err(MediaError::Validation(format!("cannot index unknown field: {}", field)));
            }
            let name = format!("idx_{}", field);
            let exists = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1",
                    [&name],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();

            if exists {
                debug!("Index {} already present", name);
                continue;
            }

            conn.execute(&format!("CREATE INDEX {} ON {}({})", name, self.table, field), [])?;
            info!("📇 Created index {}", name);
            created.push(name);
        }

        Ok(created)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("table", &self.table)
            .field("db_path", &self.db_path)
            .finish()
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(MediaError::Configuration(format!("invalid table name: {:?}", name)))
    }
}

/// Column as text whatever its stored affinity
fn text<I: rusqlite::RowIndex>(row: &Row<'_>, index: I) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(index)? {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(r) => Some(r.to_string()),
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MediaRecord> {
    Ok(MediaRecord {
        file_id: text(row, "file_id")?.unwrap_or_default(),
        file_name: text(row, "file_name")?.unwrap_or_default(),
        file_path: text(row, "file_path")?.unwrap_or_default(),
        file_type: text(row, "file_type")?.unwrap_or_default(),
        file_format: text(row, "file_format")?,
        file_resolution: text(row, "file_resolution")?,
        file_duration: text(row, "file_duration")?,
        shot_size: text(row, "shot_size")?,
        shot_type: text(row, "shot_type")?,
        source: text(row, "source")?,
        source_id: text(row, "source_id")?,
        genre: text(row, "genre")?,
        subject: text(row, "subject")?,
        category: text(row, "category")?,
        lighting: text(row, "lighting")?,
        setting: text(row, "setting")?,
        tags: text(row, "tags")?,
        captions: text(row, "captions")?,
    })
}
