//! Storage traits and error types

use crate::model::{CategoryType, ConfidenceSource, ExtractedEntity, SessionStatus};
use crate::storage::{
    CategoryProduct, CategoryRecord, DatabaseStats, HierarchyRow, LinkRecord, NewCategory,
    NodeUpdate, PriceStats, ProductRecord, SavedNode, SessionImport, SessionRecord, SessionStats,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Writers take `&mut self`; a session has one logical writer.
pub trait Storage {
    // ===== Session Management =====

    /// Creates a session in the `running` state and returns its id
    fn create_session(
        &mut self,
        started_at: DateTime<Utc>,
        ai_enabled: bool,
        config_hash: Option<&str>,
        metadata: &Value,
    ) -> StorageResult<String>;

    /// Sets the terminal status, end time and aggregate counts
    fn finish_session(&mut self, session_id: &str, status: SessionStatus)
        -> StorageResult<SessionRecord>;

    fn get_session(&self, session_id: &str) -> StorageResult<Option<SessionRecord>>;

    /// Most recent sessions first
    fn list_sessions(&self, limit: usize) -> StorageResult<Vec<SessionRecord>>;

    /// Deletes sessions started more than `keep_days` before `now`
    ///
    /// Categories, products and links of a deleted session go with it.
    /// Returns the number of sessions removed.
    fn purge_sessions_older_than(&mut self, keep_days: u32, now: DateTime<Utc>)
        -> StorageResult<usize>;

    /// Writes a whole session, its categories, products and links, or nothing
    fn import_session(&mut self, import: &SessionImport) -> StorageResult<String>;

    // ===== Category Management =====

    /// Inserts an unclassified-or-typed category; level and path follow the parent
    fn insert_category(&mut self, session_id: &str, category: &NewCategory) -> StorageResult<i64>;

    /// Persists everything one node produced, in a single transaction
    fn save_node(&mut self, category_id: i64, update: &NodeUpdate) -> StorageResult<SavedNode>;

    /// Overwrites a category's type; repeating the same call changes nothing
    fn update_category_type(
        &mut self,
        category_id: i64,
        category_type: CategoryType,
        source: Option<ConfidenceSource>,
    ) -> StorageResult<()>;

    fn get_category(&self, category_id: i64) -> StorageResult<Option<CategoryRecord>>;

    /// Categories in insertion order, optionally for one session
    fn list_categories(&self, session_id: Option<&str>) -> StorageResult<Vec<CategoryRecord>>;

    fn category_hierarchy(&self, session_id: &str) -> StorageResult<Vec<HierarchyRow>>;

    // ===== Product Management =====

    /// Inserts a product or returns the id of the same product in this session
    fn insert_product(
        &mut self,
        session_id: &str,
        entity_type: &str,
        entity: &ExtractedEntity,
    ) -> StorageResult<i64>;

    fn link_product(
        &mut self,
        category_id: i64,
        product_id: i64,
        position: u32,
        featured: bool,
    ) -> StorageResult<()>;

    fn get_product(&self, product_id: i64) -> StorageResult<Option<ProductRecord>>;

    fn list_products(&self, session_id: Option<&str>, limit: usize)
        -> StorageResult<Vec<ProductRecord>>;

    /// Products linked to a category, by position
    fn products_in_category(&self, category_id: i64) -> StorageResult<Vec<CategoryProduct>>;

    /// Case-insensitive substring search over name, brand and description
    fn search_products(
        &self,
        term: &str,
        session_id: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<ProductRecord>>;

    /// Every category/product link of a session
    fn session_links(&self, session_id: &str) -> StorageResult<Vec<LinkRecord>>;

    // ===== Statistics =====

    fn database_stats(&self) -> StorageResult<DatabaseStats>;

    fn session_stats(&self, session_id: &str) -> StorageResult<Option<SessionStats>>;

    /// Category type -> count, most frequent first
    fn category_type_distribution(&self, session_id: &str) -> StorageResult<Vec<(String, u64)>>;

    fn price_stats(&self, session_id: &str) -> StorageResult<PriceStats>;

    fn brand_distribution(&self, session_id: &str, limit: usize)
        -> StorageResult<Vec<(String, u64)>>;

    fn availability_distribution(&self, session_id: &str) -> StorageResult<Vec<(String, u64)>>;

    // ===== Discovery Cache =====

    /// Cached payload for `source` if it was stored less than `max_age` before `now`
    fn get_cached_sitemap(
        &self,
        source: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<String>>;

    fn put_cached_sitemap(&mut self, source: &str, payload: &str, now: DateTime<Utc>)
        -> StorageResult<()>;
}
