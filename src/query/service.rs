use crate::query::{QueryError, QueryResult};
use crate::storage::{
    CategoryProduct, CategoryRecord, DatabaseStats, HierarchyRow, PriceStats, ProductRecord,
    SessionRecord, SessionStats, Storage,
};
use serde::Serialize;

/// Rows returned when the caller gives no limit
pub const DEFAULT_LIMIT: usize = 50;

/// Largest accepted limit
pub const MAX_LIMIT: usize = 1000;

pub const MAX_SEARCH_TERM_CHARS: usize = 200;

/// Brands listed in a session overview
const TOP_BRANDS: usize = 10;

/// Everything the statistics endpoints know about one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOverview {
    pub stats: SessionStats,
    pub category_types: Vec<(String, u64)>,
    pub prices: PriceStats,
    pub brands: Vec<(String, u64)>,
    pub availability: Vec<(String, u64)>,
}

/// Read-only view over a [`Storage`] backend
pub struct QueryService<'a, S: Storage + ?Sized> {
    storage: &'a S,
}

impl<'a, S: Storage + ?Sized> QueryService<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    // ===== Sessions =====

    /// Most recent sessions first
    pub fn sessions(&self, limit: Option<usize>) -> QueryResult<Vec<SessionRecord>> {
        let limit = check_limit(limit)?;
        Ok(self.storage.list_sessions(limit)?)
    }

    pub fn session(&self, session_id: &str) -> QueryResult<SessionRecord> {
        let session_id = check_session_id(session_id)?;
        self.storage
            .get_session(session_id)?
            .ok_or_else(|| QueryError::NotFound(format!("session {}", session_id)))
    }

    // ===== Categories =====

    pub fn categories(&self, session_id: Option<&str>) -> QueryResult<Vec<CategoryRecord>> {
        match session_id {
            Some(id) => {
                let session = self.session(id)?;
                Ok(self.storage.list_categories(Some(&session.session_id))?)
            }
            None => Ok(self.storage.list_categories(None)?),
        }
    }

    pub fn category(&self, category_id: i64) -> QueryResult<CategoryRecord> {
        check_id(category_id, "category")?;
        self.storage
            .get_category(category_id)?
            .ok_or_else(|| QueryError::NotFound(format!("category {}", category_id)))
    }

    /// Categories of a session ordered by path, with parent names and product counts
    pub fn hierarchy(&self, session_id: &str) -> QueryResult<Vec<HierarchyRow>> {
        let session = self.session(session_id)?;
        Ok(self.storage.category_hierarchy(&session.session_id)?)
    }

    pub fn category_products(&self, category_id: i64) -> QueryResult<Vec<CategoryProduct>> {
        let category = self.category(category_id)?;
        Ok(self.storage.products_in_category(category.id)?)
    }

    // ===== Products =====

    pub fn products(
        &self,
        session_id: Option<&str>,
        limit: Option<usize>,
    ) -> QueryResult<Vec<ProductRecord>> {
        let limit = check_limit(limit)?;
        let session = match session_id {
            Some(id) => Some(self.session(id)?.session_id),
            None => None,
        };
        Ok(self.storage.list_products(session.as_deref(), limit)?)
    }

    pub fn product(&self, product_id: i64) -> QueryResult<ProductRecord> {
        check_id(product_id, "product")?;
        self.storage
            .get_product(product_id)?
            .ok_or_else(|| QueryError::NotFound(format!("product {}", product_id)))
    }

    /// Case-insensitive substring search over name, brand and description
    pub fn search(
        &self,
        term: &str,
        session_id: Option<&str>,
        limit: Option<usize>,
    ) -> QueryResult<Vec<ProductRecord>> {
        let term = term.trim();
        if term.is_empty() {
            return Err(QueryError::BadRequest("search term must not be empty".into()));
        }
        if term.chars().count() > MAX_SEARCH_TERM_CHARS {
            return Err(QueryError::BadRequest(format!(
                "search term longer than {} characters",
                MAX_SEARCH_TERM_CHARS
            )));
        }
        let limit = check_limit(limit)?;
        let session = match session_id {
            Some(id) => Some(self.session(id)?.session_id),
            None => None,
        };
        Ok(self
            .storage
            .search_products(term, session.as_deref(), limit)?)
    }

    // ===== Statistics =====

    pub fn database_stats(&self) -> QueryResult<DatabaseStats> {
        Ok(self.storage.database_stats()?)
    }

    pub fn category_types(&self, session_id: &str) -> QueryResult<Vec<(String, u64)>> {
        let session = self.session(session_id)?;
        Ok(self
            .storage
            .category_type_distribution(&session.session_id)?)
    }

    pub fn price_stats(&self, session_id: &str) -> QueryResult<PriceStats> {
        let session = self.session(session_id)?;
        Ok(self.storage.price_stats(&session.session_id)?)
    }

    pub fn brands(&self, session_id: &str, limit: Option<usize>) -> QueryResult<Vec<(String, u64)>> {
        let limit = check_limit(limit)?;
        let session = self.session(session_id)?;
        Ok(self
            .storage
            .brand_distribution(&session.session_id, limit)?)
    }

    pub fn availability(&self, session_id: &str) -> QueryResult<Vec<(String, u64)>> {
        let session = self.session(session_id)?;
        Ok(self
            .storage
            .availability_distribution(&session.session_id)?)
    }

    pub fn session_overview(&self, session_id: &str) -> QueryResult<SessionOverview> {
        let session = self.session(session_id)?;
        let id = session.session_id.as_str();
        let stats = self
            .storage
            .session_stats(id)?
            .ok_or_else(|| QueryError::NotFound(format!("session {}", id)))?;

        Ok(SessionOverview {
            stats,
            category_types: self.storage.category_type_distribution(id)?,
            prices: self.storage.price_stats(id)?,
            brands: self.storage.brand_distribution(id, TOP_BRANDS)?,
            availability: self.storage.availability_distribution(id)?,
        })
    }
}

fn check_limit(limit: Option<usize>) -> QueryResult<usize> {
    match limit {
        None => Ok(DEFAULT_LIMIT),
        Some(0) => Err(QueryError::BadRequest("limit must be at least 1".into())),
        Some(n) if n > MAX_LIMIT => Err(QueryError::BadRequest(format!(
            "limit must be at most {}",
            MAX_LIMIT
        ))),
        Some(n) => Ok(n),
    }
}

fn check_id(id: i64, what: &str) -> QueryResult<()> {
    if id <= 0 {
        return Err(QueryError::BadRequest(format!("invalid {} id {}", what, id)));
    }
    Ok(())
}

fn check_session_id(session_id: &str) -> QueryResult<&str> {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(QueryError::BadRequest("session id must not be empty".into()));
    }
    Ok(session_id)
}
