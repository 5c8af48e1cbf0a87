//! Storage module for persisting harvest data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Session lifecycle and retention
//! - Category, product and link persistence (one transaction per node)
//! - Read queries and statistics
//! - The sitemap discovery cache

mod schema;
mod sqlite;
mod traits;

pub use schema::{get_schema_version, SCHEMA_SQL};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::model::{CategoryType, ConfidenceSource, ExtractedEntity, SessionStatus, PRODUCTS};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Default currency for harvested prices
pub const DEFAULT_CURRENCY: &str = "CAD";

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// A harvest session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: SessionStatus,
    pub ai_enabled: bool,
    pub config_hash: Option<String>,
    pub metadata: Value,
    pub total_categories: u64,
    pub total_products: u64,
}

/// A stored category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub session_id: String,
    pub name: String,
    pub url: String,
    pub category_type: CategoryType,
    pub is_leaf: bool,
    pub confidence_source: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub level: u32,
    /// Names from the root, joined with `" > "`
    pub path: String,
    pub metadata: Value,
    pub created_at: String,
}

/// A stored product (or other harvestable entity)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: i64,
    pub session_id: String,
    pub fingerprint: String,
    pub entity_type: String,
    pub name: String,
    pub item_number: Option<String>,
    pub price: Option<String>,
    pub price_value: Option<f64>,
    pub currency: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub availability: Option<String>,
    pub image_url: Option<String>,
    pub product_url: Option<String>,
    pub metadata: Value,
    pub created_at: String,
}

impl ProductRecord {
    /// Rebuilds the entity this record was stored from
    pub fn to_entity(&self) -> ExtractedEntity {
        let mut extra: BTreeMap<String, Value> = match &self.metadata {
            Value::Object(map) => map.clone().into_iter().collect(),
            _ => Default::default(),
        };
        if self.currency != DEFAULT_CURRENCY {
            extra.insert("currency".to_string(), Value::String(self.currency.clone()));
        }

        ExtractedEntity {
            name: self.name.clone(),
            price: self.price.clone(),
            url: self.product_url.clone(),
            image_url: self.image_url.clone(),
            identifier: self.item_number.clone(),
            description: self.description.clone(),
            brand: self.brand.clone(),
            availability: self.availability.clone(),
            category_type: None,
            extra,
        }
    }
}

/// A product as listed on one category page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryProduct {
    pub product: ProductRecord,
    pub position: u32,
    pub featured: bool,
}

/// One category/product link
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRecord {
    pub category_id: i64,
    pub product_id: i64,
    pub position: u32,
    pub featured: bool,
}

/// Row of the `category_hierarchy` view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyRow {
    pub id: i64,
    pub session_id: String,
    pub name: String,
    pub url: String,
    pub category_type: CategoryType,
    pub is_leaf: bool,
    pub parent_id: Option<i64>,
    pub level: u32,
    pub path: String,
    pub parent_name: Option<String>,
    pub product_count: u64,
}

/// Category to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewCategory {
    pub name: String,
    pub url: String,
    pub category_type: CategoryType,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub metadata: Value,
}

impl NewCategory {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            category_type: CategoryType::Unknown,
            description: None,
            parent_id: None,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_parent(mut self, parent_id: Option<i64>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_type(mut self, category_type: CategoryType) -> Self {
        self.category_type = category_type;
        self
    }
}

/// Everything one processed node writes
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpdate {
    pub category_type: CategoryType,
    pub confidence_source: Option<ConfidenceSource>,
    /// Merged into the stored metadata object
    pub metadata: Value,
    /// `(entity type, entity)` in page order; position is the index
    pub entities: Vec<(String, ExtractedEntity)>,
    /// Categories found on the page, stored as children of the node
    pub child_categories: Vec<NewCategory>,
}

impl NodeUpdate {
    pub fn classified(category_type: CategoryType, source: ConfidenceSource) -> Self {
        Self {
            category_type,
            confidence_source: Some(source),
            metadata: Value::Object(Default::default()),
            entities: Vec::new(),
            child_categories: Vec::new(),
        }
    }

    /// Adds products with the default entity type
    pub fn with_products(mut self, products: impl IntoIterator<Item = ExtractedEntity>) -> Self {
        self.entities
            .extend(products.into_iter().map(|p| (PRODUCTS.to_string(), p)));
        self
    }
}

/// A complete session written in one transaction by [`Storage::import_session`]
///
/// Categories refer to their parent, and links to their category, by index
/// into `categories`. A parent must precede its children.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionImport {
    pub started_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub ai_enabled: bool,
    pub config_hash: Option<String>,
    pub metadata: Value,
    pub categories: Vec<ImportedCategory>,
    pub products: Vec<ImportedProduct>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedCategory {
    /// `parent_id` is ignored; `parent` is used instead
    pub category: NewCategory,
    pub parent: Option<usize>,
    pub confidence_source: Option<ConfidenceSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedProduct {
    pub entity_type: String,
    pub entity: ExtractedEntity,
    pub links: Vec<ImportedLink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportedLink {
    pub category: usize,
    pub position: u32,
    pub featured: bool,
}

/// What a node save wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SavedNode {
    pub category_id: i64,
    pub products_linked: usize,
    pub children_created: usize,
}

/// Whole-database totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub total_sessions: u64,
    pub total_categories: u64,
    pub total_products: u64,
    pub database_size_bytes: u64,
}

/// Row of the `session_stats` view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub session_id: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: SessionStatus,
    pub total_categories: u64,
    pub leaf_categories: u64,
    pub total_products: u64,
    /// Over products with a parseable price
    pub min_price: Option<f64>,
    pub avg_price: Option<f64>,
    pub max_price: Option<f64>,
}

/// Price statistics over products with a parseable price
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceStats {
    pub priced_products: u64,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_price: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(currency: &str) -> ProductRecord {
        ProductRecord {
            id: 1,
            session_id: "s".into(),
            fingerprint: "f".into(),
            entity_type: PRODUCTS.into(),
            name: "Tent".into(),
            item_number: Some("42".into()),
            price: Some("$99.99".into()),
            price_value: Some(99.99),
            currency: currency.into(),
            description: None,
            brand: Some("Coleman".into()),
            availability: None,
            image_url: None,
            product_url: Some("https://www.costco.ca/tent.html".into()),
            metadata: serde_json::json!({"rating": 4}),
            created_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_record_to_entity() {
        let entity = record(DEFAULT_CURRENCY).to_entity();
        assert_eq!(entity.name, "Tent");
        assert_eq!(entity.identifier.as_deref(), Some("42"));
        assert_eq!(entity.extra.len(), 1);

        let usd = record("USD").to_entity();
        assert_eq!(usd.extra.get("currency"), Some(&Value::String("USD".into())));
    }
}
