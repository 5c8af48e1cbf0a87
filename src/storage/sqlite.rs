//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::{
    generate_session_id, CategoryType, ConfidenceSource, ExtractedEntity, SessionStatus,
};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    CategoryProduct, CategoryRecord, DatabaseStats, HierarchyRow, LinkRecord, NewCategory,
    NodeUpdate, PriceStats, ProductRecord, SavedNode, SessionImport, SessionRecord, SessionStats,
    DEFAULT_CURRENCY,
};
use crate::HarvestError;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::path::Path;

/// Attempts at drawing an unused session id
const SESSION_ID_ATTEMPTS: usize = 5;

/// Separator between names in a category path
const PATH_SEPARATOR: &str = " > ";

const SESSION_COLUMNS: &str = "session_id, start_time, end_time, status, ai_enabled, config_hash,
     metadata, total_categories, total_products";

const CATEGORY_COLUMNS: &str = "id, session_id, name, url, category_type, is_leaf,
     confidence_source, description, parent_category_id, level, path, metadata, created_at";

const PRODUCT_COLUMNS: &str = "p.id, p.session_id, p.fingerprint, p.entity_type, p.name,
     p.item_number, p.price, p.price_value, p.currency, p.description, p.brand, p.availability,
     p.image_url, p.product_url, p.metadata, p.created_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database file and applies the schema
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;
        register_functions(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        register_functions(&conn)?;
        Ok(Self { conn })
    }
}

/// `fold_case(text)`: Unicode lowercase, matching `str::to_lowercase`
///
/// SQLite's own `lower()` only folds ASCII.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn json_text(value: &Value) -> String {
    match value {
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

fn json_value(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or_else(|_| Value::Object(Map::new()))
}

fn count(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)?.max(0) as u64)
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        session_id: row.get(0)?,
        start_time: row.get(1)?,
        end_time: row.get(2)?,
        status: SessionStatus::from_db_string(&row.get::<_, String>(3)?)
            .unwrap_or(SessionStatus::Failed),
        ai_enabled: row.get(4)?,
        config_hash: row.get(5)?,
        metadata: json_value(row.get(6)?),
        total_categories: count(row, 7)?,
        total_products: count(row, 8)?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<CategoryRecord> {
    Ok(CategoryRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        category_type: CategoryType::parse_lenient(&row.get::<_, String>(4)?),
        is_leaf: row.get(5)?,
        confidence_source: row.get(6)?,
        description: row.get(7)?,
        parent_id: row.get(8)?,
        level: row.get(9)?,
        path: row.get(10)?,
        metadata: json_value(row.get(11)?),
        created_at: row.get(12)?,
    })
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<ProductRecord> {
    Ok(ProductRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        fingerprint: row.get(2)?,
        entity_type: row.get(3)?,
        name: row.get(4)?,
        item_number: row.get(5)?,
        price: row.get(6)?,
        price_value: row.get(7)?,
        currency: row.get(8)?,
        description: row.get(9)?,
        brand: row.get(10)?,
        availability: row.get(11)?,
        image_url: row.get(12)?,
        product_url: row.get(13)?,
        metadata: json_value(row.get(14)?),
        created_at: row.get(15)?,
    })
}

fn create_session_on(
    conn: &Connection,
    started_at: DateTime<Utc>,
    ai_enabled: bool,
    config_hash: Option<&str>,
    metadata: &Value,
) -> StorageResult<String> {
    for _ in 0..SESSION_ID_ATTEMPTS {
        let session_id = generate_session_id(started_at);
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO scraping_sessions
             (session_id, start_time, status, ai_enabled, config_hash, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                timestamp(started_at),
                SessionStatus::Running.to_db_string(),
                ai_enabled,
                config_hash,
                json_text(metadata),
            ],
        )?;
        if inserted == 1 {
            return Ok(session_id);
        }
    }

    Err(StorageError::ConstraintViolation(
        "could not allocate a unique session id".to_string(),
    ))
}

fn finish_session_on(conn: &Connection, session_id: &str, status: SessionStatus) -> StorageResult<()> {
    let updated = conn.execute(
        "UPDATE scraping_sessions SET status = ?1, end_time = ?2,
         total_categories = (SELECT COUNT(*) FROM categories WHERE session_id = ?3),
         total_products = (SELECT COUNT(*) FROM products WHERE session_id = ?3)
         WHERE session_id = ?3",
        params![status.to_db_string(), timestamp(Utc::now()), session_id],
    )?;
    if updated == 0 {
        return Err(StorageError::NotFound(format!("Session {}", session_id)));
    }
    Ok(())
}

fn insert_category_on(
    conn: &Connection,
    session_id: &str,
    category: &NewCategory,
) -> StorageResult<i64> {
    let (level, path) = match category.parent_id {
        Some(parent_id) => {
            let (parent_level, parent_path): (u32, String) = conn
                .query_row(
                    "SELECT level, path FROM categories WHERE id = ?1 AND session_id = ?2",
                    params![parent_id, session_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or_else(|| {
                    StorageError::ConstraintViolation(format!(
                        "parent category {} is not part of session {}",
                        parent_id, session_id
                    ))
                })?;
            (
                parent_level + 1,
                format!("{}{}{}", parent_path, PATH_SEPARATOR, category.name),
            )
        }
        None => (0, category.name.clone()),
    };

    conn.execute(
        "INSERT INTO categories (session_id, name, url, category_type, is_leaf, description,
         parent_category_id, level, path, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            session_id,
            category.name,
            category.url,
            category.category_type.to_db_string(),
            category.category_type.is_leaf(),
            category.description,
            category.parent_id,
            level,
            path,
            json_text(&category.metadata),
            timestamp(Utc::now()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn set_category_type_on(
    conn: &Connection,
    category_id: i64,
    category_type: CategoryType,
    source: Option<ConfidenceSource>,
) -> StorageResult<()> {
    let updated = conn.execute(
        "UPDATE categories SET category_type = ?1, is_leaf = ?2, confidence_source = ?3
         WHERE id = ?4",
        params![
            category_type.to_db_string(),
            category_type.is_leaf(),
            source.map(|s| s.as_str()),
            category_id
        ],
    )?;
    if updated == 0 {
        return Err(StorageError::NotFound(format!("Category ID {}", category_id)));
    }
    Ok(())
}

fn merge_category_metadata(conn: &Connection, category_id: i64, patch: &Value) -> StorageResult<()> {
    let Value::Object(patch) = patch else {
        return Ok(());
    };
    if patch.is_empty() {
        return Ok(());
    }

    let current: String = conn.query_row(
        "SELECT metadata FROM categories WHERE id = ?1",
        params![category_id],
        |row| row.get(0),
    )?;
    let mut merged = match json_value(current) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }

    conn.execute(
        "UPDATE categories SET metadata = ?1 WHERE id = ?2",
        params![Value::Object(merged).to_string(), category_id],
    )?;
    Ok(())
}

fn insert_product_on(
    conn: &Connection,
    session_id: &str,
    entity_type: &str,
    entity: &ExtractedEntity,
) -> StorageResult<i64> {
    let fingerprint = entity.fingerprint();
    let mut extra: Map<String, Value> = entity
        .extra
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let currency = match extra.remove("currency") {
        Some(Value::String(c)) if !c.trim().is_empty() => c.trim().to_uppercase(),
        _ => DEFAULT_CURRENCY.to_string(),
    };

    conn.execute(
        "INSERT INTO products (session_id, fingerprint, entity_type, name, item_number, price,
         price_value, currency, description, brand, availability, image_url, product_url,
         metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(session_id, fingerprint) DO NOTHING",
        params![
            session_id,
            fingerprint,
            entity_type,
            entity.name,
            entity.identifier,
            entity.price,
            entity.price_value(),
            currency,
            entity.description,
            entity.brand,
            entity.availability,
            entity.image_url,
            entity.url,
            Value::Object(extra).to_string(),
            timestamp(Utc::now()),
        ],
    )?;

    let id = conn.query_row(
        "SELECT id FROM products WHERE session_id = ?1 AND fingerprint = ?2",
        params![session_id, fingerprint],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn link_product_on(
    conn: &Connection,
    category_id: i64,
    product_id: i64,
    position: u32,
    featured: bool,
) -> StorageResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO category_products (category_id, product_id, position, featured)
         VALUES (?1, ?2, ?3, ?4)",
        params![category_id, product_id, position, featured],
    )?;
    Ok(inserted == 1)
}

fn distribution(
    conn: &Connection,
    sql: &str,
    session_id: &str,
    limit: Option<usize>,
) -> StorageResult<Vec<(String, u64)>> {
    let mut stmt = conn.prepare(sql)?;
    let limit = limit.map(|l| l as i64).unwrap_or(-1);
    let rows = stmt
        .query_map(params![session_id, limit], |row| Ok((row.get(0)?, count(row, 1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Storage for SqliteStorage {
    // ===== Session Management =====

    fn create_session(
        &mut self,
        started_at: DateTime<Utc>,
        ai_enabled: bool,
        config_hash: Option<&str>,
        metadata: &Value,
    ) -> StorageResult<String> {
        create_session_on(&self.conn, started_at, ai_enabled, config_hash, metadata)
    }

    fn finish_session(
        &mut self,
        session_id: &str,
        status: SessionStatus,
    ) -> StorageResult<SessionRecord> {
        finish_session_on(&self.conn, session_id, status)?;
        self.get_session(session_id)?
            .ok_or_else(|| StorageError::NotFound(format!("Session {}", session_id)))
    }

    fn get_session(&self, session_id: &str) -> StorageResult<Option<SessionRecord>> {
        let session = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM scraping_sessions WHERE session_id = ?1",
                    SESSION_COLUMNS
                ),
                params![session_id],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    fn list_sessions(&self, limit: usize) -> StorageResult<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM scraping_sessions ORDER BY start_time DESC, rowid DESC LIMIT ?1",
            SESSION_COLUMNS
        ))?;
        let sessions = stmt
            .query_map(params![limit as i64], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    fn purge_sessions_older_than(
        &mut self,
        keep_days: u32,
        now: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let cutoff = timestamp(now - Duration::days(i64::from(keep_days)));
        let deleted = self.conn.execute(
            "DELETE FROM scraping_sessions WHERE start_time < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    fn import_session(&mut self, import: &SessionImport) -> StorageResult<String> {
        let tx = self.conn.transaction()?;
        let session_id = create_session_on(
            &tx,
            import.started_at,
            import.ai_enabled,
            import.config_hash.as_deref(),
            &import.metadata,
        )?;

        let mut category_ids: Vec<i64> = Vec::with_capacity(import.categories.len());
        for (index, imported) in import.categories.iter().enumerate() {
            let parent_id = match imported.parent {
                Some(parent) => Some(*category_ids.get(parent).ok_or_else(|| {
                    StorageError::ConstraintViolation(format!(
                        "category {} refers to parent {} which does not precede it",
                        index, parent
                    ))
                })?),
                None => None,
            };
            let category = imported.category.clone().with_parent(parent_id);
            let id = insert_category_on(&tx, &session_id, &category)?;
            if imported.confidence_source.is_some() {
                set_category_type_on(&tx, id, category.category_type, imported.confidence_source)?;
            }
            category_ids.push(id);
        }

        for product in &import.products {
            let product_id =
                insert_product_on(&tx, &session_id, &product.entity_type, &product.entity)?;
            for link in &product.links {
                let category_id = *category_ids.get(link.category).ok_or_else(|| {
                    StorageError::ConstraintViolation(format!(
                        "link to unknown category {}",
                        link.category
                    ))
                })?;
                link_product_on(&tx, category_id, product_id, link.position, link.featured)?;
            }
        }

        finish_session_on(&tx, &session_id, import.status)?;
        tx.commit()?;
        Ok(session_id)
    }

    // ===== Category Management =====

    fn insert_category(&mut self, session_id: &str, category: &NewCategory) -> StorageResult<i64> {
        insert_category_on(&self.conn, session_id, category)
    }

    fn save_node(&mut self, category_id: i64, update: &NodeUpdate) -> StorageResult<SavedNode> {
        let tx = self.conn.transaction()?;

        let session_id: String = tx
            .query_row(
                "SELECT session_id FROM categories WHERE id = ?1",
                params![category_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(format!("Category ID {}", category_id)))?;

        set_category_type_on(&tx, category_id, update.category_type, update.confidence_source)?;
        merge_category_metadata(&tx, category_id, &update.metadata)?;

        let mut saved = SavedNode {
            category_id,
            ..SavedNode::default()
        };

        for (position, (entity_type, entity)) in update.entities.iter().enumerate() {
            let product_id = insert_product_on(&tx, &session_id, entity_type, entity)?;
            if link_product_on(&tx, category_id, product_id, position as u32, false)? {
                saved.products_linked += 1;
            }
        }

        for child in &update.child_categories {
            let child = child.clone().with_parent(Some(category_id));
            insert_category_on(&tx, &session_id, &child)?;
            saved.children_created += 1;
        }

        tx.commit()?;
        Ok(saved)
    }

    fn update_category_type(
        &mut self,
        category_id: i64,
        category_type: CategoryType,
        source: Option<ConfidenceSource>,
    ) -> StorageResult<()> {
        set_category_type_on(&self.conn, category_id, category_type, source)
    }

    fn get_category(&self, category_id: i64) -> StorageResult<Option<CategoryRecord>> {
        let category = self
            .conn
            .query_row(
                &format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS),
                params![category_id],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    fn list_categories(&self, session_id: Option<&str>) -> StorageResult<Vec<CategoryRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM categories WHERE ?1 IS NULL OR session_id = ?1 ORDER BY id",
            CATEGORY_COLUMNS
        ))?;
        let categories = stmt
            .query_map(params![session_id], category_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn category_hierarchy(&self, session_id: &str) -> StorageResult<Vec<HierarchyRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, name, url, category_type, is_leaf, parent_category_id,
             level, path, parent_name, product_count
             FROM category_hierarchy WHERE session_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok(HierarchyRow {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    name: row.get(2)?,
                    url: row.get(3)?,
                    category_type: CategoryType::parse_lenient(&row.get::<_, String>(4)?),
                    is_leaf: row.get(5)?,
                    parent_id: row.get(6)?,
                    level: row.get(7)?,
                    path: row.get(8)?,
                    parent_name: row.get(9)?,
                    product_count: count(row, 10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ===== Product Management =====

    fn insert_product(
        &mut self,
        session_id: &str,
        entity_type: &str,
        entity: &ExtractedEntity,
    ) -> StorageResult<i64> {
        insert_product_on(&self.conn, session_id, entity_type, entity)
    }

    fn link_product(
        &mut self,
        category_id: i64,
        product_id: i64,
        position: u32,
        featured: bool,
    ) -> StorageResult<()> {
        link_product_on(&self.conn, category_id, product_id, position, featured)?;
        Ok(())
    }

    fn get_product(&self, product_id: i64) -> StorageResult<Option<ProductRecord>> {
        let product = self
            .conn
            .query_row(
                &format!("SELECT {} FROM products p WHERE p.id = ?1", PRODUCT_COLUMNS),
                params![product_id],
                product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    fn list_products(
        &self,
        session_id: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<ProductRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM products p WHERE ?1 IS NULL OR p.session_id = ?1
             ORDER BY p.id LIMIT ?2",
            PRODUCT_COLUMNS
        ))?;
        let products = stmt
            .query_map(params![session_id, limit as i64], product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    fn products_in_category(&self, category_id: i64) -> StorageResult<Vec<CategoryProduct>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {}, cp.position, cp.featured FROM category_products cp
             JOIN products p ON p.id = cp.product_id
             WHERE cp.category_id = ?1 ORDER BY cp.position",
            PRODUCT_COLUMNS
        ))?;
        let products = stmt
            .query_map(params![category_id], |row| {
                Ok(CategoryProduct {
                    product: product_from_row(row)?,
                    position: row.get(16)?,
                    featured: row.get(17)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    fn search_products(
        &self,
        term: &str,
        session_id: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<ProductRecord>> {
        let needle = term.trim().to_lowercase();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM products p
             WHERE (instr(fold_case(p.name), ?1) > 0
                 OR instr(fold_case(COALESCE(p.brand, '')), ?1) > 0
                 OR instr(fold_case(COALESCE(p.description, '')), ?1) > 0)
               AND (?2 IS NULL OR p.session_id = ?2)
             ORDER BY p.name, p.id LIMIT ?3",
            PRODUCT_COLUMNS
        ))?;
        let products = stmt
            .query_map(params![needle, session_id, limit as i64], product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    fn session_links(&self, session_id: &str) -> StorageResult<Vec<LinkRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT cp.category_id, cp.product_id, cp.position, cp.featured
             FROM category_products cp JOIN categories c ON c.id = cp.category_id
             WHERE c.session_id = ?1 ORDER BY cp.category_id, cp.position",
        )?;
        let links = stmt
            .query_map(params![session_id], |row| {
                Ok(LinkRecord {
                    category_id: row.get(0)?,
                    product_id: row.get(1)?,
                    position: row.get(2)?,
                    featured: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    // ===== Statistics =====

    fn database_stats(&self) -> StorageResult<DatabaseStats> {
        let (total_sessions, total_categories, total_products) = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM scraping_sessions),
                    (SELECT COUNT(*) FROM categories),
                    (SELECT COUNT(*) FROM products)",
            [],
            |row| Ok((count(row, 0)?, count(row, 1)?, count(row, 2)?)),
        )?;
        let page_count: i64 = self.conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = self.conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;

        Ok(DatabaseStats {
            total_sessions,
            total_categories,
            total_products,
            database_size_bytes: (page_count.max(0) as u64) * (page_size.max(0) as u64),
        })
    }

    fn session_stats(&self, session_id: &str) -> StorageResult<Option<SessionStats>> {
        let stats = self
            .conn
            .query_row(
                "SELECT session_id, start_time, end_time, status, total_categories,
                 leaf_categories, total_products, min_price, avg_price, max_price
                 FROM session_stats WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(SessionStats {
                        session_id: row.get(0)?,
                        start_time: row.get(1)?,
                        end_time: row.get(2)?,
                        status: SessionStatus::from_db_string(&row.get::<_, String>(3)?)
                            .unwrap_or(SessionStatus::Failed),
                        total_categories: count(row, 4)?,
                        leaf_categories: count(row, 5)?,
                        total_products: count(row, 6)?,
                        min_price: row.get(7)?,
                        avg_price: row.get(8)?,
                        max_price: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(stats)
    }

    fn category_type_distribution(&self, session_id: &str) -> StorageResult<Vec<(String, u64)>> {
        distribution(
            &self.conn,
            "SELECT category_type, COUNT(*) AS n FROM categories WHERE session_id = ?1
             GROUP BY category_type ORDER BY n DESC, category_type LIMIT ?2",
            session_id,
            None,
        )
    }

    fn price_stats(&self, session_id: &str) -> StorageResult<PriceStats> {
        let stats = self.conn.query_row(
            "SELECT COUNT(price_value), MIN(price_value), MAX(price_value), AVG(price_value)
             FROM products WHERE session_id = ?1 AND price_value IS NOT NULL",
            params![session_id],
            |row| {
                Ok(PriceStats {
                    priced_products: count(row, 0)?,
                    min_price: row.get(1)?,
                    max_price: row.get(2)?,
                    avg_price: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }

    fn brand_distribution(
        &self,
        session_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<(String, u64)>> {
        distribution(
            &self.conn,
            "SELECT brand, COUNT(*) AS n FROM products
             WHERE session_id = ?1 AND brand IS NOT NULL AND brand != ''
             GROUP BY brand ORDER BY n DESC, brand LIMIT ?2",
            session_id,
            Some(limit),
        )
    }

    fn availability_distribution(&self, session_id: &str) -> StorageResult<Vec<(String, u64)>> {
        distribution(
            &self.conn,
            "SELECT COALESCE(NULLIF(availability, ''), 'unknown') AS a, COUNT(*) AS n
             FROM products WHERE session_id = ?1
             GROUP BY a ORDER BY n DESC, a LIMIT ?2",
            session_id,
            None,
        )
    }

    // ===== Discovery Cache =====

    fn get_cached_sitemap(
        &self,
        source: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<String>> {
        let cached: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT payload, fetched_at FROM sitemap_cache WHERE source = ?1",
                params![source],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((payload, fetched_at)) = cached else {
            return Ok(None);
        };

        let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
            .map_err(|e| StorageError::Serialization(format!("bad cache timestamp: {}", e)))?
            .with_timezone(&Utc);

        if now - fetched_at < max_age {
            Ok(Some(payload))
        } else {
            Ok(None)
        }
    }

    fn put_cached_sitemap(
        &mut self,
        source: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO sitemap_cache (source, payload, fetched_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(source) DO UPDATE SET payload = excluded.payload,
             fetched_at = excluded.fetched_at",
            params![source, payload, timestamp(now)],
        )?;
        Ok(())
    }
}
