//! Database schema definitions
//!
//! Sessions own everything created during them; deleting a session row
//! cascades to its categories, products and category/product links.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per harvest run
CREATE TABLE IF NOT EXISTS scraping_sessions (
    session_id TEXT PRIMARY KEY,
    start_time TEXT NOT NULL,
    end_time TEXT,
    status TEXT NOT NULL,
    ai_enabled INTEGER NOT NULL DEFAULT 0,
    config_hash TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    total_categories INTEGER NOT NULL DEFAULT 0,
    total_products INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_sessions_start ON scraping_sessions(start_time);

-- Categories discovered or found inside pages
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES scraping_sessions(session_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    category_type TEXT NOT NULL DEFAULT 'unknown',
    is_leaf INTEGER NOT NULL DEFAULT 0,
    confidence_source TEXT,
    description TEXT,
    parent_category_id INTEGER REFERENCES categories(id) ON DELETE CASCADE,
    level INTEGER NOT NULL DEFAULT 0,
    path TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_categories_session ON categories(session_id);
CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_category_id);
CREATE INDEX IF NOT EXISTS idx_categories_type ON categories(category_type);

-- Products and other harvestable entities
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES scraping_sessions(session_id) ON DELETE CASCADE,
    fingerprint TEXT NOT NULL,
    entity_type TEXT NOT NULL DEFAULT 'products',
    name TEXT NOT NULL,
    item_number TEXT,
    price TEXT,
    price_value REAL,
    currency TEXT NOT NULL DEFAULT 'CAD',
    description TEXT,
    brand TEXT,
    availability TEXT,
    image_url TEXT,
    product_url TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    UNIQUE(session_id, fingerprint)
);

CREATE INDEX IF NOT EXISTS idx_products_session ON products(session_id);
CREATE INDEX IF NOT EXISTS idx_products_name ON products(name);
CREATE INDEX IF NOT EXISTS idx_products_brand ON products(brand);

-- Many-to-many link between categories and products
CREATE TABLE IF NOT EXISTS category_products (
    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    featured INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (category_id, product_id)
);

CREATE INDEX IF NOT EXISTS idx_category_products_product ON category_products(product_id);

-- Parsed sitemap structures keyed by source URL
CREATE TABLE IF NOT EXISTS sitemap_cache (
    source TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    fetched_at TEXT NOT NULL
);

CREATE VIEW IF NOT EXISTS session_stats AS
SELECT
    s.session_id,
    s.start_time,
    s.end_time,
    s.status,
    (SELECT COUNT(*) FROM categories c WHERE c.session_id = s.session_id) AS total_categories,
    (SELECT COUNT(*) FROM categories c WHERE c.session_id = s.session_id AND c.is_leaf = 1) AS leaf_categories,
    (SELECT COUNT(*) FROM products p WHERE p.session_id = s.session_id) AS total_products,
    (SELECT MIN(p.price_value) FROM products p WHERE p.session_id = s.session_id) AS min_price,
    (SELECT AVG(p.price_value) FROM products p WHERE p.session_id = s.session_id) AS avg_price,
    (SELECT MAX(p.price_value) FROM products p WHERE p.session_id = s.session_id) AS max_price
FROM scraping_sessions s;

CREATE VIEW IF NOT EXISTS category_hierarchy AS
SELECT
    c.id,
    c.session_id,
    c.name,
    c.url,
    c.category_type,
    c.is_leaf,
    c.parent_category_id,
    c.level,
    c.path,
    parent.name AS parent_name,
    (SELECT COUNT(*) FROM category_products cp WHERE cp.category_id = c.id) AS product_count
FROM categories c
LEFT JOIN categories parent ON parent.id = c.parent_category_id;
"#;

/// Version stored in `PRAGMA user_version` once the schema is applied
pub const SCHEMA_VERSION: u32 = 2;

/// Initializes the database schema
///
/// Databases from an older version get their views recreated; tables are
/// only ever added.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < SCHEMA_VERSION {
        conn.execute_batch(
            "DROP VIEW IF EXISTS session_stats;
             DROP VIEW IF EXISTS category_hierarchy;",
        )?;
    }
    conn.execute_batch(SCHEMA_SQL)?;
    if version != SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    SCHEMA_VERSION
}
