//! Session export and import
//!
//! An export document holds one session with its categories and products.
//! Categories refer to their parent, and products to the categories they were
//! found in, by position in the `categories` array rather than by database id,
//! so a document can be imported into any database.

use crate::model::{CategoryType, ConfidenceSource, ExtractedEntity};
use crate::storage::{
    ImportedCategory, ImportedLink, ImportedProduct, NewCategory, SessionImport, SessionRecord,
    Storage,
};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Bumped whenever the document layout changes incompatibly
pub const EXPORT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub format_version: u32,
    pub session: SessionRecord,
    pub categories: Vec<ExportedCategory>,
    pub products: Vec<ExportedProduct>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedCategory {
    pub name: String,
    pub url: String,
    pub category_type: CategoryType,
    pub is_leaf: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Index of the parent in `categories`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    pub level: u32,
    pub path: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedProduct {
    pub entity_type: String,
    pub entity: ExtractedEntity,
    #[serde(default)]
    pub links: Vec<ExportedLink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedLink {
    /// Index of the category in `categories`
    pub category: usize,
    pub position: u32,
    #[serde(default)]
    pub featured: bool,
}

impl ExportDocument {
    /// Copy with session identity and timestamps cleared, for comparing a
    /// document with its re-export
    pub fn without_identity(&self) -> Self {
        let mut doc = self.clone();
        doc.session.session_id.clear();
        doc.session.start_time.clear();
        doc.session.end_time = None;
        doc
    }
}

/// Builds the export document of one session
pub fn export_session<S: Storage + ?Sized>(
    storage: &S,
    session_id: &str,
) -> Result<ExportDocument, HarvestError> {
    let session = storage
        .get_session(session_id)?
        .ok_or_else(|| HarvestError::Export(format!("session {} not found", session_id)))?;

    let records = storage.list_categories(Some(session_id))?;
    let index_of: HashMap<i64, usize> = records
        .iter()
        .enumerate()
        .map(|(index, c)| (c.id, index))
        .collect();

    let categories = records
        .iter()
        .map(|c| ExportedCategory {
            name: c.name.clone(),
            url: c.url.clone(),
            category_type: c.category_type,
            is_leaf: c.is_leaf,
            confidence_source: c.confidence_source.clone(),
            description: c.description.clone(),
            parent: c.parent_id.and_then(|p| index_of.get(&p).copied()),
            level: c.level,
            path: c.path.clone(),
            metadata: c.metadata.clone(),
        })
        .collect();

    let mut links: HashMap<i64, Vec<ExportedLink>> = HashMap::new();
    for link in storage.session_links(session_id)? {
        if let Some(&category) = index_of.get(&link.category_id) {
            links.entry(link.product_id).or_default().push(ExportedLink {
                category,
                position: link.position,
                featured: link.featured,
            });
        }
    }

    // usize::MAX becomes LIMIT -1, which SQLite reads as no limit
    let products = storage
        .list_products(Some(session_id), usize::MAX)?
        .into_iter()
        .map(|p| ExportedProduct {
            entity_type: p.entity_type.clone(),
            entity: p.to_entity(),
            links: links.remove(&p.id).unwrap_or_default(),
        })
        .collect();

    Ok(ExportDocument {
        format_version: EXPORT_FORMAT_VERSION,
        session,
        categories,
        products,
    })
}

/// Recreates a document's content as a new session and returns its id
///
/// Status, AI flag, config hash and metadata are carried over; ids and
/// timestamps are new. The document is checked before anything is written,
/// and the write itself is a single transaction: a rejected document leaves
/// no session behind.
pub fn import_session<S: Storage + ?Sized>(
    storage: &mut S,
    doc: &ExportDocument,
    now: DateTime<Utc>,
) -> Result<String, HarvestError> {
    check_document(doc)?;

    let import = SessionImport {
        started_at: now,
        status: doc.session.status,
        ai_enabled: doc.session.ai_enabled,
        config_hash: doc.session.config_hash.clone(),
        metadata: doc.session.metadata.clone(),
        categories: doc
            .categories
            .iter()
            .map(|category| ImportedCategory {
                category: NewCategory {
                    name: category.name.clone(),
                    url: category.url.clone(),
                    category_type: category.category_type,
                    description: category.description.clone(),
                    parent_id: None,
                    metadata: category.metadata.clone(),
                },
                parent: category.parent,
                confidence_source: category
                    .confidence_source
                    .as_deref()
                    .and_then(ConfidenceSource::from_db_string),
            })
            .collect(),
        products: doc
            .products
            .iter()
            .map(|product| ImportedProduct {
                entity_type: product.entity_type.clone(),
                entity: product.entity.clone(),
                links: product
                    .links
                    .iter()
                    .map(|link| ImportedLink {
                        category: link.category,
                        position: link.position,
                        featured: link.featured,
                    })
                    .collect(),
            })
            .collect(),
    };

    let session_id = storage.import_session(&import)?;
    info!(
        from = %doc.session.session_id,
        to = %session_id,
        categories = doc.categories.len(),
        products = doc.products.len(),
        "Imported session"
    );
    Ok(session_id)
}

/// Rejects unknown format versions and dangling category references
fn check_document(doc: &ExportDocument) -> Result<(), HarvestError> {
    if doc.format_version != EXPORT_FORMAT_VERSION {
        return Err(HarvestError::Export(format!(
            "unsupported export format version {}",
            doc.format_version
        )));
    }

    for (index, category) in doc.categories.iter().enumerate() {
        if let Some(parent) = category.parent.filter(|&p| p >= index) {
            return Err(HarvestError::Export(format!(
                "category {} refers to parent {} which does not precede it",
                index, parent
            )));
        }
    }

    let known = doc.categories.len();
    for product in &doc.products {
        if let Some(link) = product.links.iter().find(|l| l.category >= known) {
            return Err(HarvestError::Export(format!(
                "product {} links to unknown category {}",
                product.entity.name, link.category
            )));
        }
    }
    Ok(())
}

pub fn write_export(doc: &ExportDocument, path: &Path) -> Result<(), HarvestError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(doc)?)?;
    Ok(())
}

pub fn read_export(path: &Path) -> Result<ExportDocument, HarvestError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
