//! Extracted entities and the batches extraction strategies return

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Entity type name for products
pub const PRODUCTS: &str = "products";

/// Entity type name for categories found inside a page
pub const CATEGORIES: &str = "categories";

/// Entity type name for services (photo, optical, travel...)
pub const SERVICES: &str = "services";

/// One product, service or other entity pulled out of a page
///
/// `name` is the only required field. Everything else is best-effort.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,

    /// Absolute URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Item number or product id from the page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,

    /// Raw category type string, only meaningful for category entities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_type: Option<String>,

    /// Free-form fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ExtractedEntity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Numeric value of the price text, e.g. `"$1,299.99"` -> `1299.99`
    pub fn price_value(&self) -> Option<f64> {
        self.price.as_deref().and_then(parse_price)
    }

    /// Stable identity used to link one product to several categories
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.trim().to_lowercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.identifier.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(self.url.as_deref().unwrap_or("").as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Parses the first number in a price string, ignoring currency and separators
pub fn parse_price(text: &str) -> Option<f64> {
    let mut digits = String::new();
    let mut started = false;

    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            started = true;
        } else if c == '.' && started && !digits.contains('.') {
            digits.push(c);
        } else if c == ',' && started {
            continue;
        } else if started {
            break;
        }
    }

    digits.trim_end_matches('.').parse::<f64>().ok()
}

/// Entities grouped by type name, in the order the types were first found
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityBatch {
    entities_found: Vec<String>,
    payloads: BTreeMap<String, Vec<ExtractedEntity>>,
}

impl EntityBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds entities of one type; empty lists leave the batch unchanged
    pub fn insert(&mut self, entity_type: &str, entities: Vec<ExtractedEntity>) {
        if entities.is_empty() {
            return;
        }
        if !self.payloads.contains_key(entity_type) {
            self.entities_found.push(entity_type.to_string());
        }
        self.payloads
            .entry(entity_type.to_string())
            .or_default()
            .extend(entities);
    }

    /// Type names that carry at least one entity
    pub fn entities_found(&self) -> &[String] {
        &self.entities_found
    }

    pub fn payloads(&self) -> &BTreeMap<String, Vec<ExtractedEntity>> {
        &self.payloads
    }

    pub fn get(&self, entity_type: &str) -> &[ExtractedEntity] {
        self.payloads
            .get(entity_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn products(&self) -> &[ExtractedEntity] {
        self.get(PRODUCTS)
    }

    pub fn categories(&self) -> &[ExtractedEntity] {
        self.get(CATEGORIES)
    }

    /// Every entity that is not a category, in type order
    pub fn harvestable(&self) -> impl Iterator<Item = (&str, &ExtractedEntity)> {
        self.entities_found
            .iter()
            .filter(|t| t.as_str() != CATEGORIES)
            .flat_map(move |t| self.get(t).iter().map(move |e| (t.as_str(), e)))
    }

    pub fn total(&self) -> usize {
        self.payloads.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entities_found.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("$1,299.99"), Some(1299.99));
        assert_eq!(parse_price("CA $ 14.50 each"), Some(14.5));
        assert_eq!(parse_price("$10."), Some(10.0));
        assert_eq!(parse_price("Sign in for price"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_fingerprint_ignores_name_case() {
        let mut a = ExtractedEntity::named("Kirkland Coffee");
        a.identifier = Some("123".to_string());
        let mut b = ExtractedEntity::named("  kirkland coffee ");
        b.identifier = Some("123".to_string());
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.identifier = Some("124".to_string());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_batch_tracks_found_types_in_order() {
        let mut batch = EntityBatch::new();
        batch.insert(SERVICES, vec![ExtractedEntity::named("Photo Centre")]);
        batch.insert(PRODUCTS, vec![]);
        batch.insert(PRODUCTS, vec![ExtractedEntity::named("TV")]);
        batch.insert(SERVICES, vec![ExtractedEntity::named("Optical")]);

        assert_eq!(batch.entities_found(), &["services", "products"]);
        assert_eq!(batch.get(SERVICES).len(), 2);
        assert_eq!(batch.total(), 3);
        assert!(batch.categories().is_empty());
    }

    #[test]
    fn test_harvestable_skips_categories() {
        let mut batch = EntityBatch::new();
        batch.insert(CATEGORIES, vec![ExtractedEntity::named("Snacks")]);
        batch.insert(PRODUCTS, vec![ExtractedEntity::named("Chips")]);

        let names: Vec<&str> = batch.harvestable().map(|(_, e)| e.name.as_str()).collect();
        assert_eq!(names, vec!["Chips"]);
    }
}
