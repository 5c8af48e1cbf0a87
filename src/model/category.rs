/// Category definitions shared by discovery, classification and persistence
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The kind of page a category link leads to
///
/// Only the `leaf_*` variants hold harvestable entities. A node starts as
/// `Unknown` and is resolved by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryType {
    LeafProduct,
    LeafService,
    LeafLocation,
    NonLeafNavigation,
    NonLeafHub,
    Unknown,
}

impl CategoryType {
    /// True iff this is one of the `leaf_*` variants
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Self::LeafProduct | Self::LeafService | Self::LeafLocation
        )
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::LeafProduct => "leaf_product",
            Self::LeafService => "leaf_service",
            Self::LeafLocation => "leaf_location",
            Self::NonLeafNavigation => "non_leaf_navigation",
            Self::NonLeafHub => "non_leaf_hub",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "leaf_product" => Some(Self::LeafProduct),
            "leaf_service" => Some(Self::LeafService),
            "leaf_location" => Some(Self::LeafLocation),
            "non_leaf_navigation" => Some(Self::NonLeafNavigation),
            "non_leaf_hub" => Some(Self::NonLeafHub),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Parses untrusted input, mapping anything unrecognized to `Unknown`
    pub fn parse_lenient(s: &str) -> Self {
        Self::from_db_string(s.trim().to_lowercase().as_str()).unwrap_or(Self::Unknown)
    }

    /// Guesses a type from a link and its label
    ///
    /// Used for categories found inside pages, before their own page is fetched.
    pub fn infer_from_link(url: &str, name: &str) -> Self {
        if url.is_empty() {
            return Self::Unknown;
        }

        let url_lower = url.to_lowercase();
        let combined = format!("{} {}", url_lower, name.to_lowercase());

        if ["product", "catalog", ".product.", "item"]
            .iter()
            .any(|k| url_lower.contains(k))
        {
            Self::LeafProduct
        } else if SERVICE_KEYWORDS.iter().any(|k| combined.contains(k)) {
            Self::LeafService
        } else if LOCATION_KEYWORDS.iter().any(|k| combined.contains(k)) {
            Self::LeafLocation
        } else if ["category", "department", "browse", "sitemap"]
            .iter()
            .any(|k| url_lower.contains(k))
        {
            Self::NonLeafNavigation
        } else if ["home", "main", "index", "hub"]
            .iter()
            .any(|k| combined.contains(k))
        {
            Self::NonLeafHub
        } else {
            Self::Unknown
        }
    }

    /// Leaf subtype for a page the classifier judged to be a listing
    pub fn leaf_for(page_hint: &str, url: &str, name: &str) -> Self {
        match page_hint {
            "service_page" => Self::LeafService,
            "location_page" => Self::LeafLocation,
            _ => match Self::infer_from_link(url, name) {
                t @ (Self::LeafService | Self::LeafLocation) => t,
                _ => Self::LeafProduct,
            },
        }
    }

    /// Non-leaf subtype for a page the classifier judged to be navigation
    pub fn non_leaf_for(url: &str, name: &str) -> Self {
        match Self::infer_from_link(url, name) {
            Self::NonLeafHub => Self::NonLeafHub,
            _ => Self::NonLeafNavigation,
        }
    }

    pub fn all() -> [Self; 6] {
        [
            Self::LeafProduct,
            Self::LeafService,
            Self::LeafLocation,
            Self::NonLeafNavigation,
            Self::NonLeafHub,
            Self::Unknown,
        ]
    }
}

const SERVICE_KEYWORDS: &[&str] = &[
    "insurance",
    "photo",
    "travel",
    "optical",
    "pharmacy",
    "service",
];

const LOCATION_KEYWORDS: &[&str] = &["warehouse", "location", "store", "address"];

impl fmt::Display for CategoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A category of the catalog, as discovered and later classified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub name: String,

    /// Site-relative link (`/path?query`)
    pub url: String,

    category_type: CategoryType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Name of the parent category; lookup only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_category: Option<String>,

    #[serde(default)]
    pub subcategories: Vec<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CategoryNode {
    /// Creates an unclassified node
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            category_type: CategoryType::Unknown,
            description: None,
            parent_category: None,
            subcategories: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn category_type(&self) -> CategoryType {
        self.category_type
    }

    /// Derived from the category type, never stored on its own
    pub fn is_leaf(&self) -> bool {
        self.category_type.is_leaf()
    }

    pub fn is_classified(&self) -> bool {
        self.category_type != CategoryType::Unknown
    }

    /// Records the classifier's verdict; re-classification overwrites
    pub fn set_category_type(&mut self, category_type: CategoryType) {
        self.category_type = category_type;
    }
}
