//! Selector-based product extraction
//!
//! Container selectors are tried in order and the first one that matches
//! anything wins; their results are never unioned. When none match, any
//! `div`/`article` whose class mentions a product-ish keyword is used.
//! Within a container, each field has ordered candidate selectors and the
//! first non-empty value wins.

use crate::extract::normalize::{collapse_whitespace, normalize_entity};
use crate::extract::{ExtractionError, ExtractionStrategy};
use crate::html::PageTypeHint;
use crate::model::{EntityBatch, ExtractedEntity, PRODUCTS};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Product container selectors, most specific first
pub const PRODUCT_CONTAINER_SELECTORS: &[&str] = &[
    r#"[data-testid^="ProductTile_"]"#,
    ".product-tile",
    ".product-item",
    ".product-card",
    r#"[data-automation-id*="product"]"#,
    ".productTileContainer",
    ".product-grid .product",
    ".products-grid .product",
    ".search-results .product",
    ".product-list-item",
];

const FALLBACK_SELECTOR: &str = "div[class], article[class]";
const FALLBACK_KEYWORDS: &[&str] = &["product", "item", "tile"];

const NAME_SELECTORS: &[&str] = &[
    ".product-title",
    ".product-name",
    r#"[data-testid^="Text_ProductTile_"]"#,
    "h3",
    "h4",
    r#"[data-automation-id*="product-title"]"#,
    ".productTitleDescription a",
];

const PRICE_SELECTORS: &[&str] = &[
    ".price",
    ".product-price",
    ".sale-price",
    r#"[data-automation-id*="price"]"#,
    ".sr-only + span",
];

const BRAND_SELECTORS: &[&str] = &[".brand", ".product-brand", r#"[data-automation-id*="brand"]"#];
const DESCRIPTION_SELECTORS: &[&str] = &[".product-description", ".description", ".features"];
const AVAILABILITY_SELECTORS: &[&str] = &[".availability", ".stock-status", ".out-of-stock"];

const LINK_SELECTOR: &str = "a[href]";
const IMAGE_SELECTOR: &str = "img";
const IDENTIFIER_ATTRS: &[&str] = &["data-product-id", "data-item-id", "data-item-number"];

/// Compiled selectors for the static strategy
pub struct StaticSelectorStrategy {
    base: Url,
    containers: Vec<(&'static str, Selector)>,
    fallback: Vec<Selector>,
    name: Vec<Selector>,
    price: Vec<Selector>,
    brand: Vec<Selector>,
    description: Vec<Selector>,
    availability: Vec<Selector>,
    link: Vec<Selector>,
    image: Vec<Selector>,
}

impl StaticSelectorStrategy {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            containers: PRODUCT_CONTAINER_SELECTORS
                .iter()
                .filter_map(|s| Selector::parse(s).ok().map(|sel| (*s, sel)))
                .collect(),
            fallback: parse_all(&[FALLBACK_SELECTOR]),
            name: parse_all(NAME_SELECTORS),
            price: parse_all(PRICE_SELECTORS),
            brand: parse_all(BRAND_SELECTORS),
            description: parse_all(DESCRIPTION_SELECTORS),
            availability: parse_all(AVAILABILITY_SELECTORS),
            link: parse_all(&[LINK_SELECTOR]),
            image: parse_all(&[IMAGE_SELECTOR]),
        }
    }

    /// Extracts products synchronously; never fails
    pub fn extract_products(&self, html: &str) -> Vec<ExtractedEntity> {
        let document = Html::parse_document(html);
        let containers = self.find_containers(&document);

        let mut seen = HashSet::new();
        containers
            .into_iter()
            .filter_map(|c| self.parse_container(c))
            .filter_map(|e| normalize_entity(e, &self.base))
            .filter(|e| seen.insert(e.fingerprint()))
            .collect()
    }

    fn find_containers<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        for (label, selector) in &self.containers {
            let found: Vec<_> = document.select(selector).collect();
            if !found.is_empty() {
                debug!(selector = label, count = found.len(), "Matched product containers");
                return found;
            }
        }

        let found: Vec<_> = self
            .fallback
            .iter()
            .flat_map(|s| document.select(s))
            .filter(|e| has_product_class(*e))
            .collect();
        debug!(count = found.len(), "Fallback product-like containers");
        found
    }

    fn parse_container(&self, container: ElementRef<'_>) -> Option<ExtractedEntity> {
        let name = first_text(container, &self.name, |_| true)?;

        let url = self
            .link
            .iter()
            .flat_map(|s| container.select(s))
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .find(|h| !h.is_empty())
            .map(str::to_string);

        let image_url = self
            .image
            .iter()
            .flat_map(|s| container.select(s))
            .find_map(|img| {
                img.value()
                    .attr("src")
                    .or_else(|| img.value().attr("data-src"))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            });

        Some(ExtractedEntity {
            name,
            price: first_text(container, &self.price, |t| t.contains('$')),
            url,
            image_url,
            identifier: identifier_of(container),
            description: first_text(container, &self.description, |_| true),
            brand: first_text(container, &self.brand, |_| true),
            availability: first_text(container, &self.availability, |_| true),
            ..ExtractedEntity::default()
        })
    }
}

#[async_trait]
impl ExtractionStrategy for StaticSelectorStrategy {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn extract(&self, html: &str, _hint: PageTypeHint) -> Result<EntityBatch, ExtractionError> {
        let mut batch = EntityBatch::new();
        batch.insert(PRODUCTS, self.extract_products(html));
        Ok(batch)
    }
}

/// First candidate yielding non-empty text that passes `accept`
fn first_text(
    container: ElementRef<'_>,
    candidates: &[Selector],
    accept: impl Fn(&str) -> bool,
) -> Option<String> {
    candidates.iter().find_map(|selector| {
        container
            .select(selector)
            .map(|e| collapse_whitespace(&e.text().collect::<String>()))
            .find(|t| !t.is_empty() && accept(t))
    })
}

fn has_product_class(element: ElementRef<'_>) -> bool {
    element
        .value()
        .attr("class")
        .map(|c| {
            let c = c.to_lowercase();
            FALLBACK_KEYWORDS.iter().any(|k| c.contains(k))
        })
        .unwrap_or(false)
}

fn identifier_of(container: ElementRef<'_>) -> Option<String> {
    let element = container.value();
    IDENTIFIER_ATTRS
        .iter()
        .find_map(|attr| element.attr(attr))
        .or_else(|| {
            element
                .attr("data-testid")
                .and_then(|t| t.strip_prefix("ProductTile_"))
        })
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_all(selectors: &[&str]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> StaticSelectorStrategy {
        StaticSelectorStrategy::new(Url::parse("https://www.costco.ca").unwrap())
    }

    #[test]
    fn test_all_builtin_selectors_compile() {
        let s = strategy();
        assert_eq!(s.containers.len(), PRODUCT_CONTAINER_SELECTORS.len());
        assert_eq!(s.name.len(), NAME_SELECTORS.len());
        assert_eq!(s.price.len(), PRICE_SELECTORS.len());
        assert_eq!(s.fallback.len(), 1);
    }

    #[test]
    fn test_first_matching_container_selector_wins() {
        let html = r#"<body>
            <div data-testid="ProductTile_101"><h3>Coffee</h3><span class="price">$19.99</span>
                <a href="/coffee.product.101.html">view</a><img data-src="/img/c.jpg"></div>
            <div class="product-card"><h3>Should not appear</h3></div>
        </body>"#;

        let products = strategy().extract_products(html);

        assert_eq!(products.len(), 1);
        let coffee = &products[0];
        assert_eq!(coffee.name, "Coffee");
        assert_eq!(coffee.price.as_deref(), Some("$19.99"));
        assert_eq!(coffee.identifier.as_deref(), Some("101"));
        assert_eq!(
            coffee.url.as_deref(),
            Some("https://www.costco.ca/coffee.product.101.html")
        );
        assert_eq!(
            coffee.image_url.as_deref(),
            Some("https://www.costco.ca/img/c.jpg")
        );
    }

    #[test]
    fn test_empty_field_candidates_are_skipped() {
        let html = r#"<div class="product-tile">
            <span class="product-title">   </span><h4>Real Name</h4>
            <span class="price">Member only</span><span class="sale-price">$5.00</span>
        </div>"#;

        let products = strategy().extract_products(html);
        assert_eq!(products[0].name, "Real Name");
        assert_eq!(products[0].price.as_deref(), Some("$5.00"));
    }

    #[test]
    fn test_fallback_to_product_like_classes() {
        let html = r#"<section>
            <article class="ListItem"><h3>Tent</h3></article>
            <div class="banner"><h3>Not a product</h3></div>
        </section>"#;

        let products = strategy().extract_products(html);
        let names: Vec<_> = products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Tent"]);
    }

    #[test]
    fn test_nameless_containers_are_rejected() {
        let html = r#"<div class="product-tile"><span class="price">$1</span></div>
                      <div class="product-tile"><h3>Named</h3></div>"#;
        let products = strategy().extract_products(html);
        assert_eq!(products.len(), 1);
        assert!(products.iter().all(|p| !p.name.trim().is_empty()));
    }

    #[test]
    fn test_navigation_page_yields_nothing() {
        let html = r#"<nav><a href="/a">Appliances</a><a href="/b">Baby</a><a href="/c">Computers</a></nav>"#;
        assert!(strategy().extract_products(html).is_empty());
    }
}
