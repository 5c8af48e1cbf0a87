//! Sitemap page parser
//!
//! Builds the category hierarchy from the site's sitemap page.
//!
//! # Link Rules
//!
//! **Sections:** `div`/`section` elements whose class mentions `category`,
//! `department`, `section` or `nav`; when there are none, every `ul`/`ol`.
//!
//! **Skipped links:**
//! - hrefs containing `javascript:`, `mailto:`, `#`, `help`, `contact`,
//!   `about`, `privacy`, `terms`, `sitemap` or `search`
//! - names shorter than 3 characters
//! - links to other sites
//! - repeated hrefs (the first occurrence wins)
//!
//! **Nesting:** a link's parent is the first already-recorded link inside its
//! nearest enclosing `li`/`div` (searching outward, within the section).

use crate::extract::collapse_whitespace;
use crate::html::to_site_relative;
use crate::model::CategoryNode;
use crate::sitemap::CategoryArena;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use url::Url;

const SECTION_KEYWORDS: &[&str] = &["category", "department", "section", "nav"];

const SKIP_PATTERNS: &[&str] = &[
    "javascript:",
    "mailto:",
    "#",
    "help",
    "contact",
    "about",
    "privacy",
    "terms",
    "sitemap",
    "search",
];

const MIN_NAME_CHARS: usize = 3;

/// Parses a sitemap page into a category arena
///
/// All nodes start as `unknown`. An empty arena means nothing usable was found.
pub fn parse_sitemap(html: &str, base: &Url) -> CategoryArena {
    let document = Html::parse_document(html);
    let (Ok(primary), Ok(fallback), Ok(links)) = (
        Selector::parse("div[class], section[class]"),
        Selector::parse("ul, ol"),
        Selector::parse("a[href]"),
    ) else {
        return CategoryArena::new();
    };

    let mut sections: Vec<ElementRef<'_>> = document
        .select(&primary)
        .filter(|e| is_category_section(*e))
        .collect();
    if sections.is_empty() {
        sections = document.select(&fallback).collect();
    }
    debug!(sections = sections.len(), "Sitemap sections");

    let mut arena = CategoryArena::new();
    let mut seen_hrefs = HashSet::new();
    let mut recorded = HashMap::new();

    for section in sections {
        for link in section.select(&links) {
            if recorded.contains_key(&link.id()) {
                continue;
            }
            let Some((name, url)) = accept_link(link, base) else {
                continue;
            };
            if !seen_hrefs.insert(url.clone()) {
                continue;
            }

            let parent = link
                .ancestors()
                .filter_map(ElementRef::wrap)
                .take_while(|e| e.id() != section.id())
                .filter(|e| matches!(e.value().name(), "li" | "div"))
                .find_map(|container| {
                    container
                        .select(&links)
                        .find_map(|a| recorded.get(&a.id()).copied())
                });

            let node = CategoryNode::new(name, url);
            let id = match parent {
                Some(parent) => arena.add_child(parent, node),
                None => arena.add_root(node),
            };
            recorded.insert(link.id(), id);
        }
    }

    debug!(categories = arena.len(), roots = arena.roots().len(), "Parsed sitemap");
    arena
}

fn is_category_section(element: ElementRef<'_>) -> bool {
    element
        .value()
        .attr("class")
        .map(|c| {
            let c = c.to_lowercase();
            SECTION_KEYWORDS.iter().any(|k| c.contains(k))
        })
        .unwrap_or(false)
}

/// Name and site-relative URL of a usable category link
fn accept_link(link: ElementRef<'_>, base: &Url) -> Option<(String, String)> {
    let href = link.value().attr("href")?.trim();
    let lower = href.to_lowercase();
    if href.is_empty() || SKIP_PATTERNS.iter().any(|p| lower.contains(p)) {
        return None;
    }

    let name = collapse_whitespace(&link.text().collect::<String>());
    if name.chars().count() < MIN_NAME_CHARS {
        return None;
    }

    let url = to_site_relative(href, base).ok()?;
    Some((name, url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sitemap::NodeId;

    fn base() -> Url {
        Url::parse("https://www.costco.ca").unwrap()
    }

    fn names(arena: &CategoryArena, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| arena.get(*id).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn test_nested_lists_become_a_tree() {
        let html = r#"<div class="sitemap-category-list">
            <ul>
              <li><a href="/electronics.html">Electronics</a>
                <ul>
                  <li><a href="/tvs.html">Televisions</a>
                    <ul><li><a href="/oled-tvs.html">OLED TVs</a></li></ul>
                  </li>
                  <li><a href="/audio.html">Audio</a></li>
                </ul>
              </li>
              <li><a href="https://www.costco.ca/grocery.html?lang=en">Grocery</a></li>
            </ul>
        </div>"#;

        let arena = parse_sitemap(html, &base());
        let roots = arena.roots().to_vec();
        assert_eq!(names(&arena, &roots), vec!["Electronics", "Grocery"]);

        let electronics = roots[0];
        assert_eq!(
            names(&arena, arena.children(electronics)),
            vec!["Televisions", "Audio"]
        );
        let tvs = arena.children(electronics)[0];
        assert_eq!(names(&arena, arena.children(tvs)), vec!["OLED TVs"]);

        assert_eq!(arena.get(roots[1]).unwrap().url, "/grocery.html?lang=en");
    }

    #[test]
    fn test_flat_groups_use_first_link_as_parent() {
        let html = r#"<section class="department-list">
            <div class="group"><a href="/appliances.html">Appliances</a>
                <a href="/fridges.html">Refrigerators</a><a href="/washers.html">Washers</a></div>
            <div class="group"><a href="/baby.html">Baby</a></div>
        </section>"#;

        let arena = parse_sitemap(html, &base());
        let roots = arena.roots().to_vec();
        assert_eq!(names(&arena, &roots), vec!["Appliances", "Baby"]);
        assert_eq!(
            names(&arena, arena.children(roots[0])),
            vec!["Refrigerators", "Washers"]
        );
    }

    #[test]
    fn test_links_directly_in_section_are_roots() {
        let html = r#"<div class="top-nav"><a href="/a.html">Auto</a><a href="/b.html">Beauty</a></div>
            <div class="category-links"><a href="/c.html">Computers</a><a href="/d.html">Deli</a></div>"#;
        let arena = parse_sitemap(html, &base());
        assert_eq!(arena.roots().len(), 4);
        assert!(arena.roots().iter().all(|r| arena.children(*r).is_empty()));
    }

    #[test]
    fn test_skip_rules() {
        let html = r#"<div class="categories"><ul>
            <li><a href="/tires.html">Tires</a></li>
            <li><a href="javascript:void(0)">Menu</a></li>
            <li><a href="mailto:help@costco.ca">Email us</a></li>
            <li><a href="/page.html#top">Anchored</a></li>
            <li><a href="/customer-service-help.html">Help Centre</a></li>
            <li><a href="/about-us.html">Our Company</a></li>
            <li><a href="/SiteMapDisplayView">All Departments</a></li>
            <li><a href="/CatalogSearch?q=tv">Search TVs</a></li>
            <li><a href="/tv.html">TV</a></li>
            <li><a href="https://www.example.com/deals.html">Partner Deals</a></li>
            <li><a href="/tires.html">Tires again</a></li>
        </ul></div>"#;

        let arena = parse_sitemap(html, &base());
        let all: Vec<_> = arena.iter().map(|(_, n)| n.name.clone()).collect();
        assert_eq!(all, vec!["Tires"]);
    }

    #[test]
    fn test_fallback_to_plain_lists() {
        let html = r#"<body><ul><li><a href="/garden.html">Garden</a></li></ul>
            <ol><li><a href="/pets.html">Pets</a></li></ol></body>"#;
        let arena = parse_sitemap(html, &base());
        assert_eq!(arena.len(), 2);
        assert!(arena.iter().all(|(_, n)| !n.is_classified()));
    }

    #[test]
    fn test_empty_page_yields_empty_arena() {
        assert!(parse_sitemap("<html><body><p>Maintenance</p></body></html>", &base()).is_empty());
    }
}
