//! Tile-count heuristics for the leaf/non-leaf decision
//!
//! The thresholds encode an empirical calibration against one catalog site's
//! markup. Pointing the harvester at another site means recalibrating them,
//! which is why they live in [`ClassifierPolicy`] rather than in the code path.

use crate::config::ClassifierConfig;
use crate::model::{ClassificationResult, ConfidenceSource};
use scraper::{Html, Selector};

/// At or above this many product tiles a page is a listing
pub const STRONG_TILE_THRESHOLD: usize = 20;

/// At or above this many product tiles a page is likely a listing
pub const LIKELY_TILE_THRESHOLD: usize = 10;

/// Between this and the likely threshold, tiles alone are not enough
pub const WEAK_TILE_THRESHOLD: usize = 5;

/// Tile sets needed, with pagination, when individual tiles are scarce
pub const TILE_SET_THRESHOLD: usize = 10;

const PRODUCT_TILE_SELECTOR: &str = r#"[data-testid^="ProductTile_"]"#;
const TILE_SET_SELECTOR: &str = ".product-tile-set";
const PAGINATION_SELECTOR: &str = ".pagination, .page-numbers, .pager, .slick-dots";
const MAIN_RESULTS_SELECTOR: &str = "#product-results, .product-list-container, .search-results";

/// Threshold policy for the tile heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierPolicy {
    pub strong_tiles: usize,
    pub likely_tiles: usize,
    pub weak_tiles: usize,
    pub tile_sets: usize,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            strong_tiles: STRONG_TILE_THRESHOLD,
            likely_tiles: LIKELY_TILE_THRESHOLD,
            weak_tiles: WEAK_TILE_THRESHOLD,
            tile_sets: TILE_SET_THRESHOLD,
        }
    }
}

impl From<&ClassifierConfig> for ClassifierPolicy {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            strong_tiles: config.strong_tile_threshold,
            likely_tiles: config.likely_tile_threshold,
            weak_tiles: config.weak_tile_threshold,
            tile_sets: config.tile_set_threshold,
        }
    }
}

/// Structural signals counted on a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileSignals {
    pub product_tiles: usize,
    pub tile_sets: usize,
    pub pagination: usize,
    pub main_results: usize,
}

impl TileSignals {
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);
        Self {
            product_tiles: count(&document, PRODUCT_TILE_SELECTOR),
            tile_sets: count(&document, TILE_SET_SELECTOR),
            pagination: count(&document, PAGINATION_SELECTOR),
            main_results: count(&document, MAIN_RESULTS_SELECTOR),
        }
    }

    pub fn has_pagination(&self) -> bool {
        self.pagination > 0
    }

    pub fn has_main_results(&self) -> bool {
        self.main_results > 0
    }

    /// True when the page shows no product structure at all
    pub fn is_bare(&self) -> bool {
        self.product_tiles == 0 && self.tile_sets == 0
    }
}

fn count(document: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|s| document.select(&s).count())
        .unwrap_or(0)
}

/// What the tile heuristic concluded on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeuristicVerdict {
    Leaf(&'static str),
    NonLeaf(&'static str),
    Inconclusive(&'static str),
}

impl ClassifierPolicy {
    /// Applies the tile bands to counted signals
    ///
    /// A page with no product structure at all is inconclusive rather than
    /// non-leaf: the heuristic has nothing to say about it.
    pub fn judge(&self, signals: &TileSignals) -> HeuristicVerdict {
        let tiles = signals.product_tiles;

        if tiles >= self.strong_tiles {
            HeuristicVerdict::Leaf("many product tiles")
        } else if tiles >= self.likely_tiles {
            HeuristicVerdict::Leaf("moderate product tiles")
        } else if tiles >= self.weak_tiles {
            if signals.has_pagination() || signals.has_main_results() {
                HeuristicVerdict::Leaf("few product tiles with pagination or results container")
            } else {
                HeuristicVerdict::Inconclusive("few product tiles without pagination")
            }
        } else if signals.tile_sets >= self.tile_sets && signals.has_pagination() {
            HeuristicVerdict::Leaf("many tile sets with pagination")
        } else if signals.is_bare() {
            HeuristicVerdict::Inconclusive("no product structure")
        } else {
            HeuristicVerdict::NonLeaf("scattered tiles without listing structure")
        }
    }
}

/// Pure heuristic classification with the policy default applied
///
/// This is the classifier's output whenever no backend is configured or the
/// backend fails.
pub fn classify_heuristic(html: &str, policy: &ClassifierPolicy) -> ClassificationResult {
    let signals = TileSignals::from_html(html);
    tracing::debug!(
        tiles = signals.product_tiles,
        tile_sets = signals.tile_sets,
        pagination = signals.pagination,
        main_results = signals.main_results,
        "Counted tile signals"
    );
    resolve(policy.judge(&signals))
}

/// Turns a heuristic verdict into a result, falling back to the policy default
pub(crate) fn resolve(verdict: HeuristicVerdict) -> ClassificationResult {
    match verdict {
        HeuristicVerdict::Leaf(reason) => {
            ClassificationResult::leaf(ConfidenceSource::Heuristic, reason)
        }
        HeuristicVerdict::NonLeaf(reason) => {
            ClassificationResult::non_leaf(ConfidenceSource::Heuristic, reason)
        }
        HeuristicVerdict::Inconclusive(_) => ClassificationResult::policy_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiles(n: usize) -> String {
        (0..n)
            .map(|i| format!(r#"<div data-testid="ProductTile_{i}">Item {i}</div>"#))
            .collect()
    }

    fn tile_sets(n: usize) -> String {
        (0..n)
            .map(|_| r#"<div class="product-tile-set"></div>"#)
            .collect()
    }

    const PAGINATION: &str = r#"<ul class="pagination"><li>1</li></ul>"#;

    fn page(body: &str) -> String {
        format!("<html><body>{body}</body></html>")
    }

    #[test]
    fn test_thresholds_are_pinned() {
        assert_eq!(STRONG_TILE_THRESHOLD, 20);
        assert_eq!(LIKELY_TILE_THRESHOLD, 10);
        assert_eq!(WEAK_TILE_THRESHOLD, 5);
        assert_eq!(TILE_SET_THRESHOLD, 10);
    }

    #[test]
    fn test_band_edges() {
        let policy = ClassifierPolicy::default();
        let judge = |html: String| policy.judge(&TileSignals::from_html(&html));

        assert!(matches!(judge(page(&tiles(20))), HeuristicVerdict::Leaf(_)));
        assert!(matches!(judge(page(&tiles(19))), HeuristicVerdict::Leaf(_)));
        assert!(matches!(judge(page(&tiles(10))), HeuristicVerdict::Leaf(_)));
        assert!(matches!(
            judge(page(&tiles(9))),
            HeuristicVerdict::Inconclusive(_)
        ));
        assert!(matches!(
            judge(page(&format!("{}{}", tiles(5), PAGINATION))),
            HeuristicVerdict::Leaf(_)
        ));
        assert!(matches!(
            judge(page(&format!(
                r#"{}<div id="product-results"></div>"#,
                tiles(5)
            ))),
            HeuristicVerdict::Leaf(_)
        ));
        assert!(matches!(judge(page(&tiles(4))), HeuristicVerdict::NonLeaf(_)));
    }

    #[test]
    fn test_tile_sets_need_pagination() {
        let policy = ClassifierPolicy::default();

        let with = TileSignals::from_html(&page(&format!("{}{}", tile_sets(10), PAGINATION)));
        assert!(matches!(policy.judge(&with), HeuristicVerdict::Leaf(_)));

        let without = TileSignals::from_html(&page(&tile_sets(12)));
        assert!(matches!(policy.judge(&without), HeuristicVerdict::NonLeaf(_)));

        let too_few = TileSignals::from_html(&page(&format!("{}{}", tile_sets(9), PAGINATION)));
        assert!(matches!(policy.judge(&too_few), HeuristicVerdict::NonLeaf(_)));
    }

    #[test]
    fn test_bare_page_uses_policy_default() {
        let html = page(r#"<a href="/a">A</a><a href="/b">B</a><a href="/c">C</a>"#);
        let result = classify_heuristic(&html, &ClassifierPolicy::default());

        assert!(!result.is_leaf);
        assert_eq!(result.confidence_source, ConfidenceSource::ForcedDefault);
    }

    #[test]
    fn test_custom_policy_moves_bands() {
        let policy = ClassifierPolicy {
            strong_tiles: 40,
            likely_tiles: 30,
            weak_tiles: 25,
            tile_sets: 10,
        };
        let result = classify_heuristic(&page(&tiles(20)), &policy);
        assert!(!result.is_leaf);
        assert_eq!(result.confidence_source, ConfidenceSource::Heuristic);
    }

    #[test]
    fn test_garbage_input_does_not_panic() {
        for html in ["", "<<<>>>", "<div", "\u{0}\u{1}", "<html><body></html></body>"] {
            let result = classify_heuristic(html, &ClassifierPolicy::default());
            assert!(!result.is_leaf);
        }
    }
}
