//! Leaf/non-leaf page classification
//!
//! Layers, each consulted only when the previous one is inconclusive:
//! 1. tile-count heuristic ([`ClassifierPolicy::judge`])
//! 2. forced binary question to a generative backend, when one is configured
//! 3. policy default: non-leaf
//!
//! Classification never fails; every result is tagged with the layer that
//! produced it.

mod heuristics;

pub use heuristics::{
    classify_heuristic, ClassifierPolicy, HeuristicVerdict, TileSignals, LIKELY_TILE_THRESHOLD,
    STRONG_TILE_THRESHOLD, TILE_SET_THRESHOLD, WEAK_TILE_THRESHOLD,
};

use crate::backend::parse::{parse_page_label, PageLabel};
use crate::backend::GenerativeBackend;
use crate::html::{denoise, truncate_chars};
use crate::model::{ClassificationResult, ConfidenceSource};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default size of the page sample shown to the backend
pub const AI_SAMPLE_CHARS: usize = 10_000;

/// Layered page classifier
#[derive(Clone)]
pub struct Classifier {
    policy: ClassifierPolicy,
    backend: Option<Arc<dyn GenerativeBackend>>,
    sample_chars: usize,
}

impl Classifier {
    /// Heuristic-only classifier
    pub fn new(policy: ClassifierPolicy) -> Self {
        Self {
            policy,
            backend: None,
            sample_chars: AI_SAMPLE_CHARS,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn GenerativeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_sample_chars(mut self, sample_chars: usize) -> Self {
        self.sample_chars = sample_chars;
        self
    }

    pub fn policy(&self) -> &ClassifierPolicy {
        &self.policy
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Classifies one page
    pub async fn classify(&self, html: &str) -> ClassificationResult {
        let verdict = self.policy.judge(&TileSignals::from_html(html));
        debug!(?verdict, "Heuristic verdict");

        let reason = match verdict {
            HeuristicVerdict::Inconclusive(reason) => reason,
            decided => return heuristics::resolve(decided),
        };

        let Some(backend) = &self.backend else {
            return ClassificationResult::policy_default();
        };

        match self.ask_backend(backend.as_ref(), html).await {
            Some(PageLabel::ProductListing) => {
                ClassificationResult::leaf(ConfidenceSource::Ai, "backend: PRODUCT_LISTING")
            }
            Some(PageLabel::Navigation) => {
                ClassificationResult::non_leaf(ConfidenceSource::Ai, "backend: NAVIGATION")
            }
            None => {
                debug!(reason, "Backend gave no usable label, applying policy default");
                ClassificationResult::policy_default()
            }
        }
    }

    async fn ask_backend(&self, backend: &dyn GenerativeBackend, html: &str) -> Option<PageLabel> {
        let cleaned = denoise(html);
        let sample = truncate_chars(&cleaned, self.sample_chars);
        let prompt = leaf_prompt(sample);

        match backend.generate(&prompt).await {
            Ok(text) => {
                let label = parse_page_label(&text);
                if label.is_none() {
                    warn!(
                        backend = backend.name(),
                        response = truncate_chars(text.trim(), 80),
                        "Unrecognized page label"
                    );
                }
                label
            }
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "Leaf detection request failed");
                None
            }
        }
    }
}

fn leaf_prompt(sample: &str) -> String {
    format!(
        "Analyze this HTML page and decide whether it is a PRODUCT LISTING page or a NAVIGATION page.\n\
         A PRODUCT LISTING page shows actual products with names, prices and purchase options.\n\
         A NAVIGATION page links to categories or subcategories but shows no actual products.\n\n\
         Respond with exactly one token: PRODUCT_LISTING or NAVIGATION\n\n\
         HTML to analyze:\n{sample}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedBackend {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedBackend {
        fn new(reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerativeBackend for FixedBackend {
        async fn generate(&self, prompt: &str) -> BackendResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(prompt.contains("PRODUCT_LISTING or NAVIGATION"));
            self.reply
                .map(str::to_string)
                .ok_or(BackendError::EmptyResponse)
        }
    }

    fn tiles(n: usize) -> String {
        let body: String = (0..n)
            .map(|i| format!(r#"<div data-testid="ProductTile_{i}"><h3>P{i}</h3></div>"#))
            .collect();
        format!("<html><body>{body}</body></html>")
    }

    #[tokio::test]
    async fn test_backend_not_consulted_when_heuristic_decides() {
        let backend = FixedBackend::new(Some("NAVIGATION"));
        let classifier = Classifier::new(ClassifierPolicy::default()).with_backend(backend.clone());

        let result = classifier.classify(&tiles(25)).await;

        assert!(result.is_leaf);
        assert_eq!(result.confidence_source, ConfidenceSource::Heuristic);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backend_resolves_inconclusive_page() {
        let backend = FixedBackend::new(Some("PRODUCT_LISTING"));
        let classifier = Classifier::new(ClassifierPolicy::default()).with_backend(backend.clone());

        let result = classifier.classify(&tiles(7)).await;

        assert!(result.is_leaf);
        assert_eq!(result.confidence_source, ConfidenceSource::Ai);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_backend_matches_pure_heuristic() {
        let policy = ClassifierPolicy::default();
        for reply in [None, Some("maybe?"), Some("PRODUCT_LISTING and NAVIGATION")] {
            let classifier = Classifier::new(policy).with_backend(FixedBackend::new(reply));
            for html in [tiles(7), tiles(0), tiles(30), String::new()] {
                assert_eq!(
                    classifier.classify(&html).await,
                    classify_heuristic(&html, &policy)
                );
            }
        }
    }

    #[tokio::test]
    async fn test_no_backend_matches_pure_heuristic() {
        let policy = ClassifierPolicy::default();
        let classifier = Classifier::new(policy);
        for html in [tiles(7), tiles(3), tiles(12)] {
            assert_eq!(
                classifier.classify(&html).await,
                classify_heuristic(&html, &policy)
            );
        }
    }

    #[tokio::test]
    async fn test_deeply_nested_page_reaches_backend() {
        let html = format!(
            "<html><body>{}<a href=\"/a\">A</a>{}</body></html>",
            "<div>".repeat(20_000),
            "</div>".repeat(20_000)
        );
        let backend = FixedBackend::new(Some("NAVIGATION"));
        let classifier = Classifier::new(ClassifierPolicy::default()).with_backend(backend.clone());

        let result = classifier.classify(&html).await;

        assert!(!result.is_leaf);
        assert_eq!(result.confidence_source, ConfidenceSource::Ai);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prompt_carries_sample() {
        let prompt = leaf_prompt("<main>x</main>");
        assert!(prompt.ends_with("<main>x</main>\n"));
        assert!(prompt.contains("PRODUCT_LISTING or NAVIGATION"));
    }
}
