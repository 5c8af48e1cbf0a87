//! Entity extraction from leaf pages
//!
//! Two strategies implement [`ExtractionStrategy`]:
//! - [`StaticSelectorStrategy`]: ordered selector heuristics, always available
//! - [`GeneratedRoutineStrategy`]: a backend-written routine run in a sandbox
//!
//! [`ExtractionEngine`] leads with the generated strategy when it is enabled
//! and falls back to the static one on the same HTML for any failure. The
//! engine itself never fails; the worst outcome is an empty batch.

mod generated;
mod normalize;
pub mod routine;
mod static_strategy;
mod validate;

pub use generated::{GeneratedRoutineStrategy, StructureAnalysis};
pub use normalize::{collapse_whitespace, normalize_entity};
pub use routine::{
    execute_sandboxed, Deadline, ExtractionPlan, ExtractionRoutine, PlanRoutine, RoutineError,
    RoutineLimits,
};
pub use static_strategy::{StaticSelectorStrategy, PRODUCT_CONTAINER_SELECTORS};
pub use validate::validate_routine_output;

use crate::backend::{BackendError, GenerativeBackend};
use crate::config::{ExtractionConfig, StrategyChoice};
use crate::html::PageTypeHint;
use crate::model::{EntityBatch, ExtractedEntity};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Reasons a strategy gives up on a page
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Backend unavailable: {0}")]
    Backend(#[from] BackendError),

    #[error("Structure analysis says this is not a product listing")]
    NegativeAnalysis,

    #[error(transparent)]
    Routine(#[from] RoutineError),
}

/// A way of turning page HTML into entities
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Short label recorded with the output
    fn name(&self) -> &'static str;

    async fn extract(&self, html: &str, hint: PageTypeHint) -> Result<EntityBatch, ExtractionError>;
}

/// Engine knobs, derived from `[extraction]`
#[derive(Debug, Clone, Copy)]
pub struct ExtractionSettings {
    pub prefer_generated: bool,
    pub max_html_chars: usize,
    pub limits: RoutineLimits,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self::from(&ExtractionConfig::default())
    }
}

impl From<&ExtractionConfig> for ExtractionSettings {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            prefer_generated: config.strategy == StrategyChoice::Generated,
            max_html_chars: config.max_html_chars,
            limits: RoutineLimits {
                timeout: Duration::from_millis(config.routine_timeout_ms),
                max_entities_per_type: config.max_routine_entities,
            },
        }
    }
}

/// Result of running the engine on one page
#[derive(Debug, Clone)]
pub struct ExtractionOutput {
    pub batch: EntityBatch,
    /// Label of the strategy whose batch was kept
    pub strategy: &'static str,
    /// Why the generated strategy was abandoned, if it was tried
    pub fallback_reason: Option<String>,
}

impl ExtractionOutput {
    pub fn entities_found(&self) -> &[String] {
        self.batch.entities_found()
    }

    pub fn payloads(&self) -> &BTreeMap<String, Vec<ExtractedEntity>> {
        self.batch.payloads()
    }

    pub fn used_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// Strategy selection with static fallback
pub struct ExtractionEngine {
    primary: Option<Box<dyn ExtractionStrategy>>,
    fallback: Box<dyn ExtractionStrategy>,
}

impl ExtractionEngine {
    /// Builds the engine; the generated strategy is only enabled when the
    /// settings prefer it and a backend is present
    pub fn new(
        base: Url,
        settings: ExtractionSettings,
        backend: Option<Arc<dyn GenerativeBackend>>,
    ) -> Self {
        let primary = match backend {
            Some(backend) if settings.prefer_generated => {
                Some(Box::new(GeneratedRoutineStrategy::new(
                    backend,
                    base.clone(),
                    settings.max_html_chars,
                    settings.limits,
                )) as Box<dyn ExtractionStrategy>)
            }
            _ => None,
        };

        Self {
            primary,
            fallback: Box::new(StaticSelectorStrategy::new(base)),
        }
    }

    /// Engine with an explicit primary strategy in front of the static one
    pub fn with_primary(base: Url, primary: Box<dyn ExtractionStrategy>) -> Self {
        Self {
            primary: Some(primary),
            fallback: Box::new(StaticSelectorStrategy::new(base)),
        }
    }

    /// Label of the strategy tried first
    pub fn leading_strategy(&self) -> &'static str {
        self.primary
            .as_ref()
            .map(|p| p.name())
            .unwrap_or_else(|| self.fallback.name())
    }

    pub async fn extract(&self, html: &str, hint: PageTypeHint) -> ExtractionOutput {
        let mut fallback_reason = None;

        if let Some(primary) = &self.primary {
            match primary.extract(html, hint).await {
                Ok(batch) => {
                    return ExtractionOutput {
                        batch,
                        strategy: primary.name(),
                        fallback_reason: None,
                    }
                }
                Err(e) => {
                    warn!(strategy = primary.name(), error = %e, "Falling back to static extraction");
                    fallback_reason = Some(e.to_string());
                }
            }
        }

        let batch = match self.fallback.extract(html, hint).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Static extraction failed");
                EntityBatch::new()
            }
        };
        debug!(entities = batch.total(), "Static extraction finished");

        ExtractionOutput {
            batch,
            strategy: self.fallback.name(),
            fallback_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendResult;

    struct Down;

    #[async_trait]
    impl GenerativeBackend for Down {
        async fn generate(&self, _prompt: &str) -> BackendResult<String> {
            Err(BackendError::EmptyResponse)
        }
    }

    struct Failing;

    #[async_trait]
    impl ExtractionStrategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn extract(&self, _html: &str, _hint: PageTypeHint) -> Result<EntityBatch, ExtractionError> {
            Err(RoutineError::Timeout(Duration::from_millis(5)).into())
        }
    }

    const LISTING: &str = r#"<main>
        <div class="product-tile"><h3>Sofa</h3><span class="price">$899.99</span></div>
        <div class="product-tile"><h3>Chair</h3><span class="price">$129.99</span></div>
    </main>"#;

    fn base() -> Url {
        Url::parse("https://www.costco.ca").unwrap()
    }

    #[test]
    fn test_generated_needs_both_preference_and_backend() {
        let mut settings = ExtractionSettings::default();
        assert_eq!(ExtractionEngine::new(base(), settings, Some(Arc::new(Down))).leading_strategy(), "static");

        settings.prefer_generated = true;
        assert_eq!(ExtractionEngine::new(base(), settings, None).leading_strategy(), "static");
        assert_eq!(
            ExtractionEngine::new(base(), settings, Some(Arc::new(Down))).leading_strategy(),
            "generated"
        );
    }

    #[tokio::test]
    async fn test_failing_backend_matches_static_output() {
        let settings = ExtractionSettings {
            prefer_generated: true,
            ..ExtractionSettings::default()
        };
        let with_backend = ExtractionEngine::new(base(), settings, Some(Arc::new(Down)));
        let static_only = ExtractionEngine::new(base(), ExtractionSettings::default(), None);

        let a = with_backend.extract(LISTING, PageTypeHint::ProductListing).await;
        let b = static_only.extract(LISTING, PageTypeHint::ProductListing).await;

        assert_eq!(a.batch, b.batch);
        assert_eq!(a.strategy, "static");
        assert!(a.used_fallback());
        assert!(!b.used_fallback());
    }

    #[tokio::test]
    async fn test_timed_out_routine_falls_back() {
        let engine = ExtractionEngine::with_primary(base(), Box::new(Failing));
        let output = engine.extract(LISTING, PageTypeHint::Unknown).await;
        assert_eq!(output.payloads()["products"].len(), 2);
        assert!(output.fallback_reason.unwrap().contains("time budget"));
    }

    #[tokio::test]
    async fn test_nothing_to_extract_is_empty_not_error() {
        let engine = ExtractionEngine::with_primary(base(), Box::new(Failing));
        let output = engine.extract("<p>hello</p>", PageTypeHint::Unknown).await;
        assert!(output.batch.is_empty());
        assert!(output.entities_found().is_empty());
    }
}
