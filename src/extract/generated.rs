//! Extraction through a backend-generated routine
//!
//! Steps, any of which can fail and hand the page back to the static strategy:
//! 1. denoise and cap the HTML
//! 2. ask for a JSON structure analysis; unparseable means "not a listing"
//! 3. ask for an extraction plan emitting the standard entity shapes
//! 4. compile the plan and run it in the sandbox under a timeout
//! 5. validate the declared return value

use crate::backend::parse::parse_json;
use crate::backend::GenerativeBackend;
use crate::extract::routine::{
    execute_sandboxed, ExtractionPlan, ExtractionRoutine, PlanRoutine, RoutineError, RoutineLimits,
};
use crate::extract::validate::validate_routine_output;
use crate::extract::{ExtractionError, ExtractionStrategy};
use crate::html::{denoise_and_truncate, truncate_chars, PageTypeHint};
use crate::model::EntityBatch;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// HTML shown to the backend when requesting the plan
const PLAN_PROMPT_HTML_CHARS: usize = 20_000;

/// The backend's answer to the structure-analysis prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureAnalysis {
    pub is_product_page: bool,
    #[serde(default)]
    pub product_container_patterns: Vec<String>,
    #[serde(default)]
    pub available_data_fields: Vec<String>,
    #[serde(default)]
    pub structure_notes: Option<String>,
}

/// Strategy that asks the backend to write the extraction routine
pub struct GeneratedRoutineStrategy {
    backend: Arc<dyn GenerativeBackend>,
    base: Url,
    max_html_chars: usize,
    limits: RoutineLimits,
}

impl GeneratedRoutineStrategy {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        base: Url,
        max_html_chars: usize,
        limits: RoutineLimits,
    ) -> Self {
        Self {
            backend,
            base,
            max_html_chars,
            limits,
        }
    }

    /// Step 2: strict analysis; any parse failure is a negative answer
    pub async fn analyze(&self, cleaned: &str) -> StructureAnalysis {
        let prompt = analysis_prompt(cleaned);
        let text = match self.backend.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                debug!(error = %e, "Structure analysis request failed");
                return StructureAnalysis::default();
            }
        };

        match parse_json::<StructureAnalysis>(&text) {
            Ok(analysis) => analysis,
            Err(e) => {
                debug!(error = %e, "Structure analysis was not valid JSON");
                StructureAnalysis::default()
            }
        }
    }

    /// Step 3: request and compile the routine
    pub async fn generate_routine(
        &self,
        cleaned: &str,
        analysis: &StructureAnalysis,
        hint: PageTypeHint,
    ) -> Result<PlanRoutine, ExtractionError> {
        let prompt = routine_prompt(cleaned, analysis, hint);
        let text = self.backend.generate(&prompt).await?;
        let plan: ExtractionPlan = parse_json(&text)
            .map_err(|e| RoutineError::Compile(format!("plan is not valid JSON: {}", e)))?;
        Ok(PlanRoutine::compile(plan, self.limits.max_entities_per_type)?)
    }

    /// Steps 4 and 5 for an already generated routine
    pub async fn run_routine(
        &self,
        routine: Arc<dyn ExtractionRoutine>,
        html: &str,
    ) -> Result<EntityBatch, ExtractionError> {
        let value = execute_sandboxed(routine, html.to_string(), self.limits).await?;
        let batch = validate_routine_output(&value, &self.base, self.limits.max_entities_per_type)?;
        if batch.is_empty() {
            return Err(RoutineError::Empty.into());
        }
        Ok(batch)
    }
}

#[async_trait]
impl ExtractionStrategy for GeneratedRoutineStrategy {
    fn name(&self) -> &'static str {
        "generated"
    }

    async fn extract(&self, html: &str, hint: PageTypeHint) -> Result<EntityBatch, ExtractionError> {
        let cleaned = denoise_and_truncate(html, self.max_html_chars);

        let analysis = self.analyze(&cleaned).await;
        if !analysis.is_product_page {
            return Err(ExtractionError::NegativeAnalysis);
        }

        let routine = self.generate_routine(&cleaned, &analysis, hint).await?;
        let batch = self.run_routine(Arc::new(routine), html).await?;

        info!(
            types = ?batch.entities_found(),
            entities = batch.total(),
            "Generated routine succeeded"
        );
        Ok(batch)
    }
}

fn analysis_prompt(cleaned: &str) -> String {
    format!(
        r#"You are an expert HTML structure analyzer. Analyze this HTML page and identify:
1. Is this a product listing page?
2. Which CSS selectors match the product containers?
3. Which product fields are available (name, price, image, url...)?

Respond with JSON only, exactly in this shape:
{{"is_product_page": true, "product_container_patterns": ["selector"], "available_data_fields": ["name", "price"], "structure_notes": "how products are organized"}}

HTML to analyze:
{cleaned}
"#
    )
}

fn routine_prompt(cleaned: &str, analysis: &StructureAnalysis, hint: PageTypeHint) -> String {
    let analysis_json = serde_json::to_string_pretty(analysis).unwrap_or_default();
    let html = truncate_chars(cleaned, PLAN_PROMPT_HTML_CHARS);
    format!(
        r#"You write extraction plans for a retail catalog scraper. A plan is JSON that names CSS
selectors; it is executed by a restricted interpreter, so do not write code.

PAGE TYPE: {hint}

Structure analysis:
{analysis_json}

Plan format:
{{"entity_types": [{{
  "entity_type": "products",
  "container": "CSS selector matching one element per entity",
  "fields": {{
    "name": [{{"selector": "CSS selector inside the container"}}],
    "url": {{"selector": "a", "attr": "href"}},
    "identifier": {{"attr": "data-product-id"}},
    "currency": {{"value": "CAD"}}
  }}
}}]}}

Rules:
- entity_type is one of: products, categories, services (lowercase)
- every entity type must define a "name" field
- a field is one rule or an ordered list of rules; the first non-empty value wins
- a rule has "selector" (optional, defaults to the container), "attr" (optional, defaults to text) or a constant "value"
- product fields: name, price, url, image_url, identifier, description, brand, availability
- category fields: name, url, category_type (leaf_product|leaf_service|leaf_location|non_leaf_navigation|non_leaf_hub|unknown), description
- only include entity types actually present on the page

Return ONLY the JSON plan.

HTML:
{html}
"#
    )
}
