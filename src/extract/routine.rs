//! Generated extraction routines and the sandbox that runs them
//!
//! A routine is requested from the generative backend as a declarative JSON
//! plan. The plan is compiled into a [`PlanRoutine`] whose only capabilities
//! are parsing the page HTML and building a JSON value; it has no access to
//! the filesystem, the network or the rest of the process.
//!
//! ```json
//! {
//!   "entity_types": [
//!     {
//!       "entity_type": "products",
//!       "container": "div.product-tile",
//!       "fields": {
//!         "name": [{"selector": ".title"}, {"selector": "h3"}],
//!         "url": {"selector": "a", "attr": "href"},
//!         "currency": {"value": "CAD"}
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! Running a routine yields its declared return value,
//! `{"entities_found": [...], "payloads": {type: [entity, ...]}}`, which is
//! validated separately before anything is trusted.

use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Upper bound on entity types one plan may declare
pub const MAX_PLAN_ENTITY_TYPES: usize = 8;

/// Upper bound on fields per entity type
pub const MAX_PLAN_FIELDS: usize = 32;

/// Errors raised while compiling or running a generated routine
#[derive(Debug, Error)]
pub enum RoutineError {
    #[error("Routine could not be compiled: {0}")]
    Compile(String),

    #[error("Routine execution failed: {0}")]
    Execution(String),

    #[error("Routine exceeded its {0:?} time budget")]
    Timeout(Duration),

    #[error("Routine output violates the entity schema: {0}")]
    Schema(String),

    #[error("Routine produced no entities")]
    Empty,
}

/// Limits a routine runs under
#[derive(Debug, Clone, Copy)]
pub struct RoutineLimits {
    pub timeout: Duration,
    pub max_entities_per_type: usize,
}

impl Default for RoutineLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5_000),
            max_entities_per_type: 500,
        }
    }
}

/// Cooperative deadline checked by routines between units of work
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn check(&self) -> Result<(), RoutineError> {
        if Instant::now() >= self.at {
            Err(RoutineError::Timeout(self.budget))
        } else {
            Ok(())
        }
    }
}

/// An opaque, untrusted extraction unit
///
/// Implementations receive only the HTML and return the declared JSON value.
pub trait ExtractionRoutine: Send + Sync {
    fn run(&self, html: &str, deadline: &Deadline) -> Result<Value, RoutineError>;
}

/// Runs a routine on a blocking thread under a wall-clock timeout
///
/// A routine that overruns is abandoned; its thread is left to finish on its
/// own and its result is discarded.
pub async fn execute_sandboxed(
    routine: Arc<dyn ExtractionRoutine>,
    html: String,
    limits: RoutineLimits,
) -> Result<Value, RoutineError> {
    let deadline = Deadline::after(limits.timeout);
    let task = tokio::task::spawn_blocking(move || routine.run(&html, &deadline));

    match tokio::time::timeout(limits.timeout, task).await {
        Err(_) => Err(RoutineError::Timeout(limits.timeout)),
        Ok(Err(join_error)) => Err(RoutineError::Execution(format!(
            "routine aborted: {}",
            join_error
        ))),
        Ok(Ok(result)) => result,
    }
}

// ===== Plan format =====

/// Declarative plan as emitted by the backend
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionPlan {
    pub entity_types: Vec<EntityPlan>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityPlan {
    pub entity_type: String,
    pub container: String,
    pub fields: BTreeMap<String, FieldCandidates>,
}

/// One rule or an ordered list of rules; the first non-empty value wins
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FieldCandidates {
    One(FieldRule),
    Many(Vec<FieldRule>),
}

impl FieldCandidates {
    fn rules(&self) -> &[FieldRule] {
        match self {
            Self::One(rule) => std::slice::from_ref(rule),
            Self::Many(rules) => rules,
        }
    }
}

/// Where a field value comes from
///
/// `value` is a constant. Otherwise the element is `selector` inside the
/// container (or the container itself) and the value is `attr` or its text.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldRule {
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub attr: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

// ===== Compiled routine =====

enum CompiledRule {
    Constant(String),
    Lookup {
        selector: Option<Selector>,
        attr: Option<String>,
    },
}

struct CompiledEntity {
    entity_type: String,
    container: Selector,
    fields: Vec<(String, Vec<CompiledRule>)>,
}

/// A compiled plan; the only routine the harvester will run
pub struct PlanRoutine {
    entities: Vec<CompiledEntity>,
    max_entities_per_type: usize,
}

impl PlanRoutine {
    /// Validates the plan shape and compiles every selector up front
    pub fn compile(plan: ExtractionPlan, max_entities_per_type: usize) -> Result<Self, RoutineError> {
        if plan.entity_types.is_empty() {
            return Err(RoutineError::Compile("plan declares no entity types".into()));
        }
        if plan.entity_types.len() > MAX_PLAN_ENTITY_TYPES {
            return Err(RoutineError::Compile(format!(
                "plan declares {} entity types (max {})",
                plan.entity_types.len(),
                MAX_PLAN_ENTITY_TYPES
            )));
        }

        let mut entities = Vec::with_capacity(plan.entity_types.len());
        for entity in plan.entity_types {
            let entity_type = entity.entity_type.trim().to_lowercase();
            if entity_type.is_empty() {
                return Err(RoutineError::Compile("empty entity_type".into()));
            }
            if !entity.fields.contains_key("name") {
                return Err(RoutineError::Compile(format!(
                    "entity type '{}' has no name field",
                    entity_type
                )));
            }
            if entity.fields.len() > MAX_PLAN_FIELDS {
                return Err(RoutineError::Compile(format!(
                    "entity type '{}' declares too many fields",
                    entity_type
                )));
            }

            let container = compile_selector(&entity.container)?;
            let mut fields = Vec::with_capacity(entity.fields.len());
            for (field, candidates) in entity.fields {
                let rules = candidates
                    .rules()
                    .iter()
                    .map(compile_rule)
                    .collect::<Result<Vec<_>, _>>()?;
                fields.push((field, rules));
            }

            entities.push(CompiledEntity {
                entity_type,
                container,
                fields,
            });
        }

        Ok(Self {
            entities,
            max_entities_per_type,
        })
    }
}

fn compile_selector(source: &str) -> Result<Selector, RoutineError> {
    Selector::parse(source)
        .map_err(|e| RoutineError::Compile(format!("invalid selector '{}': {:?}", source, e)))
}

fn compile_rule(rule: &FieldRule) -> Result<CompiledRule, RoutineError> {
    if let Some(value) = &rule.value {
        return Ok(CompiledRule::Constant(value.clone()));
    }
    let selector = match &rule.selector {
        Some(s) => Some(compile_selector(s)?),
        None => None,
    };
    Ok(CompiledRule::Lookup {
        selector,
        attr: rule.attr.clone(),
    })
}

impl ExtractionRoutine for PlanRoutine {
    fn run(&self, html: &str, deadline: &Deadline) -> Result<Value, RoutineError> {
        let document = Html::parse_document(html);
        deadline.check()?;

        let mut entities_found = Vec::new();
        let mut payloads = Map::new();

        for entity in &self.entities {
            let mut items = Vec::new();
            for container in document
                .select(&entity.container)
                .take(self.max_entities_per_type)
            {
                deadline.check()?;
                let mut record = Map::new();
                for (field, rules) in &entity.fields {
                    if let Some(value) = rules.iter().find_map(|r| apply_rule(r, container)) {
                        record.insert(field.clone(), Value::String(value));
                    }
                }
                items.push(Value::Object(record));
            }

            if !items.is_empty() {
                if !payloads.contains_key(&entity.entity_type) {
                    entities_found.push(Value::String(entity.entity_type.clone()));
                }
                if let Some(Value::Array(existing)) = payloads.get_mut(&entity.entity_type) {
                    existing.extend(items);
                } else {
                    payloads.insert(entity.entity_type.clone(), Value::Array(items));
                }
            }
        }

        Ok(json!({
            "entities_found": entities_found,
            "payloads": payloads,
        }))
    }
}

fn apply_rule(rule: &CompiledRule, container: ElementRef<'_>) -> Option<String> {
    match rule {
        CompiledRule::Constant(value) => Some(value.clone()).filter(|v| !v.trim().is_empty()),
        CompiledRule::Lookup { selector, attr } => {
            let target = match selector {
                Some(sel) => container.select(sel).next()?,
                None => container,
            };
            let raw = match attr {
                Some(name) => target.value().attr(name)?.to_string(),
                None => target.text().collect::<String>(),
            };
            let value = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            (!value.is_empty()).then_some(value)
        }
    }
}
