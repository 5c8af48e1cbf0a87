//! Harvest orchestrator - the category walk
//!
//! This module contains the session loop that ties every component together:
//! - Creating the session record and publishing events
//! - Discovering the category arena (cached or fetched)
//! - Visiting nodes depth-first with a politeness delay
//! - Classifying, extracting and persisting one node at a time
//! - Closing the session with its summary

use crate::backend::{GenerativeBackend, HttpGenerativeBackend};
use crate::classifier::{Classifier, ClassifierPolicy};
use crate::config::Config;
use crate::extract::{ExtractionEngine, ExtractionSettings};
use crate::fetch::{FetchOptions, HttpFetcher, PageFetcher};
use crate::harvest::{HarvestEvent, NodeStage, RunSummary};
use crate::html::{to_site_relative, PageTypeHint};
use crate::model::{CategoryNode, CategoryType, ExtractedEntity, SessionStatus};
use crate::sitemap::{fetch_arena, load_cached_arena, store_arena, CategoryArena, NodeId};
use crate::storage::{NewCategory, NodeUpdate, Storage, StorageError, StorageResult};
use crate::HarvestError;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Instrument};
use url::Url;

/// Buffered events per subscriber before it starts lagging
pub const EVENT_CAPACITY: usize = 256;

/// Consecutive persistence failures after which the session is abandoned
pub const SYSTEMIC_STORAGE_FAILURES: usize = 3;

/// Per-run choices, usually taken from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestOptions {
    /// Cap on visited nodes
    pub limit: Option<usize>,
    /// Restrict the walk to subtrees rooted at these category names
    pub categories: Vec<String>,
    /// Ignore the discovery cache
    pub refresh_sitemap: bool,
}

/// What happened to one node
enum NodeOutcome {
    Saved {
        category_type: CategoryType,
        entities: usize,
    },
    FetchFailed,
    PersistFailed(StorageError),
}

/// Main harvest orchestrator
pub struct Orchestrator<S: Storage + Send> {
    base: Url,
    sitemap_url: String,
    fetcher: Arc<dyn PageFetcher>,
    classifier: Classifier,
    engine: ExtractionEngine,
    storage: Arc<Mutex<S>>,
    fetch_options: FetchOptions,
    request_delay: Duration,
    cache_max_age: chrono::Duration,
    config_hash: Option<String>,
    events: broadcast::Sender<HarvestEvent>,
}

impl<S: Storage + Send> Orchestrator<S> {
    pub fn new(
        base: Url,
        sitemap_url: impl Into<String>,
        fetcher: Arc<dyn PageFetcher>,
        classifier: Classifier,
        engine: ExtractionEngine,
        storage: S,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            base,
            sitemap_url: sitemap_url.into(),
            fetcher,
            classifier,
            engine,
            storage: Arc::new(Mutex::new(storage)),
            fetch_options: FetchOptions::default(),
            request_delay: Duration::ZERO,
            cache_max_age: chrono::Duration::hours(24),
            config_hash: None,
            events,
        }
    }

    /// Wires the HTTP fetcher, classifier, extraction engine and (when
    /// `ai_enabled` and a `[generator]` is configured) the generative backend
    ///
    /// A backend that cannot be built is logged and left out; the harvest
    /// then runs on heuristics and static extraction.
    pub fn from_config(config: &Config, storage: S, ai_enabled: bool) -> Result<Self, HarvestError> {
        let base = Url::parse(&config.site.base_url)?;
        let fetcher = HttpFetcher::from_config(
            &config.user_agent,
            Duration::from_secs(config.scraper.fetch_timeout_secs),
        )?;

        let backend: Option<Arc<dyn GenerativeBackend>> = match &config.generator {
            Some(generator) if ai_enabled => match HttpGenerativeBackend::from_config(generator) {
                Ok(backend) => Some(Arc::new(backend)),
                Err(e) => {
                    warn!(error = %e, "Generative backend unavailable, continuing without it");
                    None
                }
            },
            _ => None,
        };

        let mut classifier = Classifier::new(ClassifierPolicy::from(&config.classifier))
            .with_sample_chars(config.classifier.ai_sample_chars);
        if let Some(backend) = &backend {
            classifier = classifier.with_backend(Arc::clone(backend));
        }

        let engine = ExtractionEngine::new(
            base.clone(),
            ExtractionSettings::from(&config.extraction),
            backend,
        );

        let fetch_options = if config.scraper.wait_for_dynamic {
            FetchOptions::waiting_for_dynamic()
        } else {
            FetchOptions::default()
        };

        Ok(Self::new(
            base,
            config.site.sitemap_url(),
            Arc::new(fetcher),
            classifier,
            engine,
            storage,
        )
        .with_request_delay(Duration::from_millis(config.scraper.request_delay_ms))
        .with_fetch_options(fetch_options)
        .with_cache_max_age(chrono::Duration::hours(i64::from(
            config.scraper.sitemap_cache_hours,
        ))))
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_fetch_options(mut self, options: FetchOptions) -> Self {
        self.fetch_options = options;
        self
    }

    pub fn with_cache_max_age(mut self, max_age: chrono::Duration) -> Self {
        self.cache_max_age = max_age;
        self
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// New receiver for the event stream; only events sent after this call arrive
    pub fn subscribe(&self) -> broadcast::Receiver<HarvestEvent> {
        self.events.subscribe()
    }

    /// Shared handle to the storage backend
    pub fn storage(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.storage)
    }

    pub fn ai_enabled(&self) -> bool {
        self.classifier.has_backend()
    }

    /// Runs one complete harvest session
    ///
    /// Per-node failures are counted and the walk continues. The session is
    /// marked failed, and an error returned, when discovery fails or storage
    /// keeps failing.
    pub async fn run_session(&self, options: &HarvestOptions) -> Result<RunSummary, HarvestError> {
        let started = Instant::now();
        let metadata = json!({
            "categories_limit": options.limit,
            "category_filter": options.categories,
            "ai_enabled": self.ai_enabled(),
            "config_hash": self.config_hash,
            "strategy": self.engine.leading_strategy(),
            "base_url": self.base.as_str(),
        });

        let session_id = self.store(|s| {
            s.create_session(
                Utc::now(),
                self.ai_enabled(),
                self.config_hash.as_deref(),
                &metadata,
            )
        })?;
        info!(session = %session_id, "Session started");
        self.emit(HarvestEvent::SessionStarted {
            session_id: session_id.clone(),
        });

        let mut summary = RunSummary::new(&session_id);

        let (mut arena, from_cache) = match self.discover(options.refresh_sitemap).await {
            Ok(found) => found,
            Err(e) => {
                error!(session = %session_id, error = %e, "Category discovery failed");
                self.fail_session(&mut summary, started);
                return Err(e);
            }
        };

        let scheduled = arena.visitation_list(&options.categories, options.limit);
        if scheduled.is_empty() {
            let e = HarvestError::Discovery(format!(
                "no categories match the filter {:?}",
                options.categories
            ));
            error!(session = %session_id, error = %e, "Nothing to visit");
            summary.categories = arena;
            self.fail_session(&mut summary, started);
            return Err(e);
        }

        summary.nodes_scheduled = scheduled.len();
        info!(
            total = arena.len(),
            scheduled = scheduled.len(),
            from_cache,
            "Categories ready"
        );
        self.emit(HarvestEvent::CategoriesDiscovered {
            total: arena.len(),
            scheduled: scheduled.len(),
            from_cache,
        });

        let mut db_ids: HashMap<NodeId, i64> = HashMap::new();
        let mut storage_streak = 0;

        for (index, id) in scheduled.iter().copied().enumerate() {
            let Some(node) = arena.get(id).cloned() else {
                continue;
            };

            if index > 0 || !from_cache {
                tokio::time::sleep(self.request_delay).await;
            }

            self.emit(HarvestEvent::NodeStarted {
                index,
                scheduled: scheduled.len(),
                name: node.name.clone(),
                url: node.url.clone(),
            });

            let parent_id = arena.parent(id).and_then(|p| db_ids.get(&p).copied());
            let span = info_span!("node", name = %node.name);
            let outcome = self
                .process_node(&session_id, id, &node, parent_id, &mut db_ids)
                .instrument(span)
                .await;

            summary.nodes_visited += 1;
            match outcome {
                NodeOutcome::Saved {
                    category_type,
                    entities,
                } => {
                    storage_streak = 0;
                    if let Some(visited) = arena.get_mut(id) {
                        visited.set_category_type(category_type);
                    }
                    if category_type.is_leaf() {
                        summary.leaf_count += 1;
                    } else if category_type != CategoryType::Unknown {
                        summary.non_leaf_count += 1;
                    }
                    summary.total_entities += entities;
                }
                NodeOutcome::FetchFailed => {
                    storage_streak = 0;
                    summary.error_count += 1;
                }
                NodeOutcome::PersistFailed(e) => {
                    summary.error_count += 1;
                    storage_streak += 1;
                    self.emit(HarvestEvent::NodeFailed {
                        name: node.name.clone(),
                        url: node.url.clone(),
                        stage: NodeStage::Persist,
                        error: e.to_string(),
                    });

                    if storage_streak >= SYSTEMIC_STORAGE_FAILURES {
                        error!(
                            session = %session_id,
                            failures = storage_streak,
                            "Storage keeps failing, abandoning session"
                        );
                        summary.categories = arena;
                        self.fail_session(&mut summary, started);
                        return Err(HarvestError::Storage(e));
                    }
                }
            }
        }

        summary.categories = arena;
        let record = self.store(|s| s.finish_session(&session_id, SessionStatus::Completed))?;
        summary.status = record.status;
        summary.duration_secs = started.elapsed().as_secs_f64();

        info!(
            session = %session_id,
            visited = summary.nodes_visited,
            leaves = summary.leaf_count,
            entities = summary.total_entities,
            errors = summary.error_count,
            "Session completed"
        );
        self.emit(HarvestEvent::SessionFinished {
            session_id,
            status: summary.status,
            summary: summary.clone(),
        });

        Ok(summary)
    }

    async fn discover(&self, refresh: bool) -> Result<(CategoryArena, bool), HarvestError> {
        let now = Utc::now();

        if !refresh {
            match self.store(|s| load_cached_arena(&*s, &self.sitemap_url, self.cache_max_age, now)) {
                Ok(Some(arena)) => return Ok((arena, true)),
                Ok(None) => debug!(source = %self.sitemap_url, "No fresh sitemap cache"),
                Err(e) => warn!(error = %e, "Sitemap cache unavailable"),
            }
        }

        let arena = fetch_arena(
            self.fetcher.as_ref(),
            &self.sitemap_url,
            &self.base,
            &self.fetch_options,
        )
        .await?;

        if let Err(e) = self.store(|s| store_arena(s, &self.sitemap_url, &arena, now)) {
            warn!(error = %e, "Failed to cache sitemap");
        }

        Ok((arena, false))
    }

    async fn process_node(
        &self,
        session_id: &str,
        id: NodeId,
        node: &CategoryNode,
        parent_id: Option<i64>,
        db_ids: &mut HashMap<NodeId, i64>,
    ) -> NodeOutcome {
        let new_category = NewCategory::new(&node.name, &node.url).with_parent(parent_id);
        let category_id = match self.store(|s| s.insert_category(session_id, &new_category)) {
            Ok(category_id) => category_id,
            Err(e) => {
                error!(error = %e, "Failed to record category");
                return NodeOutcome::PersistFailed(e);
            }
        };
        db_ids.insert(id, category_id);

        let html = match self.fetch_page(&node.url).await {
            Ok(html) => html,
            Err(message) => {
                error!(url = %node.url, error = %message, "Fetch failed");
                self.emit(HarvestEvent::NodeFailed {
                    name: node.name.clone(),
                    url: node.url.clone(),
                    stage: NodeStage::Fetch,
                    error: message.clone(),
                });

                let update = NodeUpdate {
                    category_type: CategoryType::Unknown,
                    confidence_source: None,
                    metadata: json!({ "error": message }),
                    entities: Vec::new(),
                    child_categories: Vec::new(),
                };
                if let Err(e) = self.store(|s| s.save_node(category_id, &update)) {
                    warn!(error = %e, "Failed to record fetch error");
                }
                return NodeOutcome::FetchFailed;
            }
        };

        let classification = self.classifier.classify(&html).await;
        let hint = PageTypeHint::detect(&html);
        let category_type = if classification.is_leaf {
            CategoryType::leaf_for(hint.as_str(), &node.url, &node.name)
        } else {
            CategoryType::non_leaf_for(&node.url, &node.name)
        };
        info!(
            %category_type,
            source = %classification.confidence_source,
            reason = %classification.reason,
            "Classified"
        );
        self.emit(HarvestEvent::NodeClassified {
            name: node.name.clone(),
            category_type,
            source: classification.confidence_source,
        });

        let mut update = NodeUpdate::classified(category_type, classification.confidence_source);
        let mut metadata = json!({
            "classification_reason": classification.reason,
            "page_type_hint": hint.as_str(),
        });

        if category_type.is_leaf() {
            let output = self.engine.extract(&html, hint).await;
            update.entities = output
                .batch
                .harvestable()
                .map(|(entity_type, entity)| (entity_type.to_string(), entity.clone()))
                .collect();
            update.child_categories = output
                .batch
                .categories()
                .iter()
                .filter_map(|entity| self.child_category(entity))
                .collect();

            metadata["extraction_strategy"] = json!(output.strategy);
            metadata["fallback_reason"] = json!(output.fallback_reason);
            metadata["entities_found"] = json!(output.entities_found());

            self.emit(HarvestEvent::EntitiesExtracted {
                name: node.name.clone(),
                strategy: output.strategy,
                entities: update.entities.len(),
                fallback: output.used_fallback(),
            });
        }
        update.metadata = metadata;

        match self.store(|s| s.save_node(category_id, &update)) {
            Ok(saved) => {
                debug!(
                    products = saved.products_linked,
                    children = saved.children_created,
                    "Node saved"
                );
                NodeOutcome::Saved {
                    category_type,
                    entities: update.entities.len(),
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to save node");
                NodeOutcome::PersistFailed(e)
            }
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String, String> {
        let absolute = self.base.join(url).map_err(|e| e.to_string())?;
        self.fetcher
            .fetch(absolute.as_str(), &self.fetch_options)
            .await
            .into_result()
    }

    /// Category found inside a listing page, stored as a child of that page
    fn child_category(&self, entity: &ExtractedEntity) -> Option<NewCategory> {
        let url = to_site_relative(entity.url.as_deref()?, &self.base).ok()?;
        let category_type = match entity.category_type.as_deref() {
            Some(raw) => CategoryType::parse_lenient(raw),
            None => CategoryType::infer_from_link(&url, &entity.name),
        };
        Some(NewCategory::new(&entity.name, url).with_type(category_type))
    }

    fn fail_session(&self, summary: &mut RunSummary, started: Instant) {
        summary.status = SessionStatus::Failed;
        summary.duration_secs = started.elapsed().as_secs_f64();

        if let Err(e) = self.store(|s| s.finish_session(&summary.session_id, SessionStatus::Failed)) {
            error!(session = %summary.session_id, error = %e, "Failed to mark session failed");
        }
        self.emit(HarvestEvent::SessionFinished {
            session_id: summary.session_id.clone(),
            status: SessionStatus::Failed,
            summary: summary.clone(),
        });
    }

    /// Runs `op` under the storage lock; the guard never outlives the call
    fn store<T>(&self, op: impl FnOnce(&mut S) -> StorageResult<T>) -> StorageResult<T> {
        let mut storage = self
            .storage
            .lock()
            .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))?;
        op(&mut storage)
    }

    fn emit(&self, event: HarvestEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
