use crate::model::SessionStatus;
use crate::sitemap::CategoryArena;
use serde::Serialize;

/// Counters accumulated over one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub session_id: String,
    pub status: SessionStatus,
    /// Nodes on the visitation list
    pub nodes_scheduled: usize,
    /// Nodes processed, successfully or not
    pub nodes_visited: usize,
    pub leaf_count: usize,
    pub non_leaf_count: usize,
    pub total_entities: usize,
    pub error_count: usize,
    pub duration_secs: f64,
    /// Discovered hierarchy; visited nodes carry the type they were saved with
    #[serde(skip)]
    pub categories: CategoryArena,
}

impl RunSummary {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Running,
            nodes_scheduled: 0,
            nodes_visited: 0,
            leaf_count: 0,
            non_leaf_count: 0,
            total_entities: 0,
            error_count: 0,
            duration_secs: 0.0,
            categories: CategoryArena::new(),
        }
    }

    /// Share of scheduled nodes processed without error, in percent
    pub fn completion_rate(&self) -> f64 {
        if self.nodes_scheduled == 0 {
            return 0.0;
        }
        let succeeded = self.nodes_visited.saturating_sub(self.error_count);
        succeeded as f64 / self.nodes_scheduled as f64 * 100.0
    }

    /// Share of classified nodes that are leaves, in percent
    pub fn leaf_ratio(&self) -> f64 {
        let classified = self.leaf_count + self.non_leaf_count;
        if classified == 0 {
            return 0.0;
        }
        self.leaf_count as f64 / classified as f64 * 100.0
    }

    pub fn entities_per_leaf(&self) -> f64 {
        if self.leaf_count == 0 {
            return 0.0;
        }
        self.total_entities as f64 / self.leaf_count as f64
    }
}
