use serde::{Deserialize, Serialize};
use std::fmt;

/// Which layer of the classifier produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfidenceSource {
    #[serde(rename = "heuristic")]
    Heuristic,
    #[serde(rename = "ai")]
    Ai,
    #[serde(rename = "forced-default")]
    ForcedDefault,
}

impl ConfidenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Ai => "ai",
            Self::ForcedDefault => "forced-default",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "heuristic" => Some(Self::Heuristic),
            "ai" => Some(Self::Ai),
            "forced-default" => Some(Self::ForcedDefault),
            _ => None,
        }
    }
}

impl fmt::Display for ConfidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leaf/non-leaf verdict for one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_leaf: bool,
    pub confidence_source: ConfidenceSource,
    /// Short human-readable reason, for auditing misclassifications
    pub reason: String,
}

impl ClassificationResult {
    pub fn leaf(source: ConfidenceSource, reason: impl Into<String>) -> Self {
        Self {
            is_leaf: true,
            confidence_source: source,
            reason: reason.into(),
        }
    }

    pub fn non_leaf(source: ConfidenceSource, reason: impl Into<String>) -> Self {
        Self {
            is_leaf: false,
            confidence_source: source,
            reason: reason.into(),
        }
    }

    /// The policy default: pages are assumed navigational
    pub fn policy_default() -> Self {
        Self::non_leaf(
            ConfidenceSource::ForcedDefault,
            "no layer reached a verdict",
        )
    }
}
