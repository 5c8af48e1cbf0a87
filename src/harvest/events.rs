use crate::harvest::RunSummary;
use crate::model::{CategoryType, ConfidenceSource, SessionStatus};
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// Where in node processing a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStage {
    Fetch,
    Persist,
}

impl fmt::Display for NodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Persist => write!(f, "persist"),
        }
    }
}

/// Progress notifications published while a session runs
///
/// Subscribe with [`Orchestrator::subscribe`](crate::harvest::Orchestrator::subscribe).
/// Events are delivered best-effort; a slow subscriber may observe a lag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HarvestEvent {
    SessionStarted {
        session_id: String,
    },
    CategoriesDiscovered {
        total: usize,
        scheduled: usize,
        from_cache: bool,
    },
    NodeStarted {
        index: usize,
        scheduled: usize,
        name: String,
        url: String,
    },
    NodeClassified {
        name: String,
        category_type: CategoryType,
        source: ConfidenceSource,
    },
    EntitiesExtracted {
        name: String,
        strategy: &'static str,
        entities: usize,
        fallback: bool,
    },
    NodeFailed {
        name: String,
        url: String,
        stage: NodeStage,
        error: String,
    },
    SessionFinished {
        session_id: String,
        status: SessionStatus,
        summary: RunSummary,
    },
}

/// Hands every received event to `handle` until the session finishes or the
/// orchestrator goes away
///
/// Events dropped while the receiver lagged are skipped; their count is
/// returned.
pub async fn follow_events(
    mut events: broadcast::Receiver<HarvestEvent>,
    mut handle: impl FnMut(&HarvestEvent),
) -> u64 {
    let mut skipped = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                handle(&event);
                if matches!(event, HarvestEvent::SessionFinished { .. }) {
                    break;
                }
            }
            Err(RecvError::Lagged(n)) => {
                warn!(skipped = n, "Event subscriber fell behind");
                skipped += n;
            }
            Err(RecvError::Closed) => break,
        }
    }
    skipped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(index: usize) -> HarvestEvent {
        HarvestEvent::NodeStarted {
            index,
            scheduled: 6,
            name: format!("Category {}", index),
            url: format!("/c{}.html", index),
        }
    }

    #[tokio::test]
    async fn test_lagging_subscriber_still_sees_the_end() {
        let (tx, rx) = broadcast::channel(2);
        for index in 0..5 {
            tx.send(node(index)).unwrap();
        }
        tx.send(HarvestEvent::SessionFinished {
            session_id: "s".to_string(),
            status: SessionStatus::Completed,
            summary: RunSummary::new("s"),
        })
        .unwrap();

        let mut seen = Vec::new();
        let skipped = follow_events(rx, |event| seen.push(event.clone())).await;

        assert_eq!(skipped, 4);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], node(4));
        assert!(matches!(seen[1], HarvestEvent::SessionFinished { .. }));
    }

    #[tokio::test]
    async fn test_stops_when_sender_is_dropped() {
        let (tx, rx) = broadcast::channel(4);
        tx.send(node(0)).unwrap();
        drop(tx);

        let mut seen = 0;
        assert_eq!(follow_events(rx, |_| seen += 1).await, 0);
        assert_eq!(seen, 1);
    }
}
