//! Harvest sessions
//!
//! The [`Orchestrator`] walks the category arena one node at a time and
//! publishes [`HarvestEvent`]s to any subscriber. A finished walk yields a
//! [`RunSummary`].

mod events;
mod orchestrator;
mod summary;

pub use events::{follow_events, HarvestEvent, NodeStage};
pub use orchestrator::{
    HarvestOptions, Orchestrator, EVENT_CAPACITY, SYSTEMIC_STORAGE_FAILURES,
};
pub use summary::RunSummary;
