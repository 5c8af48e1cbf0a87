//! Statistics from the harvest database
//!
//! This module loads database-wide and per-session statistics from the
//! storage layer and prints them.

use crate::harvest::RunSummary;
use crate::query::{QueryService, SessionOverview};
use crate::storage::{DatabaseStats, SessionRecord, Storage};
use crate::HarvestError;

/// Sessions listed under "Recent Sessions"
pub const RECENT_SESSIONS: usize = 5;

/// Database-wide statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    pub database: DatabaseStats,

    /// Most recent sessions first
    pub recent_sessions: Vec<SessionRecord>,

    /// Breakdown of the most recent session, if there is one
    pub latest: Option<SessionOverview>,
}

/// Loads statistics from storage
pub fn load_statistics<S: Storage + ?Sized>(storage: &S) -> Result<HarvestStatistics, HarvestError> {
    let query = QueryService::new(storage);
    let database = query.database_stats()?;
    let recent_sessions = query.sessions(Some(RECENT_SESSIONS))?;

    let latest = match recent_sessions.first() {
        Some(session) => Some(query.session_overview(&session.session_id)?),
        None => None,
    };

    Ok(HarvestStatistics {
        database,
        recent_sessions,
        latest,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Total sessions: {}", stats.database.total_sessions);
    println!("  Total categories: {}", stats.database.total_categories);
    println!("  Total products: {}", stats.database.total_products);
    println!(
        "  Database size: {:.2} MB",
        stats.database.database_size_bytes as f64 / (1024.0 * 1024.0)
    );
    println!();

    if !stats.recent_sessions.is_empty() {
        println!("Recent Sessions:");
        for session in &stats.recent_sessions {
            println!(
                "  {} [{}] {} categories, {} products",
                session.session_id, session.status, session.total_categories, session.total_products
            );
        }
        println!();
    }

    let Some(latest) = &stats.latest else {
        return;
    };

    println!("Latest Session ({}):", latest.stats.session_id);
    let total = latest.stats.total_categories;
    for (category_type, count) in &latest.category_types {
        let percentage = if total > 0 {
            (*count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", category_type, count, percentage);
    }

    if let (Some(min), Some(max), Some(avg)) = (
        latest.prices.min_price,
        latest.prices.max_price,
        latest.prices.avg_price,
    ) {
        println!(
            "  Prices: {} priced, {:.2} to {:.2}, average {:.2}",
            latest.prices.priced_products, min, max, avg
        );
    }

    if !latest.brands.is_empty() {
        println!("  Top brands:");
        for (brand, count) in &latest.brands {
            println!("    - {} ({})", brand, count);
        }
    }
}

/// Prints the summary of a finished run
pub fn print_run_summary(summary: &RunSummary) {
    println!("=== Harvest Complete ===\n");
    println!("Session: {} [{}]", summary.session_id, summary.status);
    println!(
        "  Nodes visited: {} / {}",
        summary.nodes_visited, summary.nodes_scheduled
    );
    println!("  Leaf pages: {}", summary.leaf_count);
    println!("  Navigation pages: {}", summary.non_leaf_count);
    println!("  Entities: {}", summary.total_entities);
    println!("  Errors: {}", summary.error_count);
    println!();
    println!(
        "Completion Rate: {:.1}% | Leaf Ratio: {:.1}% | Entities per Leaf: {:.1}",
        summary.completion_rate(),
        summary.leaf_ratio(),
        summary.entities_per_leaf()
    );
    println!("Duration: {:.1}s", summary.duration_secs);
}
