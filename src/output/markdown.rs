//! Markdown session report
//!
//! This module renders one harvest session as a human-readable report,
//! including statistics, the category tree and price/brand breakdowns.

use crate::query::{QueryService, SessionOverview};
use crate::storage::{HierarchyRow, SessionRecord, Storage};
use crate::HarvestError;
use chrono::DateTime;
use std::fs;
use std::path::Path;

/// Categories listed before the tree is cut off
const MAX_TREE_ROWS: usize = 200;

/// Everything a session report shows
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session: SessionRecord,
    pub overview: SessionOverview,
    pub hierarchy: Vec<HierarchyRow>,
}

impl SessionReport {
    pub fn duration_seconds(&self) -> Option<i64> {
        let started = DateTime::parse_from_rfc3339(&self.session.start_time).ok()?;
        let finished = DateTime::parse_from_rfc3339(self.session.end_time.as_deref()?).ok()?;
        Some((finished - started).num_seconds())
    }

    /// Share of categories classified as leaves, in percent
    pub fn leaf_ratio(&self) -> f64 {
        let stats = &self.overview.stats;
        if stats.total_categories == 0 {
            return 0.0;
        }
        stats.leaf_categories as f64 / stats.total_categories as f64 * 100.0
    }
}

/// Loads the report data of one session
pub fn load_session_report<S: Storage + ?Sized>(
    storage: &S,
    session_id: &str,
) -> Result<SessionReport, HarvestError> {
    let query = QueryService::new(storage);
    Ok(SessionReport {
        session: query.session(session_id)?,
        overview: query.session_overview(session_id)?,
        hierarchy: query.hierarchy(session_id)?,
    })
}

/// Writes the markdown report to `output_path`
pub fn write_markdown_report(report: &SessionReport, output_path: &Path) -> Result<(), HarvestError> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, format_markdown_report(report))?;
    Ok(())
}

pub fn format_markdown_report(report: &SessionReport) -> String {
    let session = &report.session;
    let stats = &report.overview.stats;
    let mut md = String::new();

    md.push_str("# Catalog Harvest Report\n\n");

    // Session metadata
    md.push_str("## Session Information\n\n");
    md.push_str(&format!("- **Session ID**: {}\n", session.session_id));
    md.push_str(&format!("- **Started**: {}\n", session.start_time));
    if let Some(finished) = &session.end_time {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = report.duration_seconds() {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", session.status));
    md.push_str(&format!(
        "- **AI Enabled**: {}\n",
        if session.ai_enabled { "yes" } else { "no" }
    ));
    if let Some(hash) = &session.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    md.push('\n');

    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Categories**: {}\n", stats.total_categories));
    md.push_str(&format!("- **Leaf Categories**: {}\n", stats.leaf_categories));
    md.push_str(&format!("- **Products**: {}\n", stats.total_products));
    md.push_str(&format!("- **Leaf Ratio**: {:.2}%\n\n", report.leaf_ratio()));

    if !report.overview.category_types.is_empty() {
        md.push_str("## Category Types\n\n");
        md.push_str("| Type | Count |\n");
        md.push_str("|------|-------|\n");
        for (category_type, count) in &report.overview.category_types {
            md.push_str(&format!("| {} | {} |\n", category_type, count));
        }
        md.push('\n');
    }

    let prices = &report.overview.prices;
    if prices.priced_products > 0 {
        md.push_str("## Prices\n\n");
        md.push_str(&format!("- **Priced Products**: {}\n", prices.priced_products));
        if let (Some(min), Some(max)) = (prices.min_price, prices.max_price) {
            md.push_str(&format!("- **Range**: {:.2} to {:.2}\n", min, max));
        }
        if let Some(avg) = prices.avg_price {
            md.push_str(&format!("- **Average**: {:.2}\n", avg));
        }
        md.push('\n');
    }

    if !report.overview.brands.is_empty() {
        md.push_str("## Top Brands\n\n");
        md.push_str("| Brand | Products |\n");
        md.push_str("|-------|----------|\n");
        for (brand, count) in &report.overview.brands {
            md.push_str(&format!("| {} | {} |\n", brand, count));
        }
        md.push('\n');
    }

    if !report.overview.availability.is_empty() {
        md.push_str("## Availability\n\n");
        for (availability, count) in &report.overview.availability {
            md.push_str(&format!("- {}: {}\n", availability, count));
        }
        md.push('\n');
    }

    if !report.hierarchy.is_empty() {
        md.push_str("## Category Tree\n\n");
        for row in report.hierarchy.iter().take(MAX_TREE_ROWS) {
            let marker = if row.is_leaf { "leaf" } else { "nav" };
            md.push_str(&format!(
                "{}- {} ({}, {} products)\n",
                "  ".repeat(row.level as usize),
                row.name,
                marker,
                row.product_count
            ));
        }
        if report.hierarchy.len() > MAX_TREE_ROWS {
            md.push_str(&format!(
                "\n... and {} more\n",
                report.hierarchy.len() - MAX_TREE_ROWS
            ));
        }
        md.push('\n');
    }

    md
}
