//! Category discovery
//!
//! This module turns the site's sitemap page into the hierarchy a harvest
//! walks:
//! - parsing category links into a [`CategoryArena`]
//! - depth-first visitation with cycle tolerance, filtering and a node cap
//! - caching parsed arenas in storage with a freshness window

mod arena;
mod discovery;
mod parser;

pub use arena::{CategoryArena, NodeId, Visitation};
pub use discovery::{fetch_arena, load_cached_arena, store_arena};
pub use parser::parse_sitemap;
