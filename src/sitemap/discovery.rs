use crate::fetch::{FetchOptions, PageFetcher};
use crate::sitemap::{parse_sitemap, CategoryArena};
use crate::storage::{Storage, StorageResult};
use crate::HarvestError;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use url::Url;

/// Cached arena for `source`, if one younger than `max_age` exists
///
/// A payload that no longer deserializes is treated as a miss.
pub fn load_cached_arena<S: Storage + ?Sized>(
    storage: &S,
    source: &str,
    max_age: Duration,
    now: DateTime<Utc>,
) -> StorageResult<Option<CategoryArena>> {
    let Some(payload) = storage.get_cached_sitemap(source, max_age, now)? else {
        return Ok(None);
    };

    match serde_json::from_str::<CategoryArena>(&payload) {
        Ok(arena) if !arena.is_empty() => {
            info!(source, categories = arena.len(), "Using cached sitemap");
            Ok(Some(arena))
        }
        Ok(_) => Ok(None),
        Err(e) => {
            warn!(source, error = %e, "Discarding unreadable sitemap cache entry");
            Ok(None)
        }
    }
}

pub fn store_arena<S: Storage + ?Sized>(
    storage: &mut S,
    source: &str,
    arena: &CategoryArena,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    let payload = serde_json::to_string(arena)?;
    storage.put_cached_sitemap(source, &payload, now)
}

/// Fetches and parses the sitemap page
///
/// A failed fetch or a page without usable category links is a discovery
/// failure.
pub async fn fetch_arena(
    fetcher: &dyn PageFetcher,
    source: &str,
    base: &Url,
    options: &FetchOptions,
) -> Result<CategoryArena, HarvestError> {
    let html = fetcher
        .fetch(source, options)
        .await
        .into_result()
        .map_err(|message| HarvestError::Fetch {
            url: source.to_string(),
            message,
        })?;

    let arena = parse_sitemap(&html, base);
    if arena.is_empty() {
        return Err(HarvestError::Discovery(format!(
            "no categories found at {}",
            source
        )));
    }

    info!(source, categories = arena.len(), "Discovered categories");
    Ok(arena)
}
