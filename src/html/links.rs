use crate::{UrlError, UrlResult};
use url::Url;

/// Prefixes of hrefs that never lead to a page
const NON_NAVIGABLE_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "#"];

/// Resolves an href against the site origin into an absolute http(s) URL
///
/// Returns None for empty, non-navigable or unresolvable hrefs.
pub fn absolutize(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || !is_navigable(href) {
        return None;
    }

    let resolved = base.join(href).ok()?;
    if resolved.scheme() == "http" || resolved.scheme() == "https" {
        Some(resolved.to_string())
    } else {
        None
    }
}

/// Normalizes an href to site-relative form (`/path?query`)
///
/// Absolute links must point at the site's own host (a `www.` prefix is
/// ignored on either side). Bare relative links gain a leading slash.
pub fn to_site_relative(href: &str, base: &Url) -> UrlResult<String> {
    let href = href.trim();

    if href.is_empty() || !is_navigable(href) {
        return Err(UrlError::NotNavigable(href.to_string()));
    }

    if href.starts_with('/') && !href.starts_with("//") {
        return Ok(href.to_string());
    }

    let looks_absolute = href.starts_with("//") || href.contains("://");
    if !looks_absolute {
        return Ok(format!("/{}", href.trim_start_matches("./")));
    }

    let url = base
        .join(href)
        .map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if !same_site(&url, base) {
        return Err(UrlError::OffSite(href.to_string()));
    }

    let mut relative = url.path().to_string();
    if let Some(query) = url.query() {
        relative.push('?');
        relative.push_str(query);
    }
    Ok(relative)
}

/// True unless the href is a script, mail, phone, data or same-page link
pub fn is_navigable(href: &str) -> bool {
    let lower = href.trim().to_lowercase();
    !NON_NAVIGABLE_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn same_site(url: &Url, base: &Url) -> bool {
    match (url.host_str(), base.host_str()) {
        (Some(a), Some(b)) => strip_www(a).eq_ignore_ascii_case(strip_www(b)),
        _ => false,
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
