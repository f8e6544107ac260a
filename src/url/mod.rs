//! URL handling module for Atlas-Walker
//!
//! This module provides URL normalization, link absolutization, and the
//! canonical keys used to de-duplicate entities and tasks.

mod normalize;

pub use normalize::normalize_url;

use url::Url;

/// Returns the de-duplication identity of an entity
///
/// The normalized URL is preferred; the normalized display name is used
/// only when the entity has no URL. The two key spaces are prefixed so a
/// name can never collide with a URL.
///
/// # Examples
///
/// ```
/// use atlas_walker::url::canonical_key;
///
/// assert_eq!(
///     canonical_key("Tenerife", "https://WWW.Example.com/region/es/tenerife.html?aid=7"),
///     "url:https://example.com/region/es/tenerife.html"
/// );
/// assert_eq!(canonical_key("  North   Holland ", ""), "name:north holland");
/// ```
pub fn canonical_key(name: &str, url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return format!("name:{}", normalize_name(name));
    }

    match normalize_url(url) {
        Ok(normalized) => format!("url:{}", normalized),
        Err(_) => format!("url:{}", url.to_lowercase()),
    }
}

/// Canonical key for a bare URL
pub fn url_key(url: &Url) -> String {
    canonical_key("", url.as_str())
}

/// Lowercases a display name and collapses internal whitespace
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Resolves an href against the site origin
///
/// Returns None if the link should be ignored:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - anything that does not resolve to HTTP(S)
pub fn absolutize(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}
