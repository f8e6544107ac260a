//! Pagination cursor for listing pages
//!
//! [`next_page_url`] is the pure transition rule; [`PaginationCursor`]
//! wraps it with the per-chain state needed for the page cap and the
//! cycle guard.

use crate::url::{absolutize, url_key};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Page size assumed when an offset URL carries no `rows` parameter
pub const DEFAULT_ROWS_PER_PAGE: u32 = 25;

/// Explicit "next page" markers, tried in order
const NEXT_MARKERS: [&str; 4] = [
    "link[rel='next'][href]",
    "a[rel='next'][href]",
    "a[aria-label*='Next'][href]",
    "a[data-testid='pagination-next'][href]",
];

/// Computes the URL of the page after `current`
///
/// Checks, in order:
/// 1. an explicit next-page marker in the body
/// 2. an `offset` query parameter, advanced by `rows` (or the URL's own
///    `rows` parameter when present)
///
/// Returns None when neither applies or when the result would be
/// `current` itself.
pub fn next_page_url(body: &str, current: &Url, rows_per_page: u32) -> Option<Url> {
    match transition(body, current, rows_per_page, None) {
        Transition::Found(next) => Some(next),
        Transition::Missing | Transition::Unchanged => None,
    }
}

enum Transition {
    Found(Url),
    Missing,
    Unchanged,
}

/// Shared rule behind [`next_page_url`] and [`PaginationCursor::advance`]
///
/// `hint` wins over markers in the body, markers win over the offset.
fn transition(body: &str, current: &Url, rows_per_page: u32, hint: Option<&Url>) -> Transition {
    let candidate = match hint {
        Some(hint) => Some(hint.clone()),
        None => find_next_marker(body, current).or_else(|| advance_offset(current, rows_per_page)),
    };

    match candidate {
        None => Transition::Missing,
        Some(next) if url_key(&next) == url_key(current) => Transition::Unchanged,
        Some(next) => Transition::Found(next),
    }
}

fn find_next_marker(body: &str, current: &Url) -> Option<Url> {
    let document = Html::parse_document(body);

    for marker in NEXT_MARKERS {
        let Ok(selector) = Selector::parse(marker) else {
            continue;
        };
        let found = document
            .select(&selector)
            .filter_map(|element| element.value().attr("href"))
            .find_map(|href| absolutize(current, href));
        if found.is_some() {
            return found;
        }
    }

    None
}

/// Rewrites the `offset` parameter of `current` in place
///
/// Returns None if the URL has no numeric `offset` parameter.
pub fn advance_offset(current: &Url, rows_per_page: u32) -> Option<Url> {
    let pairs: Vec<(String, String)> = current
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let offset: u64 = pairs
        .iter()
        .find(|(k, _)| k == "offset")
        .and_then(|(_, v)| v.parse().ok())?;

    let rows: u64 = pairs
        .iter()
        .find(|(k, _)| k == "rows")
        .and_then(|(_, v)| v.parse().ok())
        .filter(|rows| *rows > 0)
        .unwrap_or(u64::from(rows_per_page.max(1)));

    let next_offset = (offset + rows).to_string();
    let mut next = current.clone();
    next.query_pairs_mut().clear().extend_pairs(pairs.iter().map(|(k, v)| {
        if k == "offset" {
            (k.as_str(), next_offset.as_str())
        } else {
            (k.as_str(), v.as_str())
        }
    }));

    Some(next)
}

/// Why a pagination chain stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// The page exposed no next marker and no offset parameter
    NoNextLink,
    /// The computed next URL equals the current one
    SameUrl,
    /// The configured maximum number of pages was fetched
    PageCap,
    /// The next URL was already visited by this chain
    Revisit,
}

/// Result of advancing the cursor past one page
#[derive(Debug, Clone, PartialEq)]
pub enum CursorStep {
    Next(Url),
    Terminal(TerminalReason),
}

/// Position within one paginated listing chain
#[derive(Debug, Clone)]
pub struct PaginationCursor {
    current_url: Url,
    page_index: usize,
    max_pages: Option<usize>,
    rows_per_page: u32,
    visited: HashSet<String>,
}

impl PaginationCursor {
    pub fn new(start: Url, max_pages: Option<usize>, rows_per_page: u32) -> Self {
        let mut visited = HashSet::new();
        visited.insert(url_key(&start));

        Self {
            current_url: start,
            page_index: 0,
            max_pages,
            rows_per_page,
            visited,
        }
    }

    pub fn current_url(&self) -> &Url {
        &self.current_url
    }

    /// Zero-based index of the page the cursor points at
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Number of distinct URLs produced by this chain so far
    pub fn visited(&self) -> usize {
        self.visited.len()
    }

    /// Moves past the current page
    ///
    /// `hint` is the extractor's own next-page link, which takes
    /// precedence over markers found in `body`.
    pub fn advance(&mut self, body: &str, hint: Option<&Url>) -> CursorStep {
        let fetched = self.page_index + 1;
        if self.max_pages.is_some_and(|cap| fetched >= cap) {
            return CursorStep::Terminal(TerminalReason::PageCap);
        }

        let next = match transition(body, &self.current_url, self.rows_per_page, hint) {
            Transition::Found(next) => next,
            Transition::Missing => return CursorStep::Terminal(TerminalReason::NoNextLink),
            Transition::Unchanged => return CursorStep::Terminal(TerminalReason::SameUrl),
        };

        if !self.visited.insert(url_key(&next)) {
            return CursorStep::Terminal(TerminalReason::Revisit);
        }

        self.current_url = next.clone();
        self.page_index = fetched;
        CursorStep::Next(next)
    }
}
