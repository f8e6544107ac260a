//! Page extraction
//!
//! The orchestrator never looks at HTML itself. It hands every fetched page
//! to an [`Extractor`] together with the kind of page it expects, and gets
//! back normalized records plus auxiliary links (browse targets, extra
//! candidates, related entities, next-page hints).

mod catalog;

pub use catalog::CatalogExtractor;

use crate::url::canonical_key;
use std::collections::BTreeMap;
use url::Url;

/// What a fetched page is expected to contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// Root page listing every region
    Catalog,
    Region,
    Country,
    City,
    /// Search results page with listing cards
    Listing,
}

/// A normalized entity found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRecord {
    pub name: String,

    /// Absolute URL, when the entity links anywhere
    pub url: Option<Url>,

    pub attributes: BTreeMap<String, String>,
}

impl ExtractedRecord {
    pub fn new(name: impl Into<String>, url: Option<Url>) -> Self {
        Self {
            name: name.into(),
            url,
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute unless the value is blank
    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.attributes.insert(key.to_string(), value);
        }
        self
    }

    /// Canonical de-duplication key
    pub fn key(&self) -> String {
        canonical_key(&self.name, self.url.as_ref().map(Url::as_str).unwrap_or(""))
    }
}

/// Role of an auxiliary link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRel {
    /// Additional entity of the same kind as the records
    Candidate,
    /// Page that lists the children of this entity
    Browse,
    /// Sibling entity attached alongside the children (popular regions)
    Related,
    /// Next page of the same listing
    Next,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxLink {
    pub rel: LinkRel,
    pub record: ExtractedRecord,
}

/// Everything an extractor found on one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub records: Vec<ExtractedRecord>,
    pub aux_links: Vec<AuxLink>,

    /// Name of the strategy that produced `records`
    pub strategy: Option<&'static str>,
}

impl Extraction {
    /// Auxiliary links with the given role, in page order
    pub fn links(&self, rel: LinkRel) -> impl Iterator<Item = &ExtractedRecord> {
        self.aux_links
            .iter()
            .filter(move |link| link.rel == rel)
            .map(|link| &link.record)
    }

    pub fn first_link(&self, rel: LinkRel) -> Option<&Url> {
        self.links(rel).find_map(|record| record.url.as_ref())
    }

    pub fn next_page_hint(&self) -> Option<&Url> {
        self.first_link(LinkRel::Next)
    }
}

/// Turns a page body into records
///
/// Implementations must be pure: the same body, URL and kind always give
/// the same extraction.
pub trait Extractor: Send + Sync {
    fn extract(&self, body: &str, page_url: &Url, kind: PageKind) -> Extraction;
}
