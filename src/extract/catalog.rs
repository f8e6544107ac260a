//! Default HTML extractor for the travel catalog
//!
//! Each page kind has an ordered list of named strategies. The first
//! strategy that yields anything wins and its name is reported in
//! [`Extraction::strategy`], so selector drift shows up in debug logs as a
//! change of strategy rather than as silently empty output.

use super::{AuxLink, ExtractedRecord, Extraction, Extractor, LinkRel, PageKind};
use crate::url::absolutize;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Parsed page plus the URLs links are resolved against
struct Page<'a> {
    document: &'a Html,
    base: &'a Url,
    url: &'a Url,
}

type StrategyFn = fn(&Page<'_>) -> Option<Vec<ExtractedRecord>>;

/// Region links on the catalog root
const REGION_STRATEGIES: &[(&str, StrategyFn)] = &[("region-links", region_links)];

/// Owning country of a region page
const COUNTRY_STRATEGIES: &[(&str, StrategyFn)] = &[
    ("country-link", country_link),
    ("canonical-code", canonical_country_code),
    ("breadcrumb", breadcrumb_country),
];

/// City cards on a country page
const CITY_STRATEGIES: &[(&str, StrategyFn)] = &[
    ("top-cities", top_cities_container),
    ("city-aria-label", city_aria_blocks),
];

/// Popular-region cards on a country page
const RELATED_STRATEGIES: &[(&str, StrategyFn)] = &[
    ("top-regions", top_regions_container),
    ("popular-regions-heading", popular_regions_heading),
];

/// Country-wide listing entry point
const COUNTRY_BROWSE_STRATEGIES: &[(&str, StrategyFn)] = &[
    ("dest-search-link", dest_search_link),
    ("hotels-in-link", hotels_in_link),
    ("search-query-link", search_query_link),
];

const CITY_BROWSE_STRATEGIES: &[(&str, StrategyFn)] = &[("hotels-in-link", hotels_in_link)];

/// Listing cards on a search results page
const LISTING_STRATEGIES: &[(&str, StrategyFn)] = &[
    ("property-cards", property_cards),
    ("title-links", title_links),
    ("hotel-paths", hotel_paths),
];

const NEXT_STRATEGIES: &[(&str, StrategyFn)] = &[("pagination-next", pagination_next)];

/// Extractor for the catalog's server-rendered HTML
#[derive(Debug, Clone)]
pub struct CatalogExtractor {
    base: Url,
}

impl CatalogExtractor {
    /// `base` is the site origin every record URL is resolved against
    pub fn new(base: Url) -> Self {
        Self { base }
    }
}

impl Extractor for CatalogExtractor {
    fn extract(&self, body: &str, page_url: &Url, kind: PageKind) -> Extraction {
        let document = Html::parse_document(body);
        let page = Page {
            document: &document,
            base: &self.base,
            url: page_url,
        };

        let mut extraction = Extraction::default();

        match kind {
            PageKind::Catalog => {
                (extraction.records, extraction.strategy) = first_match(&page, REGION_STRATEGIES);
            }
            PageKind::Region => {
                (extraction.records, extraction.strategy) = first_match(&page, COUNTRY_STRATEGIES);

                let primary: Vec<String> = extraction.records.iter().map(ExtractedRecord::key).collect();
                let candidates = country_links(&page)
                    .into_iter()
                    .filter(|record| !primary.contains(&record.key()));
                push_links(&mut extraction, LinkRel::Candidate, candidates);
            }
            PageKind::Country => {
                (extraction.records, extraction.strategy) = first_match(&page, CITY_STRATEGIES);

                let (browse, _) = first_match(&page, COUNTRY_BROWSE_STRATEGIES);
                push_links(&mut extraction, LinkRel::Browse, browse.into_iter().take(1));

                let (related, _) = first_match(&page, RELATED_STRATEGIES);
                push_links(&mut extraction, LinkRel::Related, related);
            }
            PageKind::City => {
                (extraction.records, extraction.strategy) = first_match(&page, LISTING_STRATEGIES);

                let (browse, _) = first_match(&page, CITY_BROWSE_STRATEGIES);
                push_links(&mut extraction, LinkRel::Browse, browse.into_iter().take(1));
            }
            PageKind::Listing => {
                (extraction.records, extraction.strategy) = first_match(&page, LISTING_STRATEGIES);

                let (next, _) = first_match(&page, NEXT_STRATEGIES);
                push_links(&mut extraction, LinkRel::Next, next.into_iter().take(1));
            }
        }

        tracing::debug!(
            "Extracted {} records and {} links from {:?} page {} via {}",
            extraction.records.len(),
            extraction.aux_links.len(),
            kind,
            page_url,
            extraction.strategy.unwrap_or("no strategy")
        );

        extraction
    }
}

fn first_match(
    page: &Page<'_>,
    strategies: &[(&'static str, StrategyFn)],
) -> (Vec<ExtractedRecord>, Option<&'static str>) {
    for (name, strategy) in strategies {
        if let Some(records) = strategy(page).filter(|records| !records.is_empty()) {
            return (records, Some(*name));
        }
    }
    (Vec::new(), None)
}

fn push_links(
    extraction: &mut Extraction,
    rel: LinkRel,
    records: impl IntoIterator<Item = ExtractedRecord>,
) {
    extraction
        .aux_links
        .extend(records.into_iter().map(|record| AuxLink { rel, record }));
}

fn non_empty(records: Vec<ExtractedRecord>) -> Option<Vec<ExtractedRecord>> {
    if records.is_empty() {
        None
    } else {
        Some(records)
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Visible text with whitespace collapsed
fn text_of(element: ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// First usable image source, including lazy-loading attributes
fn image_of(element: Option<ElementRef<'_>>) -> String {
    let Some(element) = element else {
        return String::new();
    };
    ["src", "data-src", "data-lazy", "data-lazy-src", "data-original"]
        .iter()
        .find_map(|attr| element.value().attr(attr).map(str::trim).filter(|v| !v.is_empty()))
        .unwrap_or_default()
        .to_string()
}

fn href_of(page: &Page<'_>, element: ElementRef<'_>) -> Option<Url> {
    element
        .value()
        .attr("href")
        .and_then(|href| absolutize(page.base, href))
}

/// Anchors whose resolved path starts with `prefix`, as records
fn path_links(page: &Page<'_>, prefix: &str) -> Vec<ExtractedRecord> {
    let Some(anchors) = selector("a[href]") else {
        return Vec::new();
    };

    page.document
        .select(&anchors)
        .filter_map(|a| {
            let url = href_of(page, a)?;
            if url.host_str() != page.base.host_str() || !url.path().starts_with(prefix) {
                return None;
            }
            let name = text_of(a);
            (!name.is_empty()).then(|| ExtractedRecord::new(name, Some(url)))
        })
        .collect()
}

fn region_links(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    non_empty(path_links(page, "/region/"))
}

fn country_links(page: &Page<'_>) -> Vec<ExtractedRecord> {
    path_links(page, "/country/")
}

fn country_link(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    country_links(page).into_iter().next().map(|record| vec![record])
}

/// Infers the country from a `/region/<cc>/<slug>` canonical URL
fn canonical_country_code(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    let canonical = selector("link[rel='canonical'][href]")
        .and_then(|s| page.document.select(&s).next())
        .and_then(|link| link.value().attr("href"))
        .and_then(|href| absolutize(page.url, href))
        .unwrap_or_else(|| page.url.clone());

    let segments: Vec<&str> = canonical.path_segments()?.collect();
    let code = match segments.as_slice() {
        ["region", code, _, ..] if code.len() == 2 && code.chars().all(|c| c.is_ascii_lowercase()) => *code,
        _ => return None,
    };

    let name = selector(
        "nav[aria-label*='breadcrumb'] a[href], ol.breadcrumb a[href], ol[aria-label*='breadcrumb'] a[href]",
    )
    .and_then(|s| page.document.select(&s).last())
    .map(text_of)
    .filter(|name| !name.is_empty())
    .unwrap_or_else(|| code.to_uppercase());

    let url = page.base.join(&format!("/country/{}.html", code)).ok()?;
    Some(vec![ExtractedRecord::new(name, Some(url))])
}

/// Third breadcrumb entry, when it links somewhere
fn breadcrumb_country(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    let item = selector("nav ol li:nth-of-type(3)").and_then(|s| page.document.select(&s).next())?;
    let anchor = selector("a[href]").and_then(|s| item.select(&s).next())?;

    let url = href_of(page, anchor)?;
    let name = text_of(anchor);
    (!name.is_empty()).then(|| vec![ExtractedRecord::new(name, Some(url))])
}

/// Card records (name, url, about, image) inside a container
fn cards_in(page: &Page<'_>, block: ElementRef<'_>) -> Vec<ExtractedRecord> {
    let mut anchors: Vec<ElementRef<'_>> =
        selector(".bui-carousel__item a[href], a.bui-card[href], .bui-card a[href]")
            .map(|s| block.select(&s).collect())
            .unwrap_or_default();
    if anchors.is_empty() {
        anchors = selector("a[href]")
            .map(|s| block.select(&s).collect())
            .unwrap_or_default();
    }

    let content_sel = selector(".bui-card__content");
    let title_sel = selector("h3.bui-card__title");
    let subtitle_sel = selector("h4.bui-card__subtitle");
    let image_sel = selector(".bui-card__image-container img");
    let any_image_sel = selector("img");

    anchors
        .into_iter()
        .filter_map(|a| {
            let url = href_of(page, a)?;
            let content = content_sel.as_ref().and_then(|s| a.select(s).next());

            let title = content
                .zip(title_sel.as_ref())
                .and_then(|(c, s)| c.select(s).next())
                .map(text_of);
            let name = title
                .filter(|t| !t.is_empty())
                .or_else(|| content.map(text_of))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| text_of(a));
            if name.is_empty() {
                return None;
            }

            let about = content
                .zip(subtitle_sel.as_ref())
                .and_then(|(c, s)| c.select(s).next())
                .map(text_of)
                .unwrap_or_default();
            let image = image_of(
                image_sel
                    .as_ref()
                    .and_then(|s| a.select(s).next())
                    .or_else(|| any_image_sel.as_ref().and_then(|s| a.select(s).next())),
            );

            Some(
                ExtractedRecord::new(name, Some(url))
                    .with_attribute("about", about)
                    .with_attribute("image", image),
            )
        })
        .collect()
}

fn top_cities_container(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    let block = selector("[data-test-id='top-cities']").and_then(|s| page.document.select(&s).next())?;
    non_empty(cards_in(page, block))
}

fn city_aria_blocks(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    let labelled = selector("[aria-label]")?;
    let records: Vec<ExtractedRecord> = page
        .document
        .select(&labelled)
        .filter(|el| {
            let label = el.value().attr("aria-label").unwrap_or_default().to_lowercase();
            label.contains("top destinations for") || label.contains("check out these popular cities in")
        })
        .flat_map(|block| cards_in(page, block))
        .collect();
    non_empty(records)
}

fn top_regions_container(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    let block = selector("[data-test-id='top-regions']").and_then(|s| page.document.select(&s).next())?;
    non_empty(cards_in(page, block))
}

/// Cards in the first container following a "most popular regions" heading
fn popular_regions_heading(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    let headings = selector("h2, h3")?;
    let anchors = selector("a[href]")?;

    let heading = page.document.select(&headings).find(|h| {
        text_of(*h)
            .to_lowercase()
            .contains("hotels in the most popular regions in")
    })?;

    let following = heading.next_siblings().chain(
        heading
            .parent()
            .into_iter()
            .flat_map(|parent| parent.next_siblings()),
    );

    let container = following
        .filter_map(ElementRef::wrap)
        .take(8)
        .find(|el| el.select(&anchors).next().is_some())?;

    non_empty(cards_in(page, container))
}

/// True when the text contains the words "hotels in"
fn mentions_hotels_in(text: &str) -> bool {
    let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
    words.windows(2).any(|pair| pair[0] == "hotels" && pair[1] == "in")
}

fn hotels_in_link(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    let anchors = selector("a[href]")?;
    let spans = selector("span")?;

    let by_span = page
        .document
        .select(&anchors)
        .find(|a| a.select(&spans).any(|span| mentions_hotels_in(&text_of(span))));
    let anchor = by_span.or_else(|| {
        page.document
            .select(&anchors)
            .find(|a| mentions_hotels_in(&text_of(*a)))
    })?;

    let url = href_of(page, anchor)?;
    Some(vec![ExtractedRecord::new(text_of(anchor), Some(url))])
}

fn search_link(page: &Page<'_>, accept: impl Fn(&str) -> bool) -> Option<Vec<ExtractedRecord>> {
    let anchors = selector("a[href]")?;
    let anchor = page.document.select(&anchors).find(|a| {
        a.value()
            .attr("href")
            .is_some_and(|href| href.contains("searchresults") && accept(href))
    })?;

    let url = href_of(page, anchor)?;
    Some(vec![ExtractedRecord::new(text_of(anchor), Some(url))])
}

fn dest_search_link(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    search_link(page, |href| href.contains("dest_type=country") || href.contains("dest_id="))
}

fn search_query_link(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    search_link(page, |href| href.contains("ss="))
}

fn property_cards(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    let cards = selector("[data-testid='property-card']")?;
    let links = selector("a[data-testid='title-link'][href], h3 a[href], h2 a[href]")?;
    let titles = selector("[data-testid='title']")?;

    let records: Vec<ExtractedRecord> = page
        .document
        .select(&cards)
        .filter_map(|card| {
            let anchor = card.select(&links).next()?;
            let url = href_of(page, anchor)?;
            let name = card
                .select(&titles)
                .next()
                .map(text_of)
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| text_of(anchor));
            (!name.is_empty()).then(|| ExtractedRecord::new(name, Some(url)))
        })
        .collect();
    non_empty(records)
}

fn title_links(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    let links = selector("a[data-testid='title-link'][href]")?;
    let records: Vec<ExtractedRecord> = page
        .document
        .select(&links)
        .filter_map(|a| {
            let url = href_of(page, a)?;
            let name = text_of(a);
            (!name.is_empty() && url.path().contains("/hotel/")).then(|| ExtractedRecord::new(name, Some(url)))
        })
        .collect();
    non_empty(records)
}

fn hotel_paths(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    non_empty(path_links(page, "/hotel/"))
}

/// Site-specific pagination control, resolved against the current page
fn pagination_next(page: &Page<'_>) -> Option<Vec<ExtractedRecord>> {
    let next = selector(
        "[data-testid='pagination'] a[aria-label*='Next'][href], .bui-pagination__next-arrow a[href]",
    )?;
    let anchor = page.document.select(&next).next()?;
    let url = anchor.value().attr("href").and_then(|href| absolutize(page.url, href))?;
    Some(vec![ExtractedRecord::new("next", Some(url))])
}
