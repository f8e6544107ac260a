//! Serialized shape of the output file
//!
//! The JSON document is an array of regions. Which optional arrays appear
//! depends on the stages that ran: `listings` directly under countries, or
//! `cities` (each with optional `listings`) plus `popular_regions`.

use crate::crawler::StagePlan;
use crate::output::tree::HierarchyNode;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionDoc {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub countries: Vec<CountryDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryDoc {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listings: Option<Vec<ListingDoc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cities: Option<Vec<CityDoc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popular_regions: Option<Vec<CardDoc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityDoc {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listings: Option<Vec<ListingDoc>>,
}

/// Popular region card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardDoc {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingDoc {
    pub name: String,
    pub url: String,
}

/// Builds the output document from the tree
///
/// Regions are sorted by name (then URL) for deterministic output; every
/// nested list keeps its first-extracted order.
pub fn build_document(regions: &[HierarchyNode], plan: StagePlan) -> Vec<RegionDoc> {
    let mut docs: Vec<RegionDoc> = regions
        .iter()
        .map(|region| RegionDoc {
            name: region.name.clone(),
            url: region.url.clone(),
            error: region.failure.clone(),
            countries: region.children.iter().map(|c| country_doc(c, plan)).collect(),
        })
        .collect();

    docs.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.url.cmp(&b.url))
    });
    docs
}

fn country_doc(country: &HierarchyNode, plan: StagePlan) -> CountryDoc {
    let (listings, cities, popular_regions): (
        Option<Vec<ListingDoc>>,
        Option<Vec<CityDoc>>,
        Option<Vec<CardDoc>>,
    ) = if plan.cities {
        (
            None,
            Some(country.children.iter().map(|c| city_doc(c, plan)).collect()),
            Some(country.related.iter().map(card_doc).collect()),
        )
    } else if plan.listings {
        (Some(country.children.iter().map(listing_doc).collect()), None, None)
    } else {
        (None, None, None)
    };

    CountryDoc {
        name: country.name.clone(),
        url: country.url.clone(),
        error: country.failure.clone(),
        listings,
        cities,
        popular_regions,
    }
}

fn city_doc(city: &HierarchyNode, plan: StagePlan) -> CityDoc {
    CityDoc {
        name: city.name.clone(),
        url: city.url.clone(),
        about: city.attributes.get("about").cloned(),
        image: city.attributes.get("image").cloned(),
        error: city.failure.clone(),
        listings: plan
            .listings
            .then(|| city.children.iter().map(listing_doc).collect()),
    }
}

fn card_doc(node: &HierarchyNode) -> CardDoc {
    CardDoc {
        name: node.name.clone(),
        url: node.url.clone(),
        image: node.attributes.get("image").cloned(),
    }
}

fn listing_doc(node: &HierarchyNode) -> ListingDoc {
    ListingDoc {
        name: node.name.clone(),
        url: node.url.clone(),
    }
}
