//! Output module for the catalog tree
//!
//! This module handles:
//! - Accumulating stage results into one de-duplicated hierarchy
//! - Shaping the hierarchy into the JSON document
//! - Writing the document atomically
//! - Summarizing what a run captured

mod document;
mod summary;
mod tree;
mod writer;

pub use document::{build_document, CardDoc, CityDoc, CountryDoc, ListingDoc, RegionDoc};
pub use summary::{print_summary, RunSummary};
pub use tree::{dedupe_records, merge, Aggregator, BranchUpdate, ExpansionTarget, HierarchyNode};
pub use writer::JsonWriter;
