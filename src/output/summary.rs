//! Run summary and statistics
//!
//! The summary is assembled by the orchestrator at the end of a run and
//! printed by the binary.

use crate::crawler::FailureKind;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// What a run captured and what went wrong
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Distinct entities captured per level
    pub regions: usize,
    pub countries: usize,
    pub cities: usize,
    pub listings: usize,
    pub popular_regions: usize,

    /// Task failures by kind label
    pub failures: BTreeMap<String, usize>,

    /// Nodes in the output carrying an error marker
    pub failed_branches: usize,

    /// HTTP requests issued, retries included
    pub requests: u64,

    /// True if the run was interrupted before every stage drained
    pub cancelled: bool,

    pub output_path: String,
}

impl RunSummary {
    pub fn start(output_path: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            regions: 0,
            countries: 0,
            cities: 0,
            listings: 0,
            popular_regions: 0,
            failures: BTreeMap::new(),
            failed_branches: 0,
            requests: 0,
            cancelled: false,
            output_path: output_path.into(),
        }
    }

    pub fn record_failure(&mut self, kind: &FailureKind) {
        *self.failures.entry(kind.label().to_string()).or_insert(0) += 1;
    }

    pub fn total_failures(&self) -> usize {
        self.failures.values().sum()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }
}

/// Prints the summary to stdout in a formatted manner
pub fn print_summary(summary: &RunSummary) {
    println!("=== Crawl Summary ===\n");

    println!("Run:");
    println!("  Started:  {}", summary.started_at.to_rfc3339());
    if let Some(finished) = summary.finished_at {
        println!("  Finished: {}", finished.to_rfc3339());
    }
    if let Some(seconds) = summary.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    println!("  Requests: {}", summary.requests);
    if summary.cancelled {
        println!("  Status:   interrupted (partial output)");
    }
    println!();

    println!("Captured:");
    println!("  Regions:   {}", summary.regions);
    println!("  Countries: {}", summary.countries);
    if summary.cities > 0 || summary.popular_regions > 0 {
        println!("  Cities:    {}", summary.cities);
        println!("  Popular regions: {}", summary.popular_regions);
    }
    println!("  Listings:  {}", summary.listings);
    println!();

    if !summary.failures.is_empty() {
        println!("Failures:");
        let mut counts: Vec<_> = summary.failures.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (kind, count) in counts {
            println!("  {}: {}", kind, count);
        }
        println!("  Branches with errors: {}", summary.failed_branches);
        println!();
    }

    println!("Output written to {}", summary.output_path);
}
