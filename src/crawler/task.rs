//! Task model shared by the fetcher, the worker pool, and the orchestrator

use crate::url::url_key;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use url::Url;

/// One level of the catalog hierarchy, processed as a bounded batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Regions,
    Countries,
    Cities,
    Listings,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regions => "regions",
            Self::Countries => "countries",
            Self::Cities => "cities",
            Self::Listings => "listings",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which optional stages run after regions and countries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub cities: bool,
    pub listings: bool,
}

impl StagePlan {
    /// Accepts `[regions, countries]` optionally followed by `cities`
    /// and/or `listings`, in that order.
    pub fn from_stages(stages: &[StageKind]) -> Option<Self> {
        use StageKind::*;

        match stages {
            [Regions, Countries] => Some(Self { cities: false, listings: false }),
            [Regions, Countries, Listings] => Some(Self { cities: false, listings: true }),
            [Regions, Countries, Cities] => Some(Self { cities: true, listings: false }),
            [Regions, Countries, Cities, Listings] => Some(Self { cities: true, listings: true }),
            _ => None,
        }
    }

    pub fn stages(&self) -> Vec<StageKind> {
        let mut stages = vec![StageKind::Regions, StageKind::Countries];
        if self.cities {
            stages.push(StageKind::Cities);
        }
        if self.listings {
            stages.push(StageKind::Listings);
        }
        stages
    }

    /// Tree depth whose nodes are expanded by the listings stage
    pub fn listing_parent_depth(&self) -> usize {
        if self.cities {
            2
        } else {
            1
        }
    }
}

/// Per-task metadata carried alongside the URL
#[derive(Debug, Clone, PartialEq)]
pub struct TaskContext {
    /// Page that linked to this one, sent as `Referer`
    pub referer: Option<Url>,

    /// Depth of the node being expanded (regions are depth 0)
    pub depth: usize,

    /// Display name of the node being expanded
    pub label: String,
}

/// One page to fetch and process within a stage
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlTask {
    pub stage: StageKind,
    pub url: Url,

    /// Canonical key of the node whose children this task produces
    pub parent_key: String,

    pub context: TaskContext,
}

impl CrawlTask {
    /// Identity used for de-duplication: `(stage, canonical URL)`
    pub fn dedup_key(&self) -> (StageKind, String) {
        (self.stage, url_key(&self.url))
    }
}

/// Output of a single logical fetch for a task
#[derive(Debug)]
pub struct PageResult {
    pub task: CrawlTask,
    pub outcome: Result<String, FailureKind>,
}

/// Result of running one task through a stage handler
#[derive(Debug)]
pub struct StageOutcome<P> {
    pub task: CrawlTask,
    pub result: Result<P, FailureKind>,
}

/// Classified task failure
///
/// These are values attached to branches of the tree, never errors that
/// abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureKind {
    /// Transport-level failure (timeout, reset, refused) past the retry budget
    #[error("unreachable: {reason}")]
    Unreachable { reason: String },

    /// Retryable statuses or suspect bodies persisted past the retry budget
    #[error("exhausted {attempts} attempts, last: {last}")]
    ExhaustedRetries { attempts: u32, last: String },

    /// Non-retryable status
    #[error("not found (HTTP {status})")]
    NotFound { status: u16 },

    /// Page fetched but no extraction rule matched
    #[error("no records matched any extraction rule")]
    ExtractionEmpty,

    /// Pagination produced a URL already visited by the same chain
    #[error("pagination loop at {url}")]
    CycleGuard { url: String },

    /// Never issued because the run was interrupted
    #[error("cancelled before it was issued")]
    Cancelled,

    #[error("worker panicked: {0}")]
    WorkerPanic(String),
}

impl FailureKind {
    /// Stable label used in summaries
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "unreachable",
            Self::ExhaustedRetries { .. } => "exhausted_retries",
            Self::NotFound { .. } => "not_found",
            Self::ExtractionEmpty => "extraction_empty",
            Self::CycleGuard { .. } => "cycle_guard",
            Self::Cancelled => "cancelled",
            Self::WorkerPanic(_) => "worker_panic",
        }
    }
}

/// Remembers which tasks were already issued during a run
#[derive(Debug, Default)]
pub struct TaskLedger {
    issued: HashSet<(StageKind, String)>,
}

impl TaskLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time a `(stage, canonical URL)` pair is seen
    pub fn admit(&mut self, task: &CrawlTask) -> bool {
        self.issued.insert(task.dedup_key())
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}
