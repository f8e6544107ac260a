//! Crawler module for staged catalog traversal
//!
//! This module contains the core crawling logic, including:
//! - The task model and failure taxonomy
//! - Request identities and the retrying HTTP fetcher
//! - The listing pagination cursor
//! - The bounded stage worker pool
//! - The orchestrator that sequences the stages

mod fetcher;
mod identity;
mod orchestrator;
mod pagination;
mod pool;
mod task;

pub use fetcher::{build_http_client, classify_response, FetchClient, FetchPolicy, Verdict, RETRYABLE_STATUSES};
pub use identity::{Identity, IdentityProvider, RotatingIdentities};
pub use orchestrator::Orchestrator;
pub use pagination::{advance_offset, next_page_url, CursorStep, PaginationCursor, TerminalReason, DEFAULT_ROWS_PER_PAGE};
pub use pool::{CancelFlag, StagePool, StageReport};
pub use task::{CrawlTask, FailureKind, PageResult, StageKind, StageOutcome, StagePlan, TaskContext, TaskLedger};
