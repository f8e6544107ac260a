//! Traversal orchestrator
//!
//! Sequences the stages of a run:
//! - Regions: one fetch of the catalog root
//! - Countries: one task per region page
//! - Cities (optional): one task per country page
//! - Listings (optional): one task per country or city, each paging
//!   serially through its results
//!
//! Stages are separated by a barrier: the next stage only starts once the
//! previous pool has drained and its results are folded into the tree.

use crate::config::{validate, Config};
use crate::crawler::fetcher::FetchClient;
use crate::crawler::pagination::{CursorStep, PaginationCursor, TerminalReason};
use crate::crawler::pool::{CancelFlag, StagePool};
use crate::crawler::task::{CrawlTask, FailureKind, StageKind, StagePlan, TaskContext, TaskLedger};
use crate::extract::{CatalogExtractor, ExtractedRecord, Extractor, LinkRel, PageKind};
use crate::output::{
    build_document, dedupe_records, Aggregator, BranchUpdate, JsonWriter, RunSummary,
};
use crate::{AtlasError, ConfigError, Result};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use url::Url;

/// Shared, read-only state handed to every stage worker
struct StageContext {
    client: Arc<FetchClient>,
    extractor: Arc<dyn Extractor>,
    cancel: CancelFlag,
    country_limit: Option<usize>,
    page_limit: Option<usize>,
    rows_per_page: u32,
    search_base: Url,
    language: String,
}

/// Drives a complete run
pub struct Orchestrator {
    plan: StagePlan,
    concurrency: usize,
    region_limit: Option<usize>,
    base: Url,
    root: Url,
    bootstrap_paths: Vec<String>,
    checkpoint: bool,
    writer: JsonWriter,
    context: Arc<StageContext>,
}

impl Orchestrator {
    /// Builds an orchestrator with the default HTTP client and extractor
    pub fn new(config: Config) -> Result<Self> {
        validate(&config)?;
        let client = FetchClient::from_config(&config)?;
        let extractor = Arc::new(CatalogExtractor::new(config.site.base()?));
        Self::with_parts(config, client, extractor)
    }

    /// Builds an orchestrator around a caller-provided client and extractor
    pub fn with_parts(config: Config, client: FetchClient, extractor: Arc<dyn Extractor>) -> Result<Self> {
        validate(&config)?;
        let plan = config
            .crawler
            .plan()
            .ok_or_else(|| ConfigError::Validation("unsupported stage list".to_string()))?;
        let base = config.site.base()?;
        let root = config.site.catalog_url()?;
        let search_base = base.join(&config.site.search_path)?;

        let context = StageContext {
            client: Arc::new(client),
            extractor,
            cancel: CancelFlag::new(),
            country_limit: config.crawler.country_limit(),
            page_limit: config.crawler.page_limit(),
            rows_per_page: config.site.rows_per_page,
            search_base,
            language: config.site.language.clone(),
        };

        Ok(Self {
            plan,
            concurrency: config.crawler.concurrency,
            region_limit: config.crawler.region_limit(),
            base,
            root,
            bootstrap_paths: config.site.bootstrap_paths.clone(),
            checkpoint: config.output.checkpoint,
            writer: JsonWriter::new(&config.output.path),
            context: Arc::new(context),
        })
    }

    /// Flag that interrupts the run when set
    pub fn cancel_flag(&self) -> CancelFlag {
        self.context.cancel.clone()
    }

    pub fn plan(&self) -> StagePlan {
        self.plan
    }

    /// Runs every planned stage and writes the output document
    ///
    /// Only a failure to fetch the catalog root, or to write the final
    /// document, is returned as an error. Everything else is attached to
    /// the affected branch and counted in the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::start(self.writer.path().display().to_string());
        let mut aggregator = Aggregator::new();
        let mut ledger = TaskLedger::new();

        tracing::info!(
            "Starting run: stages {:?}, concurrency {}",
            self.plan.stages(),
            self.concurrency
        );

        self.context
            .client
            .bootstrap(&self.base, &self.bootstrap_paths)
            .await;

        let regions = self.discover_regions(&mut aggregator, &mut summary).await?;
        tracing::info!("Stage regions complete: {} regions", regions);
        self.write_checkpoint(&aggregator);

        self.expand(StageKind::Countries, 0, &mut aggregator, &mut ledger, &mut summary, |ctx, task| async move {
            ctx.countries_of(task).await
        })
        .await;

        if self.plan.cities {
            self.expand(StageKind::Cities, 1, &mut aggregator, &mut ledger, &mut summary, |ctx, task| async move {
                ctx.cities_of(task).await
            })
            .await;
        }

        if self.plan.listings {
            let depth = self.plan.listing_parent_depth();
            self.expand(StageKind::Listings, depth, &mut aggregator, &mut ledger, &mut summary, |ctx, task| async move {
                ctx.listings_of(task).await
            })
            .await;
        }

        summary.regions = aggregator.regions().len();
        summary.countries = aggregator.distinct_at(1);
        if self.plan.cities {
            summary.cities = aggregator.distinct_at(2);
            summary.popular_regions = aggregator.distinct_related_at(1);
        }
        if self.plan.listings {
            summary.listings = aggregator.distinct_at(self.plan.listing_parent_depth() + 1);
        }
        summary.failed_branches = aggregator.failed_branches();
        summary.requests = self.context.client.requests_sent();
        summary.cancelled |= self.context.cancel.is_cancelled();

        self.writer.write(&build_document(aggregator.regions(), self.plan))?;
        summary.finish();

        tracing::info!(
            "Run complete: {} regions, {} countries, {} listings, {} failures",
            summary.regions,
            summary.countries,
            summary.listings,
            summary.total_failures()
        );

        Ok(summary)
    }

    /// Fetches the catalog root and installs the region list
    async fn discover_regions(&self, aggregator: &mut Aggregator, summary: &mut RunSummary) -> Result<usize> {
        tracing::info!("Fetching catalog {}", self.root);

        let body = self
            .context
            .client
            .fetch(&self.root, Some(&self.base))
            .await
            .map_err(|kind| AtlasError::RootUnavailable {
                url: self.root.to_string(),
                kind,
            })?;

        let extraction = self
            .context
            .extractor
            .extract(&body, &self.root, PageKind::Catalog);
        let mut count = aggregator.set_regions(extraction.records);

        if let Some(limit) = self.region_limit {
            aggregator.truncate_regions(limit);
            count = aggregator.regions().len();
        }

        if count == 0 {
            let kind = FailureKind::ExtractionEmpty;
            tracing::warn!("[{} failed] catalog {} -> {}", StageKind::Regions, self.root, kind);
            summary.record_failure(&kind);
        }

        Ok(count)
    }

    /// Runs one stage over every healthy node at `depth`
    async fn expand<F, Fut>(
        &self,
        stage: StageKind,
        depth: usize,
        aggregator: &mut Aggregator,
        ledger: &mut TaskLedger,
        summary: &mut RunSummary,
        handler: F,
    ) where
        F: Fn(Arc<StageContext>, CrawlTask) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<BranchUpdate, FailureKind>> + Send + 'static,
    {
        let mut updates: HashMap<String, BranchUpdate> = HashMap::new();
        let mut tasks = Vec::new();

        for target in aggregator.expansion_targets(depth) {
            let Some(url) = target.url else {
                let kind = FailureKind::Unreachable {
                    reason: "entity has no page URL".to_string(),
                };
                tracing::warn!("[{} failed] {} (no url) -> {}", stage, target.name, kind);
                summary.record_failure(&kind);
                updates.insert(target.key, BranchUpdate::failed(kind));
                continue;
            };

            let task = CrawlTask {
                stage,
                url,
                parent_key: target.key,
                context: TaskContext {
                    referer: target.parent_url.or_else(|| Some(self.root.clone())),
                    depth,
                    label: target.name,
                },
            };

            if ledger.admit(&task) {
                tasks.push(task);
            } else {
                tracing::debug!("Skipping duplicate {} task for {}", stage, task.url);
            }
        }

        tracing::info!("Stage {} starting: {} tasks", stage, tasks.len());

        let context = Arc::clone(&self.context);
        let pool = StagePool::new(self.concurrency, self.context.cancel.clone());
        let report = pool
            .run(stage, tasks, move |task| handler(Arc::clone(&context), task))
            .await;

        let succeeded = report.succeeded();
        let total = report.outcomes.len();

        for outcome in report.outcomes {
            let update = match outcome.result {
                Ok(update) => update,
                Err(kind) => BranchUpdate::failed(kind),
            };

            if let Some(kind) = &update.failure {
                tracing::warn!(
                    "[{} failed] {} {} -> {}",
                    stage,
                    outcome.task.context.label,
                    outcome.task.url,
                    kind
                );
                summary.record_failure(kind);
                if *kind == FailureKind::Cancelled {
                    summary.cancelled = true;
                }
            }

            updates.insert(outcome.task.parent_key, update);
        }

        aggregator.apply(depth, &updates);

        tracing::info!(
            "Stage {} complete: {}/{} tasks succeeded, peak {} in flight",
            stage,
            succeeded,
            total,
            report.peak_in_flight
        );

        self.write_checkpoint(aggregator);
    }

    /// Writes the partial tree; failures are logged and ignored
    fn write_checkpoint(&self, aggregator: &Aggregator) {
        if !self.checkpoint {
            return;
        }
        if let Err(e) = self.writer.write(&build_document(aggregator.regions(), self.plan)) {
            tracing::warn!("Checkpoint write to {} failed: {}", self.writer.path().display(), e);
        }
    }
}

impl StageContext {
    async fn fetch_page(&self, task: &CrawlTask) -> std::result::Result<String, FailureKind> {
        self.client.fetch_task(task).await.outcome
    }

    /// Region page: owning country plus any extra country links
    async fn countries_of(&self, task: CrawlTask) -> std::result::Result<BranchUpdate, FailureKind> {
        let body = self.fetch_page(&task).await?;
        let extraction = self.extractor.extract(&body, &task.url, PageKind::Region);

        let candidates: Vec<ExtractedRecord> = extraction.links(LinkRel::Candidate).cloned().collect();
        let mut countries = dedupe_records(extraction.records.into_iter().chain(candidates));
        if let Some(limit) = self.country_limit {
            countries.truncate(limit);
        }

        if countries.is_empty() {
            return Err(FailureKind::ExtractionEmpty);
        }

        Ok(BranchUpdate {
            children: countries,
            ..BranchUpdate::default()
        })
    }

    /// Country page: city cards plus popular regions
    async fn cities_of(&self, task: CrawlTask) -> std::result::Result<BranchUpdate, FailureKind> {
        let body = self.fetch_page(&task).await?;
        let extraction = self.extractor.extract(&body, &task.url, PageKind::Country);

        let related: Vec<ExtractedRecord> = extraction.links(LinkRel::Related).cloned().collect();
        let cities = dedupe_records(extraction.records);
        let failure = cities.is_empty().then_some(FailureKind::ExtractionEmpty);

        Ok(BranchUpdate {
            children: cities,
            related: dedupe_records(related),
            failure,
        })
    }

    /// Country or city: resolve the listing entry point, then page through it
    async fn listings_of(&self, task: CrawlTask) -> std::result::Result<BranchUpdate, FailureKind> {
        let parent_kind = if task.context.depth >= 2 {
            PageKind::City
        } else {
            PageKind::Country
        };

        let body = self.fetch_page(&task).await?;
        let extraction = self.extractor.extract(&body, &task.url, parent_kind);

        let (start, first_body) = match extraction.first_link(LinkRel::Browse) {
            Some(browse) => (browse.clone(), None),
            None if parent_kind == PageKind::Country => {
                let search = self.search_url(&task.context.label);
                tracing::debug!("No browse link on {}, searching {}", task.url, search);
                (search, None)
            }
            None => (task.url.clone(), Some(body)),
        };

        self.paginate(&task, start, first_body).await
    }

    /// Search URL built from an entity name
    fn search_url(&self, name: &str) -> Url {
        let mut url = self.search_base.clone();
        url.query_pairs_mut()
            .append_pair("ss", name)
            .append_pair("ssne", name)
            .append_pair("ssne_untouched", name)
            .append_pair("lang", &self.language);
        url
    }

    /// Walks one listing chain serially
    ///
    /// A failure after the first page keeps what was collected so far.
    async fn paginate(
        &self,
        task: &CrawlTask,
        start: Url,
        mut pending_body: Option<String>,
    ) -> std::result::Result<BranchUpdate, FailureKind> {
        let mut cursor = PaginationCursor::new(start, self.page_limit, self.rows_per_page);
        let mut referer = task.url.clone();
        let mut seen = HashSet::new();
        let mut listings = Vec::new();
        let mut failure = None;

        loop {
            let body = match pending_body.take() {
                Some(body) => body,
                None => {
                    if cursor.page_index() > 0 && self.cancel.is_cancelled() {
                        failure = Some(FailureKind::Cancelled);
                        break;
                    }
                    match self.client.fetch(cursor.current_url(), Some(&referer)).await {
                        Ok(body) => body,
                        Err(kind) if cursor.page_index() == 0 => return Err(kind),
                        Err(kind) => {
                            failure = Some(kind);
                            break;
                        }
                    }
                }
            };

            let extraction = self
                .extractor
                .extract(&body, cursor.current_url(), PageKind::Listing);
            let hint = extraction.next_page_hint().cloned();

            let before = listings.len();
            listings.extend(
                extraction
                    .records
                    .into_iter()
                    .filter(|record| seen.insert(record.key())),
            );
            let added = listings.len() - before;

            tracing::trace!(
                "{} page {} of {}: {} new listings",
                task.context.label,
                cursor.page_index() + 1,
                cursor.current_url(),
                added
            );

            if added == 0 && cursor.page_index() > 0 {
                tracing::debug!("No new listings on {}, stopping", cursor.current_url());
                break;
            }

            referer = cursor.current_url().clone();
            match cursor.advance(&body, hint.as_ref()) {
                CursorStep::Next(_) => continue,
                CursorStep::Terminal(TerminalReason::Revisit) => {
                    failure = Some(FailureKind::CycleGuard {
                        url: cursor.current_url().to_string(),
                    });
                    break;
                }
                CursorStep::Terminal(reason) => {
                    tracing::trace!("Pagination for {} ended: {:?}", task.context.label, reason);
                    break;
                }
            }
        }

        if listings.is_empty() && failure.is_none() {
            failure = Some(FailureKind::ExtractionEmpty);
        }

        Ok(BranchUpdate {
            children: listings,
            related: Vec::new(),
            failure,
        })
    }
}
