use crate::crawler::{StageKind, StagePlan};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Desktop browser user agents rotated across retries
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
];

/// Main configuration structure for Atlas-Walker
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub fetch: FetchConfig,
    pub site: SiteConfig,
    pub identity: IdentityConfig,
    pub output: OutputConfig,
}

/// Traversal shape and fan-out limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of tasks in flight within one stage
    pub concurrency: usize,

    /// Maximum number of regions taken from the catalog page (0 = unlimited)
    pub max_regions: usize,

    /// Maximum number of countries kept per region (0 = unlimited)
    pub max_countries: usize,

    /// Maximum number of listing pages fetched per branch (0 = unlimited)
    pub max_pages: usize,

    /// Ordered list of stages to run
    pub stages: Vec<StageKind>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: 6,
            max_regions: 0,
            max_countries: 0,
            max_pages: 0,
            stages: vec![StageKind::Regions, StageKind::Countries, StageKind::Listings],
        }
    }
}

impl CrawlerConfig {
    pub fn region_limit(&self) -> Option<usize> {
        non_zero(self.max_regions)
    }

    pub fn country_limit(&self) -> Option<usize> {
        non_zero(self.max_countries)
    }

    pub fn page_limit(&self) -> Option<usize> {
        non_zero(self.max_pages)
    }

    /// Resolves the configured stage list into a plan
    ///
    /// Returns `None` when the list is not one of the supported shapes.
    pub fn plan(&self) -> Option<StagePlan> {
        StagePlan::from_stages(&self.stages)
    }
}

fn non_zero(limit: usize) -> Option<usize> {
    (limit > 0).then_some(limit)
}

/// Retry, pacing and timeout settings for the fetcher
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Number of retries after the first attempt
    pub max_retries: u32,

    /// Lower bound of the random delay applied before every attempt
    pub delay_min_ms: u64,

    /// Upper bound of the random delay applied before every attempt
    pub delay_max_ms: u64,

    /// Base of the exponential retry backoff
    pub backoff_base_ms: u64,

    /// Ceiling for a single backoff sleep
    pub backoff_max_ms: u64,

    /// 200 responses shorter than this are treated as interstitials
    pub min_body_bytes: usize,

    pub timeout_secs: u64,

    pub connect_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay_min_ms: 600,
            delay_max_ms: 1600,
            backoff_base_ms: 600,
            backoff_max_ms: 30_000,
            min_body_bytes: 1000,
            timeout_secs: 25,
            connect_timeout_secs: 10,
        }
    }
}

impl FetchConfig {
    pub fn delay_window(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.delay_min_ms),
            Duration::from_millis(self.delay_max_ms),
        )
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// The catalog site being walked
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Origin every extracted link is absolutized against
    pub base_url: String,

    /// Path of the page listing every region
    pub catalog_path: String,

    /// Path used to synthesize a search URL when a country exposes no browse link
    pub search_path: String,

    /// Language passed to synthesized search URLs
    pub language: String,

    /// Page size assumed when an offset-paginated URL carries no `rows` parameter
    pub rows_per_page: u32,

    /// Paths visited once per run to collect session cookies
    pub bootstrap_paths: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.booking.com".to_string(),
            catalog_path: "/region.html".to_string(),
            search_path: "/searchresults.html".to_string(),
            language: "en-us".to_string(),
            rows_per_page: 25,
            bootstrap_paths: Vec::new(),
        }
    }
}

impl SiteConfig {
    pub fn base(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)
    }

    pub fn catalog_url(&self) -> Result<Url, url::ParseError> {
        self.base()?.join(&self.catalog_path)
    }
}

/// Outgoing request identities
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IdentityConfig {
    pub user_agents: Vec<String>,
    pub accept_language: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            accept_language: "en-GB,en;q=0.9".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path of the JSON document
    pub path: String,

    /// Rewrite the document after every stage transition
    pub checkpoint: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "booking_hierarchy.json".to_string(),
            checkpoint: true,
        }
    }
}
