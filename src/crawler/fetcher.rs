//! HTTP fetcher implementation
//!
//! This module handles every HTTP request of a run, including:
//! - Building the shared connection pool with browser-like defaults
//! - Jittered pacing before each attempt
//! - Exponential backoff with multiplicative jitter between retries
//! - Identity rotation on retry
//! - Treating suspiciously short 200 responses as interstitials
//! - Classifying failures into [`FailureKind`]

use crate::config::{Config, FetchConfig};
use crate::crawler::identity::{IdentityProvider, RotatingIdentities};
use crate::crawler::task::{CrawlTask, FailureKind, PageResult};
use crate::AtlasError;
use reqwest::header::{REFERER, USER_AGENT};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

/// Statuses that are retried rather than failed immediately
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Multiplicative jitter applied to each backoff sleep
const BACKOFF_JITTER: (f64, f64) = (0.85, 1.15);

/// Retry and pacing rules for a single logical fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub delay_min: Duration,
    pub delay_max: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub min_body_bytes: usize,
}

impl FetchPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        let (delay_min, delay_max) = config.delay_window();
        Self {
            max_retries: config.max_retries,
            delay_min,
            delay_max,
            backoff_base: config.backoff_base(),
            backoff_max: config.backoff_max(),
            min_body_bytes: config.min_body_bytes,
        }
    }

    /// Total number of requests one fetch may issue
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Uniform random delay in `[delay_min, delay_max]`
    pub fn pacing_delay(&self) -> Duration {
        let min = self.delay_min.as_millis() as u64;
        let max = self.delay_max.as_millis() as u64;
        if max <= min {
            return self.delay_min;
        }
        Duration::from_millis(rand::random_range(min..=max))
    }

    /// Backoff before retry number `retry` (1-based), without jitter
    pub fn backoff_ceiling(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let scaled = self.backoff_base.saturating_mul(1u32 << exponent);
        scaled.min(self.backoff_max)
    }

    /// Backoff before retry number `retry` with multiplicative jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = rand::random_range(BACKOFF_JITTER.0..=BACKOFF_JITTER.1);
        self.backoff_ceiling(retry).mul_f64(factor)
    }
}

/// How a single response is treated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Usable page body
    Accept,
    /// Worth another attempt; carries a short description
    Retry(String),
    /// Permanent failure
    Reject(FailureKind),
}

/// Classifies a response by status and body length
pub fn classify_response(status: StatusCode, body_len: usize, min_body_bytes: usize) -> Verdict {
    if status.is_success() {
        if body_len < min_body_bytes {
            return Verdict::Retry(format!("short body ({} bytes)", body_len));
        }
        return Verdict::Accept;
    }

    if RETRYABLE_STATUSES.contains(&status.as_u16()) {
        return Verdict::Retry(format!("HTTP {}", status.as_u16()));
    }

    Verdict::Reject(FailureKind::NotFound {
        status: status.as_u16(),
    })
}

/// Last thing that went wrong during a fetch
enum LastFailure {
    Transport(String),
    Response(String),
}

/// Builds the shared HTTP client
///
/// The idle pool is sized to the stage concurrency so that every worker
/// can keep its connection alive between requests.
pub fn build_http_client(config: &FetchConfig, pool_size: usize) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .pool_max_idle_per_host(pool_size.max(1))
        .redirect(Policy::limited(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Per-run client context
///
/// Holds the connection pool, the identity pool, and the retry policy.
/// `FetchClient` is `Send + Sync` and is shared behind an `Arc` by every
/// worker; none of its methods need external locking.
pub struct FetchClient {
    http: Client,
    identities: Arc<dyn IdentityProvider>,
    policy: FetchPolicy,
    default_referer: Option<Url>,
    bootstrapped: OnceCell<()>,
    requests: AtomicU64,
}

impl FetchClient {
    pub fn new(http: Client, identities: Arc<dyn IdentityProvider>, policy: FetchPolicy) -> Self {
        Self {
            http,
            identities,
            policy,
            default_referer: None,
            bootstrapped: OnceCell::new(),
            requests: AtomicU64::new(0),
        }
    }

    /// Builds the client context described by a configuration
    pub fn from_config(config: &Config) -> Result<Self, AtlasError> {
        let http = build_http_client(&config.fetch, config.crawler.concurrency)?;
        let identities = Arc::new(RotatingIdentities::from_config(&config.identity));
        let policy = FetchPolicy::from_config(&config.fetch);
        let referer = config.site.base()?;

        Ok(Self::new(http, identities, policy).with_default_referer(referer))
    }

    /// Referer sent when the caller does not provide one
    pub fn with_default_referer(mut self, referer: Url) -> Self {
        self.default_referer = Some(referer);
        self
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Number of HTTP requests issued so far, retries included
    pub fn requests_sent(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Visits the bootstrap pages once to collect session cookies
    ///
    /// Later calls are no-ops. Failures are logged and ignored.
    pub async fn bootstrap(&self, base: &Url, paths: &[String]) {
        self.bootstrapped
            .get_or_init(|| async {
                for path in paths {
                    let Ok(url) = base.join(path) else {
                        tracing::warn!("Skipping invalid bootstrap path {}", path);
                        continue;
                    };

                    let identity = self.identities.primary();
                    self.requests.fetch_add(1, Ordering::Relaxed);
                    match self
                        .http
                        .get(url.clone())
                        .header(USER_AGENT, identity.user_agent.as_str())
                        .send()
                        .await
                    {
                        Ok(response) => {
                            tracing::debug!("Bootstrap {} -> {}", url, response.status())
                        }
                        Err(e) => tracing::warn!("Bootstrap request to {} failed: {}", url, e),
                    }
                }
            })
            .await;
    }

    /// Fetches the page behind a task, using its referer
    pub async fn fetch_task(&self, task: &CrawlTask) -> PageResult {
        let outcome = self.fetch(&task.url, task.context.referer.as_ref()).await;
        PageResult {
            task: task.clone(),
            outcome,
        }
    }

    /// Issues one logical GET with retries
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx, body >= min length | Return body |
    /// | 2xx, body < min length | Retry, then ExhaustedRetries |
    /// | 429, 500, 502, 503, 504 | Retry, then ExhaustedRetries |
    /// | Other status | Immediate NotFound |
    /// | Timeout / connect / reset | Retry, then Unreachable |
    ///
    /// Every attempt is preceded by the pacing delay; retries additionally
    /// wait for the jittered backoff and switch identity.
    pub async fn fetch(&self, url: &Url, referer: Option<&Url>) -> Result<String, FailureKind> {
        let referer = referer.or(self.default_referer.as_ref());
        let attempts = self.policy.max_attempts();
        let mut last_failure = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = self.policy.backoff(attempt);
                tracing::debug!(
                    "Retry {}/{} for {} in {:?}",
                    attempt,
                    self.policy.max_retries,
                    url,
                    backoff
                );
                sleep_unless_zero(backoff).await;
            }
            sleep_unless_zero(self.policy.pacing_delay()).await;

            let identity = if attempt == 0 {
                self.identities.primary()
            } else {
                self.identities.next_identity()
            };

            let mut request = self
                .http
                .get(url.clone())
                .header(USER_AGENT, identity.user_agent.as_str());
            for (name, value) in &identity.headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if let Some(referer) = referer {
                request = request.header(REFERER, referer.as_str());
            }

            self.requests.fetch_add(1, Ordering::Relaxed);
            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::trace!("Attempt {} for {} failed: {}", attempt + 1, url, e);
                    last_failure = Some(LastFailure::Transport(describe_transport_error(&e)));
                    continue;
                }
            };

            let status = response.status();
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    last_failure = Some(LastFailure::Transport(describe_transport_error(&e)));
                    continue;
                }
            };

            match classify_response(status, body.len(), self.policy.min_body_bytes) {
                Verdict::Accept => {
                    tracing::trace!("Fetched {} ({} bytes)", url, body.len());
                    return Ok(body);
                }
                Verdict::Retry(reason) => {
                    tracing::trace!("Attempt {} for {}: {}", attempt + 1, url, reason);
                    last_failure = Some(LastFailure::Response(reason));
                }
                Verdict::Reject(kind) => return Err(kind),
            }
        }

        Err(match last_failure {
            Some(LastFailure::Response(last)) => FailureKind::ExhaustedRetries { attempts, last },
            Some(LastFailure::Transport(reason)) => FailureKind::Unreachable { reason },
            None => FailureKind::Unreachable {
                reason: "no attempt was made".to_string(),
            },
        })
    }
}

async fn sleep_unless_zero(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timeout".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    }
}
