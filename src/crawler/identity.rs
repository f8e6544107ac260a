//! Outgoing request identities
//!
//! The fetcher asks an [`IdentityProvider`] for the user agent and header
//! profile of every attempt. Retries switch to a different profile so that
//! repeated failures are not all tied to the same fingerprint.

use crate::config::IdentityConfig;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A user agent plus the headers a browser with that agent would send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_agent: String,
    pub headers: BTreeMap<String, String>,
}

/// Source of request identities
///
/// Implementations are shared by every worker and must be safe to call
/// concurrently.
pub trait IdentityProvider: Send + Sync {
    /// Identity for a new (non-retry) request
    fn primary(&self) -> Identity {
        self.next_identity()
    }

    /// Identity for the next retry
    fn next_identity(&self) -> Identity;
}

/// Round-robin pool of browser header profiles
#[derive(Debug)]
pub struct RotatingIdentities {
    profiles: Vec<Identity>,
    cursor: AtomicUsize,
}

impl RotatingIdentities {
    /// Builds one profile per user agent
    ///
    /// An empty list yields a single profile with an empty user agent;
    /// configuration validation rejects that case before a run starts.
    pub fn new(user_agents: &[String], accept_language: &str) -> Self {
        let mut profiles: Vec<Identity> = user_agents
            .iter()
            .map(|ua| browser_profile(ua, accept_language))
            .collect();

        if profiles.is_empty() {
            profiles.push(browser_profile("", accept_language));
        }

        Self {
            profiles,
            cursor: AtomicUsize::new(1),
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(&config.user_agents, &config.accept_language)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl IdentityProvider for RotatingIdentities {
    fn primary(&self) -> Identity {
        self.profiles[0].clone()
    }

    fn next_identity(&self) -> Identity {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.profiles.len();
        self.profiles[index].clone()
    }
}

/// Navigation headers matching the platform the user agent claims
fn browser_profile(user_agent: &str, accept_language: &str) -> Identity {
    let platform = if user_agent.contains("Windows") {
        "\"Windows\""
    } else if user_agent.contains("Macintosh") {
        "\"macOS\""
    } else {
        "\"Linux\""
    };

    let mut headers = BTreeMap::new();
    headers.insert(
        "Accept".to_string(),
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
    );
    headers.insert("Accept-Language".to_string(), accept_language.to_string());
    headers.insert("Upgrade-Insecure-Requests".to_string(), "1".to_string());
    headers.insert("Sec-Fetch-Site".to_string(), "same-origin".to_string());
    headers.insert("Sec-Fetch-Mode".to_string(), "navigate".to_string());
    headers.insert("Sec-Fetch-Dest".to_string(), "document".to_string());
    headers.insert("Sec-Ch-Ua-Mobile".to_string(), "?0".to_string());
    headers.insert("Sec-Ch-Ua-Platform".to_string(), platform.to_string());

    Identity {
        user_agent: user_agent.to_string(),
        headers,
    }
}
