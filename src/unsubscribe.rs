//! `List-Unsubscribe` harvesting and best-effort opt-out
//!
//! Links are pulled from the `<...>` tokens of the header. `mailto:` links
//! are only reported, since there is no outbound mail transport here; web
//! links are fetched once with a short timeout. Every link records its own
//! outcome and none of them can fail the whole run.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::MailClient;
use crate::error::{CleanupError, Result};
use crate::models::{sample, SAMPLE_SIZE};
use crate::rules;
use crate::search::{search_threads, SearchLimit};

pub const DEFAULT_MAX_EMAILS: usize = 500;

/// Timeout for a single opt-out request
pub const LINK_TIMEOUT: Duration = Duration::from_secs(10);

static LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([^>]+)>").expect("valid unsubscribe link pattern"));

/// Bracket-delimited links of a `List-Unsubscribe` header, in order
pub fn extract_links(header_value: &str) -> Vec<String> {
    LINK_PATTERN
        .captures_iter(header_value)
        .map(|c| c[1].trim().to_string())
        .filter(|link| !link.is_empty())
        .collect()
}

fn is_mailto(link: &str) -> bool {
    link.get(..7)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("mailto:"))
}

/// Performs the HTTP side of an opt-out
#[async_trait]
pub trait LinkFetcher: Send + Sync {
    /// GET `url` and return the response status code
    async fn fetch(&self, url: &str) -> Result<u16>;
}

/// `reqwest`-backed fetcher with a per-request timeout
pub struct HttpLinkFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpLinkFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(LINK_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CleanupError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl LinkFetcher for HttpLinkFetcher {
    async fn fetch(&self, url: &str) -> Result<u16> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CleanupError::Timeout(self.timeout)
            } else {
                CleanupError::NetworkError(e.to_string())
            }
        })?;
        Ok(response.status().as_u16())
    }
}

/// What happened to one harvested link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UnsubscribeOutcome {
    /// Found but not sent
    Mailto { mailto: String },
    Fetched { url: String, status: u16 },
    Failed { url: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UnsubscribeReport {
    DryRun {
        found: usize,
        sample: Vec<String>,
    },
    Live {
        unsubscribed: usize,
        details: Vec<UnsubscribeOutcome>,
    },
}

/// Gather unsubscribe links from up to `max_emails` recent list threads
pub async fn harvest_links(client: &dyn MailClient, max_emails: usize) -> Result<Vec<String>> {
    let thread_ids = search_threads(
        client,
        rules::UNSUBSCRIBE_QUERY,
        SearchLimit::from_count(max_emails),
    )
    .await?;

    let mut links = Vec::new();
    for thread_id in &thread_ids {
        match client.thread_header_values(thread_id, "List-Unsubscribe").await {
            Ok(values) => links.extend(values.iter().flat_map(|v| extract_links(v))),
            Err(e) => warn!("Skipping thread {} while harvesting links: {}", thread_id, e),
        }
    }

    debug!(
        "Harvested {} unsubscribe links from {} threads",
        links.len(),
        thread_ids.len()
    );
    Ok(links)
}

/// Harvest links and, unless `dry_run`, act on each of them
pub async fn auto_unsubscribe(
    client: &dyn MailClient,
    fetcher: &dyn LinkFetcher,
    max_emails: usize,
    dry_run: bool,
) -> Result<UnsubscribeReport> {
    let links = harvest_links(client, max_emails).await?;

    if dry_run {
        return Ok(UnsubscribeReport::DryRun {
            found: links.len(),
            sample: sample(&links),
        });
    }

    let mut details = Vec::with_capacity(links.len());
    for link in links {
        let outcome = if is_mailto(&link) {
            UnsubscribeOutcome::Mailto { mailto: link }
        } else {
            match fetcher.fetch(&link).await {
                Ok(status) => UnsubscribeOutcome::Fetched { url: link, status },
                Err(e) => {
                    warn!("Unsubscribe request to {} failed: {}", link, e);
                    UnsubscribeOutcome::Failed {
                        url: link,
                        error: e.to_string(),
                    }
                }
            }
        };
        details.push(outcome);
    }

    info!("Processed {} unsubscribe links", details.len());
    let unsubscribed = details.len();
    details.truncate(SAMPLE_SIZE);
    Ok(UnsubscribeReport::Live {
        unsubscribed,
        details,
    })
}
