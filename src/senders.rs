//! Frequent-sender tally over a recent window

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::client::MailClient;
use crate::error::Result;
use crate::rules;
use crate::search::{search_threads, SearchLimit};

/// Threads inspected per tally
pub const SENDER_SCAN_LIMIT: usize = 1000;

pub const DEFAULT_SINCE_DAYS: u32 = 60;
pub const DEFAULT_MAX_SENDERS: usize = 20;

/// Count raw `From` header values across recent threads
///
/// Senders are keyed by the header string exactly as received. The result is
/// ranked by count, ties kept in first-seen order. A thread whose metadata
/// cannot be fetched is skipped.
pub async fn top_noisy_senders(
    client: &dyn MailClient,
    since_days: u32,
    max_senders: usize,
) -> Result<IndexMap<String, usize>> {
    let query = rules::recent_query(since_days);
    let thread_ids = search_threads(client, &query, SearchLimit::from_count(SENDER_SCAN_LIMIT)).await?;

    let mut tally = SenderTally::default();
    let mut skipped = 0usize;
    for thread_id in &thread_ids {
        match client.thread_header_values(thread_id, "From").await {
            Ok(senders) => senders.into_iter().for_each(|s| tally.add(s)),
            Err(e) => {
                skipped += 1;
                warn!("Skipping thread {} in sender tally: {}", thread_id, e);
            }
        }
    }

    info!(
        "Tallied {} distinct senders across {} threads ({} skipped)",
        tally.len(),
        thread_ids.len(),
        skipped
    );
    Ok(tally.top(max_senders))
}

/// Sender -> count, kept in first-seen order for stable ranking
#[derive(Debug, Default)]
pub struct SenderTally {
    counts: IndexMap<String, usize>,
}

impl SenderTally {
    pub fn add(&mut self, sender: String) {
        *self.counts.entry(sender).or_insert(0) += 1;
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// The `n` most frequent senders, descending
    pub fn top(mut self, n: usize) -> IndexMap<String, usize> {
        // stable: equal counts keep insertion order
        self.counts.sort_by(|_, a, _, b| b.cmp(a));
        self.counts.truncate(n);
        self.counts
    }
}
