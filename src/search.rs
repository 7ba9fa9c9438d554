//! Paginated thread search
//!
//! Issues token-chained `threads.list` requests and assembles the matching
//! thread ids in receipt order, up to a cap or until the service reports
//! exhaustion.

use std::num::NonZeroUsize;
use tracing::debug;

use crate::client::MailClient;
use crate::error::{CleanupError, Result};

/// Gmail's per-page ceiling for `threads.list`
pub const MAX_PAGE_SIZE: u32 = 500;

/// How many thread ids a search may return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLimit {
    Capped(NonZeroUsize),
    /// Collect until the service has no further pages
    Unlimited,
}

impl SearchLimit {
    /// Interpret a caller-supplied count; `0` means no limit
    pub fn from_count(count: usize) -> Self {
        match NonZeroUsize::new(count) {
            Some(cap) => SearchLimit::Capped(cap),
            None => SearchLimit::Unlimited,
        }
    }

    fn page_size(&self, collected: usize) -> u32 {
        match self {
            SearchLimit::Capped(cap) => {
                let remaining = cap.get().saturating_sub(collected);
                remaining.min(MAX_PAGE_SIZE as usize) as u32
            }
            SearchLimit::Unlimited => MAX_PAGE_SIZE,
        }
    }

    fn is_satisfied(&self, collected: usize) -> bool {
        match self {
            SearchLimit::Capped(cap) => collected >= cap.get(),
            SearchLimit::Unlimited => false,
        }
    }
}

/// Search threads matching `query`
///
/// Stops when the cap is reached, when a page carries no continuation token,
/// or when a page comes back empty (even with a token). The result never
/// exceeds the cap; any over-fetched tail is dropped. Service errors are
/// returned as-is with no partial result.
pub async fn search_threads(
    client: &dyn MailClient,
    query: &str,
    limit: SearchLimit,
) -> Result<Vec<String>> {
    if query.trim().is_empty() {
        return Err(CleanupError::InvalidQuery(
            "filter expression must not be empty".to_string(),
        ));
    }

    let mut ids: Vec<String> = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page_size = limit.page_size(ids.len());
        let page = client
            .list_threads(query, page_size, page_token.as_deref())
            .await?;
        pages += 1;

        let received = page.thread_ids.len();
        ids.extend(page.thread_ids);

        if limit.is_satisfied(ids.len()) {
            break;
        }

        page_token = match page.next_page_token {
            Some(token) if received > 0 => Some(token),
            _ => break,
        };
    }

    if let SearchLimit::Capped(cap) = limit {
        ids.truncate(cap.get());
    }

    debug!(
        "Query '{}' matched {} threads over {} page(s)",
        query,
        ids.len(),
        pages
    );
    Ok(ids)
}
