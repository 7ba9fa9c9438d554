//! Cleanup rules and the queries derived from them
//!
//! A rule is an opaque Gmail search expression. Nothing here parses rule
//! syntax; the only queries built locally are the compound delete query and
//! the recent-window queries used by the analytics tools.

use crate::error::{CleanupError, Result};

/// Rules applied when neither the caller nor the configuration supplies any
pub const DEFAULT_RULES: &[&str] = &[
    // marketing / promos
    "category:promotions older_than:7d",
    "subject:(newsletter OR unsubscribe OR promotion OR deal OR offer) older_than:14d",
    // social
    "category:social older_than:7d",
    "from:(facebookmail.com OR twitter.com OR linkedin.com OR instagram.com OR tiktok.com) older_than:14d",
    // delivery / shopping
    "subject:(delivered OR shipment OR tracking OR order confirmation OR order update) older_than:21d",
    "from:(noreply@amazon.com OR noreply@ebay.com OR walmart.com) older_than:21d",
    // login / auth codes
    r#"subject:("verification code" OR "security alert" OR "sign-in attempt") older_than:14d"#,
    // mailing lists that skip Gmail categories
    "list:(*) older_than:21d",
    // stale automated notices
    "subject:(notification OR alert OR digest OR summary) older_than:30d",
];

/// Window scanned for `List-Unsubscribe` headers
pub const UNSUBSCRIBE_QUERY: &str = "list:(*) newer_than:60d";

pub fn default_rules() -> Vec<String> {
    DEFAULT_RULES.iter().map(|r| r.to_string()).collect()
}

/// Caller-supplied rules, or the defaults when none (or an empty list) were given
pub fn select_rules(supplied: Option<Vec<String>>, defaults: &[String]) -> Vec<String> {
    match supplied {
        Some(rules) if !rules.is_empty() => rules,
        _ => defaults.to_vec(),
    }
}

/// Reject label names that cannot be quoted inside a search query
///
/// Gmail has no escape for `"` within a quoted term, so such a name would
/// turn the compound delete query into a different query altogether.
pub fn check_label_name(label: &str) -> Result<()> {
    if label.trim().is_empty() {
        return Err(CleanupError::InvalidArgument(
            "review label cannot be empty".to_string(),
        ));
    }
    if label.contains('"') {
        return Err(CleanupError::InvalidArgument(format!(
            "review label cannot contain '\"': {}",
            label
        )));
    }
    Ok(())
}

/// Query selecting threads that carry `label` and are older than `older_than_days`
///
/// Deletion only ever searches with this query, so a thread without the
/// review label cannot be selected however old it is.
pub fn delete_query(label: &str, older_than_days: u32) -> String {
    format!(r#"label:"{}" older_than:{}d"#, label, older_than_days)
}

/// Query selecting threads newer than `days`
pub fn recent_query(days: u32) -> String {
    format!("newer_than:{}d", days)
}
