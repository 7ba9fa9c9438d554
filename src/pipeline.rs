//! Safety-staged cleanup pipeline
//!
//! Threads move `Unreviewed -> Labeled -> {Trashed | PermanentlyDeleted}`.
//! The three stages are independent calls:
//! - **preview**: read-only counts and samples per rule
//! - **label**: attach the review label to every match (idempotent)
//! - **delete**: trash or delete threads that carry the review label *and*
//!   are older than a threshold; dry run unless explicitly disabled
//!
//! The label sitting in the mailbox between the last two stages is the
//! human-inspectable checkpoint. Deletion never searches with a rule, only
//! with the compound label-and-age query.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::batch::{BatchMutator, ItemFailure, Mutation};
use crate::client::MailClient;
use crate::error::{CleanupError, Result};
use crate::label_registry::LabelRegistry;
use crate::models::sample;
use crate::rules;
use crate::search::{search_threads, SearchLimit};

/// Preview cap applied per rule when the caller gives none
pub const DEFAULT_PREVIEW_LIMIT: usize = 500;

/// Age threshold for deletion when the caller gives none
pub const DEFAULT_OLDER_THAN_DAYS: u32 = 7;

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Matches for one rule in a preview
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub count: usize,
    pub sample: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RuleOutcome {
    fn matched(ids: &[String]) -> Self {
        Self {
            count: ids.len(),
            sample: sample(ids),
            error: None,
        }
    }

    fn failed(error: &CleanupError) -> Self {
        Self {
            count: 0,
            sample: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewReport {
    pub total_hits: usize,
    pub by_rule: IndexMap<String, RuleOutcome>,
    pub review_label: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Set when the mail service could not be reached at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PreviewReport {
    /// Zero-result report carrying `error`, for a preview that never searched
    pub fn rejected(review_label: &str, error: impl Into<String>) -> Self {
        Self {
            total_hits: 0,
            by_rule: IndexMap::new(),
            review_label: review_label.to_string(),
            errors: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Zero-result report for when no read client could be acquired
    pub fn unavailable(review_label: &str, cause: &CleanupError) -> Self {
        Self::rejected(
            review_label,
            format!("Failed to connect to Gmail service: {}", cause),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelReport {
    pub labeled_total: usize,
    pub label: String,
    pub per_rule: IndexMap<String, usize>,
    /// Threads whose label attachment failed
    #[serde(skip_serializing_if = "is_zero")]
    pub failed: usize,
    /// Rules whose search failed; their threads were not labelled
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Parameters of the delete stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub label: String,
    pub older_than_days: u32,
    pub dry_run: bool,
    pub permanent: bool,
}

impl DeleteRequest {
    /// Dry-run trash of `label` older than the default threshold
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            older_than_days: DEFAULT_OLDER_THAN_DAYS,
            dry_run: true,
            permanent: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeleteReport {
    DryRun {
        would_delete: usize,
        query: String,
        label: String,
        sample: Vec<String>,
    },
    Live {
        deleted: usize,
        failed: usize,
        label: String,
        query: String,
        permanent: bool,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        failures: Vec<ItemFailure>,
    },
}

/// The three cleanup stages over an injected read client and optional write client
pub struct CleanupPipeline<'a> {
    reader: &'a dyn MailClient,
    writer: Option<&'a dyn MailClient>,
    batch_concurrency: usize,
}

impl<'a> CleanupPipeline<'a> {
    /// Pipeline able to preview and dry-run deletes only
    pub fn read_only(reader: &'a dyn MailClient) -> Self {
        Self {
            reader,
            writer: None,
            batch_concurrency: 1,
        }
    }

    pub fn new(reader: &'a dyn MailClient, writer: &'a dyn MailClient) -> Self {
        Self {
            reader,
            writer: Some(writer),
            batch_concurrency: 1,
        }
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    fn writer(&self, stage: &str) -> Result<&'a dyn MailClient> {
        self.writer.ok_or_else(|| {
            CleanupError::ServiceUnavailable(format!("{} requires write access", stage))
        })
    }

    fn mutator(&self, client: &'a dyn MailClient) -> BatchMutator<'a> {
        BatchMutator::new(client).with_concurrency(self.batch_concurrency)
    }

    /// Count matches per rule without mutating anything
    ///
    /// A failing rule records its error and the remaining rules still run.
    pub async fn preview(
        &self,
        rules: &[String],
        limit_per_rule: SearchLimit,
        review_label: &str,
    ) -> PreviewReport {
        let mut by_rule = IndexMap::new();
        let mut errors = Vec::new();
        let mut total_hits = 0;

        for rule in rules {
            debug!("Previewing rule: {}", rule);
            match search_threads(self.reader, rule, limit_per_rule).await {
                Ok(ids) => {
                    debug!("Rule '{}' matched {} threads", rule, ids.len());
                    total_hits += ids.len();
                    by_rule.insert(rule.clone(), RuleOutcome::matched(&ids));
                }
                Err(e) => {
                    error!("Error processing rule '{}': {}", rule, e);
                    errors.push(format!("Rule '{}': {}", rule, e));
                    by_rule.insert(rule.clone(), RuleOutcome::failed(&e));
                }
            }
        }

        info!(
            "Preview: {} hits across {} rules ({} failed)",
            total_hits,
            rules.len(),
            errors.len()
        );

        PreviewReport {
            total_hits,
            by_rule,
            review_label: review_label.to_string(),
            errors,
            error: None,
        }
    }

    /// Attach `review_label` to every thread matching any rule
    ///
    /// The label is resolved (or created) once up front; failure there aborts
    /// the stage. Re-running is safe: attaching a label a thread already has
    /// succeeds without change.
    pub async fn label(&self, rules: &[String], review_label: &str) -> Result<LabelReport> {
        rules::check_label_name(review_label)?;
        let writer = self.writer("label")?;
        let label_id = LabelRegistry::new(writer)
            .resolve_or_create(review_label)
            .await?;
        let mutator = self.mutator(writer);
        let mutation = Mutation::AttachLabel(label_id);

        let mut per_rule = IndexMap::new();
        let mut errors = Vec::new();
        let mut labeled_total = 0;
        let mut failed = 0;

        for rule in rules {
            let ids = match search_threads(self.reader, rule, SearchLimit::Unlimited).await {
                Ok(ids) => ids,
                Err(e) => {
                    error!("Error searching rule '{}': {}", rule, e);
                    errors.push(format!("Rule '{}': {}", rule, e));
                    per_rule.insert(rule.clone(), 0);
                    continue;
                }
            };

            let result = mutator.apply(&ids, &mutation).await;
            labeled_total += result.succeeded;
            failed += result.failed;
            per_rule.insert(rule.clone(), result.succeeded);
        }

        info!(
            "Labelled {} threads with '{}' ({} failed)",
            labeled_total, review_label, failed
        );

        Ok(LabelReport {
            labeled_total,
            label: review_label.to_string(),
            per_rule,
            failed,
            errors,
        })
    }

    /// Trash or permanently delete labelled threads older than the threshold
    pub async fn delete(&self, request: &DeleteRequest) -> Result<DeleteReport> {
        if request.older_than_days == 0 {
            return Err(CleanupError::InvalidArgument(
                "older_than_days must be at least 1".to_string(),
            ));
        }

        rules::check_label_name(&request.label)?;

        let query = rules::delete_query(&request.label, request.older_than_days);
        let ids = search_threads(self.reader, &query, SearchLimit::Unlimited).await?;

        if request.dry_run {
            info!("Dry run: {} threads would be deleted ({})", ids.len(), query);
            return Ok(DeleteReport::DryRun {
                would_delete: ids.len(),
                query,
                label: request.label.clone(),
                sample: sample(&ids),
            });
        }

        let mutation = if request.permanent {
            Mutation::PermanentlyDelete
        } else {
            Mutation::Trash
        };
        let result = self.mutator(self.writer("delete")?).apply(&ids, &mutation).await;

        Ok(DeleteReport::Live {
            deleted: result.succeeded,
            failed: result.failed,
            label: request.label.clone(),
            query,
            permanent: request.permanent,
            failures: result.failures,
        })
    }
}
