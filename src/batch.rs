//! Batch thread mutations with per-item failure accounting
//!
//! A batch never aborts on an item failure: every thread id is attempted and
//! lands in exactly one of the success or failure counters.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::client::MailClient;
use crate::error::Result;
use crate::models::SAMPLE_SIZE;

/// Failures logged individually before the rest are only counted
const LOGGED_FAILURES: usize = 3;

/// The single effect applied to every thread of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Add a label without removing any existing one
    AttachLabel(String),
    /// Move to Trash (recoverable)
    Trash,
    /// Remove irreversibly
    PermanentlyDelete,
}

impl Mutation {
    pub fn describe(&self) -> &'static str {
        match self {
            Mutation::AttachLabel(_) => "attach label",
            Mutation::Trash => "trash",
            Mutation::PermanentlyDelete => "permanently delete",
        }
    }
}

/// A thread whose mutation failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub thread_id: String,
    pub error: String,
}

/// Outcome of a batch: counts plus bounded samples
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub succeeded: usize,
    pub failed: usize,
    /// First successfully mutated ids, in input order
    pub sample: Vec<String>,
    /// First failures, in input order
    pub failures: Vec<ItemFailure>,
}

impl BatchResult {
    /// Number of items accounted for
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    fn record(&mut self, thread_id: &str, outcome: Result<()>, mutation: &Mutation) {
        match outcome {
            Ok(()) => {
                self.succeeded += 1;
                if self.sample.len() < SAMPLE_SIZE {
                    self.sample.push(thread_id.to_string());
                }
            }
            Err(e) => {
                self.failed += 1;
                if self.failed <= LOGGED_FAILURES {
                    warn!(
                        "Failed to {} thread {}: {}",
                        mutation.describe(),
                        thread_id,
                        e
                    );
                }
                if self.failures.len() < SAMPLE_SIZE {
                    self.failures.push(ItemFailure {
                        thread_id: thread_id.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Applies one mutation across many threads
pub struct BatchMutator<'a> {
    client: &'a dyn MailClient,
    concurrency: usize,
}

impl<'a> BatchMutator<'a> {
    /// Sequential mutator
    pub fn new(client: &'a dyn MailClient) -> Self {
        Self {
            client,
            concurrency: 1,
        }
    }

    /// Allow up to `concurrency` mutations in flight; results are still
    /// consumed in input order
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn mutate_one(&self, thread_id: &str, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::AttachLabel(label_id) => {
                self.client
                    .modify_thread_labels(thread_id, std::slice::from_ref(label_id), &[])
                    .await
            }
            Mutation::Trash => self.client.trash_thread(thread_id).await,
            Mutation::PermanentlyDelete => self.client.delete_thread(thread_id).await,
        }
    }

    /// Apply `mutation` to every id; empty input makes no remote calls
    pub async fn apply(&self, thread_ids: &[String], mutation: &Mutation) -> BatchResult {
        let mut result = BatchResult::default();
        if thread_ids.is_empty() {
            return result;
        }

        // owned ids keep the buffered future Send for the HTTP handler
        let mut outcomes = stream::iter(thread_ids.iter().cloned())
            .map(|id| async move {
                let outcome = self.mutate_one(&id, mutation).await;
                (id, outcome)
            })
            .buffered(self.concurrency);

        while let Some((id, outcome)) = outcomes.next().await {
            result.record(&id, outcome, mutation);
        }

        info!(
            "Batch {}: {} succeeded, {} failed of {}",
            mutation.describe(),
            result.succeeded,
            result.failed,
            thread_ids.len()
        );
        debug_assert_eq!(result.total(), thread_ids.len());
        result
    }
}
