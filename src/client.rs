//! Gmail API client with rate limiting, per-request timeouts and retry logic

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use google_gmail1::api::{Label, ModifyThreadRequest, Thread};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::auth::{AccessScope, GmailHub};
use crate::config::ClientConfig;
use crate::error::{CleanupError, Result};
use crate::rate_limiter::{QuotaCost, QuotaRateLimiter};

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// One page of a thread search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadPage {
    pub thread_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Operations the cleanup pipeline needs from the remote mailbox
///
/// Each instance is bound to one OAuth scope; read and write access are two
/// separate clients rather than one client whose scope changes.
#[async_trait]
pub trait MailClient: Send + Sync {
    /// Fetch one page of thread ids matching `query`
    async fn list_threads(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ThreadPage>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a label visible in both the label list and the message list
    async fn create_label(&self, name: &str) -> Result<String>;

    /// Add and remove labels on every message of a thread
    async fn modify_thread_labels(
        &self,
        thread_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()>;

    /// Move a thread to Trash
    async fn trash_thread(&self, thread_id: &str) -> Result<()>;

    /// Permanently delete a thread
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Values of `header` across the messages of a thread, in message order
    async fn thread_header_values(&self, thread_id: &str, header: &str) -> Result<Vec<String>>;
}

/// Retry and timeout settings applied to every remote call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            request_timeout: config.request_timeout(),
            ..Self::default()
        }
    }
}

/// Run `operation` with exponential backoff on transient errors
///
/// Makes at most `max_retries + 1` attempts. Permanent errors are returned
/// immediately; a rate-limit error waits for the server's Retry-After.
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_interval)
        .with_max_interval(policy.max_interval)
        .with_max_elapsed_time(None)
        .build();

    let max_retries = policy.max_retries;
    let mut attempts = 0u32;

    backoff::future::retry_notify(
        backoff,
        || {
            attempts += 1;
            let attempt = attempts;
            let fut = operation();
            async move {
                fut.await.map_err(|e| {
                    if e.is_permanent() || attempt > max_retries {
                        backoff::Error::permanent(e)
                    } else if let Some(wait) = e.retry_after() {
                        backoff::Error::retry_after(e, wait)
                    } else {
                        backoff::Error::transient(e)
                    }
                })
            }
        },
        |e: CleanupError, wait: Duration| {
            warn!(
                "{} failed: {}. Retrying in {:?}...",
                operation_name, e, wait
            );
        },
    )
    .await
}

/// Production Gmail client bound to one OAuth scope
///
/// Every call waits for a concurrency permit and for quota in the shared
/// token bucket, runs under the per-request timeout and is retried with
/// exponential backoff when the failure is transient.
pub struct GmailMailClient {
    hub: GmailHub,
    scope: AccessScope,
    limiter: QuotaRateLimiter,
    permits: Arc<Semaphore>,
    policy: RetryPolicy,
}

impl GmailMailClient {
    pub fn new(
        hub: GmailHub,
        scope: AccessScope,
        limiter: QuotaRateLimiter,
        max_concurrent: usize,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            hub,
            scope,
            limiter,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            policy,
        }
    }

    pub fn scope(&self) -> AccessScope {
        self.scope
    }

    fn require_write(&self, operation: &str) -> Result<()> {
        if self.scope.is_read_only() {
            return Err(CleanupError::Forbidden(format!(
                "{} requires a write-scope client",
                operation
            )));
        }
        Ok(())
    }

    async fn call<T, F, Fut>(&self, operation_name: &str, cost: QuotaCost, mut request: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        let _permit = self.permits.acquire().await.map_err(|e| {
            CleanupError::NetworkError(format!("Failed to acquire request permit: {}", e))
        })?;
        let timeout = self.policy.request_timeout;

        with_retry(operation_name, &self.policy, || {
            let fut = request();
            let limiter = self.limiter.clone();
            async move {
                limiter.acquire(cost).await;
                match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result.map_err(CleanupError::from),
                    Err(_) => Err(CleanupError::Timeout(timeout)),
                }
            }
        })
        .await
    }
}

/// Collect the values of one header from a metadata-format thread
fn header_values(thread: Thread, header: &str) -> Vec<String> {
    thread
        .messages
        .unwrap_or_default()
        .into_iter()
        .filter_map(|msg| msg.payload.and_then(|p| p.headers))
        .flatten()
        .filter_map(|h| match (h.name, h.value) {
            (Some(name), Some(value)) if name.eq_ignore_ascii_case(header) => Some(value),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl MailClient for GmailMailClient {
    async fn list_threads(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ThreadPage> {
        let scope = self.scope.url();
        let (_, response) = self
            .call("threads.list", QuotaCost::ThreadsList, || {
                let mut call = self
                    .hub
                    .users()
                    .threads_list("me")
                    .q(query)
                    .max_results(page_size);
                if let Some(token) = page_token {
                    call = call.page_token(token);
                }
                call.add_scope(scope).doit()
            })
            .await?;

        let thread_ids: Vec<String> = response
            .threads
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| t.id)
            .collect();

        debug!(
            "threads.list returned {} ids (more pages: {})",
            thread_ids.len(),
            response.next_page_token.is_some()
        );

        Ok(ThreadPage {
            thread_ids,
            next_page_token: response.next_page_token,
        })
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let scope = self.scope.url();
        let (_, response) = self
            .call("labels.list", QuotaCost::LabelsList, || {
                self.hub.users().labels_list("me").add_scope(scope).doit()
            })
            .await?;

        Ok(response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                _ => None,
            })
            .collect())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        self.require_write("labels.create")?;
        let scope = self.scope.url();
        let (_, created) = self
            .call("labels.create", QuotaCost::LabelsCreate, || {
                let label = Label {
                    name: Some(name.to_string()),
                    label_list_visibility: Some("labelShow".to_string()),
                    message_list_visibility: Some("show".to_string()),
                    ..Default::default()
                };
                self.hub.users().labels_create(label, "me").add_scope(scope).doit()
            })
            .await?;

        created
            .id
            .ok_or_else(|| CleanupError::LabelError("Created label has no ID".to_string()))
    }

    async fn modify_thread_labels(
        &self,
        thread_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        self.require_write("threads.modify")?;
        let scope = self.scope.url();
        self.call("threads.modify", QuotaCost::ThreadsModify, || {
            let request = ModifyThreadRequest {
                add_label_ids: Some(add_label_ids.to_vec()),
                remove_label_ids: Some(remove_label_ids.to_vec()),
            };
            self.hub
                .users()
                .threads_modify(request, "me", thread_id)
                .add_scope(scope)
                .doit()
        })
        .await?;
        Ok(())
    }

    async fn trash_thread(&self, thread_id: &str) -> Result<()> {
        self.require_write("threads.trash")?;
        let scope = self.scope.url();
        self.call("threads.trash", QuotaCost::ThreadsTrash, || {
            self.hub
                .users()
                .threads_trash("me", thread_id)
                .add_scope(scope)
                .doit()
        })
        .await?;
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.require_write("threads.delete")?;
        let scope = self.scope.url();
        self.call("threads.delete", QuotaCost::ThreadsDelete, || {
            self.hub
                .users()
                .threads_delete("me", thread_id)
                .add_scope(scope)
                .doit()
        })
        .await?;
        Ok(())
    }

    async fn thread_header_values(&self, thread_id: &str, header: &str) -> Result<Vec<String>> {
        let scope = self.scope.url();
        let (_, thread) = self
            .call("threads.get", QuotaCost::ThreadsGet, || {
                self.hub
                    .users()
                    .threads_get("me", thread_id)
                    .format("metadata")
                    .add_metadata_headers(header)
                    .add_scope(scope)
                    .doit()
            })
            .await?;

        Ok(header_values(thread, header))
    }
}
