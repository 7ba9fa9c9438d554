//! Mail client acquisition
//!
//! Tools never build Gmail clients themselves; they ask a [`ServiceProvider`]
//! for a read-scope or a write-scope client. The two are always distinct
//! instances backed by distinct tokens.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use crate::auth::{self, AccessScope};
use crate::client::{GmailMailClient, MailClient, RetryPolicy};
use crate::config::Config;
use crate::error::{CleanupError, Result};
use crate::rate_limiter::QuotaRateLimiter;

/// Source of scoped mail clients
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Client limited to searching and reading metadata
    async fn reader(&self) -> Result<Arc<dyn MailClient>>;

    /// Client allowed to label, trash and (with full scope) delete
    async fn writer(&self) -> Result<Arc<dyn MailClient>>;
}

/// Builds Gmail clients from the configured secrets and token files
///
/// A new hub is built per acquisition; `yup-oauth2` reloads the cached token
/// from disk, so this costs no user interaction once `auth` has been run.
/// All clients share one quota bucket.
pub struct GmailServiceProvider {
    config: Arc<Config>,
    limiter: QuotaRateLimiter,
}

impl GmailServiceProvider {
    pub fn new(config: Arc<Config>) -> Self {
        let limiter = QuotaRateLimiter::with_config(
            config.client.quota_units_per_sec,
            config.client.quota_burst,
        );
        Self { config, limiter }
    }

    pub fn write_scope(&self) -> AccessScope {
        AccessScope::for_writes(self.config.auth.allow_permanent_delete)
    }

    async fn acquire(&self, scope: AccessScope) -> Result<Arc<dyn MailClient>> {
        debug!("Acquiring Gmail client for scope {}", scope.url());
        let hub = auth::initialize_gmail_hub(
            &self.config.auth.client_secrets,
            &self.config.auth.token_dir,
            scope,
        )
        .await
        .map_err(|e| {
            error!("Failed to acquire Gmail client ({}): {}", scope.url(), e);
            CleanupError::ServiceUnavailable(e.to_string())
        })?;

        Ok(Arc::new(GmailMailClient::new(
            hub,
            scope,
            self.limiter.clone(),
            self.config.client.max_concurrent_requests,
            RetryPolicy::from_config(&self.config.client),
        )))
    }
}

#[async_trait]
impl ServiceProvider for GmailServiceProvider {
    async fn reader(&self) -> Result<Arc<dyn MailClient>> {
        self.acquire(AccessScope::ReadOnly).await
    }

    async fn writer(&self) -> Result<Arc<dyn MailClient>> {
        self.acquire(self.write_scope()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_secrets_is_service_unavailable() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.auth.client_secrets = dir.path().join("missing.json");
        config.auth.token_dir = dir.path().join("tokens");

        let provider = GmailServiceProvider::new(Arc::new(config));
        let err = provider.reader().await.err().unwrap();
        assert!(matches!(err, CleanupError::ServiceUnavailable(_)));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_write_scope_follows_config() {
        let mut config = Config::default();
        assert_eq!(
            GmailServiceProvider::new(Arc::new(config.clone())).write_scope(),
            AccessScope::Modify
        );
        config.auth.allow_permanent_delete = true;
        assert_eq!(
            GmailServiceProvider::new(Arc::new(config)).write_scope(),
            AccessScope::FullMail
        );
    }
}
