//! OAuth2 authentication management for Gmail API
//!
//! The service holds two independent credentials: a read-only token used for
//! searches and metadata, and a write token used for labelling and deletion.
//! Each lives in its own file under the token directory and is refreshed and
//! re-persisted by `yup-oauth2` when it expires.

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::path::{Path, PathBuf};

use crate::error::{CleanupError, Result};

/// Read-only access: search, labels list, thread metadata
pub const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Read/write access without permanent deletion
pub const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Full mailbox access; Gmail requires it for `threads.delete`
pub const FULL_MAIL_SCOPE: &str = "https://mail.google.com/";

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// OAuth scope a client instance is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    ReadOnly,
    Modify,
    FullMail,
}

impl AccessScope {
    /// Scope for the write client, depending on whether permanent deletion is allowed
    pub fn for_writes(allow_permanent_delete: bool) -> Self {
        if allow_permanent_delete {
            AccessScope::FullMail
        } else {
            AccessScope::Modify
        }
    }

    pub fn url(&self) -> &'static str {
        match self {
            AccessScope::ReadOnly => READONLY_SCOPE,
            AccessScope::Modify => MODIFY_SCOPE,
            AccessScope::FullMail => FULL_MAIL_SCOPE,
        }
    }

    /// Token file name inside the token directory
    pub fn token_file_name(&self) -> &'static str {
        match self {
            AccessScope::ReadOnly => "token-read.json",
            AccessScope::Modify | AccessScope::FullMail => "token-modify.json",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, AccessScope::ReadOnly)
    }
}

/// Location of the token file for a scope
pub fn token_path(token_dir: &Path, scope: AccessScope) -> PathBuf {
    token_dir.join(scope.token_file_name())
}

/// Initialize a Gmail API hub bound to a single OAuth scope
///
/// Runs the installed-app flow (browser redirect) when no usable token is
/// cached; otherwise the cached token is loaded and refreshed as needed.
/// Missing client secrets are reported as a configuration error before any
/// network activity.
pub async fn initialize_gmail_hub(
    client_secrets: &Path,
    token_dir: &Path,
    scope: AccessScope,
) -> Result<GmailHub> {
    if !client_secrets.exists() {
        return Err(CleanupError::ConfigError(format!(
            "OAuth client secrets not found at {:?}",
            client_secrets
        )));
    }

    tokio::fs::create_dir_all(token_dir).await?;
    let token_cache_path = token_path(token_dir, scope);

    let secret = yup_oauth2::read_application_secret(client_secrets)
        .await
        .map_err(|e| CleanupError::AuthError(format!("Failed to read client secrets: {}", e)))?;

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(&token_cache_path)
    .build()
    .await
    .map_err(|e| CleanupError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Obtain the token up front so it is cached under exactly this scope
    auth.token(&[scope.url()])
        .await
        .map_err(|e| CleanupError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(&token_cache_path).await?;
    }

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| CleanupError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Restrict token file permissions to the owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows relies on the ACLs of the token directory
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
