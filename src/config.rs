use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CleanupError, Result};
use crate::rules;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Label attached to cleanup candidates and required for deletion
    #[serde(default = "default_review_label")]
    pub review_label: String,
    /// Rules used when a caller does not supply any
    #[serde(default = "rules::default_rules")]
    pub default_rules: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            review_label: default_review_label(),
            default_rules: rules::default_rules(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_client_secrets")]
    pub client_secrets: PathBuf,
    #[serde(default = "default_token_dir")]
    pub token_dir: PathBuf,
    /// Request full mailbox scope for the write token so permanent deletes work
    #[serde(default)]
    pub allow_permanent_delete: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_secrets: default_client_secrets(),
            token_dir: default_token_dir(),
            allow_permanent_delete: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_quota_units_per_sec")]
    pub quota_units_per_sec: f64,
    #[serde(default = "default_quota_burst")]
    pub quota_burst: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            quota_units_per_sec: default_quota_units_per_sec(),
            quota_burst: default_quota_burst(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// In-flight mutations per batch; 1 keeps batches strictly sequential
    #[serde(default = "default_batch_concurrency")]
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_batch_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_review_label() -> String {
    "trash-can".to_string()
}

fn default_client_secrets() -> PathBuf {
    PathBuf::from("./client_secret.json")
}

fn default_token_dir() -> PathBuf {
    PathBuf::from("./data/tokens")
}

fn default_max_concurrent() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_quota_units_per_sec() -> f64 {
    250.0
}

fn default_quota_burst() -> f64 {
    500.0
}

fn default_batch_concurrency() -> usize {
    1
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CleanupError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| CleanupError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    CleanupError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CleanupError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| CleanupError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Apply `REVIEW_LABEL`, `TOKEN_DIR`, `GOOGLE_CLIENT_SECRETS` and `BIND_ADDR`
    /// from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup, then re-validate
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(label) = lookup("REVIEW_LABEL") {
            self.service.review_label = label;
        }
        if let Some(dir) = lookup("TOKEN_DIR") {
            self.auth.token_dir = PathBuf::from(dir);
        }
        if let Some(secrets) = lookup("GOOGLE_CLIENT_SECRETS") {
            self.auth.client_secrets = PathBuf::from(secrets);
        }
        if let Some(bind) = lookup("BIND_ADDR") {
            self.server.bind = bind;
        }
        self.validate()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.service.review_label.trim().is_empty() {
            return Err(CleanupError::ConfigError(
                "service.review_label cannot be empty".to_string(),
            ));
        }
        if self.service.review_label.contains('"') {
            return Err(CleanupError::ConfigError(
                "service.review_label cannot contain '\"'".to_string(),
            ));
        }
        if self.service.default_rules.iter().any(|r| r.trim().is_empty()) {
            return Err(CleanupError::ConfigError(
                "service.default_rules cannot contain empty rules".to_string(),
            ));
        }

        if self.client.max_concurrent_requests == 0 || self.client.max_concurrent_requests > 50 {
            return Err(CleanupError::ConfigError(
                "client.max_concurrent_requests must be between 1 and 50".to_string(),
            ));
        }
        if self.client.request_timeout_secs == 0 {
            return Err(CleanupError::ConfigError(
                "client.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.client.quota_units_per_sec <= 0.0 || self.client.quota_burst < 20.0 {
            return Err(CleanupError::ConfigError(
                "client.quota_units_per_sec must be positive and client.quota_burst at least 20"
                    .to_string(),
            ));
        }

        if self.batch.concurrency == 0 || self.batch.concurrency > 50 {
            return Err(CleanupError::ConfigError(
                "batch.concurrency must be between 1 and 50".to_string(),
            ));
        }

        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(CleanupError::ConfigError(format!(
                "server.bind '{}' is not a socket address",
                self.server.bind
            )));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        Self::default().save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.service.review_label, "trash-can");
        assert_eq!(config.service.default_rules, rules::default_rules());
        assert_eq!(config.auth.token_dir, PathBuf::from("./data/tokens"));
        assert!(!config.auth.allow_permanent_delete);
        assert_eq!(config.client.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.client.max_retries, 3);
        assert_eq!(config.batch.concurrency, 1);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_label() {
        let mut config = Config::default();
        config.service.review_label = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("review_label"));
    }

    #[test]
    fn test_validation_rejects_quoted_label() {
        let mut config = Config::default();
        config.service.review_label = r#"to"delete"#.to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_rule() {
        let mut config = Config::default();
        config.service.default_rules.push(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_concurrency_bounds() {
        let mut config = Config::default();
        config.batch.concurrency = 0;
        assert!(config.validate().is_err());
        config.batch.concurrency = 51;
        assert!(config.validate().is_err());
        config.batch.concurrency = 50;
        assert!(config.validate().is_ok());

        config.client.max_concurrent_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_bind() {
        let mut config = Config::default();
        config.server.bind = "localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("REVIEW_LABEL", "to-delete"),
            ("TOKEN_DIR", "/var/lib/cleanup/tokens"),
            ("BIND_ADDR", "0.0.0.0:9000"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.service.review_label, "to-delete");
        assert_eq!(config.auth.token_dir, PathBuf::from("/var/lib/cleanup/tokens"));
        assert_eq!(config.auth.client_secrets, PathBuf::from("./client_secret.json"));
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("REVIEW_LABEL", "env-label");
        let mut config = Config::default();
        let result = config.apply_env_overrides();
        std::env::remove_var("REVIEW_LABEL");

        result.unwrap();
        assert_eq!(config.service.review_label, "env-label");
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(config.service.review_label, "trash-can");
    }

    #[tokio::test]
    async fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(
            &path,
            r#"
[service]
review_label = "cleanup/review"
default_rules = ["category:promotions older_than:30d"]

[batch]
concurrency = 4
"#,
        )
        .await
        .unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.service.review_label, "cleanup/review");
        assert_eq!(config.service.default_rules.len(), 1);
        assert_eq!(config.batch.concurrency, 4);
        assert_eq!(config.client.max_retries, 3);
    }

    #[tokio::test]
    async fn test_load_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[batch]\nconcurrency = 0\n").await.unwrap();

        let err = Config::load(&path).await.unwrap_err();
        assert!(matches!(err, CleanupError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::create_example(&path).await.unwrap();
        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.service.default_rules, rules::default_rules());
    }
}
