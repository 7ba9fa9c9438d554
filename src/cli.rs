//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::auth::{self, AccessScope};
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{DEFAULT_OLDER_THAN_DAYS, DEFAULT_PREVIEW_LIMIT};
use crate::senders::{DEFAULT_MAX_SENDERS, DEFAULT_SINCE_DAYS};
use crate::tools::ToolName;
use crate::unsubscribe::DEFAULT_MAX_EMAILS;

#[derive(Parser, Debug)]
#[command(name = "gmail-cleanup")]
#[command(version)]
#[command(about = "Label-first, delete-later Gmail bulk cleanup", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the OAuth flow for the read and write tokens
    Auth {
        /// Discard cached tokens and re-authenticate
        #[arg(long)]
        force: bool,
    },

    /// Count threads matching each rule (read-only)
    Preview {
        /// Rule to evaluate; repeat for several. Defaults to the configured rules
        #[arg(long = "rule")]
        rules: Vec<String>,

        /// Per-rule cap, 0 for unlimited
        #[arg(long, default_value_t = DEFAULT_PREVIEW_LIMIT)]
        limit_per_rule: usize,
    },

    /// Attach the review label to every thread matching the rules
    Label {
        #[arg(long = "rule")]
        rules: Vec<String>,

        /// Label to attach instead of the configured review label
        #[arg(long)]
        review_label: Option<String>,
    },

    /// Trash review-labelled threads older than a threshold
    Delete {
        /// Label to delete from instead of the configured review label
        #[arg(long)]
        label: Option<String>,

        #[arg(long, default_value_t = DEFAULT_OLDER_THAN_DAYS)]
        older_than_days: u32,

        /// Actually mutate the mailbox (default is a dry run)
        #[arg(long)]
        execute: bool,

        /// Permanently delete instead of moving to Trash
        #[arg(long)]
        permanent: bool,
    },

    /// Rank the most frequent recent senders
    Senders {
        #[arg(long, default_value_t = DEFAULT_SINCE_DAYS)]
        since_days: u32,

        #[arg(long, default_value_t = DEFAULT_MAX_SENDERS)]
        max_senders: usize,
    },

    /// Harvest List-Unsubscribe links
    Unsubscribe {
        /// Thread cap, 0 for unlimited
        #[arg(long, default_value_t = DEFAULT_MAX_EMAILS)]
        max_emails: usize,

        /// Visit the web links (default is a dry run)
        #[arg(long)]
        execute: bool,
    },

    /// Show the service policy and default rules
    Info,

    /// Serve the tools over HTTP
    Serve {
        /// Address to bind, overriding server.bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// The tool and JSON arguments a tool subcommand maps to
    pub fn tool_call(&self) -> Option<(ToolName, Value)> {
        let call = match self {
            Commands::Preview {
                rules,
                limit_per_rule,
            } => (
                ToolName::Preview,
                json!({ "rules": non_empty(rules), "limit_per_rule": limit_per_rule }),
            ),
            Commands::Label {
                rules,
                review_label,
            } => (
                ToolName::LabelCandidates,
                json!({ "rules": non_empty(rules), "review_label": review_label }),
            ),
            Commands::Delete {
                label,
                older_than_days,
                execute,
                permanent,
            } => (
                ToolName::DeleteLabeled,
                json!({
                    "label": label,
                    "older_than_days": older_than_days,
                    "dry_run": !execute,
                    "permanent": permanent,
                }),
            ),
            Commands::Senders {
                since_days,
                max_senders,
            } => (
                ToolName::TopNoisySenders,
                json!({ "since_days": since_days, "max_senders": max_senders }),
            ),
            Commands::Unsubscribe {
                max_emails,
                execute,
            } => (
                ToolName::AutoUnsubscribe,
                json!({ "max_emails": max_emails, "dry_run": !execute }),
            ),
            Commands::Info => (ToolName::Info, json!({})),
            Commands::Auth { .. } | Commands::Serve { .. } | Commands::InitConfig { .. } => {
                return None
            }
        };
        Some(call)
    }
}

fn non_empty(rules: &[String]) -> Option<&[String]> {
    if rules.is_empty() {
        None
    } else {
        Some(rules)
    }
}

/// Obtain (or refresh) both token files
///
/// With `force`, cached tokens are removed first so the browser flow runs
/// again. Returns the token paths that are now in place.
pub async fn authenticate(config: &Config, force: bool) -> Result<Vec<PathBuf>> {
    let scopes = [
        AccessScope::ReadOnly,
        AccessScope::for_writes(config.auth.allow_permanent_delete),
    ];

    let mut paths = Vec::with_capacity(scopes.len());
    for scope in scopes {
        let path = auth::token_path(&config.auth.token_dir, scope);
        if force && path.exists() {
            tokio::fs::remove_file(&path).await?;
            info!("Removed cached token {:?}", path);
        }

        auth::initialize_gmail_hub(&config.auth.client_secrets, &config.auth.token_dir, scope)
            .await?;
        info!("Token for {} cached at {:?}", scope.url(), path);
        paths.push(path);
    }
    Ok(paths)
}

/// Spinner shown on stderr while a tool runs
pub struct ProgressReporter {
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");
        Self { spinner_style }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn finish_spinner(&self, pb: &ProgressBar) {
        pb.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
