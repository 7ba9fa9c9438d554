//! Tool layer: typed arguments, dispatch by name, structured replies
//!
//! Every tool takes a JSON object and returns a JSON object. Failures never
//! escape as errors; they become `{"error": "..."}` replies, except for
//! `preview`, which always answers with its report shape.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{CleanupError, Result};
use crate::pipeline::{
    CleanupPipeline, DeleteReport, DeleteRequest, LabelReport, PreviewReport,
    DEFAULT_OLDER_THAN_DAYS, DEFAULT_PREVIEW_LIMIT,
};
use crate::rules;
use crate::search::SearchLimit;
use crate::senders::{self, DEFAULT_MAX_SENDERS, DEFAULT_SINCE_DAYS};
use crate::service::ServiceProvider;
use crate::unsubscribe::{self, LinkFetcher, UnsubscribeReport, DEFAULT_MAX_EMAILS};

pub const SERVICE_NAME: &str = "gmail-cleanup";
pub const POLICY: &str = "label-first delete-later; minimal scopes; logs recommended";

fn default_true() -> bool {
    true
}

fn default_preview_limit() -> usize {
    DEFAULT_PREVIEW_LIMIT
}

fn default_older_than_days() -> u32 {
    DEFAULT_OLDER_THAN_DAYS
}

fn default_since_days() -> u32 {
    DEFAULT_SINCE_DAYS
}

fn default_max_senders() -> usize {
    DEFAULT_MAX_SENDERS
}

fn default_max_emails() -> usize {
    DEFAULT_MAX_EMAILS
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewArgs {
    #[serde(default)]
    pub rules: Option<Vec<String>>,
    /// Per-rule cap; 0 means unlimited
    #[serde(default = "default_preview_limit")]
    pub limit_per_rule: usize,
}

impl Default for PreviewArgs {
    fn default() -> Self {
        Self {
            rules: None,
            limit_per_rule: DEFAULT_PREVIEW_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelArgs {
    #[serde(default)]
    pub rules: Option<Vec<String>>,
    #[serde(default)]
    pub review_label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteArgs {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_older_than_days")]
    pub older_than_days: u32,
    #[serde(default = "default_true")]
    pub dry_run: bool,
    #[serde(default)]
    pub permanent: bool,
}

impl Default for DeleteArgs {
    fn default() -> Self {
        Self {
            label: None,
            older_than_days: DEFAULT_OLDER_THAN_DAYS,
            dry_run: true,
            permanent: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendersArgs {
    #[serde(default = "default_since_days")]
    pub since_days: u32,
    #[serde(default = "default_max_senders")]
    pub max_senders: usize,
}

impl Default for SendersArgs {
    fn default() -> Self {
        Self {
            since_days: DEFAULT_SINCE_DAYS,
            max_senders: DEFAULT_MAX_SENDERS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribeArgs {
    /// Thread cap; 0 means unlimited
    #[serde(default = "default_max_emails")]
    pub max_emails: usize,
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

impl Default for UnsubscribeArgs {
    fn default() -> Self {
        Self {
            max_emails: DEFAULT_MAX_EMAILS,
            dry_run: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoReport {
    pub name: String,
    pub policy: String,
    pub review_label: String,
    pub default_rules: Vec<String>,
}

/// Tools exposed over the CLI and HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    Preview,
    LabelCandidates,
    DeleteLabeled,
    TopNoisySenders,
    AutoUnsubscribe,
    Info,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::Preview,
        ToolName::LabelCandidates,
        ToolName::DeleteLabeled,
        ToolName::TopNoisySenders,
        ToolName::AutoUnsubscribe,
        ToolName::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Preview => "preview",
            ToolName::LabelCandidates => "label_candidates",
            ToolName::DeleteLabeled => "delete_labeled",
            ToolName::TopNoisySenders => "top_noisy_senders",
            ToolName::AutoUnsubscribe => "auto_unsubscribe",
            ToolName::Info => "info",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::Preview => "Count threads matching each cleanup rule without changing anything",
            ToolName::LabelCandidates => "Attach the review label to every thread matching the rules",
            ToolName::DeleteLabeled => {
                "Trash (or permanently delete) review-labelled threads older than a threshold; dry run by default"
            }
            ToolName::TopNoisySenders => "Rank the most frequent senders over a recent window",
            ToolName::AutoUnsubscribe => {
                "Harvest List-Unsubscribe links and visit the web ones; dry run by default"
            }
            ToolName::Info => "Describe the service policy, review label and default rules",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = CleanupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "preview" | "preview_cleanup" => Ok(ToolName::Preview),
            "label_candidates" => Ok(ToolName::LabelCandidates),
            "delete_labeled" => Ok(ToolName::DeleteLabeled),
            "top_noisy_senders" => Ok(ToolName::TopNoisySenders),
            "auto_unsubscribe" => Ok(ToolName::AutoUnsubscribe),
            "info" => Ok(ToolName::Info),
            other => Err(CleanupError::InvalidArgument(format!("Unknown tool: {}", other))),
        }
    }
}

/// Name and description of one tool, as listed by the catalogue
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
}

pub fn catalogue() -> Vec<ToolDescriptor> {
    ToolName::ALL
        .iter()
        .map(|tool| ToolDescriptor {
            name: tool.as_str(),
            description: tool.description(),
        })
        .collect()
}

/// Settings the tools read from configuration
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub review_label: String,
    pub default_rules: Vec<String>,
    pub batch_concurrency: usize,
}

impl ToolSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            review_label: config.service.review_label.clone(),
            default_rules: config.service.default_rules.clone(),
            batch_concurrency: config.batch.concurrency,
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Structured `{"error": ...}` reply
pub fn error_reply(message: impl fmt::Display) -> Value {
    json!({ "error": message.to_string() })
}

fn reply<T: Serialize>(result: Result<T>) -> Value {
    match result.and_then(|value| serde_json::to_value(value).map_err(CleanupError::from)) {
        Ok(value) => value,
        Err(e) => {
            warn!("Tool failed: {}", e);
            error_reply(e)
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: ToolName, args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| {
        CleanupError::InvalidArgument(format!("Invalid arguments for {}: {}", tool, e))
    })
}

/// The cleanup tools bound to a client provider and link fetcher
pub struct CleanupTools {
    provider: Arc<dyn ServiceProvider>,
    fetcher: Arc<dyn LinkFetcher>,
    settings: ToolSettings,
}

impl CleanupTools {
    pub fn new(
        provider: Arc<dyn ServiceProvider>,
        fetcher: Arc<dyn LinkFetcher>,
        settings: ToolSettings,
    ) -> Self {
        Self {
            provider,
            fetcher,
            settings,
        }
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    fn rules_or_default(&self, supplied: Option<Vec<String>>) -> Vec<String> {
        rules::select_rules(supplied, &self.settings.default_rules)
    }

    /// Dispatch by wire name; unknown names get an error reply
    pub async fn dispatch(&self, name: &str, args: Value) -> Value {
        match name.parse::<ToolName>() {
            Ok(tool) => self.call(tool, args).await,
            Err(e) => error_reply(e),
        }
    }

    pub async fn call(&self, tool: ToolName, args: Value) -> Value {
        info!("Running tool {}", tool);
        match tool {
            ToolName::Preview => match parse_args(tool, args) {
                Ok(args) => reply(Ok(self.preview(args).await)),
                Err(e) => {
                    warn!("Tool failed: {}", e);
                    reply(Ok(PreviewReport::rejected(
                        &self.settings.review_label,
                        e.to_string(),
                    )))
                }
            },
            ToolName::LabelCandidates => match parse_args(tool, args) {
                Ok(args) => reply(self.label_candidates(args).await),
                Err(e) => error_reply(e),
            },
            ToolName::DeleteLabeled => match parse_args(tool, args) {
                Ok(args) => reply(self.delete_labeled(args).await),
                Err(e) => error_reply(e),
            },
            ToolName::TopNoisySenders => match parse_args(tool, args) {
                Ok(args) => reply(self.top_noisy_senders(args).await),
                Err(e) => error_reply(e),
            },
            ToolName::AutoUnsubscribe => match parse_args(tool, args) {
                Ok(args) => reply(self.auto_unsubscribe(args).await),
                Err(e) => error_reply(e),
            },
            ToolName::Info => reply(Ok(self.info())),
        }
    }

    pub async fn preview(&self, args: PreviewArgs) -> PreviewReport {
        let review_label = &self.settings.review_label;
        let reader = match self.provider.reader().await {
            Ok(reader) => reader,
            Err(e) => return PreviewReport::unavailable(review_label, &e),
        };

        let rules = self.rules_or_default(args.rules);
        CleanupPipeline::read_only(reader.as_ref())
            .preview(&rules, SearchLimit::from_count(args.limit_per_rule), review_label)
            .await
    }

    pub async fn label_candidates(&self, args: LabelArgs) -> Result<LabelReport> {
        let rules = self.rules_or_default(args.rules);
        let label = args
            .review_label
            .unwrap_or_else(|| self.settings.review_label.clone());

        let reader = self.provider.reader().await?;
        let writer = self.provider.writer().await?;
        CleanupPipeline::new(reader.as_ref(), writer.as_ref())
            .with_batch_concurrency(self.settings.batch_concurrency)
            .label(&rules, &label)
            .await
    }

    /// A dry run only ever acquires the read client
    pub async fn delete_labeled(&self, args: DeleteArgs) -> Result<DeleteReport> {
        let request = DeleteRequest {
            label: args
                .label
                .unwrap_or_else(|| self.settings.review_label.clone()),
            older_than_days: args.older_than_days,
            dry_run: args.dry_run,
            permanent: args.permanent,
        };

        let reader = self.provider.reader().await?;
        if request.dry_run {
            return CleanupPipeline::read_only(reader.as_ref())
                .delete(&request)
                .await;
        }

        let writer = self.provider.writer().await?;
        CleanupPipeline::new(reader.as_ref(), writer.as_ref())
            .with_batch_concurrency(self.settings.batch_concurrency)
            .delete(&request)
            .await
    }

    pub async fn top_noisy_senders(&self, args: SendersArgs) -> Result<IndexMap<String, usize>> {
        let reader = self.provider.reader().await?;
        senders::top_noisy_senders(reader.as_ref(), args.since_days, args.max_senders).await
    }

    pub async fn auto_unsubscribe(&self, args: UnsubscribeArgs) -> Result<UnsubscribeReport> {
        let reader = self.provider.reader().await?;
        unsubscribe::auto_unsubscribe(
            reader.as_ref(),
            self.fetcher.as_ref(),
            args.max_emails,
            args.dry_run,
        )
        .await
    }

    pub fn info(&self) -> InfoReport {
        InfoReport {
            name: SERVICE_NAME.to_string(),
            policy: POLICY.to_string(),
            review_label: self.settings.review_label.clone(),
            default_rules: self.settings.default_rules.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_round_trip() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>().unwrap(), tool);
        }
        assert_eq!("preview_cleanup".parse::<ToolName>().unwrap(), ToolName::Preview);
        assert!("drop_everything".parse::<ToolName>().is_err());
    }

    #[test]
    fn test_argument_defaults() {
        let preview: PreviewArgs = parse_args(ToolName::Preview, Value::Null).unwrap();
        assert_eq!(preview.limit_per_rule, 500);
        assert!(preview.rules.is_none());

        let delete: DeleteArgs = parse_args(ToolName::DeleteLabeled, json!({})).unwrap();
        assert!(delete.dry_run);
        assert!(!delete.permanent);
        assert_eq!(delete.older_than_days, 7);

        let senders: SendersArgs = parse_args(ToolName::TopNoisySenders, json!({})).unwrap();
        assert_eq!((senders.since_days, senders.max_senders), (60, 20));

        let unsub: UnsubscribeArgs = parse_args(ToolName::AutoUnsubscribe, json!({})).unwrap();
        assert_eq!(unsub.max_emails, 500);
        assert!(unsub.dry_run);
    }

    #[test]
    fn test_malformed_arguments_are_rejected() {
        let err = parse_args::<DeleteArgs>(ToolName::DeleteLabeled, json!({"older_than_days": "soon"}))
            .unwrap_err();
        assert!(matches!(err, CleanupError::InvalidArgument(_)));
        assert!(err.to_string().contains("delete_labeled"));
    }

    #[test]
    fn test_catalogue_lists_every_tool() {
        let names: Vec<&str> = catalogue().iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "preview",
                "label_candidates",
                "delete_labeled",
                "top_noisy_senders",
                "auto_unsubscribe",
                "info"
            ]
        );
    }
}
