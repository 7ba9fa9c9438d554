//! Gmail bulk cleanup
//!
//! Label-first, delete-later mailbox hygiene. Threads matching a set of
//! cleanup rules are tagged with a review label; a later, separate step
//! trashes (or permanently deletes) threads that carry the label and are
//! older than a threshold.
//!
//! # Overview
//!
//! - **Search**: token-chained, capped thread listing
//! - **Label registry**: name-to-id resolution with create-if-missing
//! - **Batch mutation**: one mutation over many threads, per-item failures counted
//! - **Pipeline**: preview, label and delete stages
//! - **Analytics**: frequent-sender tally and `List-Unsubscribe` harvesting
//! - **Tools**: the operations above as JSON-in, JSON-out tools, served over HTTP
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_cleanup::pipeline::CleanupPipeline;
//! use gmail_cleanup::search::SearchLimit;
//! use gmail_cleanup::service::{GmailServiceProvider, ServiceProvider};
//! use gmail_cleanup::config::Config;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let provider = GmailServiceProvider::new(Arc::new(config.clone()));
//!
//!     let reader = provider.reader().await?;
//!     let report = CleanupPipeline::read_only(reader.as_ref())
//!         .preview(
//!             &config.service.default_rules,
//!             SearchLimit::from_count(500),
//!             &config.service.review_label,
//!         )
//!         .await;
//!
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 token files and Gmail hub construction per scope
//! - [`client`] - `MailClient` trait and the rate-limited Gmail implementation
//! - [`search`] - Paginated thread search
//! - [`label_registry`] - Review label resolution
//! - [`batch`] - Batch mutations
//! - [`pipeline`] - Preview / label / delete stages
//! - [`senders`] - Sender tally
//! - [`unsubscribe`] - Unsubscribe link harvesting
//! - [`rules`] - Default rules and derived queries
//! - [`service`] - Scoped client acquisition
//! - [`tools`] - Tool dispatch and structured replies
//! - [`server`] - HTTP surface
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases

pub mod auth;
pub mod batch;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod label_registry;
pub mod models;
pub mod pipeline;
pub mod rate_limiter;
pub mod rules;
pub mod search;
pub mod senders;
pub mod server;
pub mod service;
pub mod tools;
pub mod unsubscribe;

// Re-export commonly used types for convenience
pub use error::{CleanupError, Result};

pub use batch::{BatchMutator, BatchResult, ItemFailure, Mutation};
pub use client::{GmailMailClient, LabelInfo, MailClient, ThreadPage};
pub use config::Config;
pub use label_registry::LabelRegistry;
pub use pipeline::{CleanupPipeline, DeleteReport, DeleteRequest, LabelReport, PreviewReport};
pub use search::{search_threads, SearchLimit};
pub use service::{GmailServiceProvider, ServiceProvider};
pub use tools::{CleanupTools, ToolName, ToolSettings};
pub use unsubscribe::{HttpLinkFetcher, LinkFetcher, UnsubscribeReport};
