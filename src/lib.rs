//! Inbox Sweep
//!
//! Engine for surveying a Gmail inbox page by page and cleaning it up in
//! bulk, one sender at a time.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with an owner-only token cache
//! - **Pagination**: bounded list calls chained by continuation tokens
//! - **Metadata fetch**: headers only, in bounded concurrent batches
//! - **Classification**: ordered rule table over Gmail category labels
//! - **Aggregation**: observable snapshot with per-sender and per-category views
//! - **Bulk mutations**: delete, mark read, and unsubscribe lookup by sender
//!
//! # Example Usage
//!
//! ```no_run
//! use inbox_sweep::{config::Config, gateway::GmailGateway, auth::Credential, MailboxSession};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let credential = Credential::new(std::env::var("INBOX_SWEEP_ACCESS_TOKEN")?, None);
//!     let gateway = GmailGateway::connect(&credential)?;
//!     let session = MailboxSession::new(Arc::new(gateway), &config.engine);
//!
//!     session.fetch_first_page().await?;
//!     for (sender, count) in session.snapshot().senders_by_count().iter().take(10) {
//!         println!("{:>5} {}", count, sender);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - Credential suppliers and OAuth2 scopes
//! - [`gateway`] - Gmail REST gateway behind the [`MailboxGateway`] trait
//! - [`pagination`] - Page fetches and the page stream
//! - [`fetcher`] - Batched metadata fetch and record normalization
//! - [`classifier`] - Category rules
//! - [`snapshot`] - Observable record store and derived views
//! - [`coordinator`] - Bulk delete / mark-read / unsubscribe by sender
//! - [`session`] - Busy flags, cursor, and notices for the presentation layer
//! - [`cli`] - Command-line interface
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures

pub mod auth;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod gateway;
pub mod models;
pub mod pagination;
pub mod session;
pub mod snapshot;

// Re-export commonly used types for convenience
pub use error::{Result, SweepError};

// Core data models
pub use models::{
    MailboxCategory, MessageList, MessageRecord, PageToken, RawMetadata, UnsubscribeLink,
    UnsubscribeOutcome,
};

// Engine components
pub use auth::{Credential, CredentialSupplier, InstalledFlowSupplier, StaticCredentialSupplier};
pub use classifier::classify;
pub use coordinator::{extract_unsubscribe_link, MutationCoordinator};
pub use fetcher::{FailurePolicy, MetadataFetcher};
pub use gateway::{GmailGateway, MailboxGateway};
pub use pagination::{Page, PaginationController};
pub use session::{MailboxSession, SessionStatus};
pub use snapshot::{MailboxSnapshot, SnapshotStore};

// Config types
pub use config::{AuthConfig, Config, EngineConfig};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter};
