//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::auth::{
    load_secret_from_env, CredentialSupplier, InstalledFlowSupplier, StaticCredentialSupplier,
};
use crate::config::Config;
use crate::error::{Result, SweepError};
use crate::gateway::GmailGateway;
use crate::models::{MailboxCategory, MessageRecord};
use crate::session::MailboxSession;
use crate::snapshot::MailboxSnapshot;

#[derive(Parser, Debug)]
#[command(name = "inbox-sweep")]
#[command(version = "0.1.0")]
#[command(about = "Find and clean up bulk senders in a Gmail inbox", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file (overrides auth.credentials_path)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Path to token cache file (overrides auth.token_cache_path)
    #[arg(long)]
    pub token_cache: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in to Gmail and cache the token
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Remove the cached token
    SignOut,

    /// Show message, unread and storage totals
    Summary {
        /// Number of pages to load (default: all)
        #[arg(long)]
        pages: Option<usize>,
    },

    /// Rank senders by message count
    Senders {
        /// Show at most this many senders
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Number of pages to load (default: all)
        #[arg(long)]
        pages: Option<usize>,
    },

    /// List loaded messages
    List {
        /// Only messages in this category
        #[arg(long)]
        category: Option<MailboxCategory>,

        /// Only unread messages
        #[arg(long)]
        unread: bool,

        /// Number of pages to load (default: all)
        #[arg(long)]
        pages: Option<usize>,
    },

    /// Permanently delete every loaded message from a sender
    Delete {
        /// Exact sender, as shown by `senders`
        sender: String,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,

        /// Number of pages to load (default: all)
        #[arg(long)]
        pages: Option<usize>,
    },

    /// Mark every loaded message from a sender as read
    MarkRead {
        /// Exact sender, as shown by `senders`
        sender: String,

        /// Number of pages to load (default: all)
        #[arg(long)]
        pages: Option<usize>,
    },

    /// Show the unsubscribe link advertised by a sender
    Unsubscribe {
        /// Exact sender, as shown by `senders`
        sender: String,

        /// Number of pages to load (default: all)
        #[arg(long)]
        pages: Option<usize>,
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

impl Cli {
    pub fn credentials_path<'a>(&'a self, config: &'a Config) -> &'a Path {
        self.credentials
            .as_deref()
            .unwrap_or(&config.auth.credentials_path)
    }

    pub fn token_cache_path<'a>(&'a self, config: &'a Config) -> &'a Path {
        self.token_cache
            .as_deref()
            .unwrap_or(&config.auth.token_cache_path)
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share a MultiProgress with the log writer so log lines print above spinners
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }

    pub fn fail_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✗ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick a credential supplier.
///
/// `INBOX_SWEEP_ACCESS_TOKEN` wins; otherwise the installed-app flow reads
/// the client secret from the credentials file, or from the environment
/// when that file does not exist.
pub async fn build_supplier(cli: &Cli, config: &Config) -> Result<Arc<dyn CredentialSupplier>> {
    if let Ok(supplier) = StaticCredentialSupplier::from_env() {
        info!("Using access token from environment");
        return Ok(Arc::new(supplier));
    }

    let credentials = cli.credentials_path(config);
    let token_cache = cli.token_cache_path(config).to_path_buf();

    if credentials.exists() {
        let supplier = InstalledFlowSupplier::from_secret_file(credentials, token_cache).await?;
        return Ok(Arc::new(supplier));
    }

    warn!(
        "Credentials file {:?} not found, reading client secret from environment",
        credentials
    );
    let secret = load_secret_from_env().map_err(|_| {
        SweepError::AuthError(format!(
            "No credentials file at {:?} and INBOX_SWEEP_CLIENT_ID / INBOX_SWEEP_CLIENT_SECRET are not set",
            credentials
        ))
    })?;
    Ok(Arc::new(InstalledFlowSupplier::new(secret, token_cache)))
}

/// Sign in and open a session against Gmail
pub async fn open_session(
    supplier: &dyn CredentialSupplier,
    config: &Config,
    reporter: &ProgressReporter,
) -> Result<MailboxSession<GmailGateway>> {
    let spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let credential = match supplier.current_credential() {
        Some(credential) if !credential.is_expired() => credential,
        Some(_) => supplier.refresh().await?,
        None => supplier.sign_in().await?,
    };
    reporter.finish_spinner(&spinner, "Gmail API authenticated");

    let gateway = GmailGateway::connect(&credential)?;
    Ok(MailboxSession::new(Arc::new(gateway), &config.engine))
}

/// Load `pages` pages (all when `None`) with a spinner
pub async fn load_mailbox(
    session: &MailboxSession<GmailGateway>,
    pages: Option<usize>,
    reporter: &ProgressReporter,
) -> Result<Arc<MailboxSnapshot>> {
    let spinner = reporter.add_spinner("Loading messages...");
    let mut rx = session.subscribe_snapshot();
    let progress = spinner.clone();
    let watcher = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let loaded = rx.borrow_and_update().len();
            progress.set_message(format!("Loading messages... {} so far", loaded));
        }
    });

    let result = session.fetch_pages(pages).await;
    watcher.abort();

    match result {
        Ok(count) => {
            let more = if session.status().has_more_pages {
                " (more available)"
            } else {
                ""
            };
            reporter.finish_spinner(&spinner, &format!("Loaded {} messages{}", count, more));
            Ok(session.snapshot())
        }
        Err(e) => {
            reporter.fail_spinner(&spinner, "Failed to load messages");
            Err(e)
        }
    }
}

/// Ask before permanently deleting
pub fn confirm_delete(sender: &str, count: usize) -> Result<bool> {
    inquire::Confirm::new(&format!(
        "Permanently delete {} messages from {}?",
        count, sender
    ))
    .with_default(false)
    .with_help_message("This cannot be undone")
    .prompt()
    .map_err(|e| SweepError::IoError(std::io::Error::other(e.to_string())))
}

pub fn format_summary(snapshot: &MailboxSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "========================================");
    let _ = writeln!(out, "Mailbox Summary");
    let _ = writeln!(out, "========================================");
    let _ = writeln!(out, "Messages: {}", snapshot.len());
    let _ = writeln!(out, "Unread: {}", snapshot.unread_count());
    let _ = writeln!(out, "Storage: {}", snapshot.formatted_total_size());
    let _ = writeln!(out, "Senders: {}", snapshot.by_sender().len());

    let groups = snapshot.by_category();
    for category in MailboxCategory::ALL {
        let count = groups.get(&category).map_or(0, Vec::len);
        let _ = writeln!(out, "  {:<12} {}", category, count);
    }
    let _ = write!(out, "========================================");
    out
}

pub fn format_senders(snapshot: &MailboxSnapshot, limit: usize) -> String {
    let ranked = snapshot.senders_by_count();
    if ranked.is_empty() {
        return "No messages loaded.".to_string();
    }

    let mut out = String::new();
    for (sender, count) in ranked.iter().take(limit) {
        let _ = writeln!(out, "{:>6}  {}", count, truncate_string(sender, 70));
    }
    if ranked.len() > limit {
        let _ = writeln!(out, "... and {} more senders", ranked.len() - limit);
    }
    out.trim_end().to_string()
}

pub fn format_records<'a>(records: impl IntoIterator<Item = &'a MessageRecord>) -> String {
    let mut out = String::new();
    for record in records {
        let _ = writeln!(
            out,
            "{} {} {:<11} {:>9}  {}  |  {}",
            if record.is_read { " " } else { "*" },
            record.timestamp.format("%Y-%m-%d"),
            record.category,
            crate::models::format_size(record.size_bytes),
            truncate_string(&record.sender, 40),
            truncate_string(&record.subject, 60),
        );
    }
    if out.is_empty() {
        return "No matching messages.".to_string();
    }
    out.trim_end().to_string()
}

/// Records matching the `list` filters, in snapshot order
pub fn filter_records(
    snapshot: &MailboxSnapshot,
    category: Option<MailboxCategory>,
    unread_only: bool,
) -> Vec<&MessageRecord> {
    snapshot
        .records()
        .iter()
        .filter(|r| category.map_or(true, |c| r.category == c))
        .filter(|r| !unread_only || !r.is_read)
        .collect()
}
