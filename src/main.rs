use anyhow::Result;
use clap::Parser;
use inbox_sweep::cli::{self, Cli, Commands, ProgressReporter};
use inbox_sweep::config::Config;
use inbox_sweep::error::SweepError;
use inbox_sweep::models::UnsubscribeOutcome;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Vec<u8>,
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let msg = String::from_utf8_lossy(&self.buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter {
            multi: Arc::clone(&self.multi),
            buffer: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        eprintln!("\nFor help, run: inbox-sweep --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On Windows, use ring (no NASM/CMake required)
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("inbox_sweep=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("inbox_sweep=info,warn"))
    };

    // Logs print above spinners through the shared MultiProgress
    let multi_progress = Arc::new(MultiProgress::new());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter {
            multi: Arc::clone(&multi_progress),
        })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    if let Commands::InitConfig { output, force } = &cli.command {
        if output.exists() && !force {
            return Err(SweepError::ConfigError(format!(
                "Configuration file already exists at {:?}. Use --force to overwrite.",
                output
            ))
            .into());
        }

        Config::create_example(output).await?;

        println!("Created example configuration file at: {:?}", output);
        println!("\nKey settings to review:");
        println!("  - engine.page_size: Messages per list call (1-500)");
        println!("  - engine.fetch_concurrency: Metadata requests in flight (1-50)");
        println!("  - engine.label_filter: Labels to survey (default INBOX)");
        println!("  - engine.failure_policy: 'abort' or 'skip' on a failed message fetch");
        return Ok(());
    }

    let config = Config::load(&cli.config).await?;
    let reporter = ProgressReporter::with_multi_progress((*multi_progress).clone());
    let supplier = cli::build_supplier(&cli, &config).await?;

    match &cli.command {
        Commands::Auth { force } => {
            if *force {
                supplier.sign_out().await?;
                tracing::info!("Removed existing token cache");
            }

            let spinner = reporter.add_spinner("Authenticating with Gmail API...");
            let credential = supplier.sign_in().await?;
            reporter.finish_spinner(&spinner, "Successfully authenticated with Gmail API");

            if let Some(expires_at) = credential.expires_at() {
                println!("Token valid until: {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!("Token cached at: {:?}", cli.token_cache_path(&config));
        }

        Commands::SignOut => {
            supplier.sign_out().await?;
            println!("Signed out; removed {:?}", cli.token_cache_path(&config));
        }

        Commands::Summary { pages } => {
            let session = cli::open_session(supplier.as_ref(), &config, &reporter).await?;
            let snapshot = cli::load_mailbox(&session, *pages, &reporter).await?;
            println!("\n{}", cli::format_summary(&snapshot));
        }

        Commands::Senders { limit, pages } => {
            let session = cli::open_session(supplier.as_ref(), &config, &reporter).await?;
            let snapshot = cli::load_mailbox(&session, *pages, &reporter).await?;
            println!("\n{}", cli::format_senders(&snapshot, *limit));
        }

        Commands::List {
            category,
            unread,
            pages,
        } => {
            let session = cli::open_session(supplier.as_ref(), &config, &reporter).await?;
            let snapshot = cli::load_mailbox(&session, *pages, &reporter).await?;
            let records = cli::filter_records(&snapshot, *category, *unread);
            println!("\n{}", cli::format_records(records));
        }

        Commands::Delete { sender, yes, pages } => {
            let session = cli::open_session(supplier.as_ref(), &config, &reporter).await?;
            let snapshot = cli::load_mailbox(&session, *pages, &reporter).await?;

            let count = snapshot.from_sender(sender).len();
            if count == 0 {
                println!("No loaded messages from {}", sender);
                return Ok(());
            }

            let confirmed = *yes
                || reporter
                    .multi_progress()
                    .suspend(|| cli::confirm_delete(sender, count))?;
            if !confirmed {
                println!("Aborted.");
                return Ok(());
            }

            let spinner = reporter.add_spinner(&format!("Deleting {} messages...", count));
            let deleted = session.delete_from(sender).await?;
            reporter.finish_spinner(
                &spinner,
                &format!("Deleted {} messages from {}", deleted, sender),
            );
        }

        Commands::MarkRead { sender, pages } => {
            let session = cli::open_session(supplier.as_ref(), &config, &reporter).await?;
            cli::load_mailbox(&session, *pages, &reporter).await?;

            let spinner = reporter.add_spinner("Marking messages as read...");
            let changed = session.mark_read_from(sender).await?;
            reporter.finish_spinner(
                &spinner,
                &format!("Marked {} messages from {} as read", changed, sender),
            );
        }

        Commands::Unsubscribe { sender, pages } => {
            let session = cli::open_session(supplier.as_ref(), &config, &reporter).await?;
            cli::load_mailbox(&session, *pages, &reporter).await?;

            match session.unsubscribe_from(sender).await? {
                UnsubscribeOutcome::Link(link) => {
                    println!("Unsubscribe from {}:", sender);
                    println!("  {}", link);
                }
                UnsubscribeOutcome::NoLinkFound => {
                    if let Some(notice) = session.status().notice {
                        println!("{}", notice);
                    }
                }
            }
        }

        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(sweep_err) = error.downcast_ref::<SweepError>() {
        match sweep_err.root() {
            SweepError::AuthError(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid.");
                eprintln!("      You can download it from Google Cloud Console.");
                eprintln!("      Try running: inbox-sweep auth --force");
            }
            SweepError::Api { status: 401, .. } | SweepError::Api { status: 403, .. } => {
                eprintln!("\nHint: The access token was rejected or lacks a scope.");
                eprintln!("      Try running: inbox-sweep auth --force");
            }
            SweepError::Api { status: 429, .. } => {
                eprintln!("\nHint: You've hit Gmail API rate limits.");
                eprintln!("      Wait a few seconds and try again.");
                eprintln!("      Consider reducing engine.fetch_concurrency in config.");
            }
            SweepError::Api { .. } | SweepError::Network(_) => {
                eprintln!("\nHint: This may be a temporary API error.");
                eprintln!("      Try running the command again.");
            }
            SweepError::NotFound { .. } => {
                eprintln!("\nHint: Senders must match exactly. Run: inbox-sweep senders");
            }
            SweepError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: inbox-sweep init-config --force");
            }
            _ => {}
        }
    }
}
