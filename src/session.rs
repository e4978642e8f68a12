//! Presentation-facing mailbox session
//!
//! The session is the only writer the UI talks to. It owns the pagination
//! cursor and the busy flags, and keeps the latest user-visible notice.
//! Snapshot and status are both published through `watch` channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::coordinator::MutationCoordinator;
use crate::error::{Result, SweepError};
use crate::fetcher::MetadataFetcher;
use crate::gateway::MailboxGateway;
use crate::models::{PageToken, UnsubscribeOutcome};
use crate::pagination::{Page, PaginationController};
use crate::snapshot::{MailboxSnapshot, SnapshotStore};

pub const NO_LINK_NOTICE: &str = "No unsubscribe link found for this sender";
pub const NO_EMAILS_NOTICE: &str = "No emails found from this sender";

/// Observable flags mirrored to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub is_loading: bool,
    pub is_loading_next_page: bool,
    /// A delete, mark-read or unsubscribe is running
    pub is_mutating: bool,
    /// True until a page comes back without a continuation token
    pub has_more_pages: bool,
    /// Latest user-visible message
    pub notice: Option<String>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            is_loading: false,
            is_loading_next_page: false,
            is_mutating: false,
            has_more_pages: true,
            notice: None,
        }
    }
}

/// Clears a busy flag when dropped
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct MailboxSession<G> {
    id: Uuid,
    store: Arc<SnapshotStore>,
    pagination: PaginationController<G>,
    coordinator: MutationCoordinator<G>,
    cursor: Mutex<Option<PageToken>>,
    status: watch::Sender<SessionStatus>,
    fetching: AtomicBool,
    mutating: AtomicBool,
}

impl<G: MailboxGateway> MailboxSession<G> {
    /// Wire up a session over `gateway` using the engine settings
    pub fn new(gateway: Arc<G>, config: &EngineConfig) -> Self {
        let store = Arc::new(SnapshotStore::new());
        let fetcher = MetadataFetcher::new(
            gateway.clone(),
            config.fetch_concurrency,
            config.failure_policy,
        );
        let pagination = PaginationController::new(
            gateway.clone(),
            fetcher,
            config.page_size,
            config.label_filter.clone(),
        );
        let coordinator =
            MutationCoordinator::new(gateway, store.clone(), config.modify_chunk_size);
        let (status, _rx) = watch::channel(SessionStatus::default());
        let id = Uuid::new_v4();

        info!("Started mailbox session {}", id);

        Self {
            id,
            store,
            pagination,
            coordinator,
            cursor: Mutex::new(None),
            status,
            fetching: AtomicBool::new(false),
            mutating: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn snapshot(&self) -> Arc<MailboxSnapshot> {
        self.store.current()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<MailboxSnapshot>> {
        self.store.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn pagination(&self) -> &PaginationController<G> {
        &self.pagination
    }

    fn update_status(&self, f: impl FnOnce(&mut SessionStatus)) {
        self.status.send_modify(f);
    }

    fn set_notice(&self, notice: impl Into<String>) {
        let notice = notice.into();
        warn!("{}", notice);
        self.update_status(|s| s.notice = Some(notice));
    }

    fn report_skipped(&self, page: &Page) {
        if !page.failed_ids.is_empty() {
            warn!(
                "{} messages could not be loaded: {:?}",
                page.failed_ids.len(),
                page.failed_ids
            );
        }
    }

    /// Full refresh: on success the snapshot becomes exactly the first page.
    ///
    /// On failure the previous snapshot and cursor are kept.
    pub async fn fetch_first_page(&self) -> Result<usize> {
        let span = info_span!("fetch_first_page", session = %self.id);
        async {
            let _guard = BusyGuard::acquire(&self.fetching).ok_or_else(|| {
                SweepError::Busy("A page fetch is already in progress".to_string())
            })?;

            self.update_status(|s| s.is_loading = true);

            // Held until the page is applied so a reset cannot interleave
            let mut cursor = self.cursor.lock().await;
            match self.pagination.fetch_page(None).await {
                Ok(page) => {
                    self.report_skipped(&page);
                    let has_more = page.has_more();
                    *cursor = page.next_token;
                    let loaded = self.store.reset_with(page.records);
                    self.update_status(|s| {
                        s.is_loading = false;
                        s.has_more_pages = has_more;
                    });
                    info!("Loaded {} messages (more pages: {})", loaded, has_more);
                    Ok(loaded)
                }
                Err(e) => {
                    drop(cursor);
                    let e = e.context("fetch emails");
                    self.update_status(|s| s.is_loading = false);
                    self.set_notice(e.to_string());
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Append the next page. Returns the number of records added.
    ///
    /// Does nothing when no pages remain or a page fetch is already running.
    pub async fn fetch_next_page(&self) -> Result<usize> {
        Ok(self.try_fetch_next_page().await?.unwrap_or(0))
    }

    /// `None` when the fetch was skipped
    async fn try_fetch_next_page(&self) -> Result<Option<usize>> {
        let span = info_span!("fetch_next_page", session = %self.id);
        async {
            if !self.status().has_more_pages {
                debug!("No more pages to fetch");
                return Ok(None);
            }
            let Some(_guard) = BusyGuard::acquire(&self.fetching) else {
                debug!("Page fetch already in progress, ignoring");
                return Ok(None);
            };

            self.update_status(|s| s.is_loading_next_page = true);

            let mut cursor = self.cursor.lock().await;
            match self.pagination.fetch_page(cursor.as_ref()).await {
                Ok(page) => {
                    self.report_skipped(&page);
                    let has_more = page.has_more();
                    *cursor = page.next_token;
                    let added = self.store.append(page.records);
                    self.update_status(|s| {
                        s.is_loading_next_page = false;
                        s.has_more_pages = has_more;
                    });
                    drop(cursor);
                    info!("Appended {} messages (more pages: {})", added, has_more);
                    Ok(Some(added))
                }
                Err(e) => {
                    drop(cursor);
                    let e = e.context("fetch more emails");
                    self.update_status(|s| s.is_loading_next_page = false);
                    self.set_notice(e.to_string());
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Fetch the first page, then keep appending until the mailbox is
    /// exhausted or `max_pages` pages have been loaded
    pub async fn fetch_pages(&self, max_pages: Option<usize>) -> Result<usize> {
        self.fetch_first_page().await?;
        self.fetch_remaining(max_pages.map(|max| max.saturating_sub(1)))
            .await?;
        Ok(self.store.current().len())
    }

    /// Append up to `max_more` further pages while the mailbox has more.
    ///
    /// Fails with `Busy` if another fetch holds the cursor instead of
    /// counting the skipped fetch as a page.
    async fn fetch_remaining(&self, max_more: Option<usize>) -> Result<usize> {
        let mut pages = 0;

        while self.status().has_more_pages && max_more.map_or(true, |max| pages < max) {
            if self.try_fetch_next_page().await?.is_none() {
                return Err(SweepError::Busy(
                    "A page fetch is already in progress".to_string(),
                ));
            }
            pages += 1;
        }

        Ok(pages)
    }

    /// Run a mutation intent under the mutating flag, mirrored as `is_mutating`
    async fn mutate<T, F>(&self, operation: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let _guard = BusyGuard::acquire(&self.mutating)
            .ok_or_else(|| SweepError::Busy("Another operation is in progress".to_string()))?;

        self.update_status(|s| s.is_mutating = true);
        let result = operation.await;
        self.update_status(|s| s.is_mutating = false);
        result
    }

    /// Delete every loaded message from `sender`
    pub async fn delete_from(&self, sender: &str) -> Result<usize> {
        let span = info_span!("delete_from", session = %self.id, sender);
        self.mutate(async {
            self.coordinator
                .delete_from_sender(sender)
                .await
                .map_err(|e| {
                    let e = e.context("delete emails");
                    self.set_notice(e.to_string());
                    e
                })
        })
        .instrument(span)
        .await
    }

    /// Mark every loaded unread message from `sender` as read
    pub async fn mark_read_from(&self, sender: &str) -> Result<usize> {
        let span = info_span!("mark_read_from", session = %self.id, sender);
        self.mutate(async {
            self.coordinator
                .mark_read_from_sender(sender)
                .await
                .map_err(|e| {
                    let e = e.context("mark emails as read");
                    self.set_notice(e.to_string());
                    e
                })
        })
        .instrument(span)
        .await
    }

    /// Find the unsubscribe link for `sender`
    pub async fn unsubscribe_from(&self, sender: &str) -> Result<UnsubscribeOutcome> {
        let span = info_span!("unsubscribe_from", session = %self.id, sender);
        self.mutate(async {
            match self.coordinator.unsubscribe_from_sender(sender).await {
                Ok(UnsubscribeOutcome::NoLinkFound) => {
                    self.set_notice(NO_LINK_NOTICE);
                    Ok(UnsubscribeOutcome::NoLinkFound)
                }
                Ok(outcome) => Ok(outcome),
                Err(e) if e.is_not_found() => {
                    self.set_notice(NO_EMAILS_NOTICE);
                    Err(e)
                }
                Err(e) => {
                    let e = e.context("unsubscribe");
                    self.set_notice(e.to_string());
                    Err(e)
                }
            }
        })
        .instrument(span)
        .await
    }

    /// Drop all loaded state and start over.
    ///
    /// Waits for an in-flight page fetch to be applied first, so its page
    /// never lands on the cleared snapshot.
    pub async fn reset(&self) {
        let mut cursor = self.cursor.lock().await;
        *cursor = None;
        self.store.reset();
        self.status.send_modify(|s| {
            *s = SessionStatus {
                is_mutating: s.is_mutating,
                ..SessionStatus::default()
            }
        });
        drop(cursor);
        info!("Session {} reset", self.id);
    }

    pub fn dismiss_notice(&self) {
        self.status.send_if_modified(|s| s.notice.take().is_some());
    }
}
