//! Page-at-a-time mailbox listing driven by continuation tokens

use async_stream::stream;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, SweepError};
use crate::fetcher::MetadataFetcher;
use crate::gateway::MailboxGateway;
use crate::models::{MessageRecord, PageToken};

/// One fetched page of normalized records
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Sorted by descending size
    pub records: Vec<MessageRecord>,
    /// Cursor for the following page; `None` means this was the last one
    pub next_token: Option<PageToken>,
    /// Ids skipped under the skip-on-failure policy
    pub failed_ids: Vec<String>,
}

impl Page {
    pub fn has_more(&self) -> bool {
        self.next_token.is_some()
    }
}

/// Drives bounded list calls and hands references to the metadata fetcher
pub struct PaginationController<G> {
    gateway: Arc<G>,
    fetcher: MetadataFetcher<G>,
    page_size: u32,
    label_filter: Vec<String>,
}

impl<G: MailboxGateway> PaginationController<G> {
    pub fn new(
        gateway: Arc<G>,
        fetcher: MetadataFetcher<G>,
        page_size: u32,
        label_filter: Vec<String>,
    ) -> Self {
        Self {
            gateway,
            fetcher,
            page_size: page_size.max(1),
            label_filter,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetch one page. `None` requests the first page.
    ///
    /// Fails as a whole: no partial page is returned on a list or (under the
    /// abort policy) metadata error.
    pub async fn fetch_page(&self, token: Option<&PageToken>) -> Result<Page> {
        let listing = self
            .gateway
            .list_messages(token, self.page_size, &self.label_filter)
            .await?;

        if listing.ids.len() > self.page_size as usize {
            return Err(SweepError::InvalidResponse(format!(
                "List call returned {} messages for a page size of {}",
                listing.ids.len(),
                self.page_size
            )));
        }

        let outcome = self.fetcher.fetch_records(&listing.ids).await?;
        debug!(
            "Fetched page: {} records, {} failed, more pages: {}",
            outcome.records.len(),
            outcome.failed_ids.len(),
            listing.next_token.is_some()
        );

        Ok(Page {
            records: outcome.records,
            next_token: listing.next_token,
            failed_ids: outcome.failed_ids,
        })
    }

    /// Stream successive pages starting at `start`.
    ///
    /// Ends after the first page without a next token, or after yielding the
    /// first error.
    pub fn pages<'a>(
        &'a self,
        start: Option<PageToken>,
    ) -> Pin<Box<dyn Stream<Item = Result<Page>> + Send + 'a>> {
        Box::pin(stream! {
            let mut token = start;
            let mut page_number = 0usize;

            loop {
                page_number += 1;
                match self.fetch_page(token.as_ref()).await {
                    Ok(page) => {
                        token = page.next_token.clone();
                        let last = token.is_none();
                        yield Ok(page);
                        if last {
                            info!("Reached last page after {} pages", page_number);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Error fetching page {}: {}", page_number, e);
                        yield Err(e);
                        break;
                    }
                }
            }
        })
    }
}
