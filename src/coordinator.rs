//! Bulk delete / mark-read / unsubscribe by sender
//!
//! Every operation targets the records currently in the snapshot whose
//! sender matches exactly. Local state changes only after the remote calls
//! succeed; a failed call leaves the snapshot untouched.

use futures::future::try_join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, SweepError};
use crate::gateway::MailboxGateway;
use crate::models::{MessageRecord, UnsubscribeLink, UnsubscribeOutcome, UNREAD_LABEL};
use crate::snapshot::SnapshotStore;

/// Header carrying unsubscribe mechanisms
pub const UNSUBSCRIBE_HEADER: &str = "List-Unsubscribe";

static WEB_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s,<>]+").unwrap());

static MAILTO_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"mailto:[^\s,<>]+").unwrap());

/// Extract an unsubscribe link, preferring web links over mailto
pub fn extract_unsubscribe_link(header: &str) -> Option<UnsubscribeLink> {
    if let Some(m) = WEB_LINK.find(header) {
        return Some(UnsubscribeLink::Web(m.as_str().to_string()));
    }
    MAILTO_LINK
        .find(header)
        .map(|m| UnsubscribeLink::Mailto(m.as_str().to_string()))
}

/// Applies bulk changes remotely, then reconciles the snapshot
pub struct MutationCoordinator<G> {
    gateway: Arc<G>,
    store: Arc<SnapshotStore>,
    modify_chunk_size: usize,
}

impl<G: MailboxGateway> MutationCoordinator<G> {
    pub fn new(gateway: Arc<G>, store: Arc<SnapshotStore>, modify_chunk_size: usize) -> Self {
        Self {
            gateway,
            store,
            modify_chunk_size: modify_chunk_size.max(1),
        }
    }

    fn ids_from(&self, sender: &str, filter: impl Fn(&MessageRecord) -> bool) -> Vec<String> {
        self.store
            .current()
            .from_sender(sender)
            .into_iter()
            .filter(|r| filter(*r))
            .map(|r| r.id.clone())
            .collect()
    }

    /// Delete every known message from `sender`. Returns the number removed.
    pub async fn delete_from_sender(&self, sender: &str) -> Result<usize> {
        let ids = self.ids_from(sender, |_| true);

        match ids.as_slice() {
            [] => {
                debug!("No messages from {} to delete", sender);
                return Ok(0);
            }
            [id] => self.gateway.delete_one(id).await?,
            _ => self.gateway.batch_delete(&ids).await?,
        }

        let removed = self.store.remove(&ids.into_iter().collect());
        info!("Deleted {} messages from {}", removed, sender);
        Ok(removed)
    }

    /// Mark every unread message from `sender` as read. Returns the number changed.
    pub async fn mark_read_from_sender(&self, sender: &str) -> Result<usize> {
        let ids = self.ids_from(sender, |r| !r.is_read);
        if ids.is_empty() {
            debug!("No unread messages from {}", sender);
            return Ok(0);
        }

        let remove = [UNREAD_LABEL.to_string()];
        // Chunks run concurrently; any failure fails the whole operation
        try_join_all(
            ids.chunks(self.modify_chunk_size)
                .map(|chunk| self.gateway.batch_modify(chunk, &[], &remove)),
        )
        .await?;

        let targets: HashSet<String> = ids.into_iter().collect();
        let changed = self.store.replace(&targets, MessageRecord::marked_read);
        info!("Marked {} messages from {} as read", changed, sender);
        Ok(changed)
    }

    /// Look up the unsubscribe link for `sender` using its first known message
    pub async fn unsubscribe_from_sender(&self, sender: &str) -> Result<UnsubscribeOutcome> {
        let first = self
            .store
            .current()
            .from_sender(sender)
            .first()
            .map(|r| r.id.clone())
            .ok_or_else(|| SweepError::NotFound {
                sender: sender.to_string(),
            })?;

        let raw = self
            .gateway
            .get_message_metadata(&first, &[UNSUBSCRIBE_HEADER])
            .await?;

        let outcome = raw
            .header(UNSUBSCRIBE_HEADER)
            .and_then(extract_unsubscribe_link)
            .map(UnsubscribeOutcome::Link)
            .unwrap_or(UnsubscribeOutcome::NoLinkFound);

        match &outcome {
            UnsubscribeOutcome::Link(link) => info!("Unsubscribe link for {}: {}", sender, link),
            UnsubscribeOutcome::NoLinkFound => info!("No unsubscribe link for {}", sender),
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_link_preferred() {
        let link = extract_unsubscribe_link("<https://x.example/unsub>, <mailto:a@b.com>");
        assert_eq!(
            link,
            Some(UnsubscribeLink::Web("https://x.example/unsub".to_string()))
        );
    }

    #[test]
    fn test_web_link_preferred_even_when_listed_second() {
        let link = extract_unsubscribe_link("<mailto:a@b.com>, <http://x.example/u?id=1>");
        assert_eq!(
            link,
            Some(UnsubscribeLink::Web("http://x.example/u?id=1".to_string()))
        );
    }

    #[test]
    fn test_mailto_fallback() {
        let link = extract_unsubscribe_link("<mailto:leave@list.example?subject=unsubscribe>");
        assert_eq!(
            link,
            Some(UnsubscribeLink::Mailto(
                "mailto:leave@list.example?subject=unsubscribe".to_string()
            ))
        );
    }

    #[test]
    fn test_no_link() {
        assert_eq!(extract_unsubscribe_link(""), None);
        assert_eq!(extract_unsubscribe_link("<ftp://x.example>"), None);
    }
}
