//! Metadata fetch and normalization for one page of message references

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::classifier::classify;
use crate::error::{Result, SweepError};
use crate::gateway::MailboxGateway;
use crate::models::{MessageRecord, RawMetadata, NO_SUBJECT, UNKNOWN_SENDER, UNREAD_LABEL};

/// Headers requested for each message; bodies are never fetched
pub const METADATA_HEADERS: &[&str] = &["From", "Subject"];

/// What to do when a single message fetch fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// First failure aborts the page
    #[default]
    Abort,
    /// Failed ids are reported and the rest of the page is kept
    Skip,
}

/// Records fetched for one set of references
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Sorted by descending size
    pub records: Vec<MessageRecord>,
    /// Ids whose fetch failed (only populated with [`FailurePolicy::Skip`])
    pub failed_ids: Vec<String>,
}

/// Fetches per-message metadata in bounded concurrent batches
pub struct MetadataFetcher<G> {
    gateway: Arc<G>,
    batch_size: usize,
    policy: FailurePolicy,
}

impl<G: MailboxGateway> MetadataFetcher<G> {
    pub fn new(gateway: Arc<G>, batch_size: usize, policy: FailurePolicy) -> Self {
        Self {
            gateway,
            batch_size: batch_size.max(1),
            policy,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Fetch and normalize the given messages.
    ///
    /// At most `batch_size` requests are in flight; each batch resolves
    /// completely before the next one starts.
    pub async fn fetch_records(&self, ids: &[String]) -> Result<FetchOutcome> {
        let mut outcome = FetchOutcome {
            records: Vec::with_capacity(ids.len()),
            failed_ids: Vec::new(),
        };

        for (index, batch) in ids.chunks(self.batch_size).enumerate() {
            debug!("Fetching metadata batch {} ({} messages)", index + 1, batch.len());

            let results = join_all(batch.iter().map(|id| async move {
                let raw = self
                    .gateway
                    .get_message_metadata(id, METADATA_HEADERS)
                    .await?;
                parse_record(raw)
            }))
            .await;

            for (id, result) in batch.iter().zip(results) {
                match result {
                    Ok(record) => outcome.records.push(record),
                    Err(e) => match self.policy {
                        FailurePolicy::Abort => {
                            warn!("Failed to fetch message {}: {}", id, e);
                            return Err(e);
                        }
                        FailurePolicy::Skip => {
                            warn!("Skipping message {}: {}", id, e);
                            outcome.failed_ids.push(id.clone());
                        }
                    },
                }
            }
        }

        sort_by_size_desc(&mut outcome.records);
        Ok(outcome)
    }
}

/// Largest first; equal sizes keep their fetch order
pub fn sort_by_size_desc(records: &mut [MessageRecord]) {
    records.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
}

/// Normalize raw metadata into a record
pub fn parse_record(raw: RawMetadata) -> Result<MessageRecord> {
    if raw.id.is_empty() {
        return Err(SweepError::InvalidResponse("Missing message ID".to_string()));
    }

    let sender = raw
        .header("From")
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
    let subject = raw
        .header("Subject")
        .map(str::to_string)
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let timestamp = raw
        .internal_date
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let size_bytes = raw.size_estimate.unwrap_or(0).max(0) as u64;

    Ok(MessageRecord {
        is_read: !raw.has_label(UNREAD_LABEL),
        category: classify(&raw.label_ids),
        id: raw.id,
        sender,
        subject,
        timestamp,
        size_bytes,
    })
}
