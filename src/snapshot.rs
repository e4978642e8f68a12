//! In-memory mailbox snapshot and its derived views
//!
//! [`SnapshotStore`] owns the canonical record collection. Every change
//! builds a new immutable [`MailboxSnapshot`] and publishes it through a
//! `tokio::sync::watch` channel in a single step, so subscribers observe
//! either the previous or the next state and nothing in between. Derived
//! views are computed from the records on each call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::models::{format_size, MailboxCategory, MessageRecord};

/// Immutable view of all currently-known records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxSnapshot {
    records: Vec<MessageRecord>,
}

impl MailboxSnapshot {
    pub fn new(records: Vec<MessageRecord>) -> Self {
        let mut snapshot = Self::default();
        snapshot.extend_unique(records);
        snapshot
    }

    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MessageRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Message count per sender
    pub fn by_sender(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for record in &self.records {
            *counts.entry(record.sender.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Senders ordered by message count, most first; ties by sender
    pub fn senders_by_count(&self) -> Vec<(String, usize)> {
        let mut senders: Vec<(String, usize)> = self.by_sender().into_iter().collect();
        senders.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        senders
    }

    /// Records grouped by category, each group in snapshot order
    pub fn by_category(&self) -> HashMap<MailboxCategory, Vec<MessageRecord>> {
        let mut groups: HashMap<MailboxCategory, Vec<MessageRecord>> = HashMap::new();
        for record in &self.records {
            groups.entry(record.category).or_default().push(record.clone());
        }
        groups
    }

    pub fn in_category(&self, category: MailboxCategory) -> Vec<&MessageRecord> {
        self.records
            .iter()
            .filter(|r| r.category == category)
            .collect()
    }

    pub fn from_sender(&self, sender: &str) -> Vec<&MessageRecord> {
        self.records.iter().filter(|r| r.sender == sender).collect()
    }

    pub fn unread(&self) -> Vec<&MessageRecord> {
        self.records.iter().filter(|r| !r.is_read).collect()
    }

    pub fn unread_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_read).count()
    }

    pub fn total_size(&self) -> u64 {
        self.records.iter().map(|r| r.size_bytes).sum()
    }

    /// Human-readable total size, e.g. "3.2 MB"
    pub fn formatted_total_size(&self) -> String {
        format_size(self.total_size())
    }

    fn extend_unique(&mut self, records: Vec<MessageRecord>) -> usize {
        let mut known: HashSet<String> = self.records.iter().map(|r| r.id.clone()).collect();
        let before = self.records.len();
        for record in records {
            if known.insert(record.id.clone()) {
                self.records.push(record);
            } else {
                debug!("Skipping duplicate record {}", record.id);
            }
        }
        self.records.len() - before
    }
}

/// Owner of the canonical snapshot
#[derive(Debug)]
pub struct SnapshotStore {
    tx: watch::Sender<Arc<MailboxSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(MailboxSnapshot::default()));
        Self { tx }
    }

    /// Current snapshot
    pub fn current(&self) -> Arc<MailboxSnapshot> {
        self.tx.borrow().clone()
    }

    /// Receive every snapshot published after this call
    pub fn subscribe(&self) -> watch::Receiver<Arc<MailboxSnapshot>> {
        self.tx.subscribe()
    }

    /// Append records, skipping ids already present. Returns the number added.
    pub fn append(&self, records: Vec<MessageRecord>) -> usize {
        let mut added = 0;
        self.tx.send_if_modified(|snapshot| {
            let mut next = (**snapshot).clone();
            added = next.extend_unique(records);
            if added > 0 {
                *snapshot = Arc::new(next);
            }
            added > 0
        });
        debug!("Appended {} records", added);
        added
    }

    /// Remove records by id. Returns the number removed.
    pub fn remove(&self, ids: &HashSet<String>) -> usize {
        let mut removed = 0;
        self.tx.send_if_modified(|snapshot| {
            let records: Vec<MessageRecord> = snapshot
                .records
                .iter()
                .filter(|r| !ids.contains(&r.id))
                .cloned()
                .collect();
            removed = snapshot.len() - records.len();
            if removed > 0 {
                *snapshot = Arc::new(MailboxSnapshot { records });
            }
            removed > 0
        });
        debug!("Removed {} records", removed);
        removed
    }

    /// Substitute `transform(record)` for each record whose id is in `ids`.
    ///
    /// A transform output carrying a different id is rejected and the
    /// original record is kept. Returns the number of records replaced.
    pub fn replace<F>(&self, ids: &HashSet<String>, transform: F) -> usize
    where
        F: Fn(&MessageRecord) -> MessageRecord,
    {
        let mut replaced = 0;
        self.tx.send_if_modified(|snapshot| {
            let records: Vec<MessageRecord> = snapshot
                .records
                .iter()
                .map(|record| {
                    if !ids.contains(&record.id) {
                        return record.clone();
                    }
                    let updated = transform(record);
                    if updated.id != record.id {
                        warn!(
                            "Rejected replacement of {} with a record for {}",
                            record.id, updated.id
                        );
                        return record.clone();
                    }
                    replaced += 1;
                    updated
                })
                .collect();
            if replaced > 0 {
                *snapshot = Arc::new(MailboxSnapshot { records });
            }
            replaced > 0
        });
        debug!("Replaced {} records", replaced);
        replaced
    }

    /// Replace the whole collection at once (full refresh)
    pub fn reset_with(&self, records: Vec<MessageRecord>) -> usize {
        let snapshot = MailboxSnapshot::new(records);
        let len = snapshot.len();
        self.tx.send_replace(Arc::new(snapshot));
        len
    }

    /// Clear all records and derived state
    pub fn reset(&self) {
        self.tx.send_replace(Arc::new(MailboxSnapshot::default()));
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
