//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use inbox_sweep::config::EngineConfig;
use inbox_sweep::error::{Result, SweepError};
use inbox_sweep::gateway::MailboxGateway;
use inbox_sweep::models::{MailboxCategory, MessageList, MessageRecord, PageToken, RawMetadata};
use mockall::mock;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Raw metadata as the gateway would return it
pub fn raw_message(id: &str, from: &str, labels: &[&str], size: i64) -> RawMetadata {
    RawMetadata {
        id: id.to_string(),
        label_ids: labels.iter().map(|l| l.to_string()).collect(),
        headers: vec![
            ("From".to_string(), from.to_string()),
            ("Subject".to_string(), format!("Message {}", id)),
        ],
        size_estimate: Some(size),
        internal_date: Some(1_704_124_800_000),
    }
}

/// Raw metadata carrying a List-Unsubscribe header
pub fn raw_with_unsubscribe(id: &str, from: &str, header: &str) -> RawMetadata {
    let mut raw = raw_message(id, from, &["INBOX", "CATEGORY_PROMOTIONS"], 1000);
    raw.headers
        .push(("List-Unsubscribe".to_string(), header.to_string()));
    raw
}

/// `count` unread promotional messages from `from`, ids prefixed with `prefix`
pub fn messages_from(prefix: &str, from: &str, count: usize) -> Vec<RawMetadata> {
    (0..count)
        .map(|i| {
            raw_message(
                &format!("{}{}", prefix, i),
                from,
                &["INBOX", "UNREAD", "CATEGORY_PROMOTIONS"],
                100 + i as i64,
            )
        })
        .collect()
}

/// Create a test record with default values
pub fn record(id: &str, sender: &str, size: u64, is_read: bool) -> MessageRecord {
    MessageRecord {
        id: id.to_string(),
        sender: sender.to_string(),
        subject: format!("Subject {}", id),
        timestamp: Utc::now(),
        size_bytes: size,
        is_read,
        category: MailboxCategory::Promotions,
    }
}

pub fn engine_config(page_size: u32) -> EngineConfig {
    EngineConfig {
        page_size,
        ..EngineConfig::default()
    }
}

/// Gmail list messages response (JSON)
pub fn mock_gmail_list_response(
    message_ids: Vec<&str>,
    next_page_token: Option<&str>,
) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = message_ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "threadId": format!("thread_{}", id)
            })
        })
        .collect();

    let mut response = json!({
        "messages": messages,
        "resultSizeEstimate": messages.len()
    });

    if let Some(token) = next_page_token {
        response["nextPageToken"] = json!(token);
    }

    response
}

/// Gmail metadata-format message response (JSON)
pub fn mock_gmail_message_response(id: &str, from: &str, labels: &[&str], size: i32) -> serde_json::Value {
    json!({
        "id": id,
        "threadId": format!("thread_{}", id),
        "labelIds": labels,
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": [
                {"name": "From", "value": from},
                {"name": "Subject", "value": format!("Message {}", id)}
            ]
        },
        "internalDate": "1704124800000",
        "sizeEstimate": size
    })
}

/// A remote call observed by [`FakeGateway`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(Option<String>),
    Get { id: String, headers: Vec<String> },
    BatchDelete(Vec<String>),
    DeleteOne(String),
    BatchModify {
        ids: Vec<String>,
        add: Vec<String>,
        remove: Vec<String>,
    },
}

#[derive(Default)]
struct Failures {
    list: bool,
    get: HashSet<String>,
    batch_delete: bool,
    delete_one: bool,
    /// Fail the n-th batch_modify call (0-based)
    batch_modify_call: Option<usize>,
}

/// Scripted in-memory mailbox recording every call it receives
#[derive(Default)]
pub struct FakeGateway {
    pages: HashMap<Option<String>, MessageList>,
    messages: HashMap<String, RawMetadata>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<Failures>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    modify_calls: AtomicUsize,
    hold_deletes: Mutex<Option<Arc<Notify>>>,
    hold_lists: Mutex<Option<Arc<Notify>>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `messages` into pages of `page_size`, chained by tokens "T1", "T2", ...
    pub fn paged(messages: Vec<RawMetadata>, page_size: usize) -> Self {
        let mut gateway = Self::new();
        let ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
        let chunks: Vec<&[String]> = if ids.is_empty() {
            vec![&ids[..]]
        } else {
            ids.chunks(page_size).collect()
        };

        for (i, chunk) in chunks.iter().enumerate() {
            let token = (i > 0).then(|| format!("T{}", i));
            let next = (i + 1 < chunks.len()).then(|| format!("T{}", i + 1));
            gateway = gateway.with_page(token.as_deref(), chunk.to_vec(), next.as_deref());
        }
        for message in messages {
            gateway = gateway.with_message(message);
        }
        gateway
    }

    pub fn with_page(mut self, token: Option<&str>, ids: Vec<String>, next: Option<&str>) -> Self {
        self.pages.insert(
            token.map(str::to_string),
            MessageList {
                ids,
                next_token: next.map(PageToken::from),
            },
        );
        self
    }

    pub fn with_message(mut self, raw: RawMetadata) -> Self {
        self.messages.insert(raw.id.clone(), raw);
        self
    }

    pub fn fail_list(&self, fail: bool) {
        self.failures.lock().unwrap().list = fail;
    }

    pub fn fail_get(&self, id: &str) {
        self.failures.lock().unwrap().get.insert(id.to_string());
    }

    pub fn fail_batch_delete(&self) {
        self.failures.lock().unwrap().batch_delete = true;
    }

    pub fn fail_delete_one(&self) {
        self.failures.lock().unwrap().delete_one = true;
    }

    pub fn fail_batch_modify_call(&self, n: usize) {
        self.failures.lock().unwrap().batch_modify_call = Some(n);
    }

    /// Make delete calls wait until the returned notify fires
    pub fn hold_deletes(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold_deletes.lock().unwrap() = Some(notify.clone());
        notify
    }

    /// Make the next list call wait until the returned notify fires
    pub fn hold_lists(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold_lists.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn list_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::List(_)))
            .count()
    }

    pub fn mutation_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::List(_) | Call::Get { .. }))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record_call(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn server_error() -> SweepError {
        SweepError::Api {
            status: 500,
            message: "Internal Server Error".to_string(),
        }
    }

    async fn wait_if_held(&self) {
        let notify = self.hold_deletes.lock().unwrap().clone();
        if let Some(notify) = notify {
            notify.notified().await;
        }
    }

    async fn wait_if_list_held(&self) {
        let notify = self.hold_lists.lock().unwrap().take();
        if let Some(notify) = notify {
            notify.notified().await;
        }
    }
}

#[async_trait]
impl MailboxGateway for FakeGateway {
    async fn list_messages(
        &self,
        page_token: Option<&PageToken>,
        _page_size: u32,
        _label_filter: &[String],
    ) -> Result<MessageList> {
        let key = page_token.map(|t| t.as_str().to_string());
        self.record_call(Call::List(key.clone()));
        self.wait_if_list_held().await;

        if self.failures.lock().unwrap().list {
            return Err(Self::server_error());
        }
        self.pages
            .get(&key)
            .cloned()
            .ok_or_else(|| SweepError::Api {
                status: 400,
                message: "Invalid pageToken".to_string(),
            })
    }

    async fn get_message_metadata(
        &self,
        id: &str,
        header_names: &[&'static str],
    ) -> Result<RawMetadata> {
        self.record_call(Call::Get {
            id: id.to_string(),
            headers: header_names.iter().map(|h| h.to_string()).collect(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failures.lock().unwrap().get.contains(id) {
            return Err(Self::server_error());
        }

        let mut raw = self.messages.get(id).cloned().ok_or_else(|| SweepError::Api {
            status: 404,
            message: "Not Found".to_string(),
        })?;
        // Metadata format only returns the requested headers
        raw.headers.retain(|(name, _)| {
            header_names
                .iter()
                .any(|wanted| wanted.eq_ignore_ascii_case(name))
        });
        Ok(raw)
    }

    async fn batch_delete(&self, ids: &[String]) -> Result<()> {
        self.record_call(Call::BatchDelete(ids.to_vec()));
        self.wait_if_held().await;
        if self.failures.lock().unwrap().batch_delete {
            return Err(Self::server_error());
        }
        Ok(())
    }

    async fn delete_one(&self, id: &str) -> Result<()> {
        self.record_call(Call::DeleteOne(id.to_string()));
        self.wait_if_held().await;
        if self.failures.lock().unwrap().delete_one {
            return Err(Self::server_error());
        }
        Ok(())
    }

    async fn batch_modify(
        &self,
        ids: &[String],
        add_labels: &[String],
        remove_labels: &[String],
    ) -> Result<()> {
        self.record_call(Call::BatchModify {
            ids: ids.to_vec(),
            add: add_labels.to_vec(),
            remove: remove_labels.to_vec(),
        });
        let n = self.modify_calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.lock().unwrap().batch_modify_call == Some(n) {
            return Err(Self::server_error());
        }
        Ok(())
    }
}

// Mock implementation of MailboxGateway for testing
mock! {
    pub MailboxGateway {}

    #[async_trait]
    impl MailboxGateway for MailboxGateway {
        async fn list_messages<'s, 'a>(
            &'s self,
            page_token: Option<&'a PageToken>,
            page_size: u32,
            label_filter: &[String],
        ) -> Result<MessageList>;
        async fn get_message_metadata(
            &self,
            id: &str,
            header_names: &[&'static str],
        ) -> Result<RawMetadata>;
        async fn batch_delete(&self, ids: &[String]) -> Result<()>;
        async fn delete_one(&self, id: &str) -> Result<()>;
        async fn batch_modify(
            &self,
            ids: &[String],
            add_labels: &[String],
            remove_labels: &[String],
        ) -> Result<()>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paged_fake_chains_tokens() {
        let gateway = FakeGateway::paged(messages_from("m", "a@b.com", 5), 2);
        assert_eq!(gateway.pages.len(), 3);
        assert_eq!(
            gateway.pages[&None].next_token,
            Some(PageToken::from("T1"))
        );
        assert_eq!(gateway.pages[&Some("T2".to_string())].next_token, None);
        assert_eq!(gateway.pages[&Some("T2".to_string())].ids.len(), 1);
    }

    #[test]
    fn test_paged_fake_empty_mailbox() {
        let gateway = FakeGateway::paged(Vec::new(), 50);
        assert_eq!(gateway.pages.len(), 1);
        assert!(gateway.pages[&None].ids.is_empty());
    }
}
