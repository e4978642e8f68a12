//! Remote mailbox gateway: thin Gmail API client for list/get/delete/modify

use async_trait::async_trait;
use google_gmail1::{
    api::{BatchDeleteMessagesRequest, BatchModifyMessagesRequest, Message},
    hyper_rustls, hyper_util, Gmail,
};
use std::sync::Arc;
use tracing::debug;

use crate::auth::{Credential, GmailHub, FULL_ACCESS_SCOPE, MODIFY_SCOPE};
use crate::error::{Result, SweepError};
use crate::models::{MessageList, PageToken, RawMetadata};

/// User id addressing the authenticated account
const ME: &str = "me";

/// Operations the engine needs from the remote message store
#[async_trait]
pub trait MailboxGateway: Send + Sync {
    /// List one page of message ids, restricted to the given labels
    async fn list_messages(
        &self,
        page_token: Option<&PageToken>,
        page_size: u32,
        label_filter: &[String],
    ) -> Result<MessageList>;

    /// Fetch header metadata for a single message (never the body)
    async fn get_message_metadata(
        &self,
        id: &str,
        header_names: &[&'static str],
    ) -> Result<RawMetadata>;

    /// Permanently delete several messages in one call
    async fn batch_delete(&self, ids: &[String]) -> Result<()>;

    /// Permanently delete a single message
    async fn delete_one(&self, id: &str) -> Result<()>;

    /// Add and remove labels on several messages in one call
    async fn batch_modify(
        &self,
        ids: &[String],
        add_labels: &[String],
        remove_labels: &[String],
    ) -> Result<()>;
}

/// Gmail REST implementation of [`MailboxGateway`]
pub struct GmailGateway {
    hub: GmailHub,
}

impl GmailGateway {
    /// Wrap an already configured hub
    pub fn with_hub(hub: GmailHub) -> Self {
        Self { hub }
    }

    /// Build a gateway that authorizes every call with the given credential
    pub fn connect(credential: &Credential) -> Result<Self> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| SweepError::Network(format!("Failed to load TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();
        Ok(Self::from_connector(credential, connector))
    }

    /// Same as [`GmailGateway::connect`] with an explicit TLS configuration
    pub fn connect_with_tls_config(credential: &Credential, tls: rustls::ClientConfig) -> Self {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .build();
        Self::from_connector(credential, connector)
    }

    fn from_connector(
        credential: &Credential,
        connector: hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    ) -> Self {
        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build(connector);
        Self::with_hub(Gmail::new(client, credential.access_token().to_string()))
    }

    /// Point the gateway at a different API root (used against local servers)
    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.hub.base_url(base_url.into());
    }
}

/// Convert a Gmail API message into raw metadata
fn parse_raw_metadata(msg: Message) -> Result<RawMetadata> {
    let id = msg
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SweepError::InvalidResponse("Missing message ID".to_string()))?;

    let headers = msg
        .payload
        .and_then(|p| p.headers)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|h| match (h.name, h.value) {
            (Some(name), Some(value)) => Some((name, value)),
            _ => None,
        })
        .collect();

    Ok(RawMetadata {
        id,
        label_ids: msg.label_ids.unwrap_or_default(),
        headers,
        size_estimate: msg.size_estimate.map(i64::from),
        internal_date: msg.internal_date,
    })
}

fn non_empty(labels: &[String]) -> Option<Vec<String>> {
    if labels.is_empty() {
        None
    } else {
        Some(labels.to_vec())
    }
}

#[async_trait]
impl MailboxGateway for GmailGateway {
    async fn list_messages(
        &self,
        page_token: Option<&PageToken>,
        page_size: u32,
        label_filter: &[String],
    ) -> Result<MessageList> {
        let mut call = self
            .hub
            .users()
            .messages_list(ME)
            .max_results(page_size)
            .include_spam_trash(false);

        for label in label_filter {
            call = call.add_label_ids(label);
        }

        if let Some(token) = page_token {
            call = call.page_token(token.as_str());
        }

        let (_, response) = call.add_scope(MODIFY_SCOPE).doit().await?;

        let ids: Vec<String> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect();

        debug!(
            "Listed {} message ids (more pages: {})",
            ids.len(),
            response.next_page_token.is_some()
        );

        Ok(MessageList {
            ids,
            next_token: response
                .next_page_token
                .filter(|t| !t.is_empty())
                .map(PageToken::from),
        })
    }

    async fn get_message_metadata(
        &self,
        id: &str,
        header_names: &[&'static str],
    ) -> Result<RawMetadata> {
        let mut call = self.hub.users().messages_get(ME, id).format("metadata");

        for name in header_names {
            call = call.add_metadata_headers(name);
        }

        let (_, msg) = call.add_scope(MODIFY_SCOPE).doit().await?;
        parse_raw_metadata(msg)
    }

    async fn batch_delete(&self, ids: &[String]) -> Result<()> {
        let request = BatchDeleteMessagesRequest {
            ids: Some(ids.to_vec()),
        };

        self.hub
            .users()
            .messages_batch_delete(request, ME)
            .add_scope(FULL_ACCESS_SCOPE)
            .doit()
            .await?;

        debug!("Batch deleted {} messages", ids.len());
        Ok(())
    }

    async fn delete_one(&self, id: &str) -> Result<()> {
        self.hub
            .users()
            .messages_delete(ME, id)
            .add_scope(FULL_ACCESS_SCOPE)
            .doit()
            .await?;

        debug!("Deleted message {}", id);
        Ok(())
    }

    async fn batch_modify(
        &self,
        ids: &[String],
        add_labels: &[String],
        remove_labels: &[String],
    ) -> Result<()> {
        let request = BatchModifyMessagesRequest {
            ids: Some(ids.to_vec()),
            add_label_ids: non_empty(add_labels),
            remove_label_ids: non_empty(remove_labels),
        };

        self.hub
            .users()
            .messages_batch_modify(request, ME)
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        debug!("Batch modified {} messages", ids.len());
        Ok(())
    }
}

// Shared ownership, so one gateway can back several engine components
#[async_trait]
impl<G: MailboxGateway + ?Sized> MailboxGateway for Arc<G> {
    async fn list_messages(
        &self,
        page_token: Option<&PageToken>,
        page_size: u32,
        label_filter: &[String],
    ) -> Result<MessageList> {
        self.as_ref()
            .list_messages(page_token, page_size, label_filter)
            .await
    }

    async fn get_message_metadata(
        &self,
        id: &str,
        header_names: &[&'static str],
    ) -> Result<RawMetadata> {
        self.as_ref().get_message_metadata(id, header_names).await
    }

    async fn batch_delete(&self, ids: &[String]) -> Result<()> {
        self.as_ref().batch_delete(ids).await
    }

    async fn delete_one(&self, id: &str) -> Result<()> {
        self.as_ref().delete_one(id).await
    }

    async fn batch_modify(
        &self,
        ids: &[String],
        add_labels: &[String],
        remove_labels: &[String],
    ) -> Result<()> {
        self.as_ref()
            .batch_modify(ids, add_labels, remove_labels)
            .await
    }
}
