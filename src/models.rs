use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder used when a message carries no `From` header
pub const UNKNOWN_SENDER: &str = "Unknown Sender";

/// Placeholder used when a message carries no `Subject` header
pub const NO_SUBJECT: &str = "No Subject";

/// Label the provider attaches to unread messages
pub const UNREAD_LABEL: &str = "UNREAD";

/// One mailbox entry as understood by the engine.
///
/// Records are values: a state change produces a new record with the same
/// `id` instead of editing fields in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: u64,
    pub is_read: bool,
    pub category: MailboxCategory,
}

impl MessageRecord {
    /// Same record with the read flag set
    pub fn marked_read(&self) -> Self {
        Self {
            is_read: true,
            ..self.clone()
        }
    }
}

/// Fixed category taxonomy assigned at fetch time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MailboxCategory {
    Newsletters,
    Social,
    Promotions,
    Personal,
    Other,
}

impl MailboxCategory {
    pub const ALL: [MailboxCategory; 5] = [
        MailboxCategory::Newsletters,
        MailboxCategory::Social,
        MailboxCategory::Promotions,
        MailboxCategory::Personal,
        MailboxCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MailboxCategory::Newsletters => "newsletters",
            MailboxCategory::Social => "social",
            MailboxCategory::Promotions => "promotions",
            MailboxCategory::Personal => "personal",
            MailboxCategory::Other => "other",
        }
    }
}

impl fmt::Display for MailboxCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MailboxCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        MailboxCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown category '{}', expected one of: newsletters, social, promotions, personal, other",
                    s
                )
            })
    }
}

/// Opaque continuation cursor returned by a list call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PageToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for PageToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// One page of message references from a list call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageList {
    pub ids: Vec<String>,
    pub next_token: Option<PageToken>,
}

/// Raw per-message metadata as returned by the gateway
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMetadata {
    pub id: String,
    pub label_ids: Vec<String>,
    /// (name, value) pairs in the order the provider returned them
    pub headers: Vec<(String, String)>,
    pub size_estimate: Option<i64>,
    /// Receive time in epoch milliseconds
    pub internal_date: Option<i64>,
}

impl RawMetadata {
    /// First header value with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.label_ids.iter().any(|l| l == label)
    }
}

/// Link found in a `List-Unsubscribe` header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnsubscribeLink {
    Web(String),
    Mailto(String),
}

impl UnsubscribeLink {
    pub fn as_str(&self) -> &str {
        match self {
            UnsubscribeLink::Web(url) | UnsubscribeLink::Mailto(url) => url,
        }
    }
}

impl fmt::Display for UnsubscribeLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of looking for an unsubscribe link for a sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Link(UnsubscribeLink),
    NoLinkFound,
}

/// Format a byte count for display, e.g. "0 KB", "12 bytes", "12 KB", "1.5 MB"
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1000.0;
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    match bytes {
        0 => return "0 KB".to_string(),
        1 => return "1 byte".to_string(),
        2..=999 => return format!("{} bytes", bytes),
        _ => {}
    }

    let mut value = bytes as f64 / KB;
    let mut unit = 0;
    while value >= KB && unit < UNITS.len() - 1 {
        value /= KB;
        unit += 1;
    }

    if unit == 0 {
        format!("{} KB", value.round() as u64)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
