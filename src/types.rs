use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Provider {
    Gmail,
}

/// A connected mail identity. Created by the (external) auth flow; this core
/// only reads it and persists refreshed credentials back.
#[derive(Clone, Debug)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub provider: Provider,
    pub email_address: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Account {
    /// Expired (or expiring within 60s) tokens must be refreshed before use.
    pub fn token_expired(&self, now: i64) -> bool {
        match self.token_expires_at {
            None => true,
            Some(expiry) => expiry <= now + 60,
        }
    }
}

/// User-defined taxonomy node, unique per (user_id, name).
#[derive(Clone, Debug, Serialize)]
pub struct Category {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub created_at: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsubscribeStatus {
    None,
    Pending,
    Success,
    Failed,
}

impl UnsubscribeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_db(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "success" => Self::Success,
            "failed" => Self::Failed,
            _ => Self::None,
        }
    }

    /// Terminal states never transition again; `pending` never reverts.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

#[derive(Clone, Debug)]
pub struct EmailRecord {
    pub id: String,
    pub user_id: String,
    pub account_id: String,
    pub provider_message_id: String,
    pub thread_id: String,
    pub subject: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub received_at: i64,
    pub snippet: String,
    pub raw_body: String,
    pub html_body: Option<String>,
    pub unsubscribe_urls: Vec<String>,
    pub category_id: Option<String>,
    pub ai_category: Option<String>,
    pub ai_summary: Option<String>,
    pub archived: bool,
    pub deleted: bool,
    pub unsubscribe_status: UnsubscribeStatus,
    pub unsubscribed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Per-account incremental sync watermark.
#[derive(Clone, Debug)]
pub struct IngestCursor {
    pub account_id: String,
    pub history_id: String,
    pub last_checked_at: i64,
}

/// A message body is a tree of MIME parts: containers carry children,
/// leaves carry a MIME type and decoded bytes.
#[derive(Clone, Debug)]
pub enum BodyPart {
    Container { children: Vec<BodyPart> },
    Leaf { mime_type: String, data: Vec<u8> },
}

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
