mod gmail;

pub use gmail::GmailClient;

use crate::errors::AppResult;
use crate::types::BodyPart;
use async_trait::async_trait;

/// Credentials issued by the provider's token endpoint. The caller is
/// responsible for persisting these; the client itself holds no storage.
#[derive(Clone, Debug)]
pub struct NewCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

/// A fully fetched message with decoded MIME tree.
#[derive(Clone, Debug)]
pub struct FullMessage {
    pub id: String,
    pub thread_id: String,
    pub snippet: String,
    pub received_at: i64,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub list_unsubscribe: Option<String>,
    pub body: BodyPart,
}

/// Provider-facing mailbox operations. One instance per account.
#[async_trait]
pub trait MailClient: Send + Sync {
    /// Message ids matching a provider search query, newest first.
    async fn list_message_ids(&self, query: &str, max: u32) -> AppResult<Vec<String>>;

    /// Full message including the decoded body part tree.
    async fn fetch_message(&self, message_id: &str) -> AppResult<FullMessage>;

    /// Remove the given messages from the inbox. They stay searchable in
    /// the provider's archive.
    async fn archive(&self, message_ids: &[String]) -> AppResult<()>;

    /// Opaque incremental-sync watermark for the mailbox, if the provider
    /// exposes one.
    async fn current_watermark(&self) -> AppResult<Option<String>>;

    /// Exchange the refresh token for fresh credentials and start using
    /// them. Returns the new credentials so the caller can persist them.
    async fn refresh_credentials(&mut self) -> AppResult<NewCredentials>;
}
