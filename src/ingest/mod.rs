mod cursor;

pub use cursor::CursorTracker;

use crate::classify::Classifier;
use crate::errors::AppError;
use crate::extract::{extract_bodies, harvest_unsubscribe_urls, ExtractedContent};
use crate::mail::{GmailClient, MailClient};
use crate::storage::Database;
use crate::types::{new_id, now_ts, Account, EmailRecord, UnsubscribeStatus};
use anyhow::Result;
use serde::Serialize;
use tracing::{error, info, warn};

pub const MAX_WINDOW_DAYS: u32 = 30;
pub const MAX_BATCH: u32 = 50;
pub const MAX_RECATEGORIZE: u32 = 500;

/// Per-account result of one ingestion pass.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOutcome {
    pub account_id: String,
    pub email_address: String,
    pub imported: usize,
    pub query_used: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IngestReport {
    pub results: Vec<AccountOutcome>,
}

/// Pull-based ingestion across all connected accounts: fetch, extract,
/// classify, store, archive, advance cursor.
pub struct IngestEngine {
    db: Database,
    classifier: Classifier,
    cursor: CursorTracker,
}

impl IngestEngine {
    pub fn new(db: Database, classifier: Classifier) -> Self {
        let cursor = CursorTracker::new(db.clone());
        Self {
            db,
            classifier,
            cursor,
        }
    }

    /// One ingestion pass over every account. A failing account is
    /// reported and skipped, never fatal for the batch.
    pub async fn run(&self, days: u32, max: u32) -> Result<IngestReport> {
        let days = days.clamp(1, MAX_WINDOW_DAYS);
        let max = max.clamp(1, MAX_BATCH);

        let accounts = self.db.list_accounts().await?;
        info!(count = accounts.len(), days, max, "Starting ingestion");

        let mut outcomes = Vec::with_capacity(accounts.len());
        for account in accounts {
            let mut client = GmailClient::new(
                &account.access_token,
                account.refresh_token.as_deref(),
            );
            match self.ingest_account(&account, &mut client, days, max).await {
                Ok(outcome) => {
                    info!(
                        account = %account.id,
                        imported = outcome.imported,
                        query = %outcome.query_used,
                        "Account ingested"
                    );
                    outcomes.push(outcome);
                }
                Err(e) => {
                    error!(account = %account.id, error = %e, "Account ingestion failed");
                    outcomes.push(AccountOutcome {
                        account_id: account.id.clone(),
                        email_address: account.email_address.clone(),
                        imported: 0,
                        query_used: String::new(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(IngestReport { results: outcomes })
    }

    /// Ingest one account through the given mailbox client.
    pub async fn ingest_account(
        &self,
        account: &Account,
        client: &mut dyn MailClient,
        days: u32,
        max: u32,
    ) -> Result<AccountOutcome> {
        if account.token_expired(now_ts()) {
            self.refresh_and_persist(account, client).await?;
        }

        let mut query = build_query(days);
        // A stale expiry timestamp can let a dead token through the
        // pre-emptive check; refresh once more if the provider rejects it.
        let mut ids = match client.list_message_ids(&query, max).await {
            Ok(ids) => ids,
            Err(AppError::AuthExpired) => {
                self.refresh_and_persist(account, client).await?;
                client.list_message_ids(&query, max).await?
            }
            Err(e) => return Err(e.into()),
        };

        // Widen to the full window exactly once if the narrow one is empty.
        if ids.is_empty() && days < MAX_WINDOW_DAYS {
            query = build_query(MAX_WINDOW_DAYS);
            info!(account = %account.id, query = %query, "Empty window; widening once");
            ids = client.list_message_ids(&query, max).await?;
        }

        let mut imported = 0;
        for id in &ids {
            let existing = self.db.find_email_by_provider_id(&account.id, id).await?;
            // Stored and categorized means fully processed; skip.
            if matches!(&existing, Some(e) if e.category_id.is_some()) {
                continue;
            }

            let msg = match client.fetch_message(id).await {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(account = %account.id, message = %id, error = %e, "Skipping unfetchable message");
                    continue;
                }
            };
            let content = extract_bodies(&msg.body);
            let unsubscribe_urls =
                harvest_unsubscribe_urls(msg.list_unsubscribe.as_deref(), &content);

            let prompt_content = content_for_classification(
                msg.subject.as_deref(),
                msg.from.as_deref(),
                msg.to.as_deref(),
                &content,
            );
            let classification = self
                .classifier
                .classify(&account.user_id, &prompt_content)
                .await;

            match existing {
                None => {
                    let now = now_ts();
                    let record = EmailRecord {
                        id: new_id(),
                        user_id: account.user_id.clone(),
                        account_id: account.id.clone(),
                        provider_message_id: msg.id.clone(),
                        thread_id: msg.thread_id.clone(),
                        subject: msg.subject.clone(),
                        from_address: msg.from.clone(),
                        to_address: msg.to.clone(),
                        received_at: msg.received_at,
                        snippet: msg.snippet.clone(),
                        raw_body: content.text.clone().unwrap_or_default(),
                        html_body: content.html.clone(),
                        unsubscribe_urls,
                        category_id: classification.category_id.clone(),
                        ai_category: classification.category_name.clone(),
                        ai_summary: classification.summary.clone(),
                        archived: false,
                        deleted: false,
                        unsubscribe_status: UnsubscribeStatus::None,
                        unsubscribed_at: None,
                        created_at: now,
                        updated_at: now,
                    };
                    self.db.upsert_email(&record).await?;

                    // Archive only after the record is stored; a failed
                    // archive leaves the row non-archived for a later pass.
                    match client.archive(std::slice::from_ref(id)).await {
                        Ok(()) => self.db.mark_email_archived(&record.id).await?,
                        Err(e) => {
                            warn!(account = %account.id, message = %id, error = %e, "Archive failed; leaving in inbox");
                        }
                    }
                }
                Some(existing) => {
                    self.db
                        .update_email_classification(
                            &existing.id,
                            classification.category_id.as_deref(),
                            classification.category_name.as_deref(),
                            classification.summary.as_deref(),
                        )
                        .await?;
                }
            }
            imported += 1;
        }

        if !ids.is_empty() {
            if let Some(watermark) = client.current_watermark().await? {
                self.cursor.record(&account.id, &watermark).await?;
            }
        }

        Ok(AccountOutcome {
            account_id: account.id.clone(),
            email_address: account.email_address.clone(),
            imported,
            query_used: query,
            error: None,
        })
    }

    /// Re-run classification over stored emails that are uncategorized or
    /// filed under a generic bucket. Touches no mailbox.
    pub async fn recategorize(&self, user_id: &str, limit: u32) -> Result<usize> {
        let limit = limit.clamp(1, MAX_RECATEGORIZE);

        let categories = self.db.list_categories(user_id).await?;
        let generic_ids: Vec<String> = categories
            .iter()
            .filter(|c| {
                crate::classify::categories::is_generic_name(
                    &c.name,
                    self.classifier_heuristics(),
                )
            })
            .map(|c| c.id.clone())
            .collect();

        let emails = self
            .db
            .load_emails_for_recategorize(user_id, &generic_ids, limit)
            .await?;
        info!(user = %user_id, count = emails.len(), "Recategorizing stored emails");

        let mut updated = 0;
        for email in emails {
            let content = ExtractedContent {
                text: Some(email.raw_body.clone()).filter(|t| !t.is_empty()),
                html: email.html_body.clone(),
            };
            let prompt_content = content_for_classification(
                email.subject.as_deref(),
                email.from_address.as_deref(),
                email.to_address.as_deref(),
                &content,
            );
            let classification = self.classifier.classify(user_id, &prompt_content).await;
            self.db
                .update_email_classification(
                    &email.id,
                    classification.category_id.as_deref(),
                    classification.category_name.as_deref(),
                    classification.summary.as_deref(),
                )
                .await?;
            updated += 1;
        }

        Ok(updated)
    }

    async fn refresh_and_persist(
        &self,
        account: &Account,
        client: &mut dyn MailClient,
    ) -> Result<()> {
        let creds = client.refresh_credentials().await?;
        self.db
            .update_account_tokens(
                &account.id,
                &creds.access_token,
                creds.refresh_token.as_deref(),
                creds.expires_at,
            )
            .await?;
        info!(account = %account.id, "Refreshed credentials");
        Ok(())
    }

    fn classifier_heuristics(&self) -> &crate::config::Heuristics {
        self.classifier.heuristics()
    }
}

fn build_query(days: u32) -> String {
    format!("newer_than:{days}d -in:drafts -in:spam -in:trash")
}

fn content_for_classification(
    subject: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    content: &ExtractedContent,
) -> String {
    format!(
        "{}\nFrom: {}\nTo: {}\n\n{}",
        subject.unwrap_or(""),
        from.unwrap_or(""),
        to.unwrap_or(""),
        content.best_text()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_excludes_noise_folders() {
        assert_eq!(build_query(7), "newer_than:7d -in:drafts -in:spam -in:trash");
    }
}
