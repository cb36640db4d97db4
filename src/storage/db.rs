use crate::types::{
    now_ts, Account, Category, EmailRecord, IngestCursor, Provider, UnsubscribeStatus,
};
use anyhow::{Context, Result};
use dirs::home_dir;

use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;

const DB_FILE_NAME: &str = "mailsweep.db";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    pub async fn new_default() -> Result<Self> {
        Self::new_named(DB_FILE_NAME).await
    }

    pub async fn new_named(file_name: &str) -> Result<Self> {
        let base = default_data_dir()?;
        let db_path = base.join(file_name);
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }

        let pool = SqlitePool::connect(&url)
            .await
            .with_context(|| format!("connecting to sqlite at {}", db_path.display()))?;

        let db = Database {
            pool,
            path: db_path,
        };
        db.migrate().await?;
        Ok(db)
    }

    /// In-memory database for tests.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .context("connecting to in-memory sqlite")?;
        let db = Database {
            pool,
            path: PathBuf::from(":memory:"),
        };
        db.migrate().await?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON;")
            .execute(&self.pool)
            .await
            .context("enabling foreign keys")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                email_address TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                token_expires_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id);

            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                UNIQUE(user_id, name)
            );
            CREATE INDEX IF NOT EXISTS idx_categories_user ON categories(user_id);

            CREATE TABLE IF NOT EXISTS emails (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                provider_message_id TEXT NOT NULL,
                thread_id TEXT NOT NULL DEFAULT '',
                subject TEXT,
                from_address TEXT,
                to_address TEXT,
                received_at INTEGER NOT NULL,
                snippet TEXT NOT NULL DEFAULT '',
                raw_body TEXT NOT NULL DEFAULT '',
                html_body TEXT,
                unsubscribe_urls TEXT NOT NULL DEFAULT '[]',
                category_id TEXT,
                ai_category TEXT,
                ai_summary TEXT,
                archived INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                unsubscribe_status TEXT NOT NULL DEFAULT 'none',
                unsubscribed_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(account_id, provider_message_id),
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id)
            );
            CREATE INDEX IF NOT EXISTS idx_emails_user ON emails(user_id, received_at DESC);
            CREATE INDEX IF NOT EXISTS idx_emails_category ON emails(category_id);

            CREATE TABLE IF NOT EXISTS ingest_cursors (
                account_id TEXT PRIMARY KEY,
                history_id TEXT NOT NULL,
                last_checked_at INTEGER NOT NULL,
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("running migrations")?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    pub async fn save_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, user_id, provider, email_address, access_token, refresh_token, token_expires_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                provider = excluded.provider,
                email_address = excluded.email_address,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_expires_at = excluded.token_expires_at,
                updated_at = excluded.updated_at;
            "#,
        )
        .bind(&account.id)
        .bind(&account.user_id)
        .bind(provider_to_str(&account.provider))
        .bind(&account.email_address)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.token_expires_at)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .context("upserting account")?;
        Ok(())
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, provider, email_address, access_token, refresh_token, token_expires_at, created_at, updated_at
            FROM accounts
            ORDER BY created_at ASC;
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("loading accounts")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(Account {
                id: row.get(0),
                user_id: row.get(1),
                provider: provider_from_str(&row.get::<String, _>(2)),
                email_address: row.get(3),
                access_token: row.get(4),
                refresh_token: row.get(5),
                token_expires_at: row.get(6),
                created_at: row.get(7),
                updated_at: row.get(8),
            });
        }
        Ok(out)
    }

    /// Persist refreshed credentials issued by the upstream token endpoint.
    pub async fn update_account_tokens(
        &self,
        account_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        token_expires_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET access_token = ?1,
                refresh_token = COALESCE(?2, refresh_token),
                token_expires_at = ?3,
                updated_at = ?4
            WHERE id = ?5;
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(token_expires_at)
        .bind(now_ts())
        .bind(account_id)
        .execute(&self.pool)
        .await
        .context("updating account tokens")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Categories
    // ------------------------------------------------------------------

    pub async fn list_categories(&self, user_id: &str) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, created_at
            FROM categories
            WHERE user_id = ?1
            ORDER BY name ASC;
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("loading categories")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(Category {
                id: row.get(0),
                user_id: user_id.to_string(),
                name: row.get(1),
                description: row.get(2),
                created_at: row.get(3),
            });
        }
        Ok(out)
    }

    pub async fn find_category_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<Category>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, created_at
            FROM categories
            WHERE user_id = ?1 AND name = ?2;
            "#,
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("loading category by name")?;

        Ok(row.map(|row| Category {
            id: row.get(0),
            user_id: user_id.to_string(),
            name: row.get(1),
            description: row.get(2),
            created_at: row.get(3),
        }))
    }

    /// Atomic create-or-refresh keyed on (user_id, name). Concurrent calls
    /// with the same name resolve to a single row.
    pub async fn upsert_category(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<Category> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, user_id, name, description, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id, name) DO UPDATE SET
                description = excluded.description;
            "#,
        )
        .bind(crate::types::new_id())
        .bind(user_id)
        .bind(name)
        .bind(description)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .context("upserting category")?;

        self.find_category_by_name(user_id, name)
            .await?
            .context("reloading upserted category")
    }

    // ------------------------------------------------------------------
    // Emails
    // ------------------------------------------------------------------

    pub async fn find_email_by_provider_id(
        &self,
        account_id: &str,
        provider_message_id: &str,
    ) -> Result<Option<EmailRecord>> {
        let row = sqlx::query(&format!(
            "{SELECT_EMAIL} WHERE account_id = ?1 AND provider_message_id = ?2;"
        ))
        .bind(account_id)
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading email by provider id")?;

        Ok(row.map(map_email_row))
    }

    /// Insert a freshly ingested email. A duplicate of the same upstream
    /// message resolves to an update that refreshes classification fields
    /// only, never to a second row.
    pub async fn upsert_email(&self, email: &EmailRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO emails (
                id, user_id, account_id, provider_message_id, thread_id,
                subject, from_address, to_address, received_at, snippet,
                raw_body, html_body, unsubscribe_urls, category_id,
                ai_category, ai_summary, archived, deleted,
                unsubscribe_status, unsubscribed_at, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
            ON CONFLICT(account_id, provider_message_id) DO UPDATE SET
                category_id = COALESCE(emails.category_id, excluded.category_id),
                ai_category = COALESCE(excluded.ai_category, emails.ai_category),
                ai_summary = COALESCE(excluded.ai_summary, emails.ai_summary),
                updated_at = excluded.updated_at;
            "#,
        )
        .bind(&email.id)
        .bind(&email.user_id)
        .bind(&email.account_id)
        .bind(&email.provider_message_id)
        .bind(&email.thread_id)
        .bind(&email.subject)
        .bind(&email.from_address)
        .bind(&email.to_address)
        .bind(email.received_at)
        .bind(&email.snippet)
        .bind(&email.raw_body)
        .bind(&email.html_body)
        .bind(serde_json::to_string(&email.unsubscribe_urls).unwrap_or_else(|_| "[]".into()))
        .bind(&email.category_id)
        .bind(&email.ai_category)
        .bind(&email.ai_summary)
        .bind(if email.archived { 1 } else { 0 })
        .bind(if email.deleted { 1 } else { 0 })
        .bind(email.unsubscribe_status.as_str())
        .bind(email.unsubscribed_at)
        .bind(email.created_at)
        .bind(email.updated_at)
        .execute(&self.pool)
        .await
        .context("upserting email")?;
        Ok(())
    }

    pub async fn update_email_classification(
        &self,
        email_id: &str,
        category_id: Option<&str>,
        ai_category: Option<&str>,
        ai_summary: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE emails
            SET category_id = ?1,
                ai_category = COALESCE(?2, ai_category),
                ai_summary = COALESCE(?3, ai_summary),
                updated_at = ?4
            WHERE id = ?5;
            "#,
        )
        .bind(category_id)
        .bind(ai_category)
        .bind(ai_summary)
        .bind(now_ts())
        .bind(email_id)
        .execute(&self.pool)
        .await
        .context("updating email classification")?;
        Ok(())
    }

    pub async fn mark_email_archived(&self, email_id: &str) -> Result<()> {
        sqlx::query("UPDATE emails SET archived = 1, updated_at = ?1 WHERE id = ?2;")
            .bind(now_ts())
            .bind(email_id)
            .execute(&self.pool)
            .await
            .context("marking email archived")?;
        Ok(())
    }

    pub async fn load_emails_by_ids(&self, ids: &[String]) -> Result<Vec<EmailRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_EMAIL);
        qb.push(" WHERE id IN (");
        {
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(id);
            }
        }
        qb.push(")");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("loading emails by id list")?;

        Ok(rows.into_iter().map(map_email_row).collect())
    }

    /// Emails eligible for re-classification: uncategorized, or filed under
    /// one of the given (generic) categories. Soft-deleted rows are skipped.
    pub async fn load_emails_for_recategorize(
        &self,
        user_id: &str,
        generic_category_ids: &[String],
        limit: u32,
    ) -> Result<Vec<EmailRecord>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_EMAIL);
        qb.push(" WHERE user_id = ");
        qb.push_bind(user_id);
        qb.push(" AND deleted = 0 AND (category_id IS NULL");
        if !generic_category_ids.is_empty() {
            qb.push(" OR category_id IN (");
            {
                let mut separated = qb.separated(", ");
                for id in generic_category_ids {
                    separated.push_bind(id);
                }
            }
            qb.push(")");
        }
        qb.push(") ORDER BY received_at DESC LIMIT ");
        qb.push_bind(limit as i64);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("loading emails for recategorize")?;

        Ok(rows.into_iter().map(map_email_row).collect())
    }

    /// Forward-only status transition. Terminal rows (`success`/`failed`)
    /// are left untouched; returns whether a row actually changed.
    pub async fn set_unsubscribe_status(
        &self,
        email_id: &str,
        status: UnsubscribeStatus,
        unsubscribed_at: Option<i64>,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE emails
            SET unsubscribe_status = ?1,
                unsubscribed_at = COALESCE(?2, unsubscribed_at),
                updated_at = ?3
            WHERE id = ?4
              AND unsubscribe_status NOT IN ('success', 'failed');
            "#,
        )
        .bind(status.as_str())
        .bind(unsubscribed_at)
        .bind(now_ts())
        .bind(email_id)
        .execute(&self.pool)
        .await
        .context("updating unsubscribe status")?;
        Ok(res.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Ingest cursors
    // ------------------------------------------------------------------

    pub async fn get_cursor(&self, account_id: &str) -> Result<Option<IngestCursor>> {
        let row = sqlx::query(
            r#"
            SELECT history_id, last_checked_at
            FROM ingest_cursors
            WHERE account_id = ?1;
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading ingest cursor")?;

        Ok(row.map(|row| IngestCursor {
            account_id: account_id.to_string(),
            history_id: row.get(0),
            last_checked_at: row.get(1),
        }))
    }

    pub async fn advance_cursor(
        &self,
        account_id: &str,
        history_id: &str,
        checked_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingest_cursors (account_id, history_id, last_checked_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(account_id) DO UPDATE SET
                history_id = excluded.history_id,
                last_checked_at = excluded.last_checked_at;
            "#,
        )
        .bind(account_id)
        .bind(history_id)
        .bind(checked_at)
        .execute(&self.pool)
        .await
        .context("advancing ingest cursor")?;
        Ok(())
    }
}

const SELECT_EMAIL: &str = r#"
    SELECT id, user_id, account_id, provider_message_id, thread_id,
           subject, from_address, to_address, received_at, snippet,
           raw_body, html_body, unsubscribe_urls, category_id,
           ai_category, ai_summary, archived, deleted,
           unsubscribe_status, unsubscribed_at, created_at, updated_at
    FROM emails
"#;

fn map_email_row(row: sqlx::sqlite::SqliteRow) -> EmailRecord {
    let urls: Vec<String> =
        serde_json::from_str(&row.get::<String, _>(12)).unwrap_or_default();
    EmailRecord {
        id: row.get(0),
        user_id: row.get(1),
        account_id: row.get(2),
        provider_message_id: row.get(3),
        thread_id: row.get(4),
        subject: row.get(5),
        from_address: row.get(6),
        to_address: row.get(7),
        received_at: row.get(8),
        snippet: row.get(9),
        raw_body: row.get(10),
        html_body: row.get(11),
        unsubscribe_urls: urls,
        category_id: row.get(13),
        ai_category: row.get(14),
        ai_summary: row.get(15),
        archived: row.get::<i64, _>(16) == 1,
        deleted: row.get::<i64, _>(17) == 1,
        unsubscribe_status: UnsubscribeStatus::from_db(&row.get::<String, _>(18)),
        unsubscribed_at: row.get(19),
        created_at: row.get(20),
        updated_at: row.get(21),
    }
}

pub(crate) fn default_data_dir() -> Result<PathBuf> {
    if let Ok(custom) = env::var("MAILSWEEP_DATA_DIR") {
        let path = PathBuf::from(custom);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("creating MAILSWEEP_DATA_DIR at {}", path.display()))?;
        return Ok(path);
    }

    if let Some(home) = home_dir() {
        let path = home.join(".mailsweep");
        if std::fs::create_dir_all(&path).is_ok() {
            return Ok(path);
        } else {
            warn!(
                "Unable to create {}/.mailsweep; falling back to workspace-local storage",
                home.display()
            );
        }
    }

    let cwd = env::current_dir().context("determining current directory")?;
    let path = cwd.join("mailsweep-data");
    std::fs::create_dir_all(&path)
        .with_context(|| format!("creating fallback data directory {}", path.display()))?;
    Ok(path)
}

fn provider_to_str(provider: &Provider) -> String {
    match provider {
        Provider::Gmail => "gmail".to_string(),
    }
}

fn provider_from_str(raw: &str) -> Provider {
    match raw {
        "gmail" => Provider::Gmail,
        _ => Provider::Gmail,
    }
}
