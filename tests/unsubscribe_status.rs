use mailsweep::config::{AppDefaults, Heuristics};
use mailsweep::errors::AppError;
use mailsweep::storage::Database;
use mailsweep::types::{now_ts, Account, EmailRecord, Provider, UnsubscribeStatus};
use mailsweep::unsubscribe::UnsubscribeEngine;

async fn seed_email(db: &Database, id: &str) -> EmailRecord {
    let account = Account {
        id: "acct-1".to_string(),
        user_id: "u1".to_string(),
        provider: Provider::Gmail,
        email_address: "me@example.com".to_string(),
        access_token: "tok".to_string(),
        refresh_token: None,
        token_expires_at: Some(i64::MAX),
        created_at: 0,
        updated_at: 0,
    };
    db.save_account(&account).await.unwrap();

    let now = now_ts();
    let email = EmailRecord {
        id: id.to_string(),
        user_id: "u1".to_string(),
        account_id: account.id.clone(),
        provider_message_id: format!("msg-{id}"),
        thread_id: String::new(),
        subject: Some("Newsletter".to_string()),
        from_address: None,
        to_address: None,
        received_at: now,
        snippet: String::new(),
        raw_body: String::new(),
        html_body: None,
        unsubscribe_urls: vec!["https://example.com/unsubscribe".to_string()],
        category_id: None,
        ai_category: None,
        ai_summary: None,
        archived: false,
        deleted: false,
        unsubscribe_status: UnsubscribeStatus::None,
        unsubscribed_at: None,
        created_at: now,
        updated_at: now,
    };
    db.upsert_email(&email).await.unwrap();
    email
}

async fn status_of(db: &Database, id: &str) -> UnsubscribeStatus {
    db.load_emails_by_ids(&[id.to_string()])
        .await
        .unwrap()
        .remove(0)
        .unsubscribe_status
}

#[tokio::test]
async fn status_only_moves_forward() {
    let db = Database::new_in_memory().await.unwrap();
    seed_email(&db, "e1").await;

    assert!(db
        .set_unsubscribe_status("e1", UnsubscribeStatus::Pending, None)
        .await
        .unwrap());
    assert_eq!(status_of(&db, "e1").await, UnsubscribeStatus::Pending);

    assert!(db
        .set_unsubscribe_status("e1", UnsubscribeStatus::Success, Some(now_ts()))
        .await
        .unwrap());
    assert_eq!(status_of(&db, "e1").await, UnsubscribeStatus::Success);

    // Terminal states never revert.
    assert!(!db
        .set_unsubscribe_status("e1", UnsubscribeStatus::Pending, None)
        .await
        .unwrap());
    assert!(!db
        .set_unsubscribe_status("e1", UnsubscribeStatus::Failed, None)
        .await
        .unwrap());
    assert_eq!(status_of(&db, "e1").await, UnsubscribeStatus::Success);
}

#[tokio::test]
async fn failed_is_terminal_too() {
    let db = Database::new_in_memory().await.unwrap();
    seed_email(&db, "e1").await;

    db.set_unsubscribe_status("e1", UnsubscribeStatus::Failed, None)
        .await
        .unwrap();
    assert!(!db
        .set_unsubscribe_status("e1", UnsubscribeStatus::Success, Some(now_ts()))
        .await
        .unwrap());
    assert_eq!(status_of(&db, "e1").await, UnsubscribeStatus::Failed);
}

#[tokio::test]
async fn empty_id_list_is_rejected() {
    let db = Database::new_in_memory().await.unwrap();
    let engine = UnsubscribeEngine::new(db, &AppDefaults::load().unwrap(), &Heuristics::default());

    let err = engine.run(&[]).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn emails_without_targets_report_no_urls() {
    let db = Database::new_in_memory().await.unwrap();
    let mut email = seed_email(&db, "e1").await;
    email.unsubscribe_urls = Vec::new();
    email.id = "e2".to_string();
    email.provider_message_id = "msg-e2".to_string();
    db.upsert_email(&email).await.unwrap();

    let engine = UnsubscribeEngine::new(
        db.clone(),
        &AppDefaults::load().unwrap(),
        &Heuristics::default(),
    );
    let report = engine.run(&["e2".to_string()]).await.unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].status, "no-urls");
    assert_eq!(status_of(&db, "e2").await, UnsubscribeStatus::None);
}

#[tokio::test]
async fn browser_launch_failure_reports_automation_error() {
    let db = Database::new_in_memory().await.unwrap();
    seed_email(&db, "e1").await;

    let mut defaults = AppDefaults::load().unwrap();
    defaults.chrome_path = Some("/nonexistent/chrome-binary".to_string());
    let engine = UnsubscribeEngine::new(db.clone(), &defaults, &Heuristics::default());

    let report = engine.run(&["e1".to_string()]).await.unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].status, "error");
    let message = report.results[0].error.as_deref().unwrap();
    assert!(message.contains("Automation error"), "got: {message}");
    assert_eq!(status_of(&db, "e1").await, UnsubscribeStatus::Failed);
}

#[tokio::test]
async fn terminal_emails_are_not_retried() {
    let db = Database::new_in_memory().await.unwrap();
    seed_email(&db, "e1").await;
    db.set_unsubscribe_status("e1", UnsubscribeStatus::Success, Some(now_ts()))
        .await
        .unwrap();

    let engine = UnsubscribeEngine::new(
        db.clone(),
        &AppDefaults::load().unwrap(),
        &Heuristics::default(),
    );
    // No browser launch happens for an already-terminal email.
    let report = engine.run(&["e1".to_string()]).await.unwrap();

    assert_eq!(report.results[0].status, "success");
    assert_eq!(status_of(&db, "e1").await, UnsubscribeStatus::Success);
}
