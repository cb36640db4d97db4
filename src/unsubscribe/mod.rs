use crate::config::{AppDefaults, Heuristics};
use crate::errors::{AppError, AppResult};
use crate::storage::Database;
use crate::types::{now_ts, UnsubscribeStatus};
use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptionsBuilder};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeOutcome {
    pub email_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UnsubscribeReport {
    pub results: Vec<UnsubscribeOutcome>,
}

/// Browser settings handed to the blocking automation task.
#[derive(Clone)]
struct BrowserSettings {
    chrome_path: Option<String>,
    nav_timeout: Duration,
    probe_timeout: Duration,
    settle_wait: Duration,
}

/// Drives a headless browser through stored unsubscribe links. One email
/// at a time; every email gets a terminal status before the next starts.
pub struct UnsubscribeEngine {
    db: Database,
    settings: BrowserSettings,
    probes: Vec<&'static str>,
}

impl UnsubscribeEngine {
    pub fn new(db: Database, defaults: &AppDefaults, heuristics: &Heuristics) -> Self {
        Self {
            db,
            settings: BrowserSettings {
                chrome_path: defaults.chrome_path.clone(),
                nav_timeout: defaults.nav_timeout,
                probe_timeout: defaults.probe_timeout,
                settle_wait: defaults.settle_wait,
            },
            probes: heuristics.unsubscribe_probes.clone(),
        }
    }

    pub async fn run(&self, email_ids: &[String]) -> AppResult<UnsubscribeReport> {
        if email_ids.is_empty() {
            return Err(AppError::InvalidInput(
                "email id list must not be empty".into(),
            ));
        }

        let emails = self
            .db
            .load_emails_by_ids(email_ids)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut results = Vec::with_capacity(emails.len());
        for email in emails {
            if email.unsubscribe_urls.is_empty() {
                results.push(UnsubscribeOutcome {
                    email_id: email.id.clone(),
                    status: "no-urls".into(),
                    error: None,
                });
                continue;
            }

            // Forward-only: already-terminal emails are never retried.
            let started = self
                .db
                .set_unsubscribe_status(&email.id, UnsubscribeStatus::Pending, None)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            if !started {
                results.push(UnsubscribeOutcome {
                    email_id: email.id.clone(),
                    status: email.unsubscribe_status.as_str().into(),
                    error: None,
                });
                continue;
            }

            let urls = email.unsubscribe_urls.clone();
            let settings = self.settings.clone();
            let probes = self.probes.clone();
            let attempt = tokio::task::spawn_blocking(move || {
                attempt_unsubscribe(&urls, &settings, &probes)
            })
            .await;

            let (status, reported, error) = match attempt {
                Ok(Ok(true)) => (UnsubscribeStatus::Success, "success", None),
                Ok(Ok(false)) => (UnsubscribeStatus::Failed, "failed", None),
                Ok(Err(e)) => (
                    UnsubscribeStatus::Failed,
                    "error",
                    Some(AppError::Automation(format!("{e:#}"))),
                ),
                Err(e) => (
                    UnsubscribeStatus::Failed,
                    "error",
                    Some(AppError::Unexpected(e.to_string())),
                ),
            };

            let unsubscribed_at = (status == UnsubscribeStatus::Success).then(now_ts);
            self.db
                .set_unsubscribe_status(&email.id, status, unsubscribed_at)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            info!(email = %email.id, status = reported, "Unsubscribe attempt finished");
            results.push(UnsubscribeOutcome {
                email_id: email.id.clone(),
                status: reported.into(),
                error: error.map(|e| e.to_string()),
            });
        }

        Ok(UnsubscribeReport { results })
    }
}

/// Walks the email's unsubscribe links in stored order, returning on the
/// first successful click. `mailto:` targets are recorded but not acted on.
fn attempt_unsubscribe(
    urls: &[String],
    settings: &BrowserSettings,
    probes: &[&str],
) -> Result<bool> {
    let mut builder = LaunchOptionsBuilder::default();
    builder.headless(true);
    if std::env::var("MAILSWEEP_CHROME_NO_SANDBOX")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        builder.sandbox(false);
    }
    if let Some(path) = &settings.chrome_path {
        builder.path(Some(PathBuf::from(path)));
    }
    let options = builder
        .build()
        .map_err(|e| anyhow::anyhow!("building browser options: {e}"))?;
    let browser = Browser::new(options).context("launching browser")?;

    for url in urls {
        // Only http(s) targets are automatable; mailto and anything
        // unparseable stay recorded but untouched.
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => continue,
        }

        let tab = match browser.new_tab() {
            Ok(tab) => tab,
            Err(e) => {
                warn!(url = %url, error = %e, "Could not open tab");
                continue;
            }
        };

        tab.set_default_timeout(settings.nav_timeout);
        let navigated = tab
            .navigate_to(url)
            .and_then(|t| t.wait_until_navigated());
        if let Err(e) = navigated {
            warn!(url = %url, error = %e, "Navigation failed");
            continue;
        }

        tab.set_default_timeout(settings.probe_timeout);
        for probe in probes {
            let element = match tab.wait_for_xpath(probe) {
                Ok(el) => el,
                Err(_) => continue,
            };
            if element.click().is_ok() {
                // Give the page time to submit before tearing down.
                std::thread::sleep(settings.settle_wait);
                return Ok(true);
            }
        }
    }

    Ok(false)
}
