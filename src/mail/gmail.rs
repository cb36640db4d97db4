use super::{FullMessage, MailClient, NewCredentials};
use crate::errors::{AppError, AppResult};
use crate::types::BodyPart;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use serde::Deserialize;
use std::env;
use tracing::debug;

const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    #[serde(default)]
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    internal_date: String,
    payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    body: Option<PayloadBody>,
    #[serde(default)]
    parts: Vec<Payload>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct PayloadBody {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    history_id: Option<serde_json::Value>,
}

/// Gmail REST v1 client for one account.
pub struct GmailClient {
    http: reqwest::Client,
    access_token: String,
    refresh_token: Option<String>,
}

impl GmailClient {
    pub fn new(access_token: &str, refresh_token: Option<&str>) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
        }
    }

    fn oauth_client() -> AppResult<BasicClient> {
        let id = env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| AppError::Config("GOOGLE_CLIENT_ID missing".into()))?;
        let secret = env::var("GOOGLE_CLIENT_SECRET")
            .map_err(|_| AppError::Config("GOOGLE_CLIENT_SECRET missing".into()))?;
        Ok(BasicClient::new(
            ClientId::new(id),
            Some(ClientSecret::new(secret)),
            AuthUrl::new(AUTH_URL.to_string())
                .map_err(|e| AppError::Config(format!("bad auth url: {e}")))?,
            Some(
                TokenUrl::new(TOKEN_URL.to_string())
                    .map_err(|e| AppError::Config(format!("bad token url: {e}")))?,
            ),
        ))
    }

    async fn check_status(resp: reqwest::Response) -> AppResult<reqwest::Response> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AppError::AuthExpired);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Network(format!(
                "gmail api returned {status}: {body}"
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl MailClient for GmailClient {
    async fn list_message_ids(&self, query: &str, max: u32) -> AppResult<Vec<String>> {
        let resp = self
            .http
            .get(format!("{API_BASE}/messages"))
            .bearer_auth(&self.access_token)
            .query(&[("q", query), ("maxResults", &max.to_string())])
            .send()
            .await
            .map_err(|e| AppError::Network(format!("message list failed: {e}")))?;
        let resp = Self::check_status(resp).await?;

        let list: MessageListResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Network(format!("parse message list: {e}")))?;
        debug!(count = list.messages.len(), query, "Listed messages");
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn fetch_message(&self, message_id: &str) -> AppResult<FullMessage> {
        let resp = self
            .http
            .get(format!("{API_BASE}/messages/{message_id}"))
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| AppError::Network(format!("message fetch failed: {e}")))?;
        let resp = Self::check_status(resp).await?;

        let detail: MessageDetail = resp
            .json()
            .await
            .map_err(|e| AppError::Network(format!("parse message: {e}")))?;

        let headers = detail
            .payload
            .as_ref()
            .map(|p| p.headers.as_slice())
            .unwrap_or(&[]);
        let header = |name: &str| -> Option<String> {
            headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
        };

        let received_at = detail
            .internal_date
            .parse::<i64>()
            .map(|ms| ms / 1000)
            .unwrap_or_else(|_| Utc::now().timestamp());

        Ok(FullMessage {
            id: detail.id,
            thread_id: detail.thread_id,
            snippet: detail.snippet,
            received_at,
            subject: header("Subject"),
            from: header("From"),
            to: header("To"),
            list_unsubscribe: header("List-Unsubscribe"),
            body: detail
                .payload
                .map(payload_to_part)
                .unwrap_or(BodyPart::Container {
                    children: Vec::new(),
                }),
        })
    }

    async fn archive(&self, message_ids: &[String]) -> AppResult<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        let body = serde_json::json!({
            "ids": message_ids,
            "removeLabelIds": ["INBOX"],
        });
        let resp = self
            .http
            .post(format!("{API_BASE}/messages/batchModify"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("archive failed: {e}")))?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn current_watermark(&self) -> AppResult<Option<String>> {
        let resp = self
            .http
            .get(format!("{API_BASE}/profile"))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("profile fetch failed: {e}")))?;
        let resp = Self::check_status(resp).await?;

        let profile: Profile = resp
            .json()
            .await
            .map_err(|e| AppError::Network(format!("parse profile: {e}")))?;
        // historyId arrives as either a string or a number.
        Ok(profile.history_id.map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }))
    }

    async fn refresh_credentials(&mut self) -> AppResult<NewCredentials> {
        let refresh = self
            .refresh_token
            .clone()
            .ok_or(AppError::AuthExpired)?;

        let client = Self::oauth_client()?;
        let token_res = client
            .exchange_refresh_token(&RefreshToken::new(refresh))
            .request_async(async_http_client)
            .await
            .map_err(|_| AppError::AuthExpired)?;

        let creds = NewCredentials {
            access_token: token_res.access_token().secret().to_string(),
            refresh_token: token_res.refresh_token().map(|r| r.secret().to_string()),
            expires_at: token_res
                .expires_in()
                .map(|d| Utc::now().timestamp() + d.as_secs() as i64),
        };

        self.access_token = creds.access_token.clone();
        if let Some(rt) = &creds.refresh_token {
            self.refresh_token = Some(rt.clone());
        }
        Ok(creds)
    }
}

/// Converts the provider's payload tree into the internal part tree,
/// decoding URL-safe unpadded base64 leaf data. Explicit work stack so
/// pathological nesting depth cannot blow the call stack.
fn payload_to_part(payload: Payload) -> BodyPart {
    enum Work {
        Enter(Payload),
        Assemble(usize),
    }

    let mut work = vec![Work::Enter(payload)];
    let mut built: Vec<BodyPart> = Vec::new();

    while let Some(item) = work.pop() {
        match item {
            Work::Enter(p) => {
                if p.parts.is_empty() {
                    let data = p
                        .body
                        .and_then(|b| b.data)
                        .and_then(|d| URL_SAFE_NO_PAD.decode(d).ok())
                        .unwrap_or_default();
                    built.push(BodyPart::Leaf {
                        mime_type: p.mime_type,
                        data,
                    });
                } else {
                    work.push(Work::Assemble(p.parts.len()));
                    for child in p.parts.into_iter().rev() {
                        work.push(Work::Enter(child));
                    }
                }
            }
            Work::Assemble(n) => {
                let children = built.split_off(built.len() - n);
                built.push(BodyPart::Container { children });
            }
        }
    }

    built.pop().unwrap_or(BodyPart::Container {
        children: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_conversion_preserves_part_order() {
        let payload = Payload {
            mime_type: "multipart/alternative".into(),
            headers: Vec::new(),
            body: None,
            parts: vec![
                Payload {
                    mime_type: "text/plain".into(),
                    headers: Vec::new(),
                    body: Some(PayloadBody {
                        data: Some(URL_SAFE_NO_PAD.encode("hello")),
                    }),
                    parts: Vec::new(),
                },
                Payload {
                    mime_type: "text/html".into(),
                    headers: Vec::new(),
                    body: Some(PayloadBody {
                        data: Some(URL_SAFE_NO_PAD.encode("<p>hello</p>")),
                    }),
                    parts: Vec::new(),
                },
            ],
        };

        match payload_to_part(payload) {
            BodyPart::Container { children } => {
                assert_eq!(children.len(), 2);
                match &children[0] {
                    BodyPart::Leaf { mime_type, data } => {
                        assert_eq!(mime_type, "text/plain");
                        assert_eq!(data, b"hello");
                    }
                    _ => panic!("expected leaf"),
                }
            }
            _ => panic!("expected container"),
        }
    }
}
