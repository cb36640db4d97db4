use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// The model behind classification. Constructor-injected so tests can
/// substitute canned or failing implementations.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(&self, prompt: &str) -> AppResult<String>;
}

/// Ollama generate response (non-streaming).
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Oracle backed by a local Ollama instance.
pub struct OllamaOracle {
    client: Client,
    url: String,
    model: String,
}

impl OllamaOracle {
    pub fn new(url: &str, model: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("building HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Oracle for OllamaOracle {
    async fn generate(&self, prompt: &str) -> AppResult<String> {
        let url = format!("{}/api/generate", self.url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
            "options": {
                "temperature": 0.1
            }
        });

        debug!(model = %self.model, "Calling oracle");

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Oracle(format!("request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(AppError::Oracle(format!(
                "unexpected status: {}",
                resp.status()
            )));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Oracle(format!("malformed response: {}", e)))?;

        Ok(parsed.response)
    }
}
