use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::Notifier;

/// Discord-style limit on message length.
const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts messages to a chat webhook as `{"content": "..."}`.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn post(&self, text: &str) -> Result<Option<String>> {
        let content: String = text.chars().take(MAX_CONTENT_CHARS).collect();
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { content: &content })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("webhook returned status {status}: {body}"));
        }

        Ok(None)
    }
}
