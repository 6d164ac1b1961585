//! Outbound notification channels.
//!
//! A [`Notifier`] posts a block of text somewhere public and may hand back a
//! URL for the post. [`Dispatcher`] fans a message out to every configured
//! channel in order; the first URL returned is appended to the text sent to
//! the channels after it, so a chat relay can link to the public post.

mod dashboard;
mod webhook;

pub use dashboard::{DashboardMetrics, DashboardPusher};
pub use webhook::WebhookNotifier;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Publishes `text`. `Ok(Some(url))` when the channel exposes a link to the post.
    async fn post(&self, text: &str) -> Result<Option<String>>;
}

/// Outcome of one [`Dispatcher::dispatch`] call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
    pub public_url: Option<String>,
}

#[derive(Clone, Default)]
pub struct Dispatcher {
    channels: Vec<Arc<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn has_channels(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Sends `text` to every channel. A failing channel is logged and skipped.
    pub async fn dispatch(&self, text: &str) -> Delivery {
        let mut delivery = Delivery::default();
        if self.channels.is_empty() {
            debug!("No channels configured, skipping message");
            return delivery;
        }

        for channel in &self.channels {
            let body = match &delivery.public_url {
                Some(url) => format!("{text}\n{url}"),
                None => text.to_string(),
            };

            match channel.post(&body).await {
                Ok(url) => {
                    debug!(channel = channel.name(), "Notification sent");
                    delivery.delivered += 1;
                    if delivery.public_url.is_none() {
                        delivery.public_url = url;
                    }
                }
                Err(e) => {
                    error!(channel = channel.name(), error = %e, "Failed to send notification");
                    delivery.failed += 1;
                }
            }
        }

        if delivery.delivered == 0 {
            warn!(failed = delivery.failed, "Notification reached no channel");
        }
        delivery
    }
}
