use anyhow::{Result, anyhow};
use std::time::Duration;
use tracing::debug;

use crate::config::WatchConfig;
use crate::observation::CanonicalObservation;

/// Late trains named in the status line before it is cut off.
const STATUS_TRAINS: usize = 2;

/// One cycle's headline numbers as shown on the dashboard channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardMetrics {
    pub total: usize,
    /// Trains more than `minor_delay` behind.
    pub late: usize,
    pub max_delay: i64,
    pub status: String,
}

impl DashboardMetrics {
    /// `None` for an empty batch; there is nothing to chart.
    pub fn from_batch(batch: &[CanonicalObservation], minor_delay: i64) -> Option<Self> {
        let max_delay = batch.iter().map(|o| o.delay_minutes).max()?;
        let late: Vec<_> = batch
            .iter()
            .filter(|o| o.delay_minutes > minor_delay)
            .collect();

        let status = if late.is_empty() {
            format!("All Clear ({} trains)", batch.len())
        } else {
            late.iter()
                .take(STATUS_TRAINS)
                .map(|o| format!("Tr{} +{}m", o.vehicle_id, o.delay_minutes))
                .collect::<Vec<_>>()
                .join(" | ")
        };

        Some(Self {
            total: batch.len(),
            late: late.len(),
            max_delay,
            status,
        })
    }
}

/// Pushes per-cycle metrics to a ThingSpeak-style channel update endpoint as a
/// form post.
pub struct DashboardPusher {
    url: String,
    api_key: String,
    minor_delay: i64,
    client: reqwest::Client,
}

impl DashboardPusher {
    pub fn new(url: String, api_key: String, minor_delay: i64, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url,
            api_key,
            minor_delay,
            client,
        })
    }

    /// `Ok(None)` when no channel key is configured.
    pub fn from_config(config: &WatchConfig) -> Result<Option<Self>> {
        let Some(key) = &config.thingspeak_api_key else {
            return Ok(None);
        };
        Self::new(
            config.thingspeak_url.clone(),
            key.clone(),
            config.thresholds.minor_delay,
            config.request_timeout,
        )
        .map(Some)
    }

    /// Posts the batch's metrics. Returns `false` without a request when the
    /// batch is empty.
    #[tracing::instrument(skip_all, fields(trains = batch.len()))]
    pub async fn push(&self, batch: &[CanonicalObservation]) -> Result<bool> {
        let Some(metrics) = DashboardMetrics::from_batch(batch, self.minor_delay) else {
            return Ok(false);
        };

        let form = [
            ("api_key", self.api_key.clone()),
            ("field1", metrics.total.to_string()),
            ("field2", metrics.late.to_string()),
            ("field3", metrics.max_delay.to_string()),
            ("status", metrics.status.clone()),
        ];
        let response = self.client.post(&self.url).form(&form).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("dashboard returned status {}", response.status()));
        }
        debug!(status = %metrics.status, "Dashboard metrics pushed");
        Ok(true)
    }
}
