//! Upstream feed collection.
//!
//! [`FeedNormalizer`] is a best-effort collector: every failure (HTTP status,
//! timeout, malformed body) is logged and turned into an empty result so the
//! poll loop keeps running.

pub mod document;
pub mod normalize;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::WatchConfig;
use crate::fetch::{ApiKey, BasicClient, HttpClient, fetch_bytes};
use crate::observation::{CanonicalObservation, VehicleStatus};
use document::{FeedDocument, parse_document};
use normalize::{VehicleSnapshot, normalize};

/// On-demand view of one vehicle's next stop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivePrediction {
    pub vehicle_id: String,
    pub stop: String,
    pub status: VehicleStatus,
    pub scheduled: Option<DateTime<FixedOffset>>,
    pub predicted: Option<DateTime<FixedOffset>>,
    pub delay_minutes: i64,
}

impl From<VehicleSnapshot> for LivePrediction {
    fn from(s: VehicleSnapshot) -> Self {
        Self {
            vehicle_id: s.observation.vehicle_id,
            stop: s.observation.station,
            status: s.observation.status,
            scheduled: s.scheduled,
            predicted: s.predicted,
            delay_minutes: s.observation.delay_minutes,
        }
    }
}

pub struct FeedNormalizer {
    client: Box<dyn HttpClient>,
    url: String,
    minor_delay: i64,
}

impl FeedNormalizer {
    pub fn new(client: Box<dyn HttpClient>, url: String, minor_delay: i64) -> Self {
        Self {
            client,
            url,
            minor_delay,
        }
    }

    /// Builds the HTTP stack from configuration, adding the API key header
    /// when one is set.
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        let basic = BasicClient::new(config.request_timeout, config.connect_timeout)?;
        let client: Box<dyn HttpClient> = match &config.api_key {
            Some(key) => Box::new(ApiKey::mbta(basic, key)?),
            None => Box::new(basic),
        };
        Ok(Self::new(
            client,
            config.predictions_url(),
            config.thresholds.minor_delay,
        ))
    }

    /// Returns one observation per active vehicle, or nothing if the feed
    /// could not be read.
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch(&self, now: DateTime<Utc>) -> Vec<CanonicalObservation> {
        let Some(doc) = self.load().await else {
            return Vec::new();
        };

        let observations: Vec<_> = normalize(&doc, self.minor_delay, now)
            .into_iter()
            .map(|s| s.observation)
            .collect();

        info!(
            predictions = doc.data.len(),
            vehicles = observations.len(),
            "Feed normalized"
        );
        observations
    }

    /// Looks up the next-stop prediction for a single vehicle by display id.
    ///
    /// The upstream has no filter for the display id (it is the trip name, or
    /// the vehicle label as a fallback), so this pulls the whole route feed and
    /// matches client-side. Cost is one full feed request per lookup.
    #[tracing::instrument(skip(self))]
    pub async fn get_live_prediction(&self, vehicle_id: &str) -> Option<LivePrediction> {
        let doc = self.load().await?;
        normalize(&doc, self.minor_delay, Utc::now())
            .into_iter()
            .find(|s| s.observation.vehicle_id == vehicle_id)
            .map(LivePrediction::from)
    }

    async fn load(&self) -> Option<FeedDocument> {
        let bytes = match fetch_bytes(self.client.as_ref(), &self.url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Feed HTTP fetch failed");
                return None;
            }
        };
        debug!(bytes = bytes.len(), "Feed bytes received, parsing");

        match parse_document(&bytes) {
            Ok(doc) => Some(doc),
            Err(e) => {
                error!(error = %e, "Feed parse failed");
                None
            }
        }
    }
}
