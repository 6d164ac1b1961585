use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::config::Thresholds;
use crate::observation::{CanonicalObservation, VehicleStatus};

/// Disruption classification of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    #[default]
    None,
    LateMajor,
    Canceled,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::None => "NONE",
            Condition::LateMajor => "LATE_MAJOR",
            Condition::Canceled => "CANCELED",
        }
    }
}

/// What the tracker remembers about a vehicle since its last alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlertState {
    pub condition: Condition,
    pub last_alerted_delay: i64,
}

/// A decision that a vehicle's disruption is worth announcing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub vehicle_id: String,
    pub condition: Condition,
    /// Worsening of an already announced severe delay.
    pub is_update: bool,
    pub previous_delay: i64,
    pub delay_minutes: i64,
    pub station: String,
}

/// Per-vehicle alert state machine.
///
/// `evaluate` is called once per poll cycle with the full active set. State is
/// only created when an alert fires and is dropped as soon as the vehicle
/// leaves the feed, so a returning vehicle starts from a clean slate.
#[derive(Debug)]
pub struct DisruptionTracker {
    thresholds: Thresholds,
    states: HashMap<String, AlertState>,
}

impl DisruptionTracker {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            states: HashMap::new(),
        }
    }

    pub fn state(&self, vehicle_id: &str) -> Option<&AlertState> {
        self.states.get(vehicle_id)
    }

    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    pub fn classify(&self, obs: &CanonicalObservation) -> Condition {
        if obs.status == VehicleStatus::Canceled {
            Condition::Canceled
        } else if obs.delay_minutes >= self.thresholds.major_delay {
            Condition::LateMajor
        } else {
            Condition::None
        }
    }

    /// Applies one poll cycle and returns the alerts to send.
    ///
    /// State is updated as soon as an alert is decided; delivery outcome has no
    /// bearing on it.
    pub fn evaluate(&mut self, batch: &[CanonicalObservation]) -> Vec<Alert> {
        if batch.is_empty() {
            if !self.states.is_empty() {
                info!(cleared = self.states.len(), "Empty poll, clearing alert state");
            }
            self.states.clear();
            return Vec::new();
        }

        let mut alerts = Vec::new();
        let mut active: HashSet<&str> = HashSet::with_capacity(batch.len());

        for obs in batch {
            active.insert(obs.vehicle_id.as_str());

            let previous = self
                .states
                .get(&obs.vehicle_id)
                .copied()
                .unwrap_or_default();
            let current = self.classify(obs);

            let is_update = match (current, previous.condition) {
                (Condition::Canceled, Condition::Canceled) => continue,
                (Condition::Canceled, _) => false,
                (Condition::LateMajor, Condition::None) => false,
                (Condition::LateMajor, Condition::LateMajor)
                    if obs.delay_minutes
                        >= previous.last_alerted_delay + self.thresholds.escalation_step =>
                {
                    true
                }
                _ => continue,
            };

            debug!(
                vehicle_id = %obs.vehicle_id,
                from = previous.condition.as_str(),
                to = current.as_str(),
                is_update,
                "Alert triggered"
            );

            self.states.insert(
                obs.vehicle_id.clone(),
                AlertState {
                    condition: current,
                    last_alerted_delay: obs.delay_minutes,
                },
            );
            alerts.push(Alert {
                vehicle_id: obs.vehicle_id.clone(),
                condition: current,
                is_update,
                previous_delay: previous.last_alerted_delay,
                delay_minutes: obs.delay_minutes,
                station: obs.station.clone(),
            });
        }

        let before = self.states.len();
        self.states.retain(|id, _| active.contains(id.as_str()));
        let purged = before - self.states.len();
        if purged > 0 {
            debug!(purged, "Dropped state for vehicles no longer in feed");
        }

        alerts
    }
}
