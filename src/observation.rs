//! Canonical per-vehicle records produced by the feed normalizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating status of a vehicle at observation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    Moving,
    Stopped,
    Late,
    Canceled,
    Unknown,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Moving => "MOVING",
            VehicleStatus::Stopped => "STOPPED",
            VehicleStatus::Late => "LATE",
            VehicleStatus::Canceled => "CANCELED",
            VehicleStatus::Unknown => "UNKNOWN",
        }
    }

    /// Maps a raw upstream `current_status` value.
    pub fn from_upstream(raw: Option<&str>) -> Self {
        match raw {
            Some("IN_TRANSIT_TO") | Some("INCOMING_AT") => VehicleStatus::Moving,
            Some("STOPPED_AT") => VehicleStatus::Stopped,
            _ => VehicleStatus::Unknown,
        }
    }

    /// Parses a stored label. Accepts the canonical names plus the labels
    /// written by the older CSV logger ("Moving To", "At Stop").
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "MOVING" | "Moving To" | "IN_TRANSIT_TO" | "INCOMING_AT" => VehicleStatus::Moving,
            "STOPPED" | "At Stop" | "STOPPED_AT" => VehicleStatus::Stopped,
            "LATE" => VehicleStatus::Late,
            "CANCELED" | "CANCELLED" => VehicleStatus::Canceled,
            _ => VehicleStatus::Unknown,
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Travel direction relative to the downtown terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    In,
    Out,
    Unknown,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
            Direction::Unknown => "UNKNOWN",
        }
    }

    /// Upstream `direction_id`: 0 is outbound, 1 inbound.
    pub fn from_direction_id(id: Option<i64>) -> Self {
        match id {
            Some(0) => Direction::Out,
            Some(1) => Direction::In,
            _ => Direction::Unknown,
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "IN" => Direction::In,
            "OUT" => Direction::Out,
            _ => Direction::Unknown,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One vehicle as seen during a single poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalObservation {
    pub vehicle_id: String,
    pub status: VehicleStatus,
    pub delay_minutes: i64,
    pub station: String,
    pub direction: Direction,
    pub observed_at: DateTime<Utc>,
}

impl CanonicalObservation {
    /// Late beyond `minor_delay`, or canceled outright.
    pub fn is_disrupted(&self, minor_delay: i64) -> bool {
        self.status == VehicleStatus::Canceled || self.delay_minutes > minor_delay
    }
}
