//! Reconciles a predictions document into one canonical record per vehicle.

use chrono::{DateTime, FixedOffset, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::feed::document::{FeedDocument, Resource, SideTables};
use crate::observation::{CanonicalObservation, Direction, VehicleStatus};

pub const UNKNOWN_STOP: &str = "Unknown Stop";

/// A normalized vehicle together with the prediction it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    pub observation: CanonicalObservation,
    pub scheduled: Option<DateTime<FixedOffset>>,
    pub predicted: Option<DateTime<FixedOffset>>,
}

/// Runs the reconciliation over a parsed document.
///
/// Predictions without a vehicle are dropped, vehicles running `ADDED` service
/// are skipped, and each remaining vehicle is represented by its earliest
/// upcoming prediction.
pub fn normalize(doc: &FeedDocument, minor_delay: i64, now: DateTime<Utc>) -> Vec<VehicleSnapshot> {
    let tables = SideTables::build(&doc.included);

    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&Resource>> = HashMap::new();
    for p in doc.data.iter().filter(|r| r.kind == "prediction") {
        let Some(vehicle_id) = p.related_id("vehicle") else {
            continue;
        };
        groups
            .entry(vehicle_id)
            .or_insert_with(|| {
                order.push(vehicle_id);
                Vec::new()
            })
            .push(p);
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(order.len());

    for vehicle_id in order {
        let predictions = &groups[vehicle_id];

        if predictions
            .iter()
            .any(|p| p.attr_str("schedule_relationship") == Some("ADDED"))
        {
            debug!(vehicle_id, "Skipping added-service vehicle");
            continue;
        }

        let canceled = predictions.iter().all(|p| is_cancelled(p));
        let Some(next) = predictions
            .iter()
            .filter(|p| canceled || !is_cancelled(p))
            .min_by_key(|p| {
                let t = predicted_time(p);
                (t.is_none(), t)
            })
        else {
            continue;
        };

        let snapshot = resolve(vehicle_id, next, &tables, canceled, minor_delay, now);
        if !seen.insert(snapshot.observation.vehicle_id.clone()) {
            debug!(
                vehicle_id = %snapshot.observation.vehicle_id,
                "Duplicate display id in feed, keeping first"
            );
            continue;
        }
        out.push(snapshot);
    }

    out
}

fn resolve(
    vehicle_id: &str,
    prediction: &Resource,
    tables: &SideTables<'_>,
    canceled: bool,
    minor_delay: i64,
    now: DateTime<Utc>,
) -> VehicleSnapshot {
    let vehicle = tables.vehicles.get(vehicle_id);

    let raw_status = vehicle.and_then(|v| v.attr_str("current_status"));
    let direction_id = vehicle
        .and_then(|v| v.attr_i64("direction_id"))
        .or_else(|| prediction.attr_i64("direction_id"));

    let station = prediction
        .related_id("stop")
        .and_then(|id| tables.stops.get(id))
        .and_then(|s| s.attr_str("name"))
        .unwrap_or(UNKNOWN_STOP)
        .to_string();

    let display_id = prediction
        .related_id("trip")
        .and_then(|id| tables.trips.get(id))
        .and_then(|t| t.attr_str("name"))
        .filter(|name| !name.is_empty())
        .or_else(|| vehicle.and_then(|v| v.attr_str("label")))
        .unwrap_or(vehicle_id)
        .to_string();

    let predicted = predicted_time(prediction);
    let scheduled = prediction
        .related_id("schedule")
        .and_then(|id| tables.schedules.get(id))
        .and_then(|s| {
            parse_time(s.attr_str("arrival_time")).or_else(|| parse_time(s.attr_str("departure_time")))
        });

    let (status, delay_minutes) = if canceled {
        (VehicleStatus::Canceled, 0)
    } else {
        let delay = delay_minutes(predicted, scheduled);
        let status = if delay > minor_delay {
            VehicleStatus::Late
        } else {
            VehicleStatus::from_upstream(raw_status)
        };
        (status, delay)
    };

    VehicleSnapshot {
        observation: CanonicalObservation {
            vehicle_id: display_id,
            status,
            delay_minutes,
            station,
            direction: Direction::from_direction_id(direction_id),
            observed_at: now,
        },
        scheduled,
        predicted,
    }
}

fn is_cancelled(p: &Resource) -> bool {
    matches!(
        p.attr_str("schedule_relationship"),
        Some("CANCELLED") | Some("CANCELED")
    )
}

/// Arrival time, falling back to departure for origin stops.
fn predicted_time(p: &Resource) -> Option<DateTime<FixedOffset>> {
    parse_time(p.attr_str("arrival_time")).or_else(|| parse_time(p.attr_str("departure_time")))
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw?).ok()
}

/// Whole minutes behind schedule, halves rounded to even, never negative. Zero when
/// either side is unknown.
pub fn delay_minutes(
    predicted: Option<DateTime<FixedOffset>>,
    scheduled: Option<DateTime<FixedOffset>>,
) -> i64 {
    match (predicted, scheduled) {
        (Some(p), Some(s)) => {
            let minutes = (p - s).num_seconds() as f64 / 60.0;
            (minutes.round_ties_even() as i64).max(0)
        }
        _ => 0,
    }
}
