//! Derived statistics produced from the snapshot log. Never persisted.

use chrono::{NaiveDate, Weekday};
use serde::Serialize;

use crate::analytics::grade::Grade;

/// Vehicle with the largest delay in a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorstOffender {
    pub vehicle_id: String,
    pub max_delay: i64,
}

/// Fleet-wide statistics for one window (a day, or the commute hours).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSummary {
    pub date: NaiveDate,
    pub total: usize,
    pub late: usize,
    pub canceled: usize,
    pub affected: usize,
    pub percent_affected: f64,
    /// Mean of the per-vehicle max delay over late vehicles only.
    pub avg_late_delay: f64,
    pub worst: Option<WorstOffender>,
}

impl ServiceSummary {
    pub fn on_time(&self) -> usize {
        self.total - self.affected
    }
}

/// Morning commute summary with its letter grade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommuteGrade {
    #[serde(flatten)]
    pub summary: ServiceSummary,
    pub on_time_percent: f64,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekdayDelay {
    pub weekday: Weekday,
    pub avg_delay: f64,
}

/// Per-vehicle report card over a trailing window of days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReliabilityReport {
    pub vehicle_id: String,
    pub days: i64,
    /// Distinct calendar days the vehicle was seen.
    pub total_trips: usize,
    pub canceled_days: usize,
    pub late_days: usize,
    pub reliability_percent: f64,
    pub avg_delay_minutes: f64,
    pub worst_weekday: Option<WeekdayDelay>,
}

/// One row of the misery leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub vehicle_id: String,
    pub cancellations: usize,
    pub major_delay_events: usize,
    pub max_delay: i64,
    pub score: usize,
}

/// A train that was canceled or ran late within the complaint window, with
/// the dates it also failed on over the trailing history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    pub vehicle_id: String,
    pub canceled: bool,
    pub max_delay: i64,
    pub failure_dates: Vec<NaiveDate>,
}
