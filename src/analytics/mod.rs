//! Derived statistics, letter grades and their text rendering.
//!
//! The queries themselves live on [`crate::store::SnapshotStore`]; this module
//! holds the result types, the helpers they share and the wall-clock triggers
//! that schedule the morning grade and the daily summary.

pub mod grade;
pub mod report;
pub mod trigger;
pub mod types;
pub mod utility;

pub use grade::{Grade, grade};
pub use trigger::DailyTrigger;
pub use types::{
    CommuteGrade, Incident, LeaderboardEntry, ReliabilityReport, ServiceSummary, WeekdayDelay,
    WorstOffender,
};
