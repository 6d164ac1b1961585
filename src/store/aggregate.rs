//! Read-only derived views over the snapshot log.
//!
//! Each view runs one indexed window query and folds the rows in memory.
//! Calendar days and weekdays are taken in the store's service timezone.

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::analytics::grade::grade;
use crate::analytics::types::{
    CommuteGrade, Incident, LeaderboardEntry, ReliabilityReport, ServiceSummary, WeekdayDelay,
    WorstOffender,
};
use crate::analytics::utility::{mean, pct, round1};
use crate::config::TimeWindow;
use crate::observation::VehicleStatus;
use crate::store::{LogEntry, SnapshotStore};

/// Weight of one cancellation relative to one major delay event.
const CANCEL_WEIGHT: usize = 3;

/// Worst delay and cancellation flag for one vehicle (or one day).
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    max_delay: i64,
    canceled: bool,
}

impl Tally {
    fn add(&mut self, entry: &LogEntry) {
        self.max_delay = self.max_delay.max(entry.observation.delay_minutes);
        self.canceled |= entry.observation.status == VehicleStatus::Canceled;
    }
}

impl SnapshotStore {
    /// Fleet summary for one local calendar day. `None` when nothing ran.
    #[tracing::instrument(skip(self))]
    pub async fn aggregate_daily(&self, date: NaiveDate) -> Result<Option<ServiceSummary>> {
        let window = TimeWindow::new(NaiveTime::MIN, NaiveTime::MIN);
        let (since, until) = local_range(self.tz, date, window);
        let rows = self.query_range(since, until, None).await?;
        Ok(summarize(date, &rows, self.thresholds.minor_delay))
    }

    /// Morning commute (06:00-10:00 local) summary and grade for `date`.
    #[tracing::instrument(skip(self))]
    pub async fn aggregate_commute_window(&self, date: NaiveDate) -> Result<Option<CommuteGrade>> {
        let (since, until) = local_range(self.tz, date, TimeWindow::commute());
        let rows = self.query_range(since, until, None).await?;

        Ok(summarize(date, &rows, self.thresholds.minor_delay).map(|summary| {
            let on_time_percent = pct(summary.on_time(), summary.total);
            CommuteGrade {
                grade: grade(on_time_percent, &self.thresholds.grades),
                on_time_percent: round1(on_time_percent),
                summary,
            }
        }))
    }

    /// Report card for one vehicle over the trailing `days`.
    #[tracing::instrument(skip(self, now))]
    pub async fn aggregate_vehicle_reliability(
        &self,
        vehicle_id: &str,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<ReliabilityReport>> {
        let rows = self
            .query_window(now - Duration::days(days), Some(vehicle_id))
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let by_day = self.tally_by_day(&rows);
        let total_trips = by_day.len();
        let canceled_days = by_day.values().filter(|t| t.canceled).count();
        let late_days = by_day
            .values()
            .filter(|t| !t.canceled && t.max_delay > self.thresholds.minor_delay)
            .count();

        let failures = total_trips.min(canceled_days + late_days);
        let reliability_percent = round1(pct(total_trips - failures, total_trips));

        let delays: Vec<f64> = rows
            .iter()
            .map(|e| e.observation.delay_minutes as f64)
            .collect();

        debug!(total_trips, canceled_days, late_days, "Reliability computed");

        Ok(Some(ReliabilityReport {
            vehicle_id: vehicle_id.to_string(),
            days,
            total_trips,
            canceled_days,
            late_days,
            reliability_percent,
            avg_delay_minutes: round1(mean(&delays)),
            worst_weekday: self.worst_weekday(&rows),
        }))
    }

    /// Vehicles ranked by `cancellations * 3 + major delay events`.
    ///
    /// Vehicles with a zero score are left out; equal scores keep the order in
    /// which the vehicles first appear in the log.
    #[tracing::instrument(skip(self, now))]
    pub async fn aggregate_leaderboard(
        &self,
        days: i64,
        top_n: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<LeaderboardEntry>> {
        let rows = self.query_window(now - Duration::days(days), None).await?;

        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut board: Vec<LeaderboardEntry> = Vec::new();
        for entry in &rows {
            let obs = &entry.observation;
            let slot = *index.entry(obs.vehicle_id.as_str()).or_insert_with(|| {
                board.push(LeaderboardEntry {
                    vehicle_id: obs.vehicle_id.clone(),
                    cancellations: 0,
                    major_delay_events: 0,
                    max_delay: 0,
                    score: 0,
                });
                board.len() - 1
            });

            let row = &mut board[slot];
            if obs.status == VehicleStatus::Canceled {
                row.cancellations += 1;
            }
            if obs.delay_minutes > self.thresholds.major_delay {
                row.major_delay_events += 1;
            }
            row.max_delay = row.max_delay.max(obs.delay_minutes);
        }

        for row in &mut board {
            row.score = row.cancellations * CANCEL_WEIGHT + row.major_delay_events;
        }
        board.retain(|r| r.score > 0);
        board.sort_by(|a, b| b.score.cmp(&a.score));
        board.truncate(top_n);
        Ok(board)
    }

    /// Local dates within the trailing `days` on which the vehicle was canceled
    /// or ran more than `delay_threshold` minutes late. Ascending.
    #[tracing::instrument(skip(self, now))]
    pub async fn aggregate_failure_dates(
        &self,
        vehicle_id: &str,
        days: i64,
        delay_threshold: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<NaiveDate>> {
        let rows = self
            .query_window(now - Duration::days(days), Some(vehicle_id))
            .await?;

        Ok(self
            .tally_by_day(&rows)
            .into_iter()
            .filter(|(_, t)| t.canceled || t.max_delay > delay_threshold)
            .map(|(date, _)| date)
            .collect())
    }

    /// Trains canceled or later than `minor_delay` since `since`, in the order
    /// they were first logged. Each carries its failure dates over the
    /// trailing `history_days`.
    #[tracing::instrument(skip(self, since, now))]
    pub async fn aggregate_incidents(
        &self,
        since: DateTime<Utc>,
        history_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Incident>> {
        let rows = self.query_window(since, None).await?;
        let minor = self.thresholds.minor_delay;

        let mut order: Vec<&str> = Vec::new();
        let mut tallies: HashMap<&str, Tally> = HashMap::new();
        for entry in &rows {
            let id = entry.observation.vehicle_id.as_str();
            tallies
                .entry(id)
                .or_insert_with(|| {
                    order.push(id);
                    Tally::default()
                })
                .add(entry);
        }

        let mut incidents = Vec::new();
        for id in order {
            let tally = tallies[id];
            if !tally.canceled && tally.max_delay <= minor {
                continue;
            }
            let failure_dates = self
                .aggregate_failure_dates(id, history_days, minor, now)
                .await?;
            incidents.push(Incident {
                vehicle_id: id.to_string(),
                canceled: tally.canceled,
                max_delay: tally.max_delay,
                failure_dates,
            });
        }
        debug!(rows = rows.len(), incidents = incidents.len(), "Incidents collected");
        Ok(incidents)
    }

    fn local_date(&self, entry: &LogEntry) -> NaiveDate {
        entry.observation.observed_at.with_timezone(&self.tz).date_naive()
    }

    fn tally_by_day(&self, rows: &[LogEntry]) -> BTreeMap<NaiveDate, Tally> {
        let mut by_day: BTreeMap<NaiveDate, Tally> = BTreeMap::new();
        for entry in rows {
            by_day.entry(self.local_date(entry)).or_default().add(entry);
        }
        by_day
    }

    /// Weekday with the highest mean delay; earlier weekdays win ties.
    fn worst_weekday(&self, rows: &[LogEntry]) -> Option<WeekdayDelay> {
        let mut delays: HashMap<Weekday, Vec<f64>> = HashMap::new();
        for entry in rows {
            let weekday = entry.observation.observed_at.with_timezone(&self.tz).weekday();
            delays
                .entry(weekday)
                .or_default()
                .push(entry.observation.delay_minutes as f64);
        }

        let mut worst: Option<WeekdayDelay> = None;
        let mut day = Weekday::Mon;
        for _ in 0..7 {
            if let Some(values) = delays.get(&day) {
                let avg = mean(values);
                if worst.as_ref().is_none_or(|w| avg > w.avg_delay) {
                    worst = Some(WeekdayDelay {
                        weekday: day,
                        avg_delay: avg,
                    });
                }
            }
            day = day.succ();
        }

        worst.map(|w| WeekdayDelay {
            avg_delay: round1(w.avg_delay),
            ..w
        })
    }
}

/// Folds rows into fleet statistics, one tally per vehicle.
fn summarize(date: NaiveDate, rows: &[LogEntry], minor_delay: i64) -> Option<ServiceSummary> {
    let mut order: Vec<&str> = Vec::new();
    let mut tallies: HashMap<&str, Tally> = HashMap::new();
    for entry in rows {
        let id = entry.observation.vehicle_id.as_str();
        tallies
            .entry(id)
            .or_insert_with(|| {
                order.push(id);
                Tally::default()
            })
            .add(entry);
    }

    if order.is_empty() {
        return None;
    }

    let total = order.len();
    let canceled = order.iter().filter(|id| tallies[*id].canceled).count();
    let late_delays: Vec<f64> = order
        .iter()
        .map(|id| tallies[*id])
        .filter(|t| !t.canceled && t.max_delay > minor_delay)
        .map(|t| t.max_delay as f64)
        .collect();
    let late = late_delays.len();
    let affected = late + canceled;

    let mut worst: Option<WorstOffender> = None;
    for id in &order {
        let max_delay = tallies[*id].max_delay;
        if max_delay > 0 && worst.as_ref().is_none_or(|w| max_delay > w.max_delay) {
            worst = Some(WorstOffender {
                vehicle_id: id.to_string(),
                max_delay,
            });
        }
    }

    Some(ServiceSummary {
        date,
        total,
        late,
        canceled,
        affected,
        percent_affected: round1(pct(affected, total)),
        avg_late_delay: round1(mean(&late_delays)),
        worst,
    })
}

/// UTC bounds of a local window on `date`. An `end` not after `start` means
/// the window runs to the following midnight.
fn local_range(tz: Tz, date: NaiveDate, window: TimeWindow) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(window.start);
    let end = if window.end > window.start {
        date.and_time(window.end)
    } else {
        date.succ_opt().unwrap_or(date).and_time(NaiveTime::MIN)
    };
    (to_utc(tz, start), to_utc(tz, end))
}

fn to_utc(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&local)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&local))
        .with_timezone(&Utc)
}
