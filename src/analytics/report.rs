//! Plain-text rendering of alerts and reports for notifiers and the CLI.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::fmt::Write;

use crate::alerts::{Alert, Condition};
use crate::analytics::types::{
    CommuteGrade, Incident, LeaderboardEntry, ReliabilityReport, ServiceSummary,
};
use crate::feed::LivePrediction;
use crate::store::LogEntry;

const TAGS: &str = "#MBTA #WorcesterLine";

fn local_time(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%H:%M:%S").to_string()
}

pub fn alert_text(alert: &Alert) -> String {
    let Alert {
        vehicle_id,
        station,
        delay_minutes,
        ..
    } = alert;
    match alert.condition {
        Condition::Canceled => {
            format!("ALERT: Train {vehicle_id} has been CANCELED at {station}. {TAGS}")
        }
        _ if alert.is_update => format!(
            "UPDATE: Train {vehicle_id} is now {delay_minutes} minutes late at {station} \
             (was {}). {TAGS}",
            alert.previous_delay
        ),
        _ => format!(
            "SEVERE DELAY: Train {vehicle_id} is running {delay_minutes} minutes late at {station}. {TAGS}"
        ),
    }
}

pub fn morning_grade_text(report: &CommuteGrade) -> String {
    let s = &report.summary;
    let mut out = format!(
        "Morning commute grade for {}: {} ({:.1}% on time)\n",
        s.date.format("%a %b %-d"),
        report.grade,
        report.on_time_percent
    );
    let _ = writeln!(
        out,
        "{} trains, {} on time, {} late, {} canceled",
        s.total,
        s.on_time(),
        s.late,
        s.canceled
    );
    if let Some(worst) = &s.worst {
        let _ = writeln!(out, "Worst: Train {} (+{} min)", worst.vehicle_id, worst.max_delay);
    }
    out.push_str(TAGS);
    out
}

pub fn daily_summary_text(summary: &ServiceSummary) -> String {
    let mut out = format!("Daily service summary for {}\n", summary.date);
    let _ = writeln!(
        out,
        "{} of {} trains disrupted ({:.1}%)",
        summary.affected, summary.total, summary.percent_affected
    );
    let _ = writeln!(
        out,
        "Late: {} (avg {:.1} min) | Canceled: {}",
        summary.late, summary.avg_late_delay, summary.canceled
    );
    match &summary.worst {
        Some(worst) => {
            let _ = writeln!(
                out,
                "Worst offender: Train {} (+{} min)",
                worst.vehicle_id, worst.max_delay
            );
        }
        None => out.push_str("No delays recorded\n"),
    }
    out.push_str(TAGS);
    out
}

pub fn report_card_text(report: &ReliabilityReport) -> String {
    let mut out = format!(
        "Analysis: Train {} (last {} days)\n",
        report.vehicle_id, report.days
    );
    let _ = writeln!(out, "Reliability: {:.1}%", report.reliability_percent);
    let _ = writeln!(out, "Avg delay: {:.1} min", report.avg_delay_minutes);
    let _ = writeln!(
        out,
        "Incidents: {} canceled, {} late",
        report.canceled_days, report.late_days
    );
    if let Some(worst) = &report.worst_weekday {
        let _ = writeln!(
            out,
            "Worst day: {} (avg {:.1} min)",
            worst.weekday, worst.avg_delay
        );
    }
    let _ = write!(out, "Based on {} trips.", report.total_trips);
    out
}

pub fn leaderboard_text(entries: &[LeaderboardEntry], days: i64) -> String {
    if entries.is_empty() {
        return format!("No cancellations or major delays in the last {days} days.");
    }

    let mut out = format!("Misery leaderboard (last {days} days)\n");
    for (rank, e) in entries.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. Train {}: {} cancel(s), {} major delay record(s), max +{} min (score {})",
            rank + 1,
            e.vehicle_id,
            e.cancellations,
            e.major_delay_events,
            e.max_delay,
            e.score
        );
    }
    out.trim_end().to_string()
}

/// Fixed-width board of the latest row per vehicle, disrupted rows flagged with `!`.
pub fn list_board(entries: &[LogEntry], minor_delay: i64, tz: Tz) -> String {
    if entries.is_empty() {
        return "No active trains in the last 30 minutes.".to_string();
    }

    let mut out = format!(
        "  {:<6} {:<4} {:<10} {:<6} {:<8} {}\n",
        "ID", "DIR", "STATUS", "DELAY", "SEEN", "STATION"
    );
    for entry in entries {
        let o = &entry.observation;
        let flag = if o.is_disrupted(minor_delay) { '!' } else { ' ' };
        let _ = writeln!(
            out,
            "{flag} {:<6} {:<4} {:<10} {:<6} {:<8} {}",
            o.vehicle_id,
            o.direction.as_str(),
            o.status.as_str(),
            o.delay_minutes,
            local_time(o.observed_at, tz),
            o.station
        );
    }
    out.trim_end().to_string()
}

/// Recent history of one vehicle plus its live next stop, if any.
pub fn status_text(
    vehicle_id: &str,
    history: &[LogEntry],
    live: Option<&LivePrediction>,
    minor_delay: i64,
    tz: Tz,
) -> String {
    let Some(last) = history.last() else {
        return format!("No recent logs found for Train {vehicle_id}.");
    };
    let max_delay = history
        .iter()
        .map(|e| e.observation.delay_minutes)
        .max()
        .unwrap_or(0);
    let marker = if max_delay >= minor_delay { "[!]" } else { "[ok]" };

    let last = &last.observation;
    let mut out = format!("Report: Train {vehicle_id}\n");
    let _ = writeln!(out, "{marker} Max delay (1h): {max_delay} min");
    let _ = writeln!(out, "Status: {}", last.status);
    let _ = writeln!(out, "Last location: {}", last.station);
    let _ = write!(out, "Last seen: {}", local_time(last.observed_at, tz));

    if let Some(live) = live {
        let fmt = |t: Option<DateTime<chrono::FixedOffset>>| {
            t.map(|t| t.with_timezone(&tz).format("%H:%M").to_string())
                .unwrap_or_else(|| "--".to_string())
        };
        let _ = write!(
            out,
            "\nNext stop: {}\nScheduled: {}\nPredicted: {}",
            live.stop,
            fmt(live.scheduled),
            fmt(live.predicted)
        );
        if live.delay_minutes > 0 {
            let _ = write!(out, "\nDelay: +{} min", live.delay_minutes);
        }
    }
    out
}

pub fn failures_text(vehicle_id: &str, dates: &[NaiveDate], days: i64) -> String {
    if dates.is_empty() {
        return format!("Train {vehicle_id} has no failures in the last {days} days.");
    }
    let list: Vec<String> = dates.iter().map(|d| d.format("%m/%d").to_string()).collect();
    format!(
        "Train {vehicle_id} has failed {} times in the last {days} days ({}).",
        dates.len(),
        list.join(", ")
    )
}

/// Draft customer-service complaint for the trains in `incidents`.
///
/// A train's failure history is only quoted when it failed on more than one
/// day, so a one-off bad day today does not read as a pattern.
pub fn complaint_text(
    incidents: &[Incident],
    history_days: i64,
    as_of: DateTime<Utc>,
    tz: Tz,
) -> String {
    let timestamp = as_of.with_timezone(&tz).format("%I:%M %p");

    if incidents.is_empty() {
        return format!(
            "To Whom It May Concern,\n\n\
             This log confirms the Framingham/Worcester Line is operating ON SCHEDULE as of {timestamp}.\n\
             Status: Green | System Nominal\n\n\
             Sincerely,\n[Your Name]"
        );
    }

    let mut out = format!(
        "To Customer Service,\n\n\
         I am writing to report unreliable service on the Worcester Line as of {timestamp}.\n\n\
         CURRENT INCIDENTS:\n"
    );
    for incident in incidents {
        let id = &incident.vehicle_id;
        if incident.canceled {
            let _ = write!(out, " - Train {id}: CANCELED today.");
        } else {
            let _ = write!(out, " - Train {id}: Delayed {} min.", incident.max_delay);
        }
        if incident.failure_dates.len() > 1 {
            let dates: Vec<String> = incident
                .failure_dates
                .iter()
                .map(|d| d.format("%m/%d").to_string())
                .collect();
            let _ = write!(
                out,
                "\n   -> HISTORY: Train {id} has failed {} times in the last {history_days} days ({}).",
                dates.len(),
                dates.join(", ")
            );
        }
        out.push('\n');
    }
    out.push_str(
        "\nThe recurrence of these delays indicates a systemic failure rather than isolated incidents.\n\
         Please provide an explanation for these repeated disruptions.\n\n\
         Sincerely,\n[Your Name]",
    );
    out
}

pub fn health_text(latest: Option<&LogEntry>, recent_rows: usize, tz: Tz) -> String {
    match latest {
        Some(entry) if recent_rows > 0 => format!(
            "System healthy\nLatest: {}\nRows (15 min): {recent_rows}",
            local_time(entry.observation.observed_at, tz)
        ),
        Some(entry) => format!(
            "System stale\nLatest: {}\nRows (15 min): 0",
            entry.observation.observed_at.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S")
        ),
        None => "No data logged yet".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::grade::Grade;
    use crate::analytics::types::WorstOffender;
    use crate::observation::{CanonicalObservation, Direction, VehicleStatus};
    use chrono::TimeZone;

    const TZ: Tz = chrono_tz::America::New_York;

    fn alert(condition: Condition, is_update: bool, previous: i64, delay: i64) -> Alert {
        Alert {
            vehicle_id: "508".to_string(),
            condition,
            is_update,
            previous_delay: previous,
            delay_minutes: delay,
            station: "Framingham".to_string(),
        }
    }

    fn entry(vehicle: &str, status: VehicleStatus, delay: i64) -> LogEntry {
        LogEntry {
            id: 1,
            observation: CanonicalObservation {
                vehicle_id: vehicle.to_string(),
                status,
                delay_minutes: delay,
                station: "Natick Center".to_string(),
                direction: Direction::In,
                observed_at: Utc.with_ymd_and_hms(2026, 3, 2, 12, 30, 0).unwrap(),
            },
        }
    }

    #[test]
    fn test_alert_texts() {
        let canceled = alert_text(&alert(Condition::Canceled, false, 0, 0));
        assert!(canceled.contains("Train 508 has been CANCELED at Framingham"));

        let severe = alert_text(&alert(Condition::LateMajor, false, 0, 25));
        assert!(severe.starts_with("SEVERE DELAY: Train 508 is running 25 minutes late"));

        let update = alert_text(&alert(Condition::LateMajor, true, 25, 35));
        assert!(update.contains("now 35 minutes late at Framingham (was 25)"));
    }

    #[test]
    fn test_morning_grade_text() {
        let report = CommuteGrade {
            summary: ServiceSummary {
                date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                total: 10,
                late: 1,
                canceled: 0,
                affected: 1,
                percent_affected: 10.0,
                avg_late_delay: 12.0,
                worst: Some(WorstOffender {
                    vehicle_id: "508".to_string(),
                    max_delay: 12,
                }),
            },
            on_time_percent: 90.0,
            grade: Grade::A,
        };
        let text = morning_grade_text(&report);
        assert!(text.contains("A (90.0% on time)"));
        assert!(text.contains("10 trains, 9 on time, 1 late, 0 canceled"));
        assert!(text.contains("Worst: Train 508 (+12 min)"));
    }

    #[test]
    fn test_leaderboard_ranks_in_order() {
        let entries = vec![
            LeaderboardEntry {
                vehicle_id: "508".to_string(),
                cancellations: 2,
                major_delay_events: 1,
                max_delay: 30,
                score: 7,
            },
            LeaderboardEntry {
                vehicle_id: "512".to_string(),
                cancellations: 0,
                major_delay_events: 5,
                max_delay: 45,
                score: 5,
            },
        ];
        let text = leaderboard_text(&entries, 30);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1. Train 508"));
        assert!(lines[2].starts_with("2. Train 512"));
        assert!(leaderboard_text(&[], 30).starts_with("No cancellations"));
    }

    #[test]
    fn test_list_board_flags_disrupted() {
        let board = list_board(
            &[
                entry("508", VehicleStatus::Late, 12),
                entry("512", VehicleStatus::Moving, 0),
            ],
            5,
            TZ,
        );
        let lines: Vec<&str> = board.lines().collect();
        assert!(lines[1].starts_with("! 508"));
        assert!(lines[2].starts_with("  512"));
        // 12:30 UTC is 07:30 in New York in early March
        assert!(lines[1].contains("07:30:00"));
    }

    #[test]
    fn test_status_text_with_live_prediction() {
        let history = vec![
            entry("508", VehicleStatus::Moving, 3),
            entry("508", VehicleStatus::Late, 8),
        ];
        let live = LivePrediction {
            vehicle_id: "508".to_string(),
            stop: "Wellesley Square".to_string(),
            status: VehicleStatus::Late,
            scheduled: None,
            predicted: None,
            delay_minutes: 8,
        };
        let text = status_text("508", &history, Some(&live), 5, TZ);
        assert!(text.contains("[!] Max delay (1h): 8 min"));
        assert!(text.contains("Status: LATE"));
        assert!(text.contains("Next stop: Wellesley Square"));
        assert!(text.contains("Delay: +8 min"));

        assert_eq!(
            status_text("999", &[], None, 5, TZ),
            "No recent logs found for Train 999."
        );
    }

    #[test]
    fn test_failures_and_health() {
        let dates = vec![
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
        ];
        assert_eq!(
            failures_text("508", &dates, 7),
            "Train 508 has failed 2 times in the last 7 days (03/02, 03/04)."
        );

        let latest = entry("508", VehicleStatus::Moving, 0);
        assert!(health_text(Some(&latest), 4, TZ).starts_with("System healthy"));
        assert!(health_text(Some(&latest), 0, TZ).starts_with("System stale"));
        assert_eq!(health_text(None, 0, TZ), "No data logged yet");
    }

    fn incident(vehicle: &str, canceled: bool, max_delay: i64, days: &[u32]) -> Incident {
        Incident {
            vehicle_id: vehicle.to_string(),
            canceled,
            max_delay,
            failure_dates: days
                .iter()
                .map(|d| NaiveDate::from_ymd_opt(2026, 3, *d).unwrap())
                .collect(),
        }
    }

    #[test]
    fn test_complaint_on_schedule() {
        let as_of = Utc.with_ymd_and_hms(2026, 3, 2, 12, 30, 0).unwrap();
        let text = complaint_text(&[], 7, as_of, TZ);
        assert!(text.starts_with("To Whom It May Concern,"));
        assert!(text.contains("operating ON SCHEDULE as of 07:30 AM."));
        assert!(text.contains("Status: Green | System Nominal"));
        assert!(!text.contains("CURRENT INCIDENTS"));
    }

    #[test]
    fn test_complaint_lists_incidents_with_history() {
        let as_of = Utc.with_ymd_and_hms(2026, 3, 4, 22, 15, 0).unwrap();
        let incidents = vec![
            incident("515", true, 0, &[2, 4]),
            incident("508", false, 25, &[4]),
        ];
        let text = complaint_text(&incidents, 7, as_of, TZ);
        assert!(text.starts_with("To Customer Service,"));
        assert!(text.contains("unreliable service on the Worcester Line as of 05:15 PM."));
        assert!(text.contains(
            "CURRENT INCIDENTS:\n - Train 515: CANCELED today.\n   -> HISTORY: Train 515 has failed 2 times in the last 7 days (03/02, 03/04).\n"
        ));
        // a single failure day is today's, so no history line
        assert!(text.contains(" - Train 508: Delayed 25 min.\n\nThe recurrence"));
        assert!(!text.contains("Train 508 has failed"));
        assert!(text.ends_with("Sincerely,\n[Your Name]"));
    }
}
