//! Output formatting and persistence for logged observations.
//!
//! Supports JSON rendering for the CLI and CSV append in the same column
//! layout the legacy importer reads, so an export can be migrated back in.

use anyhow::Result;
use chrono_tz::Tz;
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info};

use crate::legacy::LOG_TIME_FORMAT;
use crate::store::LogEntry;

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "LogTime")]
    log_time: String,
    #[serde(rename = "Train")]
    train: &'a str,
    #[serde(rename = "Status")]
    status: &'a str,
    #[serde(rename = "DelayMinutes")]
    delay_minutes: i64,
    #[serde(rename = "Station")]
    station: &'a str,
    #[serde(rename = "Direction")]
    direction: &'a str,
}

impl<'a> CsvRow<'a> {
    fn new(entry: &'a LogEntry, tz: Tz) -> Self {
        let o = &entry.observation;
        Self {
            log_time: o.observed_at.with_timezone(&tz).format(LOG_TIME_FORMAT).to_string(),
            train: &o.vehicle_id,
            status: o.status.as_str(),
            delay_minutes: o.delay_minutes,
            station: &o.station,
            direction: o.direction.as_str(),
        }
    }
}

/// Renders any serializable report as pretty-printed JSON.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Appends log entries as rows to a CSV file, timestamps in local time.
///
/// Creates the file with headers if it does not already exist.
pub fn append_entries(path: &Path, entries: &[LogEntry], tz: Tz) -> Result<usize> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    for entry in entries {
        writer.serialize(CsvRow::new(entry, tz))?;
    }
    writer.flush()?;

    info!(rows = entries.len(), path = %path.display(), "CSV export written");
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::read_legacy;
    use crate::observation::{CanonicalObservation, Direction, VehicleStatus};
    use chrono::{TimeZone, Utc};
    use std::fs;

    const TZ: Tz = chrono_tz::America::New_York;

    fn entry(id: i64, vehicle: &str, delay: i64) -> LogEntry {
        LogEntry {
            id,
            observation: CanonicalObservation {
                vehicle_id: vehicle.to_string(),
                status: VehicleStatus::Late,
                delay_minutes: delay,
                station: "Southborough".to_string(),
                direction: Direction::Out,
                observed_at: Utc.with_ymd_and_hms(2024, 3, 4, 22, 15, 0).unwrap(),
            },
        }
    }

    #[test]
    fn test_to_json_flattens_observation() {
        let json = to_json(&entry(3, "508", 9)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["vehicle_id"], "508");
        assert_eq!(value["status"], "LATE");
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");

        append_entries(&path, &[entry(1, "508", 9)], TZ).unwrap();
        append_entries(&path, &[entry(2, "512", 0)], TZ).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "LogTime,Train,Status,DelayMinutes,Station,Direction");
        assert_eq!(lines[1], "2024-03-04 17:15:00,508,LATE,9,Southborough,OUT");
    }

    #[test]
    fn test_export_is_readable_by_legacy_importer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        let original = entry(1, "508", 9);
        append_entries(&path, std::slice::from_ref(&original), TZ).unwrap();

        let (rows, skipped) = read_legacy(fs::File::open(&path).unwrap(), TZ).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(rows, vec![original.observation]);
    }
}
