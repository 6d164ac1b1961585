//! Migration of the CSV log written by the older logger into the snapshot store.
//!
//! Expected header: `LogTime,Train,Status,DelayMinutes[,Station][,Direction]`,
//! with `LogTime` in service-local time. Rows that cannot be read are skipped
//! and counted; everything else is inserted as one batch.

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::observation::{CanonicalObservation, Direction, VehicleStatus};
use crate::store::SnapshotStore;

pub const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const UNKNOWN_STATION: &str = "Unknown";

#[derive(Debug, Deserialize)]
struct LegacyRow {
    #[serde(rename = "LogTime")]
    log_time: String,
    #[serde(rename = "Train")]
    train: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "DelayMinutes")]
    delay_minutes: Option<f64>,
    #[serde(rename = "Station", default)]
    station: Option<String>,
    #[serde(rename = "Direction", default)]
    direction: Option<String>,
}

impl LegacyRow {
    fn into_observation(self, tz: Tz) -> Option<CanonicalObservation> {
        let local = NaiveDateTime::parse_from_str(self.log_time.trim(), LOG_TIME_FORMAT).ok()?;
        let observed_at = tz.from_local_datetime(&local).earliest()?.with_timezone(&Utc);

        let station = self
            .station
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_STATION.to_string());

        Some(CanonicalObservation {
            vehicle_id: self.train.trim().to_string(),
            status: VehicleStatus::from_label(&self.status),
            delay_minutes: self.delay_minutes.map_or(0, |d| d.round_ties_even().max(0.0) as i64),
            station,
            direction: self
                .direction
                .as_deref()
                .map_or(Direction::Unknown, Direction::from_label),
            observed_at,
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Parses legacy rows from any reader. Returns the observations and the
/// number of rows that had to be skipped.
pub fn read_legacy<R: Read>(reader: R, tz: Tz) -> Result<(Vec<CanonicalObservation>, usize)> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);

    let mut observations = Vec::new();
    let mut skipped = 0;
    for (line, result) in rdr.deserialize::<LegacyRow>().enumerate() {
        let parsed = match result {
            Ok(row) => row.into_observation(tz),
            Err(e) => {
                warn!(line = line + 2, error = %e, "Unreadable legacy row");
                None
            }
        };
        match parsed {
            Some(obs) if !obs.vehicle_id.is_empty() => observations.push(obs),
            _ => skipped += 1,
        }
    }
    Ok((observations, skipped))
}

/// Reads `path` and inserts its rows into the store as a single batch.
#[tracing::instrument(skip(store))]
pub async fn import_csv(store: &SnapshotStore, path: &Path) -> Result<ImportSummary> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open legacy CSV {}", path.display()))?;

    let (observations, skipped) = read_legacy(file, store.timezone())?;
    store
        .insert(&observations)
        .await
        .context("failed to insert legacy rows")?;

    let summary = ImportSummary {
        imported: observations.len(),
        skipped,
    };
    info!(imported = summary.imported, skipped, "Legacy CSV migrated");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::store;
    use std::io::Write;

    const TZ: Tz = chrono_tz::America::New_York;

    #[test]
    fn test_reads_minimal_columns() {
        let csv = "LogTime,Train,Status,DelayMinutes\n\
                   2024-03-04 07:30:00,508,Moving To,3\n\
                   2024-03-04 07:32:00,512,At Stop,0\n";
        let (rows, skipped) = read_legacy(csv.as_bytes(), TZ).unwrap();

        assert_eq!(skipped, 0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, VehicleStatus::Moving);
        assert_eq!(rows[1].status, VehicleStatus::Stopped);
        assert_eq!(rows[0].station, "Unknown");
        assert_eq!(rows[0].direction, Direction::Unknown);
        // EST in early March
        assert_eq!(rows[0].observed_at.to_rfc3339(), "2024-03-04T12:30:00+00:00");
    }

    #[test]
    fn test_reads_full_columns_and_skips_bad_rows() {
        let csv = "LogTime,Train,Status,DelayMinutes,Station,Direction\n\
                   2024-03-04 07:30:00,508,LATE,12.0,Framingham,IN\n\
                   not a time,512,LATE,4,Natick Center,OUT\n\
                   2024-03-04 07:40:00,515,CANCELED,,Worcester,OUT\n";
        let (rows, skipped) = read_legacy(csv.as_bytes(), TZ).unwrap();

        assert_eq!(skipped, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].delay_minutes, 12);
        assert_eq!(rows[0].station, "Framingham");
        assert_eq!(rows[0].direction, Direction::In);
        assert_eq!(rows[1].status, VehicleStatus::Canceled);
        assert_eq!(rows[1].delay_minutes, 0);
    }

    #[test]
    fn test_fractional_delays_round_half_to_even() {
        let csv = "LogTime,Train,Status,DelayMinutes\n\
                   2024-03-04 07:30:00,508,LATE,20.5\n\
                   2024-03-04 07:30:00,512,Moving To,2.5\n";
        let (rows, _) = read_legacy(csv.as_bytes(), TZ).unwrap();
        assert_eq!(rows[0].delay_minutes, 20);
        assert_eq!(rows[1].delay_minutes, 2);
    }

    #[tokio::test]
    async fn test_import_csv_inserts_batch() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "LogTime,Train,Status,DelayMinutes,Station\n\
             2024-03-04 07:30:00,508,LATE,12,Framingham\n\
             2024-03-04 07:31:00,512,Moving To,0,Ashland\n"
        )
        .unwrap();

        let store = store().await;
        let summary = import_csv(&store, file.path()).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                imported: 2,
                skipped: 0
            }
        );

        let since = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let rows = store.query_window(since, Some("508")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].observation.station, "Framingham");
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let store = store().await;
        assert!(import_csv(&store, Path::new("/nonexistent/legacy.csv")).await.is_err());
    }
}
