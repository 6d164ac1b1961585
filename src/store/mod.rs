//! Append-only snapshot log backed by SQLite.
//!
//! The store owns the `train_logs` table. Rows are written once per poll cycle
//! in a single transaction and never updated or deleted. Derived views live in
//! [`aggregate`].

pub mod aggregate;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::Thresholds;
use crate::observation::{CanonicalObservation, Direction, VehicleStatus};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS train_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        observed_at INTEGER NOT NULL,
        vehicle_id TEXT NOT NULL,
        status TEXT NOT NULL,
        delay_minutes INTEGER NOT NULL,
        station TEXT NOT NULL,
        direction TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_train_logs_observed_at ON train_logs (observed_at)",
    "CREATE INDEX IF NOT EXISTS idx_train_logs_vehicle_id ON train_logs (vehicle_id)",
];

/// A persisted observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: i64,
    #[serde(flatten)]
    pub observation: CanonicalObservation,
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: i64,
    observed_at: i64,
    vehicle_id: String,
    status: String,
    delay_minutes: i64,
    station: String,
    direction: String,
}

impl From<LogRow> for LogEntry {
    fn from(row: LogRow) -> Self {
        LogEntry {
            id: row.id,
            observation: CanonicalObservation {
                vehicle_id: row.vehicle_id,
                status: VehicleStatus::from_label(&row.status),
                delay_minutes: row.delay_minutes,
                station: row.station,
                direction: Direction::from_label(&row.direction),
                observed_at: DateTime::from_timestamp_millis(row.observed_at).unwrap_or_default(),
            },
        }
    }
}

/// Handle to the snapshot log. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct SnapshotStore {
    pool: SqlitePool,
    tz: Tz,
    thresholds: Thresholds,
}

impl SnapshotStore {
    /// Opens (creating if needed) the database at `url` and applies the schema.
    #[tracing::instrument(skip(tz, thresholds))]
    pub async fn connect(url: &str, tz: Tz, thresholds: Thresholds) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url '{url}'"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database '{url}'"))?;

        let store = Self::with_pool(pool, tz, thresholds).await?;
        info!(url, "Snapshot store ready");
        Ok(store)
    }

    /// Private in-memory database on a single connection, for tests and dry runs.
    pub async fn in_memory(tz: Tz, thresholds: Thresholds) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool, tz, thresholds).await
    }

    async fn with_pool(pool: SqlitePool, tz: Tz, thresholds: Thresholds) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .context("failed to apply schema")?;
        }
        Ok(Self {
            pool,
            tz,
            thresholds,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Appends a batch atomically. Empty batches are a no-op.
    #[tracing::instrument(skip_all, fields(rows = observations.len()))]
    pub async fn insert(&self, observations: &[CanonicalObservation]) -> Result<()> {
        if observations.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for obs in observations {
            sqlx::query(
                r#"
                INSERT INTO train_logs (observed_at, vehicle_id, status, delay_minutes, station, direction)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(obs.observed_at.timestamp_millis())
            .bind(&obs.vehicle_id)
            .bind(obs.status.as_str())
            .bind(obs.delay_minutes)
            .bind(&obs.station)
            .bind(obs.direction.as_str())
            .execute(&mut *tx)
            .await
            .context("failed to insert log row")?;
        }
        tx.commit().await?;

        info!(rows = observations.len(), "Inserted rows into store");
        Ok(())
    }

    /// Rows observed at or after `since`, optionally for one vehicle, in
    /// insertion order.
    pub async fn query_window(
        &self,
        since: DateTime<Utc>,
        vehicle_id: Option<&str>,
    ) -> Result<Vec<LogEntry>> {
        self.fetch_rows(since, None, vehicle_id).await
    }

    /// Rows in `[since, until)`, optionally for one vehicle.
    pub async fn query_range(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        vehicle_id: Option<&str>,
    ) -> Result<Vec<LogEntry>> {
        self.fetch_rows(since, Some(until), vehicle_id).await
    }

    /// Most recent row per vehicle since `since`, ordered by vehicle id.
    pub async fn latest_per_vehicle(&self, since: DateTime<Utc>) -> Result<Vec<LogEntry>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT id, observed_at, vehicle_id, status, delay_minutes, station, direction
            FROM train_logs
            WHERE id IN (
                SELECT MAX(id) FROM train_logs WHERE observed_at >= ? GROUP BY vehicle_id
            )
            ORDER BY vehicle_id
            "#,
        )
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .context("failed to query latest rows")?;

        Ok(rows.into_iter().map(LogEntry::from).collect())
    }

    /// The newest row in the log, if any.
    pub async fn latest(&self) -> Result<Option<LogEntry>> {
        let row: Option<LogRow> = sqlx::query_as(
            "SELECT id, observed_at, vehicle_id, status, delay_minutes, station, direction \
             FROM train_logs ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("failed to query latest row")?;

        Ok(row.map(LogEntry::from))
    }

    async fn fetch_rows(
        &self,
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
        vehicle_id: Option<&str>,
    ) -> Result<Vec<LogEntry>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, observed_at, vehicle_id, status, delay_minutes, station, direction \
             FROM train_logs WHERE observed_at >= ",
        );
        qb.push_bind(since.timestamp_millis());
        if let Some(until) = until {
            qb.push(" AND observed_at < ").push_bind(until.timestamp_millis());
        }
        if let Some(vehicle_id) = vehicle_id {
            qb.push(" AND vehicle_id = ").push_bind(vehicle_id.to_string());
        }
        qb.push(" ORDER BY id");

        let rows: Vec<LogRow> = qb
            .build_query_as::<LogRow>()
            .fetch_all(&self.pool)
            .await
            .context("failed to query log window")?;

        debug!(rows = rows.len(), "Window query complete");
        Ok(rows.into_iter().map(LogEntry::from).collect())
    }
}
