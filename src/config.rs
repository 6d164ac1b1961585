//! Runtime configuration.
//!
//! Every tunable number lives here: delay thresholds, grade boundaries, trigger
//! windows and the upstream endpoint. [`WatchConfig::from_env`] reads the
//! process environment (after `.env` has been loaded by `main`), falling back to
//! defaults for anything unset.

use anyhow::{Context, Result, anyhow};
use chrono::NaiveTime;
use chrono_tz::Tz;
use std::str::FromStr;
use std::time::Duration;

/// Delay thresholds shared by the normalizer, the alert tracker and the
/// analytics queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// A vehicle more than this many minutes behind is `LATE`.
    pub minor_delay: i64,
    /// At or above this many minutes a vehicle is a severe-delay alert.
    pub major_delay: i64,
    /// Extra minutes required before re-alerting an already alerted delay.
    pub escalation_step: i64,
    pub grades: GradeScale,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            minor_delay: 5,
            major_delay: 20,
            escalation_step: 10,
            grades: GradeScale::default(),
        }
    }
}

/// Lower bounds (percent of trains on time) for each commute letter grade.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeScale {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Default for GradeScale {
    fn default() -> Self {
        Self {
            a: 90.0,
            b: 80.0,
            c: 70.0,
            d: 60.0,
        }
    }
}

/// A local wall-clock interval, `start` inclusive and `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        t >= self.start && t < self.end
    }

    fn hm(start: (u32, u32), end: (u32, u32)) -> Self {
        let at = |(h, m): (u32, u32)| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self::new(at(start), at(end))
    }

    /// Morning commute: 06:00-10:00.
    pub fn commute() -> Self {
        Self::hm((6, 0), (10, 0))
    }
}

/// Everything the watchdog process needs at startup.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub route: String,
    pub database_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub timezone: Tz,
    pub webhook_url: Option<String>,
    /// Dashboard channel write key; metrics are only pushed when set.
    pub thingspeak_api_key: Option<String>,
    pub thingspeak_url: String,
    pub thresholds: Thresholds,
    pub morning_trigger: TimeWindow,
    pub summary_trigger: TimeWindow,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api-v3.mbta.com".to_string(),
            api_key: None,
            route: "CR-Worcester".to_string(),
            database_url: "sqlite:data/rail_logs.db".to_string(),
            poll_interval: Duration::from_secs(120),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            timezone: chrono_tz::America::New_York,
            webhook_url: None,
            thingspeak_api_key: None,
            thingspeak_url: "https://api.thingspeak.com/update".to_string(),
            thresholds: Thresholds::default(),
            morning_trigger: TimeWindow::hm((10, 0), (10, 15)),
            summary_trigger: TimeWindow::hm((21, 0), (21, 6)),
        }
    }
}

impl WatchConfig {
    /// Builds the configuration from environment variables.
    ///
    /// Recognised variables: `MBTA_API_KEY`, `RAIL_API_URL`, `RAIL_ROUTE`,
    /// `DATABASE_URL`, `POLL_INTERVAL_SECONDS`, `REQUEST_TIMEOUT_SECONDS`,
    /// `RAIL_TIMEZONE`, `DISCORD_WEBHOOK_URL`, `THINGSPEAK_API_KEY`,
    /// `THINGSPEAK_URL`, `DELAY_THRESHOLD`, `MAJOR_DELAY_THRESHOLD` and
    /// `ESCALATION_STEP`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let timezone = match optional_var("RAIL_TIMEZONE") {
            Some(name) => parse_timezone(&name)?,
            None => defaults.timezone,
        };

        let thresholds = Thresholds {
            minor_delay: var_or("DELAY_THRESHOLD", defaults.thresholds.minor_delay)?,
            major_delay: var_or("MAJOR_DELAY_THRESHOLD", defaults.thresholds.major_delay)?,
            escalation_step: var_or("ESCALATION_STEP", defaults.thresholds.escalation_step)?,
            grades: GradeScale::default(),
        };
        if thresholds.major_delay < thresholds.minor_delay {
            return Err(anyhow!(
                "MAJOR_DELAY_THRESHOLD ({}) must not be below DELAY_THRESHOLD ({})",
                thresholds.major_delay,
                thresholds.minor_delay
            ));
        }

        Ok(Self {
            api_base_url: optional_var("RAIL_API_URL").unwrap_or(defaults.api_base_url),
            api_key: optional_var("MBTA_API_KEY"),
            route: optional_var("RAIL_ROUTE").unwrap_or(defaults.route),
            database_url: optional_var("DATABASE_URL").unwrap_or(defaults.database_url),
            poll_interval: Duration::from_secs(var_or("POLL_INTERVAL_SECONDS", 120u64)?),
            request_timeout: Duration::from_secs(var_or("REQUEST_TIMEOUT_SECONDS", 30u64)?),
            connect_timeout: defaults.connect_timeout,
            timezone,
            webhook_url: optional_var("DISCORD_WEBHOOK_URL"),
            thingspeak_api_key: optional_var("THINGSPEAK_API_KEY"),
            thingspeak_url: optional_var("THINGSPEAK_URL").unwrap_or(defaults.thingspeak_url),
            thresholds,
            ..defaults
        })
    }

    /// Predictions endpoint for the monitored route with all side tables included.
    pub fn predictions_url(&self) -> String {
        format!(
            "{}/predictions?filter[route]={}&include=vehicle,schedule,stop,trip",
            self.api_base_url.trim_end_matches('/'),
            self.route
        )
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    Tz::from_str(name).map_err(|e| anyhow!("invalid timezone '{name}': {e}"))
}

/// Returns the variable's value, treating unset and blank the same.
fn optional_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
