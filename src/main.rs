//! CLI entry point for the rail watchdog.
//!
//! `watch` runs the poll loop; the remaining subcommands are read-only queries
//! against the snapshot log, plus CSV import and export.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rail_watchdog::{
    analytics::report,
    config::WatchConfig,
    feed::FeedNormalizer,
    legacy::import_csv,
    monitor::Monitor,
    notify::{DashboardPusher, Dispatcher, Notifier, WebhookNotifier},
    output::{append_entries, to_json},
    store::SnapshotStore,
};
use serde::Serialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const FEEDBACK_FORM_URL: &str = "https://www.mbta.com/customer-support";

#[derive(Parser)]
#[command(name = "rail_watchdog")]
#[command(about = "Commuter rail disruption monitor and analytics", long_about = None)]
struct Cli {
    /// Override DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Print query results as JSON instead of text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the live feed, log snapshots and send alerts until Ctrl+C
    Watch {
        /// Seconds between polls (defaults to POLL_INTERVAL_SECONDS)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Latest status of every train seen in the last 30 minutes
    List,
    /// Last hour of history for one train plus its live next stop
    Status {
        #[arg(value_name = "TRAIN")]
        vehicle_id: String,
    },
    /// Reliability report card for one train
    Analyze {
        #[arg(value_name = "TRAIN")]
        vehicle_id: String,

        #[arg(short, long, default_value_t = 30)]
        days: i64,
    },
    /// Trains ranked by cancellations and major delays
    Leaderboard {
        #[arg(short, long, default_value_t = 30)]
        days: i64,

        #[arg(short, long, default_value_t = 3)]
        top: usize,
    },
    /// Service summary for one local date (default today)
    Summary {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Morning commute grade for one local date (default today)
    Grade {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Dates on which a train was canceled or badly late
    Failures {
        #[arg(value_name = "TRAIN")]
        vehicle_id: String,

        #[arg(short, long, default_value_t = 7)]
        days: i64,
    },
    /// Draft a customer-service complaint from the last hour of incidents
    Feedback {
        /// Days of failure history quoted per train
        #[arg(short, long, default_value_t = 7)]
        days: i64,
    },
    /// Whether the logger has written rows recently
    Health,
    /// Migrate a legacy CSV log into the database
    ImportCsv {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// Append recent rows to a CSV file
    ExportCsv {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// How far back to export
        #[arg(short, long, default_value_t = 60)]
        minutes: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/rail_watchdog.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("rail_watchdog.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let mut config = WatchConfig::from_env().context("invalid configuration")?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    ensure_database_dir(&config.database_url)?;
    let store = SnapshotStore::connect(
        &config.database_url,
        config.timezone,
        config.thresholds.clone(),
    )
    .await?;
    let tz = config.timezone;
    let today = Utc::now().with_timezone(&tz).date_naive();
    let json = cli.json;

    match cli.command {
        Commands::Watch { interval } => {
            let normalizer = FeedNormalizer::from_config(&config)?;
            let dispatcher = build_dispatcher(&config)?;
            let interval = interval
                .map(std::time::Duration::from_secs)
                .unwrap_or(config.poll_interval);

            let mut monitor = Monitor::new(&config, normalizer, store.clone(), dispatcher);
            if let Some(dashboard) = DashboardPusher::from_config(&config)? {
                info!("Dashboard metrics push enabled");
                monitor = monitor.with_dashboard(dashboard);
            }
            monitor.run(interval).await?;
        }
        Commands::List => {
            let rows = store
                .latest_per_vehicle(Utc::now() - Duration::minutes(30))
                .await?;
            emit(json, &rows, || {
                report::list_board(&rows, config.thresholds.minor_delay, tz)
            })?;
        }
        Commands::Status { vehicle_id } => {
            let history = store
                .query_window(Utc::now() - Duration::hours(1), Some(&vehicle_id))
                .await?;
            let normalizer = FeedNormalizer::from_config(&config)?;
            let live = normalizer.get_live_prediction(&vehicle_id).await;

            #[derive(Serialize)]
            struct StatusView<'a> {
                history: &'a [rail_watchdog::store::LogEntry],
                live: Option<&'a rail_watchdog::feed::LivePrediction>,
            }
            let view = StatusView {
                history: &history,
                live: live.as_ref(),
            };
            emit(json, &view, || {
                report::status_text(
                    &vehicle_id,
                    &history,
                    live.as_ref(),
                    config.thresholds.minor_delay,
                    tz,
                )
            })?;
        }
        Commands::Analyze { vehicle_id, days } => {
            match store
                .aggregate_vehicle_reliability(&vehicle_id, days, Utc::now())
                .await?
            {
                Some(card) => emit(json, &card, || report::report_card_text(&card))?,
                None => println!("No history found for Train {vehicle_id} in the last {days} days."),
            }
        }
        Commands::Leaderboard { days, top } => {
            let entries = store.aggregate_leaderboard(days, top, Utc::now()).await?;
            emit(json, &entries, || report::leaderboard_text(&entries, days))?;
        }
        Commands::Summary { date } => {
            let date = date.unwrap_or(today);
            match store.aggregate_daily(date).await? {
                Some(summary) => emit(json, &summary, || report::daily_summary_text(&summary))?,
                None => println!("No service data for {date}."),
            }
        }
        Commands::Grade { date } => {
            let date = date.unwrap_or(today);
            match store.aggregate_commute_window(date).await? {
                Some(grade) => emit(json, &grade, || report::morning_grade_text(&grade))?,
                None => println!("No commute data for {date}."),
            }
        }
        Commands::Failures { vehicle_id, days } => {
            let dates = store
                .aggregate_failure_dates(
                    &vehicle_id,
                    days,
                    config.thresholds.minor_delay,
                    Utc::now(),
                )
                .await?;
            emit(json, &dates, || report::failures_text(&vehicle_id, &dates, days))?;
        }
        Commands::Feedback { days } => {
            let now = Utc::now();
            let incidents = store
                .aggregate_incidents(now - Duration::minutes(60), days, now)
                .await?;
            if !json {
                println!("Open form: {FEEDBACK_FORM_URL}\n");
            }
            emit(json, &incidents, || {
                report::complaint_text(&incidents, days, now, tz)
            })?;
        }
        Commands::Health => {
            let latest = store.latest().await?;
            let recent = store
                .query_window(Utc::now() - Duration::minutes(15), None)
                .await?;
            if latest.is_none() || recent.is_empty() {
                warn!(recent_rows = recent.len(), "Logger looks stale");
            }
            println!("{}", report::health_text(latest.as_ref(), recent.len(), tz));
        }
        Commands::ImportCsv { path } => {
            let summary = import_csv(&store, &path).await?;
            println!(
                "Imported {} rows ({} skipped) from {}",
                summary.imported,
                summary.skipped,
                path.display()
            );
        }
        Commands::ExportCsv { path, minutes } => {
            let rows = store
                .query_window(Utc::now() - Duration::minutes(minutes), None)
                .await?;
            let written = append_entries(&path, &rows, tz)?;
            println!("Exported {written} rows to {}", path.display());
        }
    }

    store.close().await;
    Ok(())
}

/// Prints `value` as JSON when requested, otherwise the rendered text.
fn emit<T, F>(json: bool, value: &T, text: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce() -> String,
{
    if json {
        println!("{}", to_json(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn build_dispatcher(config: &WatchConfig) -> Result<Dispatcher> {
    let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
    if let Some(url) = &config.webhook_url {
        channels.push(Arc::new(WebhookNotifier::new(
            url.clone(),
            config.request_timeout,
        )?));
        info!("Webhook notifications enabled");
    }
    Ok(Dispatcher::new(channels))
}

/// SQLite creates the file but not its directory.
fn ensure_database_dir(url: &str) -> Result<()> {
    let Some(path) = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:")) else {
        return Ok(());
    };
    if path.starts_with(':') {
        return Ok(());
    }
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create database directory {}", dir.display()))?;
    }
    Ok(())
}
