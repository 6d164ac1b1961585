//! The poll loop: fetch, log, evaluate alerts, dispatch, run daily reports.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::alerts::DisruptionTracker;
use crate::analytics::DailyTrigger;
use crate::analytics::report::{alert_text, daily_summary_text, morning_grade_text};
use crate::config::WatchConfig;
use crate::feed::FeedNormalizer;
use crate::notify::{DashboardPusher, Dispatcher};
use crate::store::SnapshotStore;

/// What happened during one poll cycle.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleOutcome {
    pub observed: usize,
    pub stored: bool,
    pub alerts: usize,
    pub metrics_pushed: bool,
    pub reports: Vec<&'static str>,
}

pub struct Monitor {
    normalizer: FeedNormalizer,
    store: SnapshotStore,
    tracker: DisruptionTracker,
    dispatcher: Dispatcher,
    dashboard: Option<DashboardPusher>,
    morning: DailyTrigger,
    summary: DailyTrigger,
    tz: Tz,
}

impl Monitor {
    pub fn new(
        config: &WatchConfig,
        normalizer: FeedNormalizer,
        store: SnapshotStore,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            normalizer,
            store,
            tracker: DisruptionTracker::new(config.thresholds.clone()),
            dispatcher,
            dashboard: None,
            morning: DailyTrigger::new("morning grade", config.morning_trigger),
            summary: DailyTrigger::new("daily summary", config.summary_trigger),
            tz: config.timezone,
        }
    }

    /// Pushes each non-empty batch's metrics to a dashboard channel.
    pub fn with_dashboard(mut self, dashboard: DashboardPusher) -> Self {
        self.dashboard = Some(dashboard);
        self
    }

    /// Runs one cycle. Every step is best-effort; failures are logged and the
    /// remaining steps still run.
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();

        let batch = self.normalizer.fetch(now).await;
        outcome.observed = batch.len();

        match self.store.insert(&batch).await {
            Ok(()) => outcome.stored = true,
            Err(e) => error!(error = %e, "Failed to store batch"),
        }

        if let Some(dashboard) = &self.dashboard {
            match dashboard.push(&batch).await {
                Ok(pushed) => outcome.metrics_pushed = pushed,
                Err(e) => warn!(error = %e, "Dashboard push failed"),
            }
        }

        let alerts = self.tracker.evaluate(&batch);
        outcome.alerts = alerts.len();
        for alert in &alerts {
            info!(
                vehicle_id = %alert.vehicle_id,
                condition = alert.condition.as_str(),
                delay = alert.delay_minutes,
                is_update = alert.is_update,
                "Dispatching alert"
            );
            self.dispatcher.dispatch(&alert_text(alert)).await;
        }

        outcome.reports = self.run_triggers(now).await;
        outcome
    }

    async fn run_triggers(&mut self, now: DateTime<Utc>) -> Vec<&'static str> {
        let local = now.with_timezone(&self.tz).naive_local();
        let today = local.date();
        let mut fired = Vec::new();

        if self.morning.should_fire(local) {
            // marked before posting so a failed post is not retried all window long
            self.morning.mark_fired(today);
            fired.push(self.morning.name());
            match self.store.aggregate_commute_window(today).await {
                Ok(Some(grade)) => {
                    self.dispatcher.dispatch(&morning_grade_text(&grade)).await;
                }
                Ok(None) => info!(date = %today, "No commute data to grade"),
                Err(e) => error!(error = %e, "Morning grade query failed"),
            }
        }

        if self.summary.should_fire(local) {
            self.summary.mark_fired(today);
            fired.push(self.summary.name());
            match self.store.aggregate_daily(today).await {
                Ok(Some(summary)) => {
                    self.dispatcher.dispatch(&daily_summary_text(&summary)).await;
                }
                Ok(None) => info!(date = %today, "No service data to summarize"),
                Err(e) => error!(error = %e, "Daily summary query failed"),
            }
        }

        fired
    }

    pub fn last_fired(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        (self.morning.last_fired(), self.summary.last_fired())
    }

    /// Polls every `interval` until ctrl-c.
    pub async fn run(&mut self, interval: Duration) -> Result<()> {
        info!(
            interval_secs = interval.as_secs(),
            "Monitor started. Press Ctrl+C to stop."
        );
        if !self.dispatcher.has_channels() {
            warn!("No notification channels configured, alerts will only be logged");
        }

        loop {
            let outcome = self.run_cycle(Utc::now()).await;
            debug!(?outcome, "Cycle complete");

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        error!(error = %e, "Failed to listen for ctrl-c");
                    }
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.store.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Thresholds;
    use crate::fetch::BasicClient;
    use crate::notify::Notifier;
    use crate::notify::tests::RecordingNotifier;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn feed(delay_minutes: i64, canceled: bool) -> serde_json::Value {
        let attributes = if canceled {
            json!({"schedule_relationship": "CANCELLED", "direction_id": 1})
        } else {
            let predicted = format!("2024-03-04T10:{:02}:00-05:00", 5 + delay_minutes);
            json!({"arrival_time": predicted, "direction_id": 1})
        };
        json!({
            "data": [{
                "type": "prediction",
                "id": "p1",
                "attributes": attributes,
                "relationships": {
                    "vehicle": {"data": {"type": "vehicle", "id": "v1"}},
                    "schedule": {"data": {"type": "schedule", "id": "s1"}},
                    "stop": {"data": {"type": "stop", "id": "st1"}},
                    "trip": {"data": {"type": "trip", "id": "t1"}}
                }
            }],
            "included": [
                {"type": "vehicle", "id": "v1", "attributes": {"current_status": "IN_TRANSIT_TO", "label": "1710", "direction_id": 1}},
                {"type": "schedule", "id": "s1", "attributes": {"arrival_time": "2024-03-04T10:05:00-05:00"}},
                {"type": "stop", "id": "st1", "attributes": {"name": "Framingham"}},
                {"type": "trip", "id": "t1", "attributes": {"name": "508"}}
            ]
        })
    }

    struct Harness {
        server: MockServer,
        monitor: Monitor,
        notifier: Arc<RecordingNotifier>,
    }

    async fn harness() -> Harness {
        let server = MockServer::start().await;
        let config = WatchConfig {
            thresholds: Thresholds {
                minor_delay: 5,
                major_delay: 20,
                escalation_step: 10,
                ..Thresholds::default()
            },
            ..WatchConfig::default()
        };
        let client = BasicClient::new(Duration::from_secs(5), Duration::from_secs(5)).unwrap();
        let normalizer = FeedNormalizer::new(
            Box::new(client),
            format!("{}/predictions", server.uri()),
            config.thresholds.minor_delay,
        );
        let store = SnapshotStore::in_memory(config.timezone, config.thresholds.clone())
            .await
            .unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let channels: Vec<Arc<dyn Notifier>> = vec![notifier.clone()];
        let monitor = Monitor::new(&config, normalizer, store, Dispatcher::new(channels));
        Harness {
            server,
            monitor,
            notifier,
        }
    }

    async fn serve(server: &MockServer, body: serde_json::Value) {
        server.reset().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    // 14:00 UTC is 09:00 in New York, outside both report windows
    fn morning_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_minor_delay_is_logged_without_alert() {
        let mut h = harness().await;
        serve(&h.server, feed(10, false)).await;

        let outcome = h.monitor.run_cycle(morning_now()).await;
        assert_eq!(outcome.observed, 1);
        assert!(outcome.stored);
        assert_eq!(outcome.alerts, 0);
        assert!(h.notifier.posts.lock().unwrap().is_empty());

        let rows = h.monitor.store.query_window(morning_now(), None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].observation.delay_minutes, 10);
    }

    #[tokio::test]
    async fn test_severe_delay_then_cancellation() {
        let mut h = harness().await;
        serve(&h.server, feed(25, false)).await;

        assert_eq!(h.monitor.run_cycle(morning_now()).await.alerts, 1);
        assert_eq!(h.monitor.run_cycle(morning_now()).await.alerts, 0);

        serve(&h.server, feed(0, true)).await;
        assert_eq!(h.monitor.run_cycle(morning_now()).await.alerts, 1);

        let posts = h.notifier.posts.lock().unwrap();
        assert_eq!(posts.len(), 2);
        assert!(posts[0].contains("SEVERE DELAY: Train 508 is running 25 minutes late"));
        assert!(posts[1].contains("Train 508 has been CANCELED"));
    }

    #[tokio::test]
    async fn test_upstream_failure_clears_state() {
        let mut h = harness().await;
        serve(&h.server, feed(25, false)).await;
        assert_eq!(h.monitor.run_cycle(morning_now()).await.alerts, 1);

        h.server.reset().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&h.server)
            .await;
        let outcome = h.monitor.run_cycle(morning_now()).await;
        assert_eq!(outcome.observed, 0);

        // state was cleared by the empty cycle, so the same delay alerts again
        serve(&h.server, feed(25, false)).await;
        assert_eq!(h.monitor.run_cycle(morning_now()).await.alerts, 1);
    }

    #[tokio::test]
    async fn test_morning_grade_fires_once_per_day() {
        let mut h = harness().await;
        serve(&h.server, feed(0, false)).await;

        h.monitor.run_cycle(morning_now()).await;

        // 15:05 UTC is 10:05 local, inside the morning window
        let in_window = Utc.with_ymd_and_hms(2024, 3, 4, 15, 5, 0).unwrap();
        let outcome = h.monitor.run_cycle(in_window).await;
        assert_eq!(outcome.reports, vec!["morning grade"]);
        assert_eq!(
            h.monitor.last_fired().0,
            NaiveDate::from_ymd_opt(2024, 3, 4)
        );

        let later = Utc.with_ymd_and_hms(2024, 3, 4, 15, 10, 0).unwrap();
        assert!(h.monitor.run_cycle(later).await.reports.is_empty());

        let posts = h.notifier.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].starts_with("Morning commute grade"));
    }

    #[tokio::test]
    async fn test_dashboard_push_is_best_effort() {
        let h = harness().await;
        serve(&h.server, feed(10, false)).await;
        Mock::given(method("POST"))
            .and(path("/update"))
            .and(body_string_contains("field2=1"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&h.server)
            .await;

        let dashboard = DashboardPusher::new(
            format!("{}/update", h.server.uri()),
            "secret".to_string(),
            5,
            Duration::from_secs(5),
        )
        .unwrap();
        let mut monitor = h.monitor.with_dashboard(dashboard);

        // the rejected push does not stop the batch from being stored
        let outcome = monitor.run_cycle(morning_now()).await;
        assert!(!outcome.metrics_pushed);
        assert!(outcome.stored);
        assert_eq!(outcome.observed, 1);
    }

    #[tokio::test]
    async fn test_daily_summary_window() {
        let mut h = harness().await;
        serve(&h.server, feed(10, false)).await;

        // 02:02 UTC on the 5th is 21:02 local on the 4th
        let evening = Utc.with_ymd_and_hms(2024, 3, 5, 2, 2, 0).unwrap();
        let outcome = h.monitor.run_cycle(evening).await;
        assert_eq!(outcome.reports, vec!["daily summary"]);

        let posts = h.notifier.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].starts_with("Daily service summary for 2024-03-04"));
    }
}
