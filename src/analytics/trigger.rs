use chrono::{NaiveDate, NaiveDateTime};

use crate::config::TimeWindow;

/// A job that runs at most once per local calendar date, inside a wall-clock window.
#[derive(Debug, Clone)]
pub struct DailyTrigger {
    name: &'static str,
    window: TimeWindow,
    last_fired: Option<NaiveDate>,
}

impl DailyTrigger {
    pub fn new(name: &'static str, window: TimeWindow) -> Self {
        Self {
            name,
            window,
            last_fired: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn last_fired(&self) -> Option<NaiveDate> {
        self.last_fired
    }

    pub fn should_fire(&self, local_now: NaiveDateTime) -> bool {
        self.window.contains(local_now.time()) && self.last_fired != Some(local_now.date())
    }

    pub fn mark_fired(&mut self, date: NaiveDate) {
        self.last_fired = Some(date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::new(
            date.parse().unwrap(),
            NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
        )
    }

    fn morning() -> DailyTrigger {
        DailyTrigger::new(
            "morning grade",
            TimeWindow::new(
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(10, 15, 0).unwrap(),
            ),
        )
    }

    #[test]
    fn test_fires_only_inside_window() {
        let t = morning();
        assert!(!t.should_fire(at("2026-03-02", "09:59")));
        assert!(t.should_fire(at("2026-03-02", "10:00")));
        assert!(t.should_fire(at("2026-03-02", "10:14")));
        assert!(!t.should_fire(at("2026-03-02", "10:15")));
    }

    #[test]
    fn test_fires_once_per_day() {
        let mut t = morning();
        let now = at("2026-03-02", "10:02");
        assert!(t.should_fire(now));
        t.mark_fired(now.date());

        assert!(!t.should_fire(at("2026-03-02", "10:04")));
        assert!(t.should_fire(at("2026-03-03", "10:04")));
    }
}
