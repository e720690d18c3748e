use chrono::{Datelike, Duration, NaiveDate};

pub const LOOKBACK_DAYS: i64 = 30;

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// The shared windows every evaluation works from: the Monday-aligned current
/// and previous calendar weeks plus the 30-day event lookback ending today.
#[derive(Debug, Clone, Copy)]
pub struct WeekWindows {
    pub today: NaiveDate,
    pub this_week: TimeWindow,
    pub last_week: TimeWindow,
    pub lookback: TimeWindow,
}

impl WeekWindows {
    pub fn for_today(today: NaiveDate) -> Self {
        let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
        let this_week = TimeWindow {
            start: monday,
            end: monday + Duration::days(7),
        };
        let last_week = TimeWindow {
            start: monday - Duration::days(7),
            end: monday,
        };
        let lookback = TimeWindow {
            start: today - Duration::days(LOOKBACK_DAYS - 1),
            end: today + Duration::days(1),
        };
        Self {
            today,
            this_week,
            last_week,
            lookback,
        }
    }

    /// Single range covering both comparison weeks, for one sessions fetch.
    pub fn study_span(&self) -> TimeWindow {
        TimeWindow {
            start: self.last_week.start,
            end: self.this_week.end,
        }
    }
}
