use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::HistoryEventRow;
use crate::windows::{WeekWindows, LOOKBACK_DAYS};

pub const RECENT_EVENTS_KEPT: usize = 10;

const STUDY_SESSION_EVENT: &str = "study_session";
const PLAN_COMPLETED_EVENT: &str = "plan_completed";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub event_type: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPatternMetrics {
    pub consecutive_plan_failures: i64,
    pub consecutive_no_study_days: i64,
    pub recent_events: Vec<HistoryEvent>,
}

/// Scans the 30-day event log backward from today. Plan failures count logged
/// days until one contains a completed plan; no-study days walk the calendar
/// back until a day with a study session. An empty log is missing data, not a
/// 30-day drought, and yields the zero-value struct.
pub fn from_events(rows: &[HistoryEventRow], today: NaiveDate) -> HistoryPatternMetrics {
    let mut events: Vec<(NaiveDate, &str)> = rows
        .iter()
        .filter_map(|row| match (&row.event_type, row.occurred_at) {
            (Some(event_type), Some(at)) => Some((at.date_naive(), event_type.as_str())),
            _ => None,
        })
        .collect();

    if events.is_empty() {
        return HistoryPatternMetrics::default();
    }

    events.sort_by(|a, b| b.0.cmp(&a.0));

    let mut types_by_date: BTreeMap<NaiveDate, HashSet<&str>> = BTreeMap::new();
    let mut study_dates: HashSet<NaiveDate> = HashSet::new();
    for &(date, event_type) in &events {
        types_by_date.entry(date).or_default().insert(event_type);
        if event_type == STUDY_SESSION_EVENT {
            study_dates.insert(date);
        }
    }

    let mut consecutive_plan_failures = 0i64;
    for types in types_by_date.values().rev() {
        if types.contains(PLAN_COMPLETED_EVENT) {
            break;
        }
        consecutive_plan_failures += 1;
    }

    let mut consecutive_no_study_days = 0i64;
    for offset in 0..LOOKBACK_DAYS {
        let day = today - Duration::days(offset);
        if study_dates.contains(&day) {
            break;
        }
        consecutive_no_study_days += 1;
    }

    let recent_events = events
        .iter()
        .take(RECENT_EVENTS_KEPT)
        .map(|(date, event_type)| HistoryEvent {
            event_type: (*event_type).to_string(),
            date: *date,
        })
        .collect();

    HistoryPatternMetrics {
        consecutive_plan_failures,
        consecutive_no_study_days,
        recent_events,
    }
}

pub async fn collect(pool: &PgPool, student_id: Uuid, windows: &WeekWindows) -> HistoryPatternMetrics {
    match db::fetch_history_events(pool, &[student_id], &windows.lookback).await {
        Ok(rows) => from_events(&rows, windows.today),
        Err(err) => {
            tracing::warn!(
                domain = "metrics",
                action = "history_pattern",
                %student_id,
                error = %err,
                "history fetch failed, using empty metrics"
            );
            HistoryPatternMetrics::default()
        }
    }
}
