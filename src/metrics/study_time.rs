use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::SessionRow;
use crate::windows::WeekWindows;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyTimeMetrics {
    pub this_week_minutes: i64,
    pub last_week_minutes: i64,
    pub change_minutes: i64,
    pub change_percent: i64,
}

/// Buckets sessions into the current and previous week by the calendar date
/// the session started on, and sums whole minutes per week.
pub fn from_sessions(rows: &[SessionRow], windows: &WeekWindows) -> StudyTimeMetrics {
    let mut this_week_seconds = 0i64;
    let mut last_week_seconds = 0i64;

    for row in rows {
        let day = row.started_at.date_naive();
        let seconds = row.duration_seconds.unwrap_or(0).max(0);
        if windows.this_week.contains(day) {
            this_week_seconds += seconds;
        } else if windows.last_week.contains(day) {
            last_week_seconds += seconds;
        }
    }

    let this_week_minutes = this_week_seconds / 60;
    let last_week_minutes = last_week_seconds / 60;
    let change_minutes = this_week_minutes - last_week_minutes;
    let change_percent = if last_week_minutes > 0 {
        (change_minutes as f64 / last_week_minutes as f64 * 100.0).round() as i64
    } else if this_week_minutes > 0 {
        100
    } else {
        0
    };

    StudyTimeMetrics {
        this_week_minutes,
        last_week_minutes,
        change_minutes,
        change_percent,
    }
}

pub async fn collect(pool: &PgPool, student_id: Uuid, windows: &WeekWindows) -> StudyTimeMetrics {
    match db::fetch_study_sessions(pool, &[student_id], &windows.study_span()).await {
        Ok(rows) => from_sessions(&rows, windows),
        Err(err) => {
            tracing::warn!(
                domain = "metrics",
                action = "study_time",
                %student_id,
                error = %err,
                "study session fetch failed, using empty metrics"
            );
            StudyTimeMetrics::default()
        }
    }
}
