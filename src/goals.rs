use chrono::NaiveDate;

use crate::models::{GoalProgressRow, GoalRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoalProgressSummary {
    pub days_remaining: i64,
    pub progress_percent: i64,
}

/// Collapses a goal's progress rows into the snapshot the metrics need: whole
/// days until the deadline and the most recently recorded progress percent,
/// clamped to [0, 100]. No rows means 0% progress.
pub fn calculate_goal_progress(
    goal: &GoalRow,
    progress: &[&GoalProgressRow],
    today: NaiveDate,
) -> GoalProgressSummary {
    let days_remaining = (goal.end_date - today).num_days();
    let progress_percent = progress
        .iter()
        .max_by_key(|row| row.recorded_at)
        .and_then(|row| row.progress_percent)
        .unwrap_or(0)
        .clamp(0, 100);
    GoalProgressSummary {
        days_remaining,
        progress_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn goal(end: NaiveDate) -> GoalRow {
        GoalRow {
            student_id: Uuid::new_v4(),
            id: Uuid::new_v4(),
            title: "finish algebra review".to_string(),
            start_date: end - Duration::days(30),
            end_date: end,
        }
    }

    fn progress_row(goal: &GoalRow, percent: Option<i64>, days_ago: i64) -> GoalProgressRow {
        GoalProgressRow {
            student_id: goal.student_id,
            goal_id: goal.id,
            progress_percent: percent,
            recorded_at: Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
                - Duration::days(days_ago),
        }
    }

    #[test]
    fn latest_row_wins() {
        let g = goal(date(2026, 2, 20));
        let older = progress_row(&g, Some(10), 5);
        let newer = progress_row(&g, Some(40), 1);
        let summary = calculate_goal_progress(&g, &[&older, &newer], date(2026, 2, 10));
        assert_eq!(summary.progress_percent, 40);
        assert_eq!(summary.days_remaining, 10);
    }

    #[test]
    fn no_rows_means_zero_progress() {
        let g = goal(date(2026, 2, 20));
        let summary = calculate_goal_progress(&g, &[], date(2026, 2, 18));
        assert_eq!(summary.progress_percent, 0);
        assert_eq!(summary.days_remaining, 2);
    }

    #[test]
    fn null_percent_on_latest_row_reads_as_zero() {
        let g = goal(date(2026, 2, 20));
        let row = progress_row(&g, None, 1);
        let summary = calculate_goal_progress(&g, &[&row], date(2026, 2, 10));
        assert_eq!(summary.progress_percent, 0);
    }

    #[test]
    fn out_of_range_percent_is_clamped() {
        let g = goal(date(2026, 2, 20));
        let row = progress_row(&g, Some(150), 1);
        let summary = calculate_goal_progress(&g, &[&row], date(2026, 2, 10));
        assert_eq!(summary.progress_percent, 100);
    }

    #[test]
    fn deadline_today_has_zero_days_remaining() {
        let g = goal(date(2026, 2, 20));
        let summary = calculate_goal_progress(&g, &[], date(2026, 2, 20));
        assert_eq!(summary.days_remaining, 0);
    }
}
