use std::collections::HashMap;

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::goals::calculate_goal_progress;
use crate::models::{GoalProgressRow, GoalRow};
use crate::windows::WeekWindows;

pub const NEAR_DEADLINE_DAYS: i64 = 7;
pub const VERY_NEAR_DEADLINE_DAYS: i64 = 3;
pub const LOW_PROGRESS_PERCENT: i64 = 50;
pub const VERY_LOW_PROGRESS_PERCENT: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSnapshot {
    pub id: Uuid,
    pub title: String,
    pub days_remaining: i64,
    pub progress_percent: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalStatusMetrics {
    pub total_active_goals: usize,
    pub goals_near_deadline: usize,
    pub goals_very_near_deadline: usize,
    pub average_progress: i64,
    pub low_progress_goals: usize,
    pub very_low_progress_goals: usize,
    pub goals: Vec<GoalSnapshot>,
}

/// Snapshots every active goal and counts deadline pressure and progress
/// shortfalls. Deadline counts only consider goals that are not already past
/// due.
pub fn from_goals(
    goals: &[GoalRow],
    progress: &[GoalProgressRow],
    today: chrono::NaiveDate,
) -> GoalStatusMetrics {
    if goals.is_empty() {
        return GoalStatusMetrics::default();
    }

    let mut progress_by_goal: HashMap<Uuid, Vec<&GoalProgressRow>> = HashMap::new();
    for row in progress {
        progress_by_goal.entry(row.goal_id).or_default().push(row);
    }

    let snapshots: Vec<GoalSnapshot> = goals
        .iter()
        .map(|goal| {
            let rows = progress_by_goal.get(&goal.id).map(Vec::as_slice).unwrap_or(&[]);
            let summary = calculate_goal_progress(goal, rows, today);
            GoalSnapshot {
                id: goal.id,
                title: goal.title.clone(),
                days_remaining: summary.days_remaining,
                progress_percent: summary.progress_percent,
            }
        })
        .collect();

    let near = |snapshot: &&GoalSnapshot, days: i64| {
        snapshot.days_remaining >= 0 && snapshot.days_remaining <= days
    };

    let total_progress: i64 = snapshots.iter().map(|g| g.progress_percent).sum();
    GoalStatusMetrics {
        total_active_goals: snapshots.len(),
        goals_near_deadline: snapshots.iter().filter(|g| near(g, NEAR_DEADLINE_DAYS)).count(),
        goals_very_near_deadline: snapshots
            .iter()
            .filter(|g| near(g, VERY_NEAR_DEADLINE_DAYS))
            .count(),
        average_progress: (total_progress as f64 / snapshots.len() as f64).round() as i64,
        low_progress_goals: snapshots
            .iter()
            .filter(|g| g.progress_percent < LOW_PROGRESS_PERCENT)
            .count(),
        very_low_progress_goals: snapshots
            .iter()
            .filter(|g| g.progress_percent < VERY_LOW_PROGRESS_PERCENT)
            .count(),
        goals: snapshots,
    }
}

pub async fn collect(pool: &PgPool, student_id: Uuid, windows: &WeekWindows) -> GoalStatusMetrics {
    let ids = [student_id];
    let (goals, progress) = tokio::join!(
        db::fetch_active_goals(pool, &ids, windows.today),
        db::fetch_goal_progress(pool, &ids),
    );

    let goals = match goals {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(
                domain = "metrics",
                action = "goal_status",
                %student_id,
                error = %err,
                "goal fetch failed, using empty metrics"
            );
            return GoalStatusMetrics::default();
        }
    };

    let progress = match progress {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(
                domain = "metrics",
                action = "goal_status",
                %student_id,
                error = %err,
                "goal progress fetch failed, treating progress as unrecorded"
            );
            Vec::new()
        }
    };

    from_goals(&goals, &progress, windows.today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 11).unwrap()
    }

    fn goal(days_out: i64) -> GoalRow {
        GoalRow {
            student_id: Uuid::new_v4(),
            id: Uuid::new_v4(),
            title: "goal".to_string(),
            start_date: today() - Duration::days(14),
            end_date: today() + Duration::days(days_out),
        }
    }

    fn progress(goal: &GoalRow, percent: i64) -> GoalProgressRow {
        GoalProgressRow {
            student_id: goal.student_id,
            goal_id: goal.id,
            progress_percent: Some(percent),
            recorded_at: Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn empty_rows_give_zero_metrics() {
        assert_eq!(from_goals(&[], &[], today()), GoalStatusMetrics::default());
    }

    #[test]
    fn deadline_buckets_are_counted() {
        let goals = vec![goal(2), goal(6), goal(20)];
        let metrics = from_goals(&goals, &[], today());
        assert_eq!(metrics.total_active_goals, 3);
        assert_eq!(metrics.goals_near_deadline, 2);
        assert_eq!(metrics.goals_very_near_deadline, 1);
    }

    #[test]
    fn overdue_goals_do_not_count_as_near_deadline() {
        let mut g = goal(0);
        g.end_date = today() - Duration::days(1);
        let metrics = from_goals(&[g], &[], today());
        assert_eq!(metrics.goals_near_deadline, 0);
        assert_eq!(metrics.goals_very_near_deadline, 0);
    }

    #[test]
    fn progress_buckets_and_average() {
        let g1 = goal(10);
        let g2 = goal(10);
        let g3 = goal(10);
        let rows = vec![progress(&g1, 20), progress(&g2, 45), progress(&g3, 90)];
        let metrics = from_goals(&[g1, g2, g3], &rows, today());
        assert_eq!(metrics.low_progress_goals, 2);
        assert_eq!(metrics.very_low_progress_goals, 1);
        assert_eq!(metrics.average_progress, 52);
    }

    #[test]
    fn goals_without_progress_rows_count_as_zero_percent() {
        let g = goal(10);
        let metrics = from_goals(&[g], &[], today());
        assert_eq!(metrics.very_low_progress_goals, 1);
        assert_eq!(metrics.goals[0].progress_percent, 0);
    }

    #[test]
    fn progress_rows_attach_to_their_goal_only() {
        let g1 = goal(10);
        let g2 = goal(10);
        let rows = vec![progress(&g1, 80)];
        let metrics = from_goals(&[g1, g2.clone()], &rows, today());
        let other = metrics.goals.iter().find(|s| s.id == g2.id).unwrap();
        assert_eq!(other.progress_percent, 0);
    }
}
