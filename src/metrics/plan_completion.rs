use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::PlanRow;
use crate::plans::{is_completed_plan, is_learning_plan};
use crate::windows::WeekWindows;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanCompletionMetrics {
    pub total_plans: usize,
    pub completed_plans: usize,
    pub completion_rate: i64,
}

/// Completion rate over this week's learning plans. Non-learning calendar
/// entries are excluded before counting; no plans means a rate of 0.
pub fn from_plans(rows: &[PlanRow]) -> PlanCompletionMetrics {
    let learning: Vec<&PlanRow> = rows.iter().filter(|p| is_learning_plan(p)).collect();
    let total_plans = learning.len();
    let completed_plans = learning.iter().filter(|p| is_completed_plan(p)).count();
    let completion_rate = if total_plans > 0 {
        (completed_plans as f64 / total_plans as f64 * 100.0).round() as i64
    } else {
        0
    };
    PlanCompletionMetrics {
        total_plans,
        completed_plans,
        completion_rate,
    }
}

pub async fn collect(pool: &PgPool, student_id: Uuid, windows: &WeekWindows) -> PlanCompletionMetrics {
    match db::fetch_plans(pool, &[student_id], &windows.this_week).await {
        Ok(rows) => from_plans(&rows),
        Err(err) => {
            tracing::warn!(
                domain = "metrics",
                action = "plan_completion",
                %student_id,
                error = %err,
                "plan fetch failed, using empty metrics"
            );
            PlanCompletionMetrics::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn plan(content: bool, completed: bool) -> PlanRow {
        PlanRow {
            student_id: Uuid::new_v4(),
            id: Uuid::new_v4(),
            completed_amount: None,
            actual_end_time: completed.then(Utc::now),
            progress: None,
            content_id: content.then(Uuid::new_v4),
            status: None,
        }
    }

    #[test]
    fn empty_rows_give_zero_metrics() {
        assert_eq!(from_plans(&[]), PlanCompletionMetrics::default());
    }

    #[test]
    fn only_learning_plans_are_counted() {
        let rows = vec![plan(true, true), plan(false, true), plan(true, false)];
        let metrics = from_plans(&rows);
        assert_eq!(metrics.total_plans, 2);
        assert_eq!(metrics.completed_plans, 1);
        assert_eq!(metrics.completion_rate, 50);
    }

    #[test]
    fn rate_rounds_to_whole_percent() {
        let rows = vec![plan(true, true), plan(true, false), plan(true, false)];
        let metrics = from_plans(&rows);
        assert_eq!(metrics.completion_rate, 33);
    }

    #[test]
    fn all_completed_is_100() {
        let rows = vec![plan(true, true), plan(true, true)];
        assert_eq!(from_plans(&rows).completion_rate, 100);
    }

    #[test]
    fn only_non_learning_rows_behave_like_empty() {
        let rows = vec![plan(false, false), plan(false, true)];
        assert_eq!(from_plans(&rows), PlanCompletionMetrics::default());
    }
}
