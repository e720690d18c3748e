//! The six weekly metric extractors. Each module pairs a pure assembly
//! function over raw rows (shared with the batch sweep) with an async
//! `collect` that queries its own slice of the store and degrades to the
//! zero-value struct instead of failing.

pub mod goal_status;
pub mod history_pattern;
pub mod plan_completion;
pub mod score_trend;
pub mod study_time;
pub mod weak_subjects;

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

pub use goal_status::{GoalSnapshot, GoalStatusMetrics};
pub use history_pattern::{HistoryEvent, HistoryPatternMetrics};
pub use plan_completion::PlanCompletionMetrics;
pub use score_trend::{RecentScore, ScoreTrendMetrics, ScoreType};
pub use study_time::StudyTimeMetrics;
pub use weak_subjects::WeakSubjectMetrics;

use crate::windows::WeekWindows;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyMetrics {
    pub study_time: StudyTimeMetrics,
    pub plan_completion: PlanCompletionMetrics,
    pub goal_status: GoalStatusMetrics,
    pub score_trend: ScoreTrendMetrics,
    pub weak_subjects: WeakSubjectMetrics,
    pub history_pattern: HistoryPatternMetrics,
}

/// Runs all six extractors concurrently and collects the bundle. The
/// extractors are independent and read-only; none blocks on another.
pub async fn collect_all(pool: &PgPool, student_id: Uuid, windows: &WeekWindows) -> WeeklyMetrics {
    let (study_time, plan_completion, goal_status, score_trend, weak_subjects, history_pattern) = tokio::join!(
        study_time::collect(pool, student_id, windows),
        plan_completion::collect(pool, student_id, windows),
        goal_status::collect(pool, student_id, windows),
        score_trend::collect(pool, student_id),
        weak_subjects::collect(pool, student_id, windows),
        history_pattern::collect(pool, student_id, windows),
    );

    WeeklyMetrics {
        study_time,
        plan_completion,
        goal_status,
        score_trend,
        weak_subjects,
        history_pattern,
    }
}
