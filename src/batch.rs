use std::collections::HashMap;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::metrics::{
    goal_status, history_pattern, plan_completion, score_trend, study_time, weak_subjects,
    WeeklyMetrics,
};
use crate::risk::{self, RiskResult};
use crate::windows::WeekWindows;

/// Evaluates a whole cohort with a fixed set of bulk queries instead of six
/// per student, then re-derives each student's metrics in memory with the
/// same pure assemblies the single-student path uses and runs them through
/// the same scorer.
///
/// One deliberate divergence: no study-time attribution is fetched, so
/// `weak_subject_study_ratio` is always 0 here and the neglect rule never
/// fires. A sweep can under-score a student by at most 10 points relative to
/// `evaluate`; reconciling that would silently shift cohort dashboards.
pub async fn evaluate_batch(pool: &PgPool, student_ids: &[Uuid]) -> Vec<RiskResult> {
    if student_ids.is_empty() {
        return Vec::new();
    }

    let windows = WeekWindows::for_today(Utc::now().date_naive());

    let study_span = windows.study_span();
    let (sessions, plans, goals, progress, internal, mock, history, risks) = tokio::join!(
        db::fetch_study_sessions(pool, student_ids, &study_span),
        db::fetch_plans(pool, student_ids, &windows.this_week),
        db::fetch_active_goals(pool, student_ids, windows.today),
        db::fetch_goal_progress(pool, student_ids),
        db::fetch_internal_scores(pool, student_ids, score_trend::SCORES_PER_STUDENT),
        db::fetch_mock_scores(pool, student_ids, score_trend::SCORES_PER_STUDENT),
        db::fetch_history_events(pool, student_ids, &windows.lookback),
        db::fetch_subject_risks(pool, student_ids),
    );

    let sessions = rows_or_empty("study_sessions", sessions);
    let plans = rows_or_empty("student_plans", plans);
    let goals = rows_or_empty("student_goals", goals);
    let progress = rows_or_empty("goal_progress", progress);
    let internal = rows_or_empty("internal_scores", internal);
    let mock = rows_or_empty("mock_scores", mock);
    let history = rows_or_empty("history_events", history);
    let risks = rows_or_empty("subject_risks", risks);

    let sessions_by = group_by_student(sessions, |r| r.student_id);
    let plans_by = group_by_student(plans, |r| r.student_id);
    let goals_by = group_by_student(goals, |r| r.student_id);
    let progress_by = group_by_student(progress, |r| r.student_id);
    let internal_by = group_by_student(internal, |r| r.student_id);
    let mock_by = group_by_student(mock, |r| r.student_id);
    let history_by = group_by_student(history, |r| r.student_id);
    let risks_by = group_by_student(risks, |r| r.student_id);

    student_ids
        .iter()
        .map(|&student_id| {
            let metrics = WeeklyMetrics {
                study_time: study_time::from_sessions(slice(&sessions_by, student_id), &windows),
                plan_completion: plan_completion::from_plans(slice(&plans_by, student_id)),
                goal_status: goal_status::from_goals(
                    slice(&goals_by, student_id),
                    slice(&progress_by, student_id),
                    windows.today,
                ),
                score_trend: score_trend::from_scores(
                    slice(&internal_by, student_id),
                    slice(&mock_by, student_id),
                ),
                weak_subjects: weak_subjects::from_rows(slice(&risks_by, student_id), &[]),
                history_pattern: history_pattern::from_events(
                    slice(&history_by, student_id),
                    windows.today,
                ),
            };
            risk::score_metrics(&metrics, student_id)
        })
        .collect()
}

fn rows_or_empty<T>(source: &'static str, result: anyhow::Result<Vec<T>>) -> Vec<T> {
    match result {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(
                domain = "batch",
                source,
                error = %err,
                "bulk fetch failed, treating source as empty"
            );
            Vec::new()
        }
    }
}

/// Groups rows by their student key. Total over typed rows; every row carries
/// a student id by schema.
pub(crate) fn group_by_student<T>(
    rows: Vec<T>,
    key: impl Fn(&T) -> Uuid,
) -> HashMap<Uuid, Vec<T>> {
    let mut map: HashMap<Uuid, Vec<T>> = HashMap::new();
    for row in rows {
        map.entry(key(&row)).or_default().push(row);
    }
    map
}

fn slice<T>(map: &HashMap<Uuid, Vec<T>>, student_id: Uuid) -> &[T] {
    map.get(&student_id).map(Vec::as_slice).unwrap_or(&[])
}
