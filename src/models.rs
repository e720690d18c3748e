use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// One study session row. `duration_seconds` is nullable at the source and is
/// normalized to zero minutes by the extractors.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub student_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct PlanRow {
    pub student_id: Uuid,
    pub id: Uuid,
    pub completed_amount: Option<i64>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub progress: Option<i64>,
    pub content_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoalRow {
    pub student_id: Uuid,
    pub id: Uuid,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct GoalProgressRow {
    pub student_id: Uuid,
    pub goal_id: Uuid,
    pub progress_percent: Option<i64>,
    pub recorded_at: DateTime<Utc>,
}

/// Exam score row, shared by the internal and mock score sources. The subject
/// label comes from a join and can be absent for orphaned rows.
#[derive(Debug, Clone)]
pub struct ScoreRow {
    pub student_id: Uuid,
    pub subject: Option<String>,
    pub grade_rank: Option<i32>,
    pub test_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct SubjectRiskRow {
    pub student_id: Uuid,
    pub subject: Option<String>,
    pub risk_score: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct SubjectMinutesRow {
    pub subject: String,
    pub minutes: i64,
}

#[derive(Debug, Clone)]
pub struct HistoryEventRow {
    pub student_id: Uuid,
    pub event_type: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub id: Uuid,
    pub full_name: String,
}
