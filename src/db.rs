use std::future::Future;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    GoalProgressRow, GoalRow, HistoryEventRow, PlanRow, ScoreRow, SessionRow, StudentRow,
    SubjectMinutesRow, SubjectRiskRow,
};
use crate::risk::RiskResult;
use crate::windows::{TimeWindow, WeekWindows};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn is_undefined_column(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("42703"),
        _ => false,
    }
}

/// Schema-drift fallback: some environments trail the newest columns, which
/// Postgres reports as undefined_column (42703). Retry exactly once with the
/// query that drops the offending filter; every other error class passes
/// through untouched.
async fn with_column_fallback<T, P, F>(
    label: &'static str,
    primary: P,
    fallback: F,
) -> Result<T, sqlx::Error>
where
    P: Future<Output = Result<T, sqlx::Error>>,
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match primary.await {
        Ok(value) => Ok(value),
        Err(err) if is_undefined_column(&err) => {
            tracing::warn!(
                query = label,
                error = %err,
                "column missing in this environment, retrying without the filter"
            );
            fallback.await
        }
        Err(err) => Err(err),
    }
}

pub async fn fetch_students(pool: &PgPool) -> anyhow::Result<Vec<StudentRow>> {
    let rows = sqlx::query("SELECT id, full_name FROM students ORDER BY full_name")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| StudentRow {
            id: row.get("id"),
            full_name: row.get("full_name"),
        })
        .collect())
}

pub async fn fetch_study_sessions(
    pool: &PgPool,
    ids: &[Uuid],
    window: &TimeWindow,
) -> anyhow::Result<Vec<SessionRow>> {
    let rows = sqlx::query(
        "SELECT student_id, started_at, duration_seconds \
         FROM study_sessions \
         WHERE student_id = ANY($1) AND started_at >= $2 AND started_at < $3",
    )
    .bind(ids)
    .bind(day_start(window.start))
    .bind(day_start(window.end))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| SessionRow {
            student_id: row.get("student_id"),
            started_at: row.get("started_at"),
            duration_seconds: row.get("duration_seconds"),
        })
        .collect())
}

pub async fn fetch_plans(
    pool: &PgPool,
    ids: &[Uuid],
    week: &TimeWindow,
) -> anyhow::Result<Vec<PlanRow>> {
    let primary = sqlx::query(
        "SELECT student_id, id, completed_amount, actual_end_time, progress, content_id, status \
         FROM student_plans \
         WHERE student_id = ANY($1) AND plan_date >= $2 AND plan_date < $3 \
           AND (status IS NULL OR status <> 'archived')",
    )
    .bind(ids)
    .bind(week.start)
    .bind(week.end)
    .fetch_all(pool);

    let fallback = sqlx::query(
        "SELECT student_id, id, completed_amount, actual_end_time, progress, content_id \
         FROM student_plans \
         WHERE student_id = ANY($1) AND plan_date >= $2 AND plan_date < $3",
    )
    .bind(ids)
    .bind(week.start)
    .bind(week.end)
    .fetch_all(pool);

    let rows = with_column_fallback("student_plans", primary, fallback).await?;

    Ok(rows
        .into_iter()
        .map(|row| PlanRow {
            student_id: row.get("student_id"),
            id: row.get("id"),
            completed_amount: row.get("completed_amount"),
            actual_end_time: row.get("actual_end_time"),
            progress: row.get("progress"),
            content_id: row.get("content_id"),
            status: row.try_get("status").unwrap_or(None),
        })
        .collect())
}

pub async fn fetch_active_goals(
    pool: &PgPool,
    ids: &[Uuid],
    today: NaiveDate,
) -> anyhow::Result<Vec<GoalRow>> {
    let rows = sqlx::query(
        "SELECT student_id, id, title, start_date, end_date \
         FROM student_goals \
         WHERE student_id = ANY($1) AND start_date <= $2 AND end_date >= $2",
    )
    .bind(ids)
    .bind(today)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| GoalRow {
            student_id: row.get("student_id"),
            id: row.get("id"),
            title: row.get("title"),
            start_date: row.get("start_date"),
            end_date: row.get("end_date"),
        })
        .collect())
}

pub async fn fetch_goal_progress(
    pool: &PgPool,
    ids: &[Uuid],
) -> anyhow::Result<Vec<GoalProgressRow>> {
    let rows = sqlx::query(
        "SELECT student_id, goal_id, progress_percent, recorded_at \
         FROM goal_progress \
         WHERE student_id = ANY($1) \
         ORDER BY recorded_at DESC",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| GoalProgressRow {
            student_id: row.get("student_id"),
            goal_id: row.get("goal_id"),
            progress_percent: row.get("progress_percent"),
            recorded_at: row.get("recorded_at"),
        })
        .collect())
}

pub async fn fetch_internal_scores(
    pool: &PgPool,
    ids: &[Uuid],
    per_student: i64,
) -> anyhow::Result<Vec<ScoreRow>> {
    fetch_scores(pool, "internal_scores", ids, per_student).await
}

pub async fn fetch_mock_scores(
    pool: &PgPool,
    ids: &[Uuid],
    per_student: i64,
) -> anyhow::Result<Vec<ScoreRow>> {
    fetch_scores(pool, "mock_scores", ids, per_student).await
}

async fn fetch_scores(
    pool: &PgPool,
    table: &str,
    ids: &[Uuid],
    per_student: i64,
) -> anyhow::Result<Vec<ScoreRow>> {
    let query = format!(
        "SELECT s.student_id, subj.name AS subject, s.grade_rank, s.test_date \
         FROM {table} s \
         JOIN subjects subj ON subj.id = s.subject_id \
         WHERE s.student_id = ANY($1) \
         ORDER BY s.test_date DESC \
         LIMIT $2"
    );

    let rows = sqlx::query(&query)
        .bind(ids)
        .bind(per_student * ids.len() as i64)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| ScoreRow {
            student_id: row.get("student_id"),
            subject: row.get("subject"),
            grade_rank: row.get("grade_rank"),
            test_date: row.get("test_date"),
        })
        .collect())
}

pub async fn fetch_subject_risks(
    pool: &PgPool,
    ids: &[Uuid],
) -> anyhow::Result<Vec<SubjectRiskRow>> {
    let primary = sqlx::query(
        "SELECT student_id, subject, risk_score \
         FROM subject_risks \
         WHERE student_id = ANY($1) AND archived = FALSE",
    )
    .bind(ids)
    .fetch_all(pool);

    let fallback = sqlx::query(
        "SELECT student_id, subject, risk_score \
         FROM subject_risks \
         WHERE student_id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool);

    let rows = with_column_fallback("subject_risks", primary, fallback).await?;

    Ok(rows
        .into_iter()
        .map(|row| SubjectRiskRow {
            student_id: row.get("student_id"),
            subject: row.get("subject"),
            risk_score: row.get("risk_score"),
        })
        .collect())
}

/// Per-subject study minutes for one student, attributed through the plan the
/// session was started from. Only the single-student path asks for this; the
/// batch sweep deliberately skips the attribution.
pub async fn fetch_subject_study_minutes(
    pool: &PgPool,
    student_id: Uuid,
    window: &TimeWindow,
) -> anyhow::Result<Vec<SubjectMinutesRow>> {
    let rows = sqlx::query(
        "SELECT subj.name AS subject, \
                (COALESCE(SUM(ss.duration_seconds), 0) / 60)::BIGINT AS minutes \
         FROM study_sessions ss \
         JOIN student_plans p ON p.id = ss.plan_id \
         JOIN subjects subj ON subj.id = p.subject_id \
         WHERE ss.student_id = $1 AND ss.started_at >= $2 AND ss.started_at < $3 \
         GROUP BY subj.name",
    )
    .bind(student_id)
    .bind(day_start(window.start))
    .bind(day_start(window.end))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| SubjectMinutesRow {
            subject: row.get("subject"),
            minutes: row.get("minutes"),
        })
        .collect())
}

pub async fn fetch_history_events(
    pool: &PgPool,
    ids: &[Uuid],
    window: &TimeWindow,
) -> anyhow::Result<Vec<HistoryEventRow>> {
    let rows = sqlx::query(
        "SELECT student_id, event_type, occurred_at \
         FROM history_events \
         WHERE student_id = ANY($1) AND occurred_at >= $2 AND occurred_at < $3 \
         ORDER BY occurred_at DESC",
    )
    .bind(ids)
    .bind(day_start(window.start))
    .bind(day_start(window.end))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| HistoryEventRow {
            student_id: row.get("student_id"),
            event_type: row.get("event_type"),
            occurred_at: row.get("occurred_at"),
        })
        .collect())
}

/// Best-effort audit copy of an evaluation. Callers treat a failure here as
/// log-and-continue; it must never fail the evaluation itself.
pub async fn record_evaluation(pool: &PgPool, result: &RiskResult) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO risk_evaluations (id, student_id, risk_score, level, reasons) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(result.student_id)
    .bind(result.risk_score)
    .bind(result.level.as_str())
    .bind(serde_json::to_value(&result.reasons)?)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn import_sessions_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        started_at: DateTime<Utc>,
        duration_seconds: i64,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let student_id: Uuid = sqlx::query(
            "INSERT INTO students (id, full_name, email) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(&row.full_name)
        .bind(&row.email)
        .fetch_one(pool)
        .await?
        .get("id");

        sqlx::query(
            "INSERT INTO study_sessions (id, student_id, started_at, duration_seconds) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(row.started_at)
        .bind(row.duration_seconds)
        .execute(pool)
        .await?;

        inserted += 1;
    }

    Ok(inserted)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Avery Lee",
            "avery.lee@example.com",
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Jules Moreno",
            "jules.moreno@example.com",
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Kiara Patel",
            "kiara.patel@example.com",
        ),
    ];

    for (id, name, email) in &students {
        sqlx::query(
            "INSERT INTO students (id, full_name, email) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name",
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;
    }

    let subjects = vec![
        (Uuid::parse_str("7b1a2f40-5d6e-4b8a-9c3d-111111111111")?, "math"),
        (Uuid::parse_str("7b1a2f40-5d6e-4b8a-9c3d-222222222222")?, "english"),
        (Uuid::parse_str("7b1a2f40-5d6e-4b8a-9c3d-333333333333")?, "science"),
    ];

    for (id, name) in &subjects {
        sqlx::query(
            "INSERT INTO subjects (id, name) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
        )
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let windows = WeekWindows::for_today(Utc::now().date_naive());
    let avery = students[0].0;
    let jules = students[1].0;
    let math = subjects[0].0;
    let english = subjects[1].0;

    // Avery had a solid previous week and barely studied this week, so the
    // demo sweep surfaces a sharp drop.
    let sessions = vec![
        (avery, windows.last_week.start, 7200i64),
        (avery, windows.last_week.start + Duration::days(2), 9000),
        (avery, windows.last_week.start + Duration::days(4), 7800),
        (avery, windows.this_week.start, 3600),
        (jules, windows.last_week.start + Duration::days(1), 5400),
        (jules, windows.this_week.start, 5400),
        (jules, windows.this_week.start + Duration::days(1), 6000),
    ];

    for (student_id, date, seconds) in sessions {
        sqlx::query(
            "INSERT INTO study_sessions (id, student_id, started_at, duration_seconds) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(day_start(date) + Duration::hours(18))
        .bind(seconds)
        .execute(pool)
        .await?;
    }

    let plans = vec![
        (avery, math, windows.this_week.start, false),
        (avery, english, windows.this_week.start + Duration::days(1), false),
        (avery, math, windows.this_week.start + Duration::days(2), true),
        (jules, math, windows.this_week.start, true),
        (jules, english, windows.this_week.start + Duration::days(1), true),
    ];

    for (student_id, subject_id, date, completed) in plans {
        sqlx::query(
            "INSERT INTO student_plans \
             (id, student_id, subject_id, content_id, plan_date, progress, actual_end_time, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'scheduled')",
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(subject_id)
        .bind(Uuid::new_v4())
        .bind(date)
        .bind(if completed { 100i64 } else { 20i64 })
        .bind(completed.then(|| day_start(date) + Duration::hours(20)))
        .execute(pool)
        .await?;
    }

    let goal_id = Uuid::parse_str("9e4d3c2b-1a0f-4e5d-8c7b-444444444444")?;
    sqlx::query(
        "INSERT INTO student_goals (id, student_id, title, start_date, end_date) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(goal_id)
    .bind(avery)
    .bind("finish the algebra workbook")
    .bind(windows.today - Duration::days(20))
    .bind(windows.today + Duration::days(2))
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO goal_progress (id, goal_id, student_id, progress_percent, recorded_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(goal_id)
    .bind(avery)
    .bind(25i64)
    .bind(day_start(windows.today - Duration::days(1)))
    .execute(pool)
    .await?;

    let internal_scores = vec![
        (avery, math, 2, windows.today - Duration::days(60)),
        (avery, math, 4, windows.today - Duration::days(10)),
        (jules, english, 2, windows.today - Duration::days(12)),
    ];

    for (student_id, subject_id, rank, date) in internal_scores {
        sqlx::query(
            "INSERT INTO internal_scores (id, student_id, subject_id, grade_rank, test_date) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(subject_id)
        .bind(rank)
        .bind(date)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "INSERT INTO subject_risks (id, student_id, subject, risk_score) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(avery)
    .bind("math")
    .bind(72i32)
    .execute(pool)
    .await?;

    let history = vec![
        (avery, "plan_missed", 0i64),
        (avery, "plan_missed", 1),
        (avery, "study_session", 2),
        (jules, "plan_completed", 0),
        (jules, "study_session", 0),
    ];

    for (student_id, event_type, days_ago) in history {
        sqlx::query(
            "INSERT INTO history_events (id, student_id, event_type, occurred_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(event_type)
        .bind(day_start(windows.today - Duration::days(days_ago)) + Duration::hours(12))
        .execute(pool)
        .await?;
    }

    Ok(())
}
