use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::ScoreRow;

/// A subject needs this many merged records before a trend can be read.
pub const MIN_RECORDS_FOR_TREND: usize = 2;
/// Grade ranks are ordinal with larger = worse; the latest rank at or past
/// this value flags the subject as low-grade.
pub const LOW_GRADE_RANK: i32 = 4;
pub const RECENT_SCORES_KEPT: usize = 10;
/// How many rows per student each score source fetch is capped at.
pub const SCORES_PER_STUDENT: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreType {
    Internal,
    Mock,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentScore {
    pub subject: String,
    pub score_type: ScoreType,
    pub grade_rank: i32,
    pub test_date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreTrendMetrics {
    pub has_declining_trend: bool,
    pub declining_subjects: Vec<String>,
    pub low_grade_subjects: Vec<String>,
    pub recent_scores: Vec<RecentScore>,
}

/// Merges the two score sources into one sequence ordered most-recent-first,
/// then reads per-subject decline (latest rank worse than the one before) and
/// low latest grades. Rows missing a subject label or rank are dropped.
pub fn from_scores(internal: &[ScoreRow], mock: &[ScoreRow]) -> ScoreTrendMetrics {
    let mut merged: Vec<RecentScore> = Vec::with_capacity(internal.len() + mock.len());
    for (rows, score_type) in [(internal, ScoreType::Internal), (mock, ScoreType::Mock)] {
        for row in rows {
            if let (Some(subject), Some(rank)) = (&row.subject, row.grade_rank) {
                merged.push(RecentScore {
                    subject: subject.clone(),
                    score_type,
                    grade_rank: rank,
                    test_date: row.test_date,
                });
            }
        }
    }
    merged.sort_by(|a, b| b.test_date.cmp(&a.test_date));

    let mut by_subject: BTreeMap<&str, Vec<&RecentScore>> = BTreeMap::new();
    for score in &merged {
        by_subject.entry(score.subject.as_str()).or_default().push(score);
    }

    let mut declining_subjects = Vec::new();
    let mut low_grade_subjects = Vec::new();
    for (subject, scores) in &by_subject {
        if scores.len() >= MIN_RECORDS_FOR_TREND && scores[0].grade_rank > scores[1].grade_rank {
            declining_subjects.push((*subject).to_string());
        }
        if scores[0].grade_rank >= LOW_GRADE_RANK {
            low_grade_subjects.push((*subject).to_string());
        }
    }

    merged.truncate(RECENT_SCORES_KEPT);
    ScoreTrendMetrics {
        has_declining_trend: !declining_subjects.is_empty(),
        declining_subjects,
        low_grade_subjects,
        recent_scores: merged,
    }
}

pub async fn collect(pool: &PgPool, student_id: Uuid) -> ScoreTrendMetrics {
    let ids = [student_id];
    let (internal, mock) = tokio::join!(
        db::fetch_internal_scores(pool, &ids, SCORES_PER_STUDENT),
        db::fetch_mock_scores(pool, &ids, SCORES_PER_STUDENT),
    );

    let internal = source_or_empty("internal_scores", student_id, internal);
    let mock = source_or_empty("mock_scores", student_id, mock);
    from_scores(&internal, &mock)
}

fn source_or_empty(
    source: &'static str,
    student_id: Uuid,
    result: anyhow::Result<Vec<ScoreRow>>,
) -> Vec<ScoreRow> {
    match result {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(
                domain = "metrics",
                action = "score_trend",
                source,
                %student_id,
                error = %err,
                "score fetch failed, treating source as empty"
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn score(subject: &str, rank: i32, test_date: NaiveDate) -> ScoreRow {
        ScoreRow {
            student_id: Uuid::new_v4(),
            subject: Some(subject.to_string()),
            grade_rank: Some(rank),
            test_date,
        }
    }

    #[test]
    fn empty_rows_give_zero_metrics() {
        assert_eq!(from_scores(&[], &[]), ScoreTrendMetrics::default());
    }

    #[test]
    fn sources_merge_ordered_most_recent_first() {
        let internal = vec![score("math", 2, date(1, 10))];
        let mock = vec![score("math", 3, date(2, 1))];
        let metrics = from_scores(&internal, &mock);
        assert_eq!(metrics.recent_scores.len(), 2);
        assert_eq!(metrics.recent_scores[0].test_date, date(2, 1));
        assert_eq!(metrics.recent_scores[0].score_type, ScoreType::Mock);
    }

    #[test]
    fn rising_rank_is_a_decline() {
        // Rank went 2 -> 3 (worse) across the merged sources.
        let internal = vec![score("math", 2, date(1, 10))];
        let mock = vec![score("math", 3, date(2, 1))];
        let metrics = from_scores(&internal, &mock);
        assert!(metrics.has_declining_trend);
        assert_eq!(metrics.declining_subjects, vec!["math".to_string()]);
    }

    #[test]
    fn single_record_subjects_cannot_decline() {
        let internal = vec![score("math", 5, date(1, 10))];
        let metrics = from_scores(&internal, &[]);
        assert!(!metrics.has_declining_trend);
    }

    #[test]
    fn improving_rank_is_not_a_decline() {
        let internal = vec![score("math", 4, date(1, 10)), score("math", 2, date(2, 1))];
        let metrics = from_scores(&internal, &[]);
        assert!(!metrics.has_declining_trend);
    }

    #[test]
    fn low_grade_uses_latest_record_only() {
        let internal = vec![score("english", 5, date(1, 10)), score("english", 2, date(2, 1))];
        let metrics = from_scores(&internal, &[]);
        assert!(metrics.low_grade_subjects.is_empty());

        let metrics = from_scores(&[score("english", 4, date(2, 5))], &[]);
        assert_eq!(metrics.low_grade_subjects, vec!["english".to_string()]);
    }

    #[test]
    fn rows_without_subject_or_rank_are_dropped() {
        let mut no_subject = score("math", 3, date(2, 1));
        no_subject.subject = None;
        let mut no_rank = score("math", 3, date(2, 2));
        no_rank.grade_rank = None;
        let metrics = from_scores(&[no_subject, no_rank], &[]);
        assert_eq!(metrics, ScoreTrendMetrics::default());
    }

    #[test]
    fn recent_scores_are_capped() {
        let rows: Vec<ScoreRow> = (1..=12)
            .map(|d| score("math", 3, date(1, d)))
            .collect();
        let metrics = from_scores(&rows, &[]);
        assert_eq!(metrics.recent_scores.len(), RECENT_SCORES_KEPT);
        assert_eq!(metrics.recent_scores[0].test_date, date(1, 12));
    }

    #[test]
    fn decline_and_low_grades_detect_independently_per_subject() {
        let internal = vec![
            score("math", 2, date(1, 10)),
            score("math", 3, date(2, 1)),
            score("english", 6, date(2, 1)),
        ];
        let metrics = from_scores(&internal, &[]);
        assert_eq!(metrics.declining_subjects, vec!["math".to_string()]);
        assert_eq!(metrics.low_grade_subjects, vec!["english".to_string()]);
    }
}
