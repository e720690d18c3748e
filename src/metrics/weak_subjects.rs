use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::{SubjectMinutesRow, SubjectRiskRow};
use crate::windows::WeekWindows;

/// Precomputed per-subject risk at or past this value marks the subject weak.
pub const RISK_SCORE_THRESHOLD: i32 = 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakSubjectMetrics {
    pub weak_subjects: Vec<String>,
    pub subject_study_minutes: BTreeMap<String, i64>,
    pub total_study_minutes: i64,
    pub weak_subject_study_ratio: i64,
}

/// Filters the precomputed subject risks down to the weak set and, when study
/// attribution rows are supplied, works out what share of the week's study
/// time went to those subjects. The batch sweep passes no attribution rows,
/// which leaves the ratio at 0 by construction.
pub fn from_rows(risks: &[SubjectRiskRow], study: &[SubjectMinutesRow]) -> WeakSubjectMetrics {
    let weak_subjects: Vec<String> = risks
        .iter()
        .filter_map(|row| match (&row.subject, row.risk_score) {
            (Some(subject), Some(score)) if score >= RISK_SCORE_THRESHOLD => {
                Some(subject.clone())
            }
            _ => None,
        })
        .collect();

    let mut subject_study_minutes: BTreeMap<String, i64> = BTreeMap::new();
    for row in study {
        *subject_study_minutes.entry(row.subject.clone()).or_insert(0) += row.minutes.max(0);
    }

    let total_study_minutes: i64 = subject_study_minutes.values().sum();
    let weak_minutes: i64 = weak_subjects
        .iter()
        .filter_map(|subject| subject_study_minutes.get(subject))
        .sum();
    let weak_subject_study_ratio = if total_study_minutes > 0 {
        (weak_minutes as f64 / total_study_minutes as f64 * 100.0).round() as i64
    } else {
        0
    };

    WeakSubjectMetrics {
        weak_subjects,
        subject_study_minutes,
        total_study_minutes,
        weak_subject_study_ratio,
    }
}

pub async fn collect(pool: &PgPool, student_id: Uuid, windows: &WeekWindows) -> WeakSubjectMetrics {
    let ids = [student_id];
    let (risks, study) = tokio::join!(
        db::fetch_subject_risks(pool, &ids),
        db::fetch_subject_study_minutes(pool, student_id, &windows.this_week),
    );

    let risks = match risks {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(
                domain = "metrics",
                action = "weak_subjects",
                %student_id,
                error = %err,
                "subject risk fetch failed, using empty metrics"
            );
            return WeakSubjectMetrics::default();
        }
    };

    let study = match study {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(
                domain = "metrics",
                action = "weak_subjects",
                %student_id,
                error = %err,
                "study attribution fetch failed, ratio degrades to 0"
            );
            Vec::new()
        }
    };

    from_rows(&risks, &study)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn risk(subject: &str, score: Option<i32>) -> SubjectRiskRow {
        SubjectRiskRow {
            student_id: Uuid::new_v4(),
            subject: Some(subject.to_string()),
            risk_score: score,
        }
    }

    fn minutes(subject: &str, minutes: i64) -> SubjectMinutesRow {
        SubjectMinutesRow {
            subject: subject.to_string(),
            minutes,
        }
    }

    #[test]
    fn empty_rows_give_zero_metrics() {
        assert_eq!(from_rows(&[], &[]), WeakSubjectMetrics::default());
    }

    #[test]
    fn threshold_is_inclusive() {
        let risks = vec![risk("math", Some(60)), risk("english", Some(59))];
        let metrics = from_rows(&risks, &[]);
        assert_eq!(metrics.weak_subjects, vec!["math".to_string()]);
    }

    #[test]
    fn null_scores_and_missing_subjects_are_skipped() {
        let mut unlabeled = risk("math", Some(90));
        unlabeled.subject = None;
        let risks = vec![unlabeled, risk("science", None)];
        assert!(from_rows(&risks, &[]).weak_subjects.is_empty());
    }

    #[test]
    fn ratio_is_weak_share_of_total_minutes() {
        let risks = vec![risk("math", Some(70)), risk("science", Some(65))];
        let study = vec![minutes("math", 60), minutes("english", 30), minutes("science", 30)];
        let metrics = from_rows(&risks, &study);
        assert_eq!(metrics.total_study_minutes, 120);
        assert_eq!(metrics.weak_subject_study_ratio, 75);
        assert_eq!(metrics.subject_study_minutes["math"], 60);
    }

    #[test]
    fn no_study_time_means_zero_ratio() {
        let risks = vec![risk("math", Some(70))];
        let metrics = from_rows(&risks, &[]);
        assert_eq!(metrics.total_study_minutes, 0);
        assert_eq!(metrics.weak_subject_study_ratio, 0);
    }

    #[test]
    fn duplicate_subject_rows_accumulate() {
        let study = vec![minutes("math", 30), minutes("math", 60)];
        let metrics = from_rows(&[], &study);
        assert_eq!(metrics.subject_study_minutes["math"], 90);
        assert_eq!(metrics.total_study_minutes, 90);
    }
}
