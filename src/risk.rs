use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::WeeklyMetrics;

pub const LOW_LEVEL_MAX: i32 = 30;
pub const MEDIUM_LEVEL_MAX: i32 = 60;

const SHARP_DROP_RATIO: f64 = 0.5;
const MILD_DROP_RATIO: f64 = 0.7;
const SEVERE_SHORTAGE_MINUTES: i64 = 300;
const MILD_SHORTAGE_MINUTES: i64 = 600;
const SEVERE_COMPLETION_RATE: i64 = 40;
const MILD_COMPLETION_RATE: i64 = 60;
const NEGLECT_RATIO_PERCENT: i64 = 10;
const PLAN_FAILURE_STREAK: i64 = 5;
const NO_STUDY_STREAK: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: i32) -> Self {
        if score <= LOW_LEVEL_MAX {
            Self::Low
        } else if score <= MEDIUM_LEVEL_MAX {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskResult {
    pub student_id: Uuid,
    pub risk_score: i32,
    pub level: RiskLevel,
    pub reasons: Vec<String>,
    pub metrics: WeeklyMetrics,
}

/// The one source of truth for the weighted rule set. Both the single-student
/// evaluator and the batch sweep end here. Rules fire in a fixed order, each
/// contributing its points and one reason carrying the literal numbers that
/// triggered it; the sum clamps to [0, 100].
pub fn score_metrics(metrics: &WeeklyMetrics, student_id: Uuid) -> RiskResult {
    let mut score = 0i32;
    let mut reasons: Vec<String> = Vec::new();

    // 1. Week-over-week study time collapse.
    let study = &metrics.study_time;
    if study.last_week_minutes > 0 {
        let ratio = study.this_week_minutes as f64 / study.last_week_minutes as f64;
        if ratio < MILD_DROP_RATIO {
            let drop_percent = ((1.0 - ratio) * 100.0).round() as i64;
            if ratio < SHARP_DROP_RATIO {
                score += 25;
            } else {
                score += 15;
            }
            reasons.push(format!(
                "Study time fell {}% from last week ({} min -> {} min)",
                drop_percent, study.last_week_minutes, study.this_week_minutes
            ));
        }
    }

    // 2. Absolute shortage, independent of the drop rule. Two empty weeks is
    //    missing data, not a shortage.
    if study.this_week_minutes > 0 || study.last_week_minutes > 0 {
        if study.this_week_minutes < SEVERE_SHORTAGE_MINUTES {
            score += 20;
            reasons.push(format!(
                "Only {} minutes of study this week (minimum target {} min)",
                study.this_week_minutes, SEVERE_SHORTAGE_MINUTES
            ));
        } else if study.this_week_minutes < MILD_SHORTAGE_MINUTES {
            score += 10;
            reasons.push(format!(
                "Only {} minutes of study this week (weekly target {} min)",
                study.this_week_minutes, MILD_SHORTAGE_MINUTES
            ));
        }
    }

    // 3. Plan completion.
    let plan = &metrics.plan_completion;
    if plan.total_plans > 0 && plan.completion_rate < MILD_COMPLETION_RATE {
        if plan.completion_rate < SEVERE_COMPLETION_RATE {
            score += 20;
        } else {
            score += 10;
        }
        reasons.push(format!(
            "Plan completion at {}% this week ({} of {} plans)",
            plan.completion_rate, plan.completed_plans, plan.total_plans
        ));
    }

    // 4. Goal pressure, first branch wins.
    let goal = &metrics.goal_status;
    if goal.goals_near_deadline >= 2 && goal.low_progress_goals >= 2 {
        score += 20;
        reasons.push(format!(
            "{} goals near their deadline with {} behind schedule",
            goal.goals_near_deadline, goal.low_progress_goals
        ));
    } else if goal.goals_very_near_deadline >= 1 && goal.very_low_progress_goals >= 1 {
        score += 15;
        reasons.push(format!(
            "{} goals almost due with {} far behind schedule",
            goal.goals_very_near_deadline, goal.very_low_progress_goals
        ));
    }

    // 5. Score trend; decline and low grades may both fire.
    let trend = &metrics.score_trend;
    if trend.has_declining_trend {
        score += 20;
        reasons.push(format!(
            "Grades declining in {}",
            trend.declining_subjects.join(", ")
        ));
    }
    if !trend.low_grade_subjects.is_empty() {
        score += 15;
        reasons.push(format!(
            "Low grades in {}",
            trend.low_grade_subjects.join(", ")
        ));
    }

    // 6. Weak-subject neglect. Requires observed study time, so the batch
    //    sweep (which carries no attribution) can only under-score here.
    let weak = &metrics.weak_subjects;
    if !weak.weak_subjects.is_empty()
        && weak.total_study_minutes > 0
        && weak.weak_subject_study_ratio < NEGLECT_RATIO_PERCENT
    {
        score += 10;
        reasons.push(format!(
            "Only {}% of study time went to {} weak subjects",
            weak.weak_subject_study_ratio,
            weak.weak_subjects.len()
        ));
    }

    // 7. History patterns, independent of each other.
    let history = &metrics.history_pattern;
    if history.consecutive_plan_failures >= PLAN_FAILURE_STREAK {
        score += 20;
        reasons.push(format!(
            "{} consecutive days without a completed plan",
            history.consecutive_plan_failures
        ));
    }
    if history.consecutive_no_study_days >= NO_STUDY_STREAK {
        score += 15;
        reasons.push(format!(
            "{} consecutive days with no study activity",
            history.consecutive_no_study_days
        ));
    }

    let risk_score = score.clamp(0, 100);
    RiskResult {
        student_id,
        risk_score,
        level: RiskLevel::from_score(risk_score),
        reasons,
        metrics: metrics.clone(),
    }
}
