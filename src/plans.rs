use crate::models::PlanRow;

/// A plan counts toward completion metrics when it schedules actual study
/// content and has not been cancelled. Calendar-only entries carry no
/// `content_id`.
pub fn is_learning_plan(plan: &PlanRow) -> bool {
    plan.content_id.is_some() && plan.status.as_deref() != Some("cancelled")
}

/// Completed means the student closed the plan out, or its recorded progress
/// reached 100 even if the end timestamp never got written.
pub fn is_completed_plan(plan: &PlanRow) -> bool {
    plan.actual_end_time.is_some() || plan.progress.unwrap_or(0) >= 100
}
