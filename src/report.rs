use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::risk::{RiskLevel, RiskResult};

#[derive(Debug, Clone)]
pub struct LevelSummary {
    pub level: RiskLevel,
    pub count: usize,
    pub avg_score: f64,
}

pub fn summarize_by_level(results: &[RiskResult]) -> Vec<LevelSummary> {
    let mut map: HashMap<&'static str, (RiskLevel, usize, i64)> = HashMap::new();

    for result in results {
        let entry = map
            .entry(result.level.as_str())
            .or_insert((result.level, 0, 0));
        entry.1 += 1;
        entry.2 += i64::from(result.risk_score);
    }

    let mut summaries: Vec<LevelSummary> = map
        .into_values()
        .map(|(level, count, total_score)| LevelSummary {
            level,
            count,
            avg_score: if count == 0 {
                0.0
            } else {
                total_score as f64 / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.avg_score.partial_cmp(&a.avg_score).unwrap_or(std::cmp::Ordering::Equal));
    summaries
}

pub fn build_report(
    week_start: NaiveDate,
    results: &[RiskResult],
    names: &HashMap<Uuid, String>,
) -> String {
    let summaries = summarize_by_level(results);

    let mut ranked: Vec<&RiskResult> = results.iter().collect();
    ranked.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));

    let mut output = String::new();

    let _ = writeln!(output, "# Weekly Risk Report");
    let _ = writeln!(
        output,
        "Week of {} across {} students",
        week_start,
        results.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No students evaluated this week.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} students (avg score {:.1})",
                summary.level, summary.count, summary.avg_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest-Risk Students");

    if ranked.is_empty() {
        let _ = writeln!(output, "No students evaluated this week.");
    } else {
        for result in ranked.iter().take(10) {
            let name = names
                .get(&result.student_id)
                .map(String::as_str)
                .unwrap_or("unknown student");
            let _ = writeln!(
                output,
                "- {} score {} ({}) across {} reasons",
                name,
                result.risk_score,
                result.level,
                result.reasons.len()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Why They Were Flagged");

    let flagged: Vec<&RiskResult> = ranked
        .iter()
        .filter(|r| !r.reasons.is_empty())
        .take(5)
        .copied()
        .collect();

    if flagged.is_empty() {
        let _ = writeln!(output, "No rules fired for this cohort.");
    } else {
        for result in flagged {
            let name = names
                .get(&result.student_id)
                .map(String::as_str)
                .unwrap_or("unknown student");
            let _ = writeln!(output, "- {}:", name);
            for reason in &result.reasons {
                let _ = writeln!(output, "  - {}", reason);
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::WeeklyMetrics;
    use crate::risk::score_metrics;

    fn result(score_shape: i64) -> RiskResult {
        let mut metrics = WeeklyMetrics::default();
        metrics.study_time.this_week_minutes = score_shape;
        metrics.study_time.last_week_minutes = 400;
        score_metrics(&metrics, Uuid::new_v4())
    }

    #[test]
    fn summary_counts_students_per_level() {
        let results = vec![result(700), result(700), result(100)];
        let summaries = summarize_by_level(&results);
        let low = summaries.iter().find(|s| s.level == RiskLevel::Low).unwrap();
        assert_eq!(low.count, 2);
        let medium = summaries
            .iter()
            .find(|s| s.level == RiskLevel::Medium)
            .unwrap();
        assert_eq!(medium.count, 1);
        assert!(medium.avg_score > low.avg_score);
    }

    #[test]
    fn report_contains_all_sections() {
        let at_risk = result(100);
        let mut names = HashMap::new();
        names.insert(at_risk.student_id, "Avery Lee".to_string());

        let report = build_report(
            NaiveDate::from_ymd_opt(2026, 2, 9).unwrap(),
            &[at_risk],
            &names,
        );

        assert!(report.contains("# Weekly Risk Report"));
        assert!(report.contains("## Risk Mix"));
        assert!(report.contains("## Highest-Risk Students"));
        assert!(report.contains("## Why They Were Flagged"));
        assert!(report.contains("Avery Lee"));
        assert!(report.contains("Study time fell"));
    }

    #[test]
    fn empty_cohort_renders_placeholders() {
        let report = build_report(
            NaiveDate::from_ymd_opt(2026, 2, 9).unwrap(),
            &[],
            &HashMap::new(),
        );
        assert!(report.contains("No students evaluated this week."));
        assert!(report.contains("No rules fired for this cohort."));
    }

    #[test]
    fn unknown_students_still_render() {
        let report = build_report(
            NaiveDate::from_ymd_opt(2026, 2, 9).unwrap(),
            &[result(100)],
            &HashMap::new(),
        );
        assert!(report.contains("unknown student"));
    }
}
