use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::metrics::{self, calculate_metrics};
use crate::models::{DailyExperience, NpsBreakdown, ResponseRecord};

/// Roll responses up into one row per calendar day, oldest first. Mirrors
/// what the dashboard charts plot: volume, completions, NPS mix, average
/// CSAT.
pub fn summarize_daily(responses: &[ResponseRecord]) -> Vec<DailyExperience> {
    struct DayAcc {
        total: usize,
        completed: usize,
        promoters: usize,
        neutrals: usize,
        detractors: usize,
        csat_sum: f64,
        csat_count: usize,
    }

    let mut map: std::collections::HashMap<chrono::NaiveDate, DayAcc> =
        std::collections::HashMap::new();

    for response in responses {
        let entry = map
            .entry(response.submitted_at.date_naive())
            .or_insert(DayAcc {
                total: 0,
                completed: 0,
                promoters: 0,
                neutrals: 0,
                detractors: 0,
                csat_sum: 0.0,
                csat_count: 0,
            });
        entry.total += 1;
        if response.completed {
            entry.completed += 1;
        }
        if let Some(score) = response.nps_score {
            if metrics::is_promoter(score) {
                entry.promoters += 1;
            } else if metrics::is_detractor(score) {
                entry.detractors += 1;
            } else {
                entry.neutrals += 1;
            }
        }
        if let Some(score) = response.csat_score {
            entry.csat_sum += score;
            entry.csat_count += 1;
        }
    }

    let mut days: Vec<DailyExperience> = map
        .into_iter()
        .map(|(day, acc)| DailyExperience {
            day,
            total: acc.total,
            completed: acc.completed,
            promoters: acc.promoters,
            neutrals: acc.neutrals,
            detractors: acc.detractors,
            avg_csat: if acc.csat_count == 0 {
                None
            } else {
                Some(acc.csat_sum / acc.csat_count as f64)
            },
        })
        .collect();

    days.sort_by(|a, b| a.day.cmp(&b.day));
    days
}

pub fn nps_breakdown(responses: &[ResponseRecord]) -> NpsBreakdown {
    let mut breakdown = NpsBreakdown::default();
    for score in responses.iter().filter_map(|r| r.nps_score) {
        if metrics::is_promoter(score) {
            breakdown.promoters += 1;
        } else if metrics::is_detractor(score) {
            breakdown.detractors += 1;
        } else {
            breakdown.neutrals += 1;
        }
    }
    breakdown
}

/// Percentage rates; a missing metric renders as a dash.
pub fn fmt_rate(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}%"),
        None => "—".to_string(),
    }
}

/// NPS is a net score in -100..100, not a percentage.
pub fn fmt_score(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}"),
        None => "—".to_string(),
    }
}

pub fn build_report(
    branch: Option<&str>,
    cutoff: DateTime<Utc>,
    responses: &[ResponseRecord],
    total_invitations: u64,
) -> String {
    let summary = calculate_metrics(responses, total_invitations);
    let days = summarize_daily(responses);
    let breakdown = nps_breakdown(responses);

    let mut output = String::new();
    let branch_label = branch.unwrap_or("all branches");

    let _ = writeln!(output, "# Branch Experience Report");
    let _ = writeln!(
        output,
        "Generated for {} (responses since {})",
        branch_label,
        cutoff.date_naive()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(
        output,
        "- responses: {} (opened {}, started {}, completed {})",
        summary.total_responses,
        summary.opened_count,
        summary.started_count,
        summary.completed_count
    );
    let _ = writeln!(output, "- open rate: {}", fmt_rate(summary.open_rate));
    let _ = writeln!(
        output,
        "- response rate: {}",
        fmt_rate(Some(summary.response_rate))
    );
    let _ = writeln!(
        output,
        "- abandonment rate: {}",
        fmt_rate(Some(summary.abandonment_rate))
    );
    let _ = writeln!(output, "- NPS: {}", fmt_score(summary.nps));
    let _ = writeln!(output, "- CSAT: {}", fmt_rate(summary.csat));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Trend");

    if days.is_empty() {
        let _ = writeln!(output, "No responses recorded for this window.");
    } else {
        for day in days.iter() {
            let _ = writeln!(
                output,
                "- {}: {} responses, {} completed, avg CSAT {}, NPS mix {}/{}/{}",
                day.day,
                day.total,
                day.completed,
                fmt_score(day.avg_csat),
                day.promoters,
                day.neutrals,
                day.detractors
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## NPS Distribution");

    if breakdown.promoters + breakdown.neutrals + breakdown.detractors == 0 {
        let _ = writeln!(output, "No scored responses in this window.");
    } else {
        let _ = writeln!(output, "- promoters: {}", breakdown.promoters);
        let _ = writeln!(output, "- neutrals: {}", breakdown.neutrals);
        let _ = writeln!(output, "- detractors: {}", breakdown.detractors);
    }

    let mut recent: Vec<&ResponseRecord> =
        responses.iter().filter(|r| r.comment.is_some()).collect();
    recent.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Comments");

    if recent.is_empty() {
        let _ = writeln!(output, "No comments recorded for this window.");
    } else {
        for response in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} on {}: {}",
                response.branch_code,
                response.submitted_at.date_naive(),
                response.comment.as_deref().unwrap_or_default()
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn response(day: u32, nps_score: Option<i32>, csat_score: Option<f64>) -> ResponseRecord {
        let submitted_at = NaiveDate::from_ymd_opt(2026, 2, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc();
        ResponseRecord {
            id: Uuid::new_v4(),
            branch_code: "piazza".to_string(),
            opened: true,
            started: true,
            completed: true,
            nps_score,
            csat_score,
            comment: None,
            submitted_at,
        }
    }

    #[test]
    fn daily_rollup_groups_and_sorts_by_day() {
        let responses = vec![
            response(3, Some(5), Some(4.0)),
            response(1, Some(1), Some(2.0)),
            response(3, Some(3), Some(5.0)),
        ];

        let days = summarize_daily(&responses);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].day, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert_eq!(days[0].detractors, 1);
        assert_eq!(days[1].total, 2);
        assert_eq!(days[1].promoters, 1);
        assert_eq!(days[1].neutrals, 1);
        assert_eq!(days[1].avg_csat, Some(4.5));
    }

    #[test]
    fn daily_rollup_leaves_csat_unset_without_scores() {
        let days = summarize_daily(&[response(5, Some(4), None)]);
        assert_eq!(days[0].avg_csat, None);
    }

    #[test]
    fn breakdown_buckets_scored_responses_only() {
        let responses = vec![
            response(1, Some(5), None),
            response(1, Some(4), None),
            response(1, Some(3), None),
            response(1, Some(0), None),
            response(1, None, Some(4.0)),
        ];

        let breakdown = nps_breakdown(&responses);
        assert_eq!(breakdown.promoters, 2);
        assert_eq!(breakdown.neutrals, 1);
        assert_eq!(breakdown.detractors, 1);
    }

    #[test]
    fn report_renders_missing_metrics_as_dashes() {
        let cutoff = NaiveDate::from_ymd_opt(2026, 1, 25)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let report = build_report(Some("piazza"), cutoff, &[], 0);

        assert!(report.contains("# Branch Experience Report"));
        assert!(report.contains("Generated for piazza"));
        assert!(report.contains("- open rate: —"));
        assert!(report.contains("- NPS: —"));
        assert!(report.contains("No responses recorded for this window."));
        assert!(report.contains("No comments recorded for this window."));
    }

    #[test]
    fn report_lists_recent_comments_newest_first() {
        let mut early = response(1, Some(5), Some(5.0));
        early.comment = Some("cold espresso".to_string());
        let mut late = response(4, Some(5), Some(5.0));
        late.comment = Some("great service".to_string());

        let cutoff = NaiveDate::from_ymd_opt(2026, 1, 25)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let report = build_report(None, cutoff, &[early, late], 10);

        let first = report.find("great service").unwrap();
        let second = report.find("cold espresso").unwrap();
        assert!(first < second);
        assert!(report.contains("Generated for all branches"));
    }
}
