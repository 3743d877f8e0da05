use chrono::{DateTime, Duration, Utc};

use crate::models::{MetricsSummary, ResponseRecord};

/// Promoter/detractor cut points on the survey's score scale. These are the
/// thresholds the production forms were configured with; do not swap in the
/// textbook 0-10 NPS bands without product sign-off.
pub const PROMOTER_MIN: i32 = 4;
pub const DETRACTOR_MAX: i32 = 2;

pub fn is_promoter(score: i32) -> bool {
    score >= PROMOTER_MIN
}

pub fn is_detractor(score: i32) -> bool {
    score <= DETRACTOR_MAX
}

/// Reduce a batch of responses and an invitation baseline to summary metrics.
///
/// Total over all inputs: counts degrade to zero and rates to zero or `None`
/// rather than erroring. A record missing a score still counts toward
/// `total_responses`; it is only excluded from the score it lacks.
pub fn calculate_metrics(responses: &[ResponseRecord], total_invitations: u64) -> MetricsSummary {
    let total = responses.len();
    let opened_count = responses.iter().filter(|r| r.opened).count();
    let started_count = responses.iter().filter(|r| r.started).count();
    let completed_count = responses.iter().filter(|r| r.completed).count();

    let open_rate = if total_invitations > 0 {
        Some(opened_count as f64 / total_invitations as f64 * 100.0)
    } else {
        None
    };

    let response_rate = if total > 0 {
        completed_count as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    // Unclamped: inconsistent upstream rows (completed without started) can
    // push this negative.
    let abandonment_rate = if started_count > 0 {
        (started_count as f64 - completed_count as f64) / started_count as f64 * 100.0
    } else {
        0.0
    };

    let nps_scores: Vec<i32> = responses.iter().filter_map(|r| r.nps_score).collect();
    let nps = if nps_scores.is_empty() {
        None
    } else {
        let valid = nps_scores.len() as f64;
        let promoters = nps_scores.iter().filter(|&&s| is_promoter(s)).count();
        let detractors = nps_scores.iter().filter(|&&s| is_detractor(s)).count();
        Some((promoters as f64 / valid - detractors as f64 / valid) * 100.0)
    };

    let csat_scores: Vec<f64> = responses.iter().filter_map(|r| r.csat_score).collect();
    let csat = if csat_scores.is_empty() {
        None
    } else {
        let avg = csat_scores.iter().sum::<f64>() / csat_scores.len() as f64;
        Some(avg / 5.0 * 100.0)
    };

    MetricsSummary {
        total_responses: total,
        opened_count,
        started_count,
        completed_count,
        open_rate,
        response_rate,
        abandonment_rate,
        nps,
        csat,
    }
}

pub fn cutoff(since_days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(since_days.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn response(
        opened: bool,
        started: bool,
        completed: bool,
        nps_score: Option<i32>,
        csat_score: Option<f64>,
    ) -> ResponseRecord {
        ResponseRecord {
            id: Uuid::new_v4(),
            branch_code: "piazza".to_string(),
            opened,
            started,
            completed,
            nps_score,
            csat_score,
            comment: None,
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn empty_input_degrades_cleanly() {
        let summary = calculate_metrics(&[], 0);
        assert_eq!(summary.total_responses, 0);
        assert_eq!(summary.opened_count, 0);
        assert_eq!(summary.started_count, 0);
        assert_eq!(summary.completed_count, 0);
        assert_eq!(summary.open_rate, None);
        assert_eq!(summary.response_rate, 0.0);
        assert_eq!(summary.abandonment_rate, 0.0);
        assert_eq!(summary.nps, None);
        assert_eq!(summary.csat, None);
    }

    #[test]
    fn open_rate_needs_an_invitation_baseline() {
        let responses = vec![response(true, true, true, None, None)];
        let summary = calculate_metrics(&responses, 0);
        assert_eq!(summary.open_rate, None);
    }

    #[test]
    fn open_rate_over_invitations() {
        let mut responses = vec![
            response(true, false, false, None, None),
            response(true, false, false, None, None),
            response(true, false, false, None, None),
        ];
        responses.push(response(false, false, false, None, None));
        let summary = calculate_metrics(&responses, 10);
        assert_eq!(summary.open_rate, Some(30.0));
    }

    #[test]
    fn response_rate_over_all_records() {
        let responses = vec![
            response(false, false, true, None, None),
            response(false, false, false, None, None),
            response(false, false, true, None, None),
        ];
        let summary = calculate_metrics(&responses, 0);
        assert!((summary.response_rate - 200.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn abandonment_rate_over_started() {
        let responses = vec![
            response(true, true, true, None, None),
            response(true, true, false, None, None),
        ];
        let summary = calculate_metrics(&responses, 0);
        assert_eq!(summary.abandonment_rate, 50.0);
    }

    #[test]
    fn abandonment_rate_goes_negative_on_inconsistent_rows() {
        let responses = vec![
            response(true, true, true, None, None),
            response(true, false, true, None, None),
        ];
        let summary = calculate_metrics(&responses, 0);
        assert_eq!(summary.abandonment_rate, -100.0);
    }

    #[test]
    fn nps_uses_configured_thresholds() {
        let responses = vec![
            response(true, true, true, Some(5), None),
            response(true, true, true, Some(5), None),
            response(true, true, true, Some(1), None),
            response(true, true, true, Some(3), None),
        ];
        let summary = calculate_metrics(&responses, 0);
        assert_eq!(summary.nps, Some(25.0));
    }

    #[test]
    fn nps_none_without_scored_responses() {
        let responses = vec![response(true, true, false, None, Some(4.0))];
        let summary = calculate_metrics(&responses, 0);
        assert_eq!(summary.nps, None);
    }

    #[test]
    fn csat_normalizes_a_five_point_average() {
        let responses = vec![
            response(true, true, true, None, Some(5.0)),
            response(true, true, true, None, Some(4.0)),
            response(true, true, true, None, Some(3.0)),
        ];
        let summary = calculate_metrics(&responses, 0);
        assert_eq!(summary.csat, Some(80.0));
    }

    #[test]
    fn csat_none_without_scored_responses() {
        let responses = vec![response(true, true, true, Some(5), None)];
        let summary = calculate_metrics(&responses, 0);
        assert_eq!(summary.csat, None);
    }

    #[test]
    fn total_counts_records_with_partial_fields() {
        let responses = vec![
            response(true, false, false, None, None),
            response(false, true, false, Some(4), None),
            response(false, false, true, None, Some(2.0)),
        ];
        let summary = calculate_metrics(&responses, 0);
        assert_eq!(summary.total_responses, 3);
        assert_eq!(summary.opened_count, 1);
        assert_eq!(summary.started_count, 1);
        assert_eq!(summary.completed_count, 1);
    }

    #[test]
    fn repeated_calls_agree_and_leave_input_untouched() {
        let responses = vec![
            response(true, true, true, Some(5), Some(5.0)),
            response(true, true, false, Some(2), Some(1.0)),
        ];
        let before = responses.clone();
        let first = calculate_metrics(&responses, 8);
        let second = calculate_metrics(&responses, 8);
        assert_eq!(first, second);
        assert_eq!(responses, before);
    }

    #[test]
    fn cutoff_respects_since_days() {
        let expected = Utc::now() - Duration::days(14);
        let got = cutoff(14);
        assert!((got - expected).num_seconds().abs() <= 1);
    }
}
