use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Branch {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Survey {
    pub id: Uuid,
    pub branch_code: String,
    pub title: String,
    pub form_url: String,
    pub created_at: DateTime<Utc>,
}

/// One recipient's journey through a survey. Score fields stay `None` when
/// the recipient never reached that question.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub id: Uuid,
    pub branch_code: String,
    pub opened: bool,
    pub started: bool,
    pub completed: bool,
    pub nps_score: Option<i32>,
    pub csat_score: Option<f64>,
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Aggregate over a batch of responses. Rates are percentages; `None` means
/// there was not enough data to compute the metric, which display code
/// renders as a dash rather than a zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_responses: usize,
    pub opened_count: usize,
    pub started_count: usize,
    pub completed_count: usize,
    pub open_rate: Option<f64>,
    pub response_rate: f64,
    pub abandonment_rate: f64,
    pub nps: Option<f64>,
    pub csat: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DailyExperience {
    pub day: NaiveDate,
    pub total: usize,
    pub completed: usize,
    pub promoters: usize,
    pub neutrals: usize,
    pub detractors: usize,
    pub avg_csat: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NpsBreakdown {
    pub promoters: usize,
    pub neutrals: usize,
    pub detractors: usize,
}
