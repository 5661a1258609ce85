//! Weighted quality scoring, recommendations and alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{DatasetQualityResponse, EventQuality};

const EMQ_WEIGHT: f64 = 0.30;
const ACR_WEIGHT: f64 = 0.25;
const DEDUP_WEIGHT: f64 = 0.20;
const COVERAGE_WEIGHT: f64 = 0.15;
const POTENTIAL_WEIGHT: f64 = 0.10;

const EMQ_THRESHOLD: f64 = 70.0;
const DEDUP_THRESHOLD: f64 = 80.0;
const POTENTIAL_THRESHOLD: f64 = 20.0;
const REAL_TIME: &str = "real_time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
    Success,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Success => "success",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub severity: Severity,
    pub event: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAnalysis {
    pub event_name: String,
    pub emq: f64,
    pub acr: f64,
    pub data_freshness: String,
    pub deduplication: f64,
    pub coverage: f64,
    pub potential_acr: f64,
    pub score: u32,
}

/// Result of one scoring pass over a dataset-quality response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAnalysis {
    pub timestamp: DateTime<Utc>,
    pub overall_score: u32,
    pub events: Vec<EventAnalysis>,
    pub recommendations: Vec<Recommendation>,
    pub alerts: Vec<Alert>,
}

impl QualityAnalysis {
    pub fn total_events(&self) -> usize {
        self.events.len()
    }
}

/// Unrounded weighted score of one event.
pub fn event_score(event: &EventQuality) -> f64 {
    event.emq() * EMQ_WEIGHT
        + event.acr() * ACR_WEIGHT
        + event.deduplication() * DEDUP_WEIGHT
        + event.coverage() * COVERAGE_WEIGHT
        + event.potential_acr().min(100.0) * POTENTIAL_WEIGHT
}

fn round_score(score: f64) -> u32 {
    score.round().max(0.0) as u32
}

fn recommendations_for(analysis: &EventAnalysis) -> Vec<Recommendation> {
    let mut out = Vec::new();
    let event = analysis.event_name.clone();

    if analysis.emq < EMQ_THRESHOLD {
        out.push(Recommendation {
            severity: Severity::Warning,
            event: event.clone(),
            message: format!(
                "Event Match Quality is low ({}%). Consider sending richer user data.",
                analysis.emq
            ),
        });
    }
    if analysis.data_freshness != REAL_TIME {
        out.push(Recommendation {
            severity: Severity::Info,
            event: event.clone(),
            message: format!(
                "Data freshness: {}. Consider sending events in real time.",
                analysis.data_freshness
            ),
        });
    }
    if analysis.deduplication < DEDUP_THRESHOLD {
        out.push(Recommendation {
            severity: Severity::Warning,
            event: event.clone(),
            message: format!(
                "Deduplication is low ({}%). Check the deduplication keys.",
                analysis.deduplication
            ),
        });
    }
    if analysis.potential_acr > POTENTIAL_THRESHOLD {
        out.push(Recommendation {
            severity: Severity::Success,
            event,
            message: format!(
                "High potential ACR increase ({}%). Keep optimizing.",
                analysis.potential_acr
            ),
        });
    }
    out
}

fn overall_alert(overall_score: u32) -> Alert {
    if overall_score < 60 {
        Alert {
            severity: Severity::Critical,
            message: "Overall score is low. Immediate action required.".to_string(),
        }
    } else if overall_score < 80 {
        Alert {
            severity: Severity::Warning,
            message: "Overall score is moderate. Consider optimizations.".to_string(),
        }
    } else {
        Alert {
            severity: Severity::Success,
            message: "Overall score is excellent.".to_string(),
        }
    }
}

/// Score every event, then derive recommendations and the overall alert.
pub fn analyze(response: &DatasetQualityResponse) -> QualityAnalysis {
    let mut events = Vec::with_capacity(response.web.len());
    let mut recommendations = Vec::new();
    let mut total = 0.0;

    for event in &response.web {
        let raw = event_score(event);
        total += raw;

        let analysis = EventAnalysis {
            event_name: event.event_name.clone(),
            emq: event.emq(),
            acr: event.acr(),
            data_freshness: event.upload_frequency().unwrap_or("unknown").to_string(),
            deduplication: event.deduplication(),
            coverage: event.coverage(),
            potential_acr: event.potential_acr(),
            score: round_score(raw),
        };
        recommendations.extend(recommendations_for(&analysis));
        events.push(analysis);
    }

    let overall_score = if events.is_empty() {
        0
    } else {
        round_score(total / events.len() as f64)
    };

    QualityAnalysis {
        timestamp: Utc::now(),
        overall_score,
        events,
        recommendations,
        alerts: vec![overall_alert(overall_score)],
    }
}
