//! Wire types of the Dataset Quality API response and the field selectors
//! used to request each metric.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One metric family exposed by the Dataset Quality API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityMetric {
    EventMatchQuality,
    AdditionalConversionsReported,
    DataFreshness,
    EventDeduplication,
    EventCoverage,
    DedupeKeyFeedback,
    PotentialAcrIncrease,
}

impl QualityMetric {
    pub const ALL: [QualityMetric; 7] = [
        QualityMetric::EventMatchQuality,
        QualityMetric::AdditionalConversionsReported,
        QualityMetric::DataFreshness,
        QualityMetric::EventDeduplication,
        QualityMetric::EventCoverage,
        QualityMetric::DedupeKeyFeedback,
        QualityMetric::PotentialAcrIncrease,
    ];

    /// Graph API field selector for this metric.
    pub fn field(&self) -> &'static str {
        match self {
            QualityMetric::EventMatchQuality => {
                "web{event_match_quality{percentage,description},event_name}"
            }
            QualityMetric::AdditionalConversionsReported => "web{acr{percentage,description},event_name}",
            QualityMetric::DataFreshness => {
                "web{data_freshness{upload_frequency,description},event_name}"
            }
            QualityMetric::EventDeduplication => {
                "web{event_deduplication{percentage,description},event_name}"
            }
            QualityMetric::EventCoverage => "web{event_coverage{percentage,description},event_name}",
            QualityMetric::DedupeKeyFeedback => {
                "web{dedupe_key_feedback{dedupe_key,browser_events_with_dedupe_key{percentage,description},server_events_with_dedupe_key{percentage,description},overall_browser_coverage_from_dedupe_key{percentage,description}},event_name}"
            }
            QualityMetric::PotentialAcrIncrease => {
                "web{event_potential_aly_acr_increase{percentage,description},event_name}"
            }
        }
    }
}

/// Selector requesting every metric at once.
pub fn default_fields() -> String {
    QualityMetric::ALL
        .iter()
        .map(QualityMetric::field)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentageMetric {
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FreshnessMetric {
    #[serde(default)]
    pub upload_frequency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Quality metrics for one tracked event. Any metric may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventQuality {
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub event_match_quality: Option<PercentageMetric>,
    #[serde(default)]
    pub acr: Option<PercentageMetric>,
    #[serde(default)]
    pub data_freshness: Option<FreshnessMetric>,
    #[serde(default)]
    pub event_deduplication: Option<PercentageMetric>,
    #[serde(default)]
    pub event_coverage: Option<PercentageMetric>,
    #[serde(default)]
    pub dedupe_key_feedback: Option<Value>,
    #[serde(default)]
    pub event_potential_aly_acr_increase: Option<PercentageMetric>,
}

fn percentage(metric: &Option<PercentageMetric>) -> f64 {
    metric
        .as_ref()
        .and_then(|m| m.percentage)
        .filter(|p| !p.is_nan())
        .unwrap_or(0.0)
}

impl EventQuality {
    pub fn emq(&self) -> f64 {
        percentage(&self.event_match_quality)
    }

    pub fn acr(&self) -> f64 {
        percentage(&self.acr)
    }

    pub fn deduplication(&self) -> f64 {
        percentage(&self.event_deduplication)
    }

    pub fn coverage(&self) -> f64 {
        percentage(&self.event_coverage)
    }

    pub fn potential_acr(&self) -> f64 {
        percentage(&self.event_potential_aly_acr_increase)
    }

    /// Upload frequency, `None` when not reported.
    pub fn upload_frequency(&self) -> Option<&str> {
        self.data_freshness
            .as_ref()
            .and_then(|f| f.upload_frequency.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Body of `GET /dataset_quality`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetQualityResponse {
    pub web: Vec<EventQuality>,
}

impl DatasetQualityResponse {
    /// Keep only the named events.
    pub fn filter_events(self, event_names: &[&str]) -> Vec<EventQuality> {
        self.web
            .into_iter()
            .filter(|e| event_names.contains(&e.event_name.as_str()))
            .collect()
    }
}
