//! Dataset Quality API client: fetch, per-metric getters, analysis and the
//! full report.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use capi_core::config::QualityConfig;
use capi_core::{CapiError, CapiResult, HttpRequest, HttpTransport, Transport};

use crate::analysis::{analyze, QualityAnalysis};
use crate::metrics::{default_fields, DatasetQualityResponse, EventQuality, QualityMetric};

#[derive(Debug, Default)]
struct QualityState {
    quality_data: Option<Value>,
    last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub dataset_id: String,
    pub agent_name: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub overall_score: u32,
    pub total_events: usize,
    pub recommendations: usize,
    pub alerts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullQualityReport {
    pub metadata: ReportMetadata,
    pub summary: ReportSummary,
    pub analysis: QualityAnalysis,
    pub raw_data: Option<Value>,
}

/// Client for `GET {api_base_url}/dataset_quality`.
///
/// Keeps the last successful raw response and its fetch time.
pub struct DatasetQualityClient<T = HttpTransport> {
    config: Arc<QualityConfig>,
    transport: Arc<T>,
    state: Arc<Mutex<QualityState>>,
}

impl<T> Clone for DatasetQualityClient<T> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&self.state),
        }
    }
}

impl DatasetQualityClient<HttpTransport> {
    pub fn from_config(
        http: &capi_core::config::HttpConfig,
        config: QualityConfig,
    ) -> CapiResult<Self> {
        let transport = Arc::new(HttpTransport::new(http)?);
        Ok(Self::new(config, transport))
    }
}

impl<T: Transport> DatasetQualityClient<T> {
    pub fn new(config: QualityConfig, transport: Arc<T>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            state: Arc::new(Mutex::new(QualityState::default())),
        }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    fn request(&self, fields: &str) -> HttpRequest {
        let base = self.config.api_base_url.trim_end_matches('/');
        let mut request = HttpRequest::get(format!("{base}/dataset_quality"))
            .query("dataset_id", self.config.dataset_id.as_str())
            .query("access_token", self.config.access_token.as_str())
            .query("fields", fields);
        if let Some(agent) = self.config.agent_name.as_deref().filter(|a| !a.is_empty()) {
            request = request.query("agent_name", agent);
        }
        request
    }

    /// Raw dataset-quality response. `None` requests every metric.
    pub async fn fetch(&self, fields: Option<&str>) -> CapiResult<Value> {
        let fields = fields.map(str::to_string).unwrap_or_else(default_fields);
        let request = self.request(&fields);

        match self.transport.execute(request).await {
            Ok(data) => {
                let mut state = self.state.lock();
                state.quality_data = Some(data.clone());
                state.last_update = Some(Utc::now());
                drop(state);
                debug!(dataset_id = %self.config.dataset_id, "dataset quality fetched");
                Ok(data)
            }
            Err(err) => {
                error!(
                    dataset_id = %self.config.dataset_id,
                    status = ?err.status(),
                    error = %err,
                    "dataset quality request failed"
                );
                Err(err.into())
            }
        }
    }

    /// Typed dataset-quality response; a body without `web` is an error.
    pub async fn fetch_response(&self, fields: Option<&str>) -> CapiResult<DatasetQualityResponse> {
        let data = self.fetch(fields).await?;
        serde_json::from_value(data).map_err(|e| {
            error!(error = %e, "dataset quality response has no usable web data");
            CapiError::Quality(format!("invalid dataset quality response: {e}"))
        })
    }

    /// One metric, optionally restricted to the named events.
    pub async fn metric(
        &self,
        metric: QualityMetric,
        event_names: Option<&[&str]>,
    ) -> CapiResult<Vec<EventQuality>> {
        let response = self.fetch_response(Some(metric.field())).await?;
        Ok(match event_names {
            Some(names) => response.filter_events(names),
            None => response.web,
        })
    }

    pub async fn event_match_quality(&self, event_names: Option<&[&str]>) -> CapiResult<Vec<EventQuality>> {
        self.metric(QualityMetric::EventMatchQuality, event_names).await
    }

    pub async fn additional_conversions_reported(
        &self,
        event_names: Option<&[&str]>,
    ) -> CapiResult<Vec<EventQuality>> {
        self.metric(QualityMetric::AdditionalConversionsReported, event_names)
            .await
    }

    pub async fn data_freshness(&self, event_names: Option<&[&str]>) -> CapiResult<Vec<EventQuality>> {
        self.metric(QualityMetric::DataFreshness, event_names).await
    }

    pub async fn event_deduplication(&self, event_names: Option<&[&str]>) -> CapiResult<Vec<EventQuality>> {
        self.metric(QualityMetric::EventDeduplication, event_names).await
    }

    pub async fn event_coverage(&self, event_names: Option<&[&str]>) -> CapiResult<Vec<EventQuality>> {
        self.metric(QualityMetric::EventCoverage, event_names).await
    }

    pub async fn dedupe_key_feedback(&self, event_names: Option<&[&str]>) -> CapiResult<Vec<EventQuality>> {
        self.metric(QualityMetric::DedupeKeyFeedback, event_names).await
    }

    pub async fn potential_acr_increase(
        &self,
        event_names: Option<&[&str]>,
    ) -> CapiResult<Vec<EventQuality>> {
        self.metric(QualityMetric::PotentialAcrIncrease, event_names).await
    }

    /// Fetch every metric and score it.
    pub async fn analyze(&self) -> CapiResult<QualityAnalysis> {
        let response = self.fetch_response(None).await?;
        let analysis = analyze(&response);
        info!(
            dataset_id = %self.config.dataset_id,
            overall_score = analysis.overall_score,
            count = analysis.events.len(),
            "dataset quality analyzed"
        );
        Ok(analysis)
    }

    pub async fn full_report(&self) -> CapiResult<FullQualityReport> {
        let analysis = self.analyze().await?;
        let (last_update, raw_data) = {
            let state = self.state.lock();
            (state.last_update, state.quality_data.clone())
        };

        Ok(FullQualityReport {
            metadata: ReportMetadata {
                dataset_id: self.config.dataset_id.clone(),
                agent_name: self.config.agent_name.clone(),
                last_update,
                generated_at: Utc::now(),
            },
            summary: ReportSummary {
                overall_score: analysis.overall_score,
                total_events: analysis.events.len(),
                recommendations: analysis.recommendations.len(),
                alerts: analysis.alerts.len(),
            },
            analysis,
            raw_data,
        })
    }

    /// Last successfully fetched raw response.
    pub fn quality_data(&self) -> Option<Value> {
        self.state.lock().quality_data.clone()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capi_core::{HttpMethod, MemoryTransport, TransportError};
    use serde_json::json;

    fn config() -> QualityConfig {
        QualityConfig {
            access_token: "token".into(),
            dataset_id: "ds-1".into(),
            agent_name: Some("spring_sale".into()),
            ..Default::default()
        }
    }

    fn sample() -> Value {
        json!({
            "web": [
                {
                    "event_name": "Purchase",
                    "event_match_quality": {"percentage": 80},
                    "acr": {"percentage": 60},
                    "data_freshness": {"upload_frequency": "real_time"},
                    "event_deduplication": {"percentage": 90},
                    "event_coverage": {"percentage": 50},
                    "event_potential_aly_acr_increase": {"percentage": 30}
                },
                {"event_name": "Lead", "event_match_quality": {"percentage": 40}}
            ]
        })
    }

    #[tokio::test]
    async fn test_fetch_request_shape() {
        let transport = Arc::new(MemoryTransport::with_fallback(Ok(sample())));
        let client = DatasetQualityClient::new(config(), transport.clone());

        assert!(client.last_update().is_none());
        client.fetch(None).await.unwrap();

        let request = transport.last_request().unwrap();
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://graph.facebook.com/v23.0/dataset_quality");
        assert_eq!(request.query_value("dataset_id"), Some("ds-1"));
        assert_eq!(request.query_value("access_token"), Some("token"));
        assert_eq!(request.query_value("agent_name"), Some("spring_sale"));
        assert_eq!(request.query_value("fields"), Some(default_fields().as_str()));

        assert!(client.last_update().is_some());
        assert_eq!(client.quality_data(), Some(sample()));
    }

    #[tokio::test]
    async fn test_trailing_slash_in_base_url() {
        let transport = Arc::new(MemoryTransport::with_fallback(Ok(sample())));
        let mut cfg = config();
        cfg.api_base_url = "https://graph.facebook.com/v23.0/".into();
        let client = DatasetQualityClient::new(cfg, transport.clone());
        client.fetch(None).await.unwrap();

        let request = transport.last_request().unwrap();
        assert_eq!(request.url, "https://graph.facebook.com/v23.0/dataset_quality");
    }

    #[tokio::test]
    async fn test_agent_name_omitted_when_unset() {
        let transport = Arc::new(MemoryTransport::with_fallback(Ok(sample())));
        let mut cfg = config();
        cfg.agent_name = None;
        let client = DatasetQualityClient::new(cfg, transport.clone());
        client.fetch(None).await.unwrap();
        assert_eq!(transport.last_request().unwrap().query_value("agent_name"), None);
    }

    #[tokio::test]
    async fn test_metric_getter_filters_events() {
        let transport = Arc::new(MemoryTransport::with_fallback(Ok(sample())));
        let client = DatasetQualityClient::new(config(), transport.clone());

        let all = client.event_match_quality(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let leads = client.event_match_quality(Some(&["Lead"])).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].emq(), 40.0);

        assert_eq!(
            transport.last_request().unwrap().query_value("fields"),
            Some(QualityMetric::EventMatchQuality.field())
        );
    }

    #[tokio::test]
    async fn test_failure_is_returned() {
        let transport = Arc::new(MemoryTransport::failing(400, "invalid token"));
        let client = DatasetQualityClient::new(config(), transport);

        let err = client.analyze().await.unwrap_err();
        match err {
            CapiError::Transport(TransportError::Status { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid token");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(client.last_update().is_none());
    }

    #[tokio::test]
    async fn test_missing_web_is_quality_error() {
        let transport = Arc::new(MemoryTransport::with_fallback(Ok(json!({"data": []}))));
        let client = DatasetQualityClient::new(config(), transport);
        assert!(matches!(client.analyze().await, Err(CapiError::Quality(_))));
    }

    #[tokio::test]
    async fn test_full_report() {
        let transport = Arc::new(MemoryTransport::with_fallback(Ok(sample())));
        let client = DatasetQualityClient::new(config(), transport);

        let report = client.full_report().await.unwrap();
        assert_eq!(report.metadata.dataset_id, "ds-1");
        assert_eq!(report.metadata.agent_name.as_deref(), Some("spring_sale"));
        assert!(report.metadata.last_update.is_some());
        assert_eq!(report.summary.total_events, 2);
        assert_eq!(report.summary.alerts, 1);
        assert_eq!(report.summary.overall_score, report.analysis.overall_score);
        assert_eq!(
            report.summary.recommendations,
            report.analysis.recommendations.len()
        );
        assert_eq!(report.raw_data, Some(sample()));
    }
}
