//! Facebook Dataset Quality API: metric retrieval, weighted scoring,
//! reporting and periodic refresh.

pub mod analysis;
pub mod client;
pub mod export;
pub mod metrics;
pub mod monitor;

pub use analysis::{analyze, Alert, EventAnalysis, QualityAnalysis, Recommendation, Severity};
pub use client::{DatasetQualityClient, FullQualityReport, ReportMetadata, ReportSummary};
pub use export::{export_csv, log_quality_metrics, render_dashboard};
pub use metrics::{default_fields, DatasetQualityResponse, EventQuality, QualityMetric};
pub use monitor::{MonitorState, QualityMonitor, RefreshHandle};
