//! CSV export, HTML dashboard rendering and the log summary of an analysis.

use serde_json::Value;
use tracing::{info, warn};

use capi_core::{CapiError, CapiResult};

use crate::analysis::{QualityAnalysis, Severity};
use crate::metrics::DatasetQualityResponse;

const CSV_HEADERS: [&str; 7] = [
    "Event Name",
    "Event Match Quality (%)",
    "ACR (%)",
    "Data Freshness",
    "Deduplication (%)",
    "Coverage (%)",
    "Potential ACR (%)",
];

fn csv_cell(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Raw dataset-quality data as CSV, one row per event, every cell quoted.
pub fn export_csv(data: &Value) -> CapiResult<String> {
    if data.get("web").map_or(true, Value::is_null) {
        return Err(CapiError::Export("no web data to export".to_string()));
    }
    let response: DatasetQualityResponse = serde_json::from_value(data.clone())
        .map_err(|e| CapiError::Export(format!("invalid dataset quality data: {e}")))?;

    let mut lines = Vec::with_capacity(response.web.len() + 1);
    lines.push(
        CSV_HEADERS
            .iter()
            .map(|h| csv_cell(h))
            .collect::<Vec<_>>()
            .join(","),
    );
    for event in &response.web {
        let cells = [
            event.event_name.clone(),
            event.emq().to_string(),
            event.acr().to_string(),
            event.upload_frequency().unwrap_or_default().to_string(),
            event.deduplication().to_string(),
            event.coverage().to_string(),
            event.potential_acr().to_string(),
        ];
        lines.push(cells.iter().map(|c| csv_cell(c)).collect::<Vec<_>>().join(","));
    }
    Ok(lines.join("\n"))
}

/// Colour band of an overall score.
pub fn score_color(score: u32) -> &'static str {
    if score >= 80 {
        "green"
    } else if score >= 60 {
        "orange"
    } else {
        "red"
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Self-contained floating summary panel.
pub fn render_dashboard(analysis: &QualityAnalysis) -> String {
    let mut events = String::new();
    for event in &analysis.events {
        events.push_str(&format!(
            "      <li>{}: {}%</li>\n",
            escape_html(&event.event_name),
            event.score
        ));
    }

    format!(
        r#"<div id="facebook-quality-dashboard" style="position: fixed; top: 20px; right: 20px; width: 300px; background: white; border: 1px solid #ddd; border-radius: 8px; padding: 15px; box-shadow: 0 4px 12px rgba(0,0,0,0.1); z-index: 10000; font-family: Arial, sans-serif; font-size: 12px;">
  <h3 style="margin: 0 0 10px 0; color: #1877f2;">Facebook Dataset Quality</h3>
  <div style="margin-bottom: 10px;">
    <strong>Overall score:</strong>
    <span style="color: {color};">{score}%</span>
  </div>
  <div style="margin-bottom: 10px;">
    <strong>Events:</strong> {event_count}
    <ul style="margin: 4px 0 0 0; padding-left: 16px;">
{events}    </ul>
  </div>
  <div style="margin-bottom: 10px;">
    <strong>Recommendations:</strong> {recommendations}
  </div>
  <div style="margin-bottom: 10px;">
    <strong>Last update:</strong> {time}
  </div>
  <button onclick="this.parentElement.remove()" style="background: #1877f2; color: white; border: none; padding: 5px 10px; border-radius: 4px; cursor: pointer; font-size: 11px;">Close</button>
</div>
"#,
        color = score_color(analysis.overall_score),
        score = analysis.overall_score,
        event_count = analysis.events.len(),
        events = events,
        recommendations = analysis.recommendations.len(),
        time = analysis.timestamp.format("%H:%M:%S"),
    )
}

/// Emit the analysis as structured log records.
pub fn log_quality_metrics(analysis: &QualityAnalysis) {
    info!(
        overall_score = analysis.overall_score,
        count = analysis.events.len(),
        "dataset quality report"
    );

    for event in &analysis.events {
        info!(
            event_name = %event.event_name,
            emq = event.emq,
            acr = event.acr,
            data_freshness = %event.data_freshness,
            deduplication = event.deduplication,
            coverage = event.coverage,
            score = event.score,
            "event quality"
        );
    }

    for rec in &analysis.recommendations {
        info!(
            severity = rec.severity.as_str(),
            event_name = %rec.event,
            "{}",
            rec.message
        );
    }

    for alert in &analysis.alerts {
        match alert.severity {
            Severity::Critical | Severity::Warning => {
                warn!(severity = alert.severity.as_str(), "{}", alert.message)
            }
            _ => info!(severity = alert.severity.as_str(), "{}", alert.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use serde_json::json;

    #[test]
    fn test_csv_export() {
        let data = json!({
            "web": [
                {
                    "event_name": "Purchase",
                    "event_match_quality": {"percentage": 82.5},
                    "acr": {"percentage": 10},
                    "data_freshness": {"upload_frequency": "real_time"}
                },
                {"event_name": "Lead \"B\""}
            ]
        });
        let csv = export_csv(&data).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "\"Event Name\",\"Event Match Quality (%)\",\"ACR (%)\",\"Data Freshness\",\"Deduplication (%)\",\"Coverage (%)\",\"Potential ACR (%)\""
        );
        assert_eq!(
            lines[1],
            "\"Purchase\",\"82.5\",\"10\",\"real_time\",\"0\",\"0\",\"0\""
        );
        assert_eq!(lines[2], "\"Lead \"\"B\"\"\",\"0\",\"0\",\"\",\"0\",\"0\",\"0\"");
        assert!(!csv.ends_with('\n'));
    }

    #[test]
    fn test_csv_requires_web() {
        assert!(matches!(export_csv(&json!({})), Err(CapiError::Export(_))));
        assert!(matches!(export_csv(&json!({"web": null})), Err(CapiError::Export(_))));
        assert!(matches!(export_csv(&json!({"web": "x"})), Err(CapiError::Export(_))));
    }

    #[test]
    fn test_csv_empty_web_has_header_only() {
        let csv = export_csv(&json!({"web": []})).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn test_score_color_bands() {
        assert_eq!(score_color(80), "green");
        assert_eq!(score_color(79), "orange");
        assert_eq!(score_color(60), "orange");
        assert_eq!(score_color(59), "red");
    }

    #[test]
    fn test_dashboard_render() {
        let response = serde_json::from_value(json!({
            "web": [{"event_name": "<Purchase>", "event_match_quality": {"percentage": 90}}]
        }))
        .unwrap();
        let analysis = analyze(&response);
        let html = render_dashboard(&analysis);

        assert!(html.contains("id=\"facebook-quality-dashboard\""));
        assert!(html.contains("color: red;"));
        assert!(html.contains("<strong>Events:</strong> 1"));
        assert!(html.contains("&lt;Purchase&gt;"));
        assert!(!html.contains("<Purchase>"));
        assert!(html.contains("this.parentElement.remove()"));
    }

    #[test]
    fn test_log_quality_metrics_does_not_panic() {
        let analysis = analyze(&DatasetQualityResponse::default());
        log_quality_metrics(&analysis);
    }
}
