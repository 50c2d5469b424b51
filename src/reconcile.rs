use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::client::{BackendClient, TestMeta};

/// The one result record of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub scenario_ref: String,
    pub test_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub result: RunResult,
    /// Empty when the backend has no report.
    pub report: String,
    pub artifacts: Vec<String>,
    /// Refreshed test metadata, when the test record could be read.
    pub meta: Option<TestMeta>,
    /// Non-fatal fetch failures.
    pub warnings: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Collects report and artifacts for a finished run.
///
/// Both reads go out together and are joined. A missing report is an empty
/// report; any other failure becomes a warning and the run stays finished.
pub async fn reconcile(client: &BackendClient, test_name: &str, scenario_ref: &str) -> Reconciliation {
    let (report, artifacts) = tokio::join!(client.fetch_report(), client.list_artifacts());

    let mut warnings = Vec::new();
    let report = report.unwrap_or_else(|e| {
        warnings.push(format!("report unavailable: {e}"));
        String::new()
    });
    let artifacts = artifacts.unwrap_or_else(|e| {
        warnings.push(format!("artifact list unavailable: {e}"));
        Vec::new()
    });

    let (meta, report_url) = match client.get_test(test_name).await {
        Ok(record) => (record.meta, record.report_url),
        Err(e) => {
            warnings.push(format!("test record unavailable: {e}"));
            (None, None)
        }
    };

    for w in &warnings {
        tracing::warn!(test = test_name, "{w}");
    }

    Reconciliation {
        result: RunResult {
            scenario_ref: scenario_ref.to_string(),
            test_name: test_name.to_string(),
            report_url,
        },
        report,
        artifacts,
        meta,
        warnings,
        completed_at: Utc::now(),
    }
}
