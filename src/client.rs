use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{header, Response, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::ClientCfg;
use crate::error::{Error, Result};
use crate::request::{BatchBody, RunRequest};
use crate::scenario::Scenario;

/// Opaque identifier of a backend-tracked run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub id: String,
}

/// Test metadata as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMeta {
    pub name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_status: Option<String>,
    #[serde(default)]
    pub last_app_url: Option<String>,
    #[serde(default)]
    pub last_report_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestRecord {
    #[serde(default)]
    pub meta: Option<TestMeta>,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub report_text: String,
    #[serde(default)]
    pub report_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Outcome of re-running an existing spec file.
#[derive(Debug, Clone, Deserialize)]
pub struct SpecRunReport {
    #[serde(default)]
    pub spec: String,
    #[serde(default)]
    pub headed: bool,
    #[serde(default)]
    pub returncode: Option<i32>,
    /// "passed" or "failed".
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Command line the backend ran.
    #[serde(default)]
    pub ran: String,
}

impl SpecRunReport {
    pub fn passed(&self) -> bool {
        self.status == "passed"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodegenLaunch {
    #[serde(default)]
    pub launched: bool,
    #[serde(default)]
    pub spec: Option<String>,
    /// Page the recorder opened, if the backend found one.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Deserialize)]
struct StartResp {
    run_id: String,
}

#[derive(Serialize)]
struct SaveCodeReq<'a> {
    code: &'a str,
}

#[derive(Serialize)]
struct RunTestReq<'a> {
    spec: &'a str,
    headed: bool,
}

#[derive(Serialize)]
struct CodegenReq<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

/// HTTP client for the test backend. Cheap to clone.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
    timeout: Duration,
}

impl BackendClient {
    pub fn new(cfg: &ClientCfg) -> Result<Self> {
        let base = Url::parse(cfg.base_url.trim())
            .map_err(|e| Error::validation(format!("invalid base_url {:?}: {e}", cfg.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(Error::validation(format!("base_url {:?} cannot hold paths", cfg.base_url)));
        }
        // no client-wide timeout: it would also cut off long event streams
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, base, timeout: cfg.request_timeout() })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Starts a run. One request, never retried: the backend may already have
    /// launched a browser by the time a failure is reported.
    pub async fn start(&self, request: &RunRequest) -> Result<RunHandle> {
        let req = match request {
            RunRequest::Single(payload) => self.http.post(self.url(&["api", "run"])).json(payload),
            RunRequest::Batch { payload, scenarios } => self
                .http
                .post(self.url(&["api", "tests", payload.test_name.as_str(), "run-many"]))
                .json(&BatchBody { payload, scenarios }),
        };
        let resp = check(req.timeout(self.timeout).send().await?).await?;
        let StartResp { run_id } = decode(resp, "start response").await?;
        if run_id.trim().is_empty() {
            return Err(Error::protocol("start response carried an empty run_id"));
        }
        tracing::info!(run_id = %run_id, test = request.test_name(), scenarios = request.scenarios().len(), "run started");
        Ok(RunHandle { id: run_id })
    }

    pub(crate) async fn open_stream(&self, run_id: &str) -> Result<Response> {
        let resp = self
            .http
            .get(self.url(&["api", "stream", run_id]))
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        check(resp).await
    }

    /// Latest report text. Not-found is an empty report, not an error.
    pub async fn fetch_report(&self) -> Result<String> {
        let resp = self.http.get(self.url(&["api", "report"])).timeout(self.timeout).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(String::new());
        }
        Ok(check(resp).await?.text().await?)
    }

    pub async fn list_artifacts(&self) -> Result<Vec<String>> {
        let resp = self.http.get(self.url(&["api", "artifacts"])).timeout(self.timeout).send().await?;
        decode(check(resp).await?, "artifact list").await
    }

    /// Generated scenarios for a test. Anything but a JSON array fails loudly.
    pub async fn list_scenarios(
        &self,
        test_name: &str,
        application_url: &str,
        description: &str,
    ) -> Result<Vec<Scenario>> {
        let resp = self
            .http
            .get(self.url(&["api", "tests", test_name, "scenarios"]))
            .query(&[("application_url", application_url), ("test_description", description)])
            .header(header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await?;
        let value: serde_json::Value = decode(check(resp).await?, "scenario list").await?;
        if !value.is_array() {
            let shown: String = value.to_string().chars().take(100).collect();
            return Err(Error::protocol(format!("expected array of scenarios, got {shown}")));
        }
        serde_json::from_value(value).map_err(|e| Error::protocol(format!("invalid scenario: {e}")))
    }

    pub async fn list_tests(&self) -> Result<Vec<TestMeta>> {
        let resp = self.http.get(self.url(&["api", "tests"])).timeout(self.timeout).send().await?;
        decode(check(resp).await?, "test list").await
    }

    pub async fn get_test(&self, name: &str) -> Result<TestRecord> {
        let resp = self
            .http
            .get(self.url(&["api", "tests", name]))
            .header(header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await?;
        decode(check(resp).await?, "test record").await
    }

    pub async fn save_test_code(&self, name: &str, code: &str) -> Result<SaveResponse> {
        if name.trim().is_empty() {
            return Err(Error::validation("test name is required"));
        }
        let resp = self
            .http
            .put(self.url(&["api", "tests", name]))
            .json(&SaveCodeReq { code })
            .timeout(self.timeout)
            .send()
            .await?;
        decode(check(resp).await?, "save response").await
    }

    /// Re-runs an existing spec file, e.g. `tests/login.spec.ts`.
    ///
    /// The backend answers only once the test process has exited, so this
    /// call carries no request timeout.
    pub async fn run_test(&self, spec: &str, headed: bool) -> Result<SpecRunReport> {
        if spec.trim().is_empty() {
            return Err(Error::validation("spec path is required"));
        }
        let resp = self
            .http
            .post(self.url(&["api", "run-test"]))
            .json(&RunTestReq { spec, headed })
            .send()
            .await?;
        let report: SpecRunReport = decode(check(resp).await?, "spec run report").await?;
        tracing::info!(spec, status = %report.status, returncode = ?report.returncode, "spec re-run done");
        Ok(report)
    }

    /// Opens a codegen recording session for `name` on the backend host.
    /// Without `url` the backend falls back to the test's last application URL.
    pub async fn start_codegen(&self, name: &str, url: Option<&str>) -> Result<CodegenLaunch> {
        if name.trim().is_empty() {
            return Err(Error::validation("test name is required"));
        }
        let url = url.map(str::trim).filter(|u| !u.is_empty());
        let resp = self
            .http
            .post(self.url(&["api", "tests", name, "codegen"]))
            .json(&CodegenReq { url })
            .timeout(self.timeout)
            .send()
            .await?;
        decode(check(resp).await?, "codegen response").await
    }
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Transport { status: status.as_u16(), body })
}

async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
    let txt = resp.text().await?;
    serde_json::from_str(&txt).map_err(|e| Error::protocol(format!("malformed {what}: {e}")))
}
