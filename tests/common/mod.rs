//! In-process mock of the test backend. Serves scripted SSE frames, can hold
//! a stream open for live pushes, and counts every request it sees.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use qarun::{BackendClient, ClientCfg, OrchestratorParams, RunOrchestrator};

pub fn line(text: &str) -> String {
    json!({ "line": text }).to_string()
}

pub fn status(s: &str) -> String {
    json!({ "status": s }).to_string()
}

pub struct Script {
    /// Payloads sent as `message` frames as soon as a stream opens.
    pub frames: Vec<String>,
    /// Keep the stream open after the frames for [`MockBackend::push`].
    pub hold_open: bool,
    pub start_failure: Option<(u16, String)>,
    /// `None` answers 404.
    pub report: Option<String>,
    pub artifacts: Vec<String>,
    pub artifacts_failure: bool,
    pub scenarios: Value,
    pub scenarios_failure: Option<(u16, String)>,
    pub test_record_failure: bool,
    pub run_test_failure: Option<(u16, String)>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            frames: vec![line("a"), line("b"), status("finished")],
            hold_open: false,
            start_failure: None,
            report: Some("# Report\nScript pass/fail result: PASS".into()),
            artifacts: vec!["final_report.md".into(), "trace.zip".into()],
            artifacts_failure: false,
            scenarios: json!([]),
            scenarios_failure: None,
            test_record_failure: false,
            run_test_failure: None,
        }
    }
}

#[derive(Default)]
pub struct Hits {
    pub run: AtomicUsize,
    pub run_many: AtomicUsize,
    pub stream: AtomicUsize,
    pub report: AtomicUsize,
    pub artifacts: AtomicUsize,
    pub scenarios: AtomicUsize,
    pub tests: AtomicUsize,
    pub test_record: AtomicUsize,
    pub save: AtomicUsize,
    pub run_test: AtomicUsize,
    pub codegen: AtomicUsize,
}

impl Hits {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn total(&self) -> usize {
        [
            &self.run,
            &self.run_many,
            &self.stream,
            &self.report,
            &self.artifacts,
            &self.scenarios,
            &self.tests,
            &self.test_record,
            &self.save,
            &self.run_test,
            &self.codegen,
        ]
        .iter()
        .map(|c| Self::get(c))
        .sum()
    }
}

#[derive(Clone)]
struct MockState {
    script: Arc<Mutex<Script>>,
    hits: Arc<Hits>,
    live: broadcast::Sender<(String, String)>,
    bodies: Arc<Mutex<Vec<(String, Value)>>>,
    queries: Arc<Mutex<Vec<Value>>>,
}

pub struct MockBackend {
    pub base_url: String,
    state: MockState,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl MockBackend {
    pub async fn spawn(script: Script) -> Self {
        let (live, _rx) = broadcast::channel(64);
        let state = MockState {
            script: Arc::new(Mutex::new(script)),
            hits: Arc::new(Hits::default()),
            live,
            bodies: Arc::new(Mutex::new(Vec::new())),
            queries: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/api/run", post(start_run))
            .route("/api/tests", get(list_tests))
            .route("/api/tests/{name}", get(get_test).put(save_test))
            .route("/api/tests/{name}/run-many", post(run_many))
            .route("/api/tests/{name}/scenarios", get(scenarios))
            .route("/api/tests/{name}/codegen", post(codegen))
            .route("/api/run-test", post(run_test))
            .route("/api/stream/{run_id}", get(stream_events))
            .route("/api/report", get(report))
            .route("/api/artifacts", get(artifacts))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { base_url: format!("http://{addr}"), state, server }
    }

    pub fn cfg(&self) -> ClientCfg {
        ClientCfg { base_url: self.base_url.clone(), ..ClientCfg::default() }
    }

    pub fn client(&self) -> BackendClient {
        BackendClient::new(&self.cfg()).unwrap()
    }

    pub fn orchestrator(&self, idle_timeout: Option<Duration>) -> RunOrchestrator {
        let params = OrchestratorParams { idle_timeout, ..OrchestratorParams::default() };
        RunOrchestrator::new(self.client(), params)
    }

    pub fn hits(&self) -> &Hits {
        &self.state.hits
    }

    /// Sends a live frame to every open stream of `run_id`.
    pub fn push(&self, run_id: &str, payload: String) {
        let _ = self.state.live.send((run_id.to_string(), payload));
    }

    /// JSON bodies received by the write endpoints, tagged with the path hit.
    pub fn bodies(&self) -> Vec<(String, Value)> {
        self.state.bodies.lock().clone()
    }

    pub fn queries(&self) -> Vec<Value> {
        self.state.queries.lock().clone()
    }
}

fn new_run_id() -> String {
    format!("run-{}", uuid::Uuid::new_v4())
}

async fn start_run(State(st): State<MockState>, Json(body): Json<Value>) -> Response {
    Hits::bump(&st.hits.run);
    if let Some((code, text)) = st.script.lock().start_failure.clone() {
        return (StatusCode::from_u16(code).unwrap(), text).into_response();
    }
    st.bodies.lock().push(("/api/run".into(), body));
    Json(json!({ "run_id": new_run_id() })).into_response()
}

async fn run_many(State(st): State<MockState>, Path(name): Path<String>, Json(body): Json<Value>) -> Response {
    Hits::bump(&st.hits.run_many);
    if let Some((code, text)) = st.script.lock().start_failure.clone() {
        return (StatusCode::from_u16(code).unwrap(), text).into_response();
    }
    st.bodies.lock().push((format!("/api/tests/{name}/run-many"), body));
    Json(json!({ "run_id": new_run_id() })).into_response()
}

async fn stream_events(
    State(st): State<MockState>,
    Path(run_id): Path<String>,
) -> Sse<BoxStream<'static, Result<Event, Infallible>>> {
    Hits::bump(&st.hits.stream);
    let (frames, hold_open) = {
        let s = st.script.lock();
        (s.frames.clone(), s.hold_open)
    };

    let scripted = stream::iter(frames);
    let payloads: BoxStream<'static, String> = if hold_open {
        // subscribe before answering so no push after the scripted frames is missed
        let live = BroadcastStream::new(st.live.subscribe()).filter_map(move |msg| {
            let run_id = run_id.clone();
            async move {
                match msg {
                    Ok((id, data)) if id == run_id => Some(data),
                    _ => None,
                }
            }
        });
        scripted.chain(live).boxed()
    } else {
        scripted.boxed()
    };

    Sse::new(payloads.map(|data| Ok(Event::default().event("message").data(data))).boxed())
}

async fn report(State(st): State<MockState>) -> Response {
    Hits::bump(&st.hits.report);
    match st.script.lock().report.clone() {
        Some(text) => text.into_response(),
        None => (StatusCode::NOT_FOUND, "").into_response(),
    }
}

async fn artifacts(State(st): State<MockState>) -> Response {
    Hits::bump(&st.hits.artifacts);
    let s = st.script.lock();
    if s.artifacts_failure {
        return (StatusCode::INTERNAL_SERVER_ERROR, "output dir unreadable").into_response();
    }
    Json(s.artifacts.clone()).into_response()
}

async fn scenarios(
    State(st): State<MockState>,
    Path(_name): Path<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    Hits::bump(&st.hits.scenarios);
    st.queries.lock().push(json!(q));
    let s = st.script.lock();
    if let Some((code, text)) = s.scenarios_failure.clone() {
        return (StatusCode::from_u16(code).unwrap(), text).into_response();
    }
    Json(s.scenarios.clone()).into_response()
}

fn meta(name: &str) -> Value {
    json!({
        "name": name,
        "created_at": "2025-03-01T10:00:00Z",
        "last_run_at": "2025-03-02T11:30:00Z",
        "last_status": "passed",
        "last_report_file": format!("reports/{name}-1.md"),
        "last_app_url": "https://shop.test"
    })
}

async fn list_tests(State(st): State<MockState>) -> Json<Value> {
    Hits::bump(&st.hits.tests);
    Json(json!([meta("cart")]))
}

async fn get_test(State(st): State<MockState>, Path(name): Path<String>) -> Response {
    Hits::bump(&st.hits.test_record);
    if st.script.lock().test_record_failure {
        return (StatusCode::INTERNAL_SERVER_ERROR, "index corrupt").into_response();
    }
    Json(json!({
        "meta": meta(&name),
        "code": "import { test } from '@playwright/test';",
        "report_text": "ok",
        "report_url": format!("/outputs/reports/{name}-1.md"),
    }))
    .into_response()
}

async fn save_test(State(st): State<MockState>, Path(name): Path<String>, Json(body): Json<Value>) -> Response {
    Hits::bump(&st.hits.save);
    if body.get("code").is_none() {
        return (StatusCode::BAD_REQUEST, "Missing \"code\" in body.").into_response();
    }
    st.bodies.lock().push((format!("/api/tests/{name}"), body));
    Json(json!({ "ok": true, "name": name, "path": format!("tests/{name}.spec.ts") })).into_response()
}

async fn run_test(State(st): State<MockState>, Json(body): Json<Value>) -> Response {
    Hits::bump(&st.hits.run_test);
    if let Some((code, text)) = st.script.lock().run_test_failure.clone() {
        return (StatusCode::from_u16(code).unwrap(), text).into_response();
    }
    let spec = body["spec"].as_str().unwrap_or_default().to_string();
    let headed = body["headed"].as_bool().unwrap_or(false);
    st.bodies.lock().push(("/api/run-test".into(), body));
    let ran = if headed { format!("npx playwright test {spec} --headed") } else { format!("npx playwright test {spec}") };
    Json(json!({
        "spec": spec,
        "headed": headed,
        "returncode": 1,
        "status": "failed",
        "stdout": "1 failed",
        "stderr": "",
        "ran": ran,
    }))
    .into_response()
}

async fn codegen(State(st): State<MockState>, Path(name): Path<String>, Json(body): Json<Value>) -> Response {
    Hits::bump(&st.hits.codegen);
    let url = body.get("url").cloned().unwrap_or_else(|| json!("https://shop.test"));
    st.bodies.lock().push((format!("/api/tests/{name}/codegen"), body));
    Json(json!({ "launched": true, "spec": format!("/repo/tests/{name}.spec.ts"), "url": url })).into_response()
}
