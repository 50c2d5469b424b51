//! Client-side run orchestration for a natural-language test backend:
//! start runs, follow their live event stream, and collect the report and
//! artifacts once they finish.

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod reconcile;
pub mod request;
pub mod run;
pub mod scenario;
pub mod selection;
pub mod sse;
pub mod stream;

pub use catalog::TestCatalog;
pub use client::{BackendClient, CodegenLaunch, RunHandle, SpecRunReport, TestMeta, TestRecord};
pub use config::ClientCfg;
pub use error::{Error, Result};
pub use events::LogEvent;
pub use orchestrator::{OrchestratorParams, RunOrchestrator, RunOutcome};
pub use reconcile::{Reconciliation, RunResult};
pub use request::{RunRequest, RunRequestBuilder};
pub use run::{Run, RunState, RunStateMachine};
pub use scenario::Scenario;
pub use selection::ScenarioSelection;
