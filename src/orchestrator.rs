use std::time::Duration;

use tokio::time::timeout;

use crate::catalog::TestCatalog;
use crate::client::{BackendClient, SpecRunReport};
use crate::config::StreamCfg;
use crate::error::{Error, Result};
use crate::events::LogEvent;
use crate::reconcile::{reconcile, Reconciliation, RunResult};
use crate::request::RunRequest;
use crate::run::{Applied, Run, RunState, RunStateMachine};
use crate::scenario::spec_path;
use crate::stream::{self, Subscription};

#[derive(Debug, Clone)]
pub struct OrchestratorParams {
    /// Longest gap between two events before the run counts as stalled.
    pub idle_timeout: Option<Duration>,
    pub log_capacity: Option<usize>,
    pub channel_capacity: usize,
}

impl From<&StreamCfg> for OrchestratorParams {
    fn from(cfg: &StreamCfg) -> Self {
        Self {
            idle_timeout: cfg.idle_timeout(),
            log_capacity: cfg.log_capacity,
            channel_capacity: cfg.channel_capacity,
        }
    }
}

impl Default for OrchestratorParams {
    fn default() -> Self {
        Self::from(&StreamCfg::default())
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run: Run,
    /// Present only when the run finished.
    pub reconciliation: Option<Reconciliation>,
}

impl RunOutcome {
    pub fn is_finished(&self) -> bool {
        self.run.state == RunState::Finished
    }

    pub fn result(&self) -> Option<&RunResult> {
        self.reconciliation.as_ref().map(|r| &r.result)
    }
}

/// Start → stream → reconcile, one run at a time per call.
#[derive(Clone)]
pub struct RunOrchestrator {
    client: BackendClient,
    params: OrchestratorParams,
    catalog: Option<TestCatalog>,
}

impl RunOrchestrator {
    pub fn new(client: BackendClient, params: OrchestratorParams) -> Self {
        Self { client, params, catalog: None }
    }

    /// Refresh this catalog after every finished run.
    pub fn with_catalog(mut self, catalog: TestCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    pub async fn execute(&self, request: RunRequest) -> Result<RunOutcome> {
        self.execute_with(request, |_| {}).await
    }

    /// Like [`execute`](Self::execute), handing each recorded event to
    /// `observer` as it arrives.
    pub async fn execute_with<F>(&self, request: RunRequest, mut observer: F) -> Result<RunOutcome>
    where
        F: FnMut(&LogEvent),
    {
        let mut machine = RunStateMachine::new(self.params.log_capacity);
        machine.begin_start()?;
        let handle = match self.client.start(&request).await {
            Ok(h) => h,
            Err(e) => {
                machine.start_failed()?;
                return Err(e);
            }
        };

        let mut sub = stream::subscribe(&self.client, &handle.id, self.params.channel_capacity);
        machine.attach(handle.id.as_str())?;
        let streamed = self.stream_until_terminal(&mut machine, &mut sub, &mut observer).await;
        sub.cancel();
        streamed?;

        let run = machine
            .into_run()
            .ok_or(Error::InvalidState { action: "collect a run", state: "detached".into() })?;
        if run.state != RunState::Finished {
            tracing::warn!(run_id = %run.id, error = ?run.error, "run ended with an error");
            return Ok(RunOutcome { run, reconciliation: None });
        }

        let rec = reconcile(&self.client, request.test_name(), &request.scenario_ref()).await;
        self.refresh_catalog().await;
        tracing::info!(
            run_id = %run.id,
            events = run.logs.len(),
            artifacts = rec.artifacts.len(),
            warnings = rec.warnings.len(),
            "run finished"
        );
        Ok(RunOutcome { run, reconciliation: Some(rec) })
    }

    /// Re-runs the saved spec of `test_name` and refreshes the catalog, since
    /// the backend records the new status on the test.
    pub async fn rerun(&self, test_name: &str, headed: bool) -> Result<SpecRunReport> {
        let report = self.client.run_test(&spec_path(test_name), headed).await?;
        self.refresh_catalog().await;
        Ok(report)
    }

    async fn refresh_catalog(&self) {
        if let Some(catalog) = &self.catalog {
            if let Err(e) = catalog.refresh().await {
                tracing::warn!("test list refresh failed: {e}");
            }
        }
    }

    async fn stream_until_terminal<F>(
        &self,
        machine: &mut RunStateMachine,
        sub: &mut Subscription,
        observer: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&LogEvent),
    {
        loop {
            let next = match self.params.idle_timeout {
                Some(limit) => match timeout(limit, sub.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::warn!(run_id = sub.run_id(), "no event for {limit:?}");
                        return Err(Error::Stalled {
                            run_id: sub.run_id().to_string(),
                            reason: format!("no event for {limit:?}"),
                        });
                    }
                },
                None => sub.next().await,
            };

            let evt = match next {
                Some(Ok(evt)) => evt,
                Some(Err(e)) => return Err(e),
                None => {
                    tracing::warn!(run_id = sub.run_id(), "event stream closed early");
                    return Err(Error::Stalled {
                        run_id: sub.run_id().to_string(),
                        reason: "event stream closed before a terminal event".into(),
                    })
                }
            };

            match machine.apply(evt.clone())? {
                Applied::Appended => observer(&evt),
                Applied::Finished | Applied::Errored => {
                    observer(&evt);
                    return Ok(());
                }
                Applied::Ignored => return Ok(()),
            }
        }
    }
}
