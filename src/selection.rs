use crate::client::BackendClient;
use crate::error::{Error, Result};
use crate::events::LogEvent;
use crate::orchestrator::{RunOrchestrator, RunOutcome};
use crate::request::{RunRequest, RunRequestBuilder};
use crate::scenario::Scenario;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioRow {
    pub scenario: Scenario,
    pub selected: bool,
}

/// Generated scenarios for one test plus the local selection over them.
#[derive(Debug, Clone)]
pub struct ScenarioSelection {
    test_name: String,
    application_url: String,
    description: String,
    rows: Vec<ScenarioRow>,
}

impl ScenarioSelection {
    /// Fetches the candidate list. Every scenario starts selected. Nothing is
    /// built unless the whole list decodes.
    pub async fn load(
        client: &BackendClient,
        test_name: &str,
        application_url: &str,
        description: &str,
    ) -> Result<Self> {
        let scenarios = client.list_scenarios(test_name, application_url, description).await?;
        tracing::debug!(test = test_name, count = scenarios.len(), "scenarios loaded");
        Ok(Self::from_scenarios(test_name, application_url, description, scenarios))
    }

    pub fn from_scenarios(
        test_name: &str,
        application_url: &str,
        description: &str,
        scenarios: Vec<Scenario>,
    ) -> Self {
        Self {
            test_name: test_name.to_string(),
            application_url: application_url.to_string(),
            description: description.to_string(),
            rows: scenarios.into_iter().map(|scenario| ScenarioRow { scenario, selected: true }).collect(),
        }
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn rows(&self) -> &[ScenarioRow] {
        &self.rows
    }

    pub fn toggle_all(&mut self, selected: bool) {
        for row in &mut self.rows {
            row.selected = selected;
        }
    }

    /// Returns false when no scenario has that id.
    pub fn toggle_one(&mut self, id: &str, selected: bool) -> bool {
        let mut found = false;
        for row in self.rows.iter_mut().filter(|r| r.scenario.id == id) {
            row.selected = selected;
            found = true;
        }
        found
    }

    pub fn selected(&self) -> impl Iterator<Item = &Scenario> {
        self.rows.iter().filter(|r| r.selected).map(|r| &r.scenario)
    }

    pub fn selected_count(&self) -> usize {
        self.selected().count()
    }

    pub fn all_selected(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.selected)
    }

    pub fn any_selected(&self) -> bool {
        self.rows.iter().any(|r| r.selected)
    }

    /// One batched request covering every selected scenario.
    pub fn build_request(&self) -> Result<RunRequest> {
        if !self.any_selected() {
            return Err(Error::validation("no scenarios selected"));
        }
        let description = if self.description.trim().is_empty() {
            format!("{} scenarios", self.test_name)
        } else {
            self.description.clone()
        };
        RunRequestBuilder::new(&self.application_url, &self.test_name, description)
            .scenarios(self.selected().cloned())
            .build()
    }

    pub async fn run_selected(&self, orchestrator: &RunOrchestrator) -> Result<RunOutcome> {
        self.run_selected_with(orchestrator, |_| {}).await
    }

    pub async fn run_selected_with<F>(&self, orchestrator: &RunOrchestrator, observer: F) -> Result<RunOutcome>
    where
        F: FnMut(&LogEvent),
    {
        let request = self.build_request()?;
        tracing::info!(test = %self.test_name, selected = request.scenarios().len(), "running selected scenarios");
        orchestrator.execute_with(request, observer).await
    }
}
