use serde::Serialize;

use crate::error::{Error, Result};
use crate::scenario::Scenario;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunPayload {
    pub application_url: String,
    pub test_name: String,
    pub test_description: String,
}

/// Exactly one run request. A batch of N scenarios is still one run with a
/// single pass/fail outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunRequest {
    Single(RunPayload),
    Batch { payload: RunPayload, scenarios: Vec<Scenario> },
}

#[derive(Serialize)]
pub(crate) struct BatchBody<'a> {
    #[serde(flatten)]
    pub payload: &'a RunPayload,
    pub scenarios: &'a [Scenario],
}

impl RunRequest {
    pub fn payload(&self) -> &RunPayload {
        match self {
            RunRequest::Single(p) | RunRequest::Batch { payload: p, .. } => p,
        }
    }

    pub fn test_name(&self) -> &str {
        &self.payload().test_name
    }

    pub fn scenarios(&self) -> &[Scenario] {
        match self {
            RunRequest::Single(_) => &[],
            RunRequest::Batch { scenarios, .. } => scenarios,
        }
    }

    /// `"single"` for a one-test run, the comma-joined scenario ids for a batch.
    pub fn scenario_ref(&self) -> String {
        match self {
            RunRequest::Single(_) => "single".to_string(),
            RunRequest::Batch { scenarios, .. } => {
                scenarios.iter().map(|s| s.id.as_str()).collect::<Vec<_>>().join(",")
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunRequestBuilder {
    application_url: String,
    test_name: String,
    test_description: String,
    scenarios: Option<Vec<Scenario>>,
}

impl RunRequestBuilder {
    pub fn new(
        application_url: impl Into<String>,
        test_name: impl Into<String>,
        test_description: impl Into<String>,
    ) -> Self {
        Self {
            application_url: application_url.into(),
            test_name: test_name.into(),
            test_description: test_description.into(),
            scenarios: None,
        }
    }

    /// Switches to the batched path; every scenario given ends up in the one request.
    pub fn scenarios(mut self, scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        self.scenarios = Some(scenarios.into_iter().collect());
        self
    }

    pub fn build(self) -> Result<RunRequest> {
        let payload = RunPayload {
            application_url: required("application_url", self.application_url)?,
            test_name: required("test_name", self.test_name)?,
            test_description: required("test_description", self.test_description)?,
        };
        match self.scenarios {
            None => Ok(RunRequest::Single(payload)),
            Some(s) if s.is_empty() => Err(Error::validation("no scenarios selected")),
            Some(scenarios) => Ok(RunRequest::Batch { payload, scenarios }),
        }
    }
}

fn required(field: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}
