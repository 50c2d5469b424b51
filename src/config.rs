use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamCfg {
    /// Seconds without any event before a run counts as stalled. 0 disables.
    pub idle_timeout_secs: u64,
    /// Ring-buffer size of a run's log. `None` keeps every event.
    pub log_capacity: Option<usize>,
    pub channel_capacity: usize,
}

impl Default for StreamCfg {
    fn default() -> Self {
        Self { idle_timeout_secs: 600, log_capacity: Some(50_000), channel_capacity: 256 }
    }
}

impl StreamCfg {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientCfg {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub stream: StreamCfg,
}

impl Default for ClientCfg {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            request_timeout_secs: 30,
            stream: StreamCfg::default(),
        }
    }
}

impl ClientCfg {
    /// YAML file (if any), then `.env`, then `QARUN_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let txt = std::fs::read_to_string(p)
                    .context(format!("Failed to read config file: {}", p.display()))?;
                Self::from_yaml(&txt)?
            }
            None => Self::default(),
        };
        dotenvy::dotenv().ok();
        cfg.apply_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_yaml(txt: &str) -> Result<Self> {
        serde_yaml::from_str(txt).context("Failed to parse config YAML")
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("QARUN_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(secs) = var("QARUN_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.request_timeout_secs = secs;
        }
        if let Some(secs) = var("QARUN_IDLE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.stream.idle_timeout_secs = secs;
        }
        if let Some(cap) = var("QARUN_LOG_CAPACITY") {
            // "0" or "unbounded" turns the ring buffer off
            self.stream.log_capacity = match cap.parse::<usize>() {
                Ok(0) => None,
                Ok(n) => Some(n),
                Err(_) if cap.eq_ignore_ascii_case("unbounded") => None,
                Err(_) => self.stream.log_capacity,
            };
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
