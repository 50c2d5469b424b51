use serde::{Deserialize, Serialize};

pub const STATUS_FINISHED: &str = "finished";
pub const STATUS_ERROR: &str = "error";

/// One message from a run's event stream.
///
/// `line` is display-only output; `status` marks a lifecycle change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Output,
    Finished,
    Failed,
}

impl LogEvent {
    pub fn line(text: impl Into<String>) -> Self {
        Self { line: Some(text.into()), status: None }
    }

    pub fn status(status: impl Into<String>) -> Self {
        Self { line: None, status: Some(status.into()) }
    }

    pub fn finished() -> Self {
        Self::status(STATUS_FINISHED)
    }

    /// Parses one stream payload. Returns `None` for anything that is not a
    /// JSON object with at least one of `line`/`status` as a string.
    pub fn parse(payload: &str) -> Option<Self> {
        let evt: LogEvent = serde_json::from_str(payload).ok()?;
        (evt.line.is_some() || evt.status.is_some()).then_some(evt)
    }

    pub fn kind(&self) -> EventKind {
        match self.status.as_deref() {
            Some(STATUS_FINISHED) => EventKind::Finished,
            Some(STATUS_ERROR) => EventKind::Failed,
            _ => EventKind::Output,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind() != EventKind::Output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_line_and_status_payloads() {
        assert_eq!(LogEvent::parse(r#"{"line":"npm test"}"#), Some(LogEvent::line("npm test")));
        assert_eq!(LogEvent::parse(r#"{"status":"finished"}"#), Some(LogEvent::finished()));
        let both = LogEvent::parse(r#"{"line":"boom","status":"error","extra":1}"#).unwrap();
        assert_eq!(both.kind(), EventKind::Failed);
        assert_eq!(both.line.as_deref(), Some("boom"));
    }

    #[test]
    fn rejects_malformed_payloads() {
        for bad in ["", "not json", "[]", "{}", r#"{"line":5}"#, r#"{"other":"x"}"#, "null"] {
            assert_eq!(LogEvent::parse(bad), None, "{bad}");
        }
    }

    #[test]
    fn only_finished_and_error_are_terminal() {
        assert!(LogEvent::finished().is_terminal());
        assert!(LogEvent::status("error").is_terminal());
        assert!(!LogEvent::status("running").is_terminal());
        assert!(!LogEvent::status("Finished").is_terminal());
        assert!(!LogEvent::line("finished").is_terminal());
    }
}
