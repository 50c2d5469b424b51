use std::collections::VecDeque;
use std::fmt;

use crate::error::{Error, Result};
use crate::events::{EventKind, LogEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Starting,
    Streaming,
    Finished,
    Errored,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Finished | RunState::Errored)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Starting => "starting",
            RunState::Streaming => "streaming",
            RunState::Finished => "finished",
            RunState::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Append-only event log. With a capacity it behaves as a ring buffer and
/// counts what it evicted.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    entries: VecDeque<LogEvent>,
    capacity: Option<usize>,
    evicted: u64,
}

impl LogBuffer {
    pub fn new(capacity: Option<usize>) -> Self {
        Self { entries: VecDeque::new(), capacity: capacity.filter(|c| *c > 0), evicted: 0 }
    }

    pub fn push(&mut self, evt: LogEvent) {
        if let Some(cap) = self.capacity {
            while self.entries.len() >= cap {
                self.entries.pop_front();
                self.evicted += 1;
            }
        }
        self.entries.push_back(evt);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEvent> {
        self.entries.iter()
    }

    /// Output lines only, in arrival order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| e.line.as_deref())
    }
}

/// One backend run as seen by this client.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub logs: LogBuffer,
    pub state: RunState,
    /// Message carried by an `error` event, if that is how the run ended.
    pub error: Option<String>,
}

/// What [`RunStateMachine::apply`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Appended,
    Finished,
    Errored,
    /// The run is already terminal; the event was not recorded.
    Ignored,
}

/// Drives one run through `Idle → Starting → Streaming → Finished | Errored`.
///
/// The machine is the only writer of the run's log. A `Run` exists only once
/// the backend has handed out an id, so a failed start leaves none behind.
#[derive(Debug)]
pub struct RunStateMachine {
    state: RunState,
    run: Option<Run>,
    log_capacity: Option<usize>,
}

impl RunStateMachine {
    pub fn new(log_capacity: Option<usize>) -> Self {
        Self { state: RunState::Idle, run: None, log_capacity }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run(&self) -> Option<&Run> {
        self.run.as_ref()
    }

    pub fn into_run(self) -> Option<Run> {
        self.run
    }

    fn expect(&self, expected: RunState, action: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState { action, state: self.state.to_string() });
        }
        Ok(())
    }

    fn set(&mut self, state: RunState) {
        self.state = state;
        if let Some(run) = self.run.as_mut() {
            run.state = state;
        }
    }

    pub fn begin_start(&mut self) -> Result<()> {
        self.expect(RunState::Idle, "start a run")?;
        self.set(RunState::Starting);
        Ok(())
    }

    pub fn start_failed(&mut self) -> Result<()> {
        self.expect(RunState::Starting, "fail a start")?;
        self.set(RunState::Errored);
        Ok(())
    }

    /// The backend returned an id and the subscriber is attached.
    pub fn attach(&mut self, run_id: impl Into<String>) -> Result<()> {
        self.expect(RunState::Starting, "attach a stream")?;
        self.run = Some(Run {
            id: run_id.into(),
            logs: LogBuffer::new(self.log_capacity),
            state: RunState::Streaming,
            error: None,
        });
        self.set(RunState::Streaming);
        Ok(())
    }

    /// Records one event. Every event is appended while streaming, whatever
    /// it carries; only `finished` ends the run successfully.
    pub fn apply(&mut self, evt: LogEvent) -> Result<Applied> {
        if self.state.is_terminal() {
            return Ok(Applied::Ignored);
        }
        self.expect(RunState::Streaming, "record an event")?;
        let kind = evt.kind();
        let message = evt.line.clone();
        let Some(run) = self.run.as_mut() else {
            return Err(Error::InvalidState { action: "record an event", state: "detached".into() });
        };
        run.logs.push(evt);
        Ok(match kind {
            EventKind::Output => Applied::Appended,
            EventKind::Finished => {
                self.set(RunState::Finished);
                Applied::Finished
            }
            EventKind::Failed => {
                run.error = Some(message.unwrap_or_else(|| "run reported an error".to_string()));
                self.set(RunState::Errored);
                Applied::Errored
            }
        })
    }
}
