//! Per-run event stream subscription.
//!
//! A reader task owns the HTTP body, parses SSE frames into [`LogEvent`]s and
//! hands them over a bounded channel in arrival order. Malformed frames are
//! dropped. The task closes itself after a `finished` event. There is no
//! reconnect: a dropped connection simply ends the stream.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::ReentrantMutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::client::BackendClient;
use crate::error::Result;
use crate::events::{EventKind, LogEvent};
use crate::sse::{SseFrame, SseParser};

/// Pull-style handle on one open event channel.
pub struct Subscription {
    run_id: String,
    rx: mpsc::Receiver<Result<LogEvent>>,
    reader: JoinHandle<()>,
    cancelled: bool,
}

/// Opens exactly one event channel for `run_id`.
pub fn subscribe(client: &BackendClient, run_id: &str, capacity: usize) -> Subscription {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let client = client.clone();
    let id = run_id.to_string();
    let reader = tokio::spawn(async move {
        if let Err(e) = read_stream(&client, &id, &tx).await {
            tracing::debug!(run_id = %id, "event stream failed: {e}");
            let _ = tx.send(Err(e)).await;
        }
    });
    Subscription { run_id: run_id.to_string(), rx, reader, cancelled: false }
}

async fn read_stream(
    client: &BackendClient,
    run_id: &str,
    tx: &mpsc::Sender<Result<LogEvent>>,
) -> Result<()> {
    let resp = client.open_stream(run_id).await?;
    let mut body = resp.bytes_stream();
    let mut parser = SseParser::new();

    while let Some(chunk) = body.next().await {
        for frame in parser.feed(&chunk?) {
            match deliver(frame, run_id, tx).await {
                Delivery::Continue => {}
                Delivery::Stop => return Ok(()),
            }
        }
    }
    if let Some(frame) = parser.finish() {
        deliver(frame, run_id, tx).await;
    }
    tracing::debug!(run_id, "event stream closed by server");
    Ok(())
}

enum Delivery {
    Continue,
    Stop,
}

async fn deliver(frame: SseFrame, run_id: &str, tx: &mpsc::Sender<Result<LogEvent>>) -> Delivery {
    if frame.event != "message" {
        return Delivery::Continue;
    }
    let Some(evt) = LogEvent::parse(&frame.data) else {
        tracing::debug!(run_id, data = %frame.data, "dropping malformed event");
        return Delivery::Continue;
    };
    let finished = evt.kind() == EventKind::Finished;
    if tx.send(Ok(evt)).await.is_err() || finished {
        // receiver gone, or the run is over
        return Delivery::Stop;
    }
    Delivery::Continue
}

impl Subscription {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Next event in arrival order. `None` once the channel is closed or cancelled.
    pub async fn next(&mut self) -> Option<Result<LogEvent>> {
        if self.cancelled {
            return None;
        }
        self.rx.recv().await
    }

    /// Releases the channel. Idempotent; nothing is yielded afterwards, including
    /// events that were already queued.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.reader.abort();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        tracing::debug!(run_id = %self.run_id, "subscription cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

struct Shared<F> {
    cancelled: AtomicBool,
    on_event: ReentrantMutex<RefCell<F>>,
}

/// Callback-style subscription. Dropping the handle does not cancel it.
pub struct CancelHandle {
    cancel_fn: Box<dyn Fn() + Send + Sync>,
    done: watch::Receiver<bool>,
}

/// Delivers every event of `run_id` to `on_event`, one call at a time, until a
/// `finished` event arrives, the stream ends, or the handle is cancelled.
///
/// A transport failure while opening or reading the stream ends delivery.
pub fn subscribe_with<F>(client: &BackendClient, run_id: &str, capacity: usize, on_event: F) -> CancelHandle
where
    F: FnMut(LogEvent) + Send + 'static,
{
    let shared = Arc::new(Shared {
        cancelled: AtomicBool::new(false),
        on_event: ReentrantMutex::new(RefCell::new(on_event)),
    });
    let (done_tx, done) = watch::channel(false);
    let mut sub = subscribe(client, run_id, capacity);

    let task_shared = shared.clone();
    let task = tokio::spawn(async move {
        while let Some(item) = sub.next().await {
            let Ok(evt) = item else { break };
            let finished = evt.kind() == EventKind::Finished;
            {
                let guard = task_shared.on_event.lock();
                if task_shared.cancelled.load(Ordering::Acquire) {
                    break;
                }
                let mut on_event = guard.borrow_mut();
                (*on_event)(evt);
            }
            if finished {
                break;
            }
        }
        sub.cancel();
        let _ = done_tx.send(true);
    });

    let cancel_shared = shared;
    let abort = task.abort_handle();
    CancelHandle {
        cancel_fn: Box::new(move || {
            cancel_shared.cancelled.store(true, Ordering::Release);
            // waits out a callback running on another thread; re-entrant for
            // a cancel issued from inside the callback itself
            drop(cancel_shared.on_event.lock());
            abort.abort();
        }),
        done,
    }
}

impl CancelHandle {
    /// Stops delivery. Once this returns no further callback runs. Idempotent.
    pub fn cancel(&self) {
        (self.cancel_fn)();
    }

    /// Resolves when delivery has ended for any reason.
    pub async fn closed(&mut self) {
        let _ = self.done.wait_for(|done| *done).await;
    }
}
