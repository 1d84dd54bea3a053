//! Progress events emitted by a run
//!
//! Within a run, events arrive in the order they were emitted:
//! `start`, then per iteration `step`, `thought`, and either `action` +
//! `observation` or `subtask_complete` (or a bare `observation`), then
//! `result` and finally exactly one `done`.

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::trace;

use crate::types::TaskId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RunEvent {
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        goal: String,
    },
    Step {
        step_id: usize,
        subtask_id: TaskId,
        subtask: String,
    },
    Thought {
        thought: String,
    },
    Action {
        tool: String,
        args: Value,
    },
    Observation {
        success: bool,
        result: Option<String>,
        error: Option<String>,
    },
    SubtaskComplete {
        subtask_id: TaskId,
        result: String,
    },
    Result {
        success: bool,
        answer: Option<String>,
        error: Option<String>,
    },
    Error {
        message: String,
    },
    Done,
}

impl RunEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Step { .. } => "step",
            Self::Thought { .. } => "thought",
            Self::Action { .. } => "action",
            Self::Observation { .. } => "observation",
            Self::SubtaskComplete { .. } => "subtask_complete",
            Self::Result { .. } => "result",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Receives a run's events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: RunEvent) {}
}

/// Producer half of a run's event queue. Sending never blocks.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl EventSink for ChannelSink {
    fn emit(&self, event: RunEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            trace!(event = name, "Event dropped, subscriber gone");
        }
    }
}

/// Consumer half of a run's event queue
#[derive(Debug)]
pub struct RunEventStream {
    rx: mpsc::UnboundedReceiver<RunEvent>,
}

impl RunEventStream {
    /// Next event, or `None` once the run has finished and the queue is drained
    pub async fn recv(&mut self) -> Option<RunEvent> {
        self.rx.recv().await
    }
}

impl Stream for RunEventStream {
    type Item = RunEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RunEvent>> {
        self.rx.poll_recv(cx)
    }
}

/// A connected sink/stream pair
pub fn channel() -> (ChannelSink, RunEventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, RunEventStream { rx })
}

/// Emits `done` when dropped, so every exit path of a run ends its stream
pub(crate) struct DoneGuard<S: EventSink> {
    sink: S,
}

impl<S: EventSink> DoneGuard<S> {
    pub(crate) fn new(sink: S) -> Self {
        Self { sink }
    }

    pub(crate) fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: EventSink> Drop for DoneGuard<S> {
    fn drop(&mut self) {
        self.sink.emit(RunEvent::Done);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let event = RunEvent::Action {
            tool: "calculator".to_string(),
            args: json!({"expression": "50 * 20"}),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "action", "data": {"tool": "calculator", "args": {"expression": "50 * 20"}}})
        );

        let event = RunEvent::SubtaskComplete {
            subtask_id: 1,
            result: "1000".to_string(),
        };
        assert_eq!(serde_json::to_value(&event).unwrap()["event"], "subtask_complete");
        assert_eq!(serde_json::to_value(RunEvent::Done).unwrap(), json!({"event": "done"}));
    }

    #[tokio::test]
    async fn test_channel_preserves_order() {
        let (sink, mut stream) = channel();
        sink.emit(RunEvent::Start {
            run_id: None,
            goal: "g".to_string(),
        });
        sink.emit(RunEvent::Thought {
            thought: "t".to_string(),
        });
        drop(sink);

        assert_eq!(stream.recv().await.unwrap().name(), "start");
        assert_eq!(stream.next().await.unwrap().name(), "thought");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_done_guard_emits_once_on_drop() {
        let (sink, mut stream) = channel();
        {
            let guard = DoneGuard::new(sink);
            guard.sink().emit(RunEvent::Error {
                message: "boom".to_string(),
            });
        }

        let events: Vec<RunEvent> = stream.by_ref().collect().await;
        assert_eq!(events.iter().map(RunEvent::name).collect::<Vec<_>>(), vec!["error", "done"]);
    }

    #[test]
    fn test_send_after_subscriber_dropped_is_silent() {
        let (sink, stream) = channel();
        drop(stream);
        sink.emit(RunEvent::Done);
    }
}
