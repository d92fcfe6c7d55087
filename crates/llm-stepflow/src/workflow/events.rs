//! Execution events.
//!
//! The engine records what happens during a run in a bounded ring buffer and
//! forwards each event to any registered [`EventSink`]. Nothing in the engine
//! reads events back; a run behaves the same with zero sinks.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Kind of execution event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    IterationStart,
    ParallelStart,
    ParallelComplete,
    StepComplete,
    StepFailed,
    SynthesisStart,
    SynthesisComplete,
    RefinementComplete,
    RunFinished,
}

/// One observed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub iteration: u32,
    pub kind: EventKind,
    pub payload: JsonValue,
    pub timestamp_ms: u64,
}

impl ExecutionEvent {
    pub fn new(iteration: u32, kind: EventKind, payload: JsonValue) -> Self {
        Self {
            iteration,
            kind,
            payload,
            timestamp_ms: current_timestamp_ms(),
        }
    }
}

/// Observer of execution events.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiver end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn on_event(&self, event: &ExecutionEvent) {
        // A dropped receiver just means nobody is listening.
        let _ = self.sender.send(event.clone());
    }
}

/// Append-only ring buffer keeping the most recent events.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<ExecutionEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: ExecutionEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ExecutionEvent> {
        self.events.iter()
    }

    pub fn to_vec(&self) -> Vec<ExecutionEvent> {
        self.events.iter().cloned().collect()
    }
}

/// Event log plus sink fan-out, owned by one orchestrator.
pub(crate) struct EventRecorder {
    log: Mutex<EventLog>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventRecorder {
    pub(crate) fn new(capacity: usize, sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            log: Mutex::new(EventLog::with_capacity(capacity)),
            sinks,
        }
    }

    pub(crate) fn emit(&self, iteration: u32, kind: EventKind, payload: JsonValue) {
        let event = ExecutionEvent::new(iteration, kind, payload);
        for sink in &self.sinks {
            sink.on_event(&event);
        }
        if let Ok(mut log) = self.log.lock() {
            log.push(event);
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<ExecutionEvent> {
        self.log.lock().map(|log| log.to_vec()).unwrap_or_default()
    }
}

/// Returns the current system time in milliseconds since UNIX_EPOCH.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
