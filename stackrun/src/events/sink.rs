//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

use super::event::{names, RunEvent};

/// Receives lifecycle events from the orchestrator.
///
/// Sinks must not fail the run: anything that goes wrong while recording
/// an event is the sink's own business.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    async fn emit(&self, event: RunEvent);
}

/// A no-op event sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: RunEvent) {}
}

/// Writes events to the log.
///
/// Failure events (`stack.failed`, `cleanup.failed`) are logged at warn
/// regardless of the configured level; the stack name and job id, when the
/// payload has them, become structured fields.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging routine events at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a sink logging routine events at debug.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn is_failure(event: &RunEvent) -> bool {
        event.event_type == names::STACK_FAILED || event.event_type == names::CLEANUP_FAILED
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: RunEvent) {
        let stack = event.field("stack").unwrap_or("-");
        let job_id = event.field("job_id").unwrap_or("-");
        let data = serde_json::Value::Object(event.data.clone());

        if Self::is_failure(&event) {
            warn!(run_id = %event.run_id, stack, job_id, event_data = %data, "{}", event.event_type);
        } else if self.level == Level::DEBUG {
            debug!(run_id = %event.run_id, stack, job_id, event_data = %data, "{}", event.event_type);
        } else {
            info!(run_id = %event.run_id, stack, job_id, "{}", event.event_type);
        }
    }
}

/// A collecting event sink for tests and run traces.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<RunEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.read().clone()
    }

    /// Returns the collected event types, in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Returns the position of the first event of a type.
    #[must_use]
    pub fn position(&self, event_type: &str) -> Option<usize> {
        self.events
            .read()
            .iter()
            .position(|e| e.event_type == event_type)
    }

    /// Returns the number of events of a type.
    #[must_use]
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: RunEvent) {
        self.events.write().push(event);
    }
}
