//! Lifecycle events for observability.
//!
//! The orchestrator emits one event per lifecycle transition. The logging
//! sink is the production default; the collecting sink gives tests a full
//! ordered trace of a run.

mod event;
mod sink;

pub use event::{names, RunEvent};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
