//! Lifecycle events emitted during a run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type names, in the order a successful run emits them.
pub mod names {
    /// Stack creation was requested.
    pub const STACK_LAUNCHED: &str = "stack.launched";
    /// The stack reached ready.
    pub const STACK_READY: &str = "stack.ready";
    /// The stack failed to provision.
    pub const STACK_FAILED: &str = "stack.failed";
    /// The engine accepts work.
    pub const ENGINE_READY: &str = "engine.ready";
    /// The job artifact was uploaded.
    pub const ARTIFACT_STAGED: &str = "artifact.staged";
    /// The job was submitted.
    pub const JOB_SUBMITTED: &str = "job.submitted";
    /// The job reached a terminal state.
    pub const JOB_FINISHED: &str = "job.finished";
    /// The job artifact was deleted.
    pub const ARTIFACT_UNSTAGED: &str = "artifact.unstaged";
    /// The job output prefix was purged.
    pub const OUTPUT_PURGED: &str = "output.purged";
    /// The engine was asked to shut down.
    pub const ENGINE_TERMINATED: &str = "engine.terminated";
    /// A cleanup action failed.
    pub const CLEANUP_FAILED: &str = "cleanup.failed";
    /// The operator was asked about teardown.
    pub const TEARDOWN_OFFERED: &str = "stack.teardown_offered";
    /// The stack was deleted.
    pub const STACK_DELETED: &str = "stack.deleted";
    /// The run finished.
    pub const RUN_FINISHED: &str = "run.finished";
}

/// An event emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// The event type (e.g. `artifact.staged`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// The run this event belongs to.
    pub run_id: Uuid,
    /// When the event occurred (ISO 8601).
    pub timestamp: String,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl RunEvent {
    /// Creates a new event with an empty payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            event_type: event_type.into(),
            run_id,
            timestamp: crate::utils::iso_timestamp(),
            data: serde_json::Map::new(),
        }
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Returns a string payload field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }
}
