//! Stack diagnostic events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of the control plane's stack event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEvent {
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// The template resource the event concerns.
    pub logical_resource_id: String,
    /// The resource status at that time.
    pub resource_status: String,
    /// Why the status changed, if the control plane said.
    #[serde(default)]
    pub reason: Option<String>,
}

impl StackEvent {
    /// Creates a new stack event.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        logical_resource_id: impl Into<String>,
        resource_status: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            logical_resource_id: logical_resource_id.into(),
            resource_status: resource_status.into(),
            reason: None,
        }
    }

    /// Sets the status reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl fmt::Display for StackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.logical_resource_id,
            self.resource_status
        )?;
        match self.reason.as_deref() {
            Some(reason) if !reason.is_empty() => write!(f, " {reason}"),
            _ => Ok(()),
        }
    }
}

/// Final status and recent events of a stack, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDiagnostics {
    /// The raw stack status string.
    pub status: String,
    /// Recent events ordered by recency.
    pub events: Vec<StackEvent>,
}

impl StackDiagnostics {
    /// Builds diagnostics from an unordered feed, keeping the newest `max_events`.
    #[must_use]
    pub fn from_feed(status: impl Into<String>, mut events: Vec<StackEvent>, max_events: usize) -> Self {
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(max_events);
        Self {
            status: status.into(),
            events,
        }
    }

    /// Renders the diagnostics as the lines shown to the operator.
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.events.len() + 2);
        lines.push(format!("Stack status: {}", self.status));
        lines.push("Recent stack events:".to_string());
        lines.extend(self.events.iter().map(|event| format!("- {event}")));
        lines
    }
}
