//! Outcome tracking for the compensating cleanup phase.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::warn;

/// What happened to each compensating action of a run.
///
/// Failures are collected but never stop sibling actions, and never
/// replace the run's primary failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Actions that completed.
    completed: Vec<String>,
    /// Actions that failed, with their error message.
    failures: Vec<(String, String)>,
}

impl CleanupReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed action.
    pub fn completed(&mut self, action: impl Into<String>) {
        self.completed.push(action.into());
    }

    /// Records a failed action and logs it as a warning.
    pub fn failed(&mut self, action: impl Into<String>, error: impl Display) {
        let action = action.into();
        let message = error.to_string();
        warn!(action = %action, error = %message, "Cleanup action failed");
        self.failures.push((action, message));
    }

    /// Records the result of an action.
    pub fn record<E: Display>(&mut self, action: impl Into<String>, result: Result<(), E>) {
        match result {
            Ok(()) => self.completed(action),
            Err(e) => self.failed(action, e),
        }
    }

    /// Returns the names of completed actions, in execution order.
    #[must_use]
    pub fn completed_actions(&self) -> &[String] {
        &self.completed
    }

    /// Returns the failed actions with their messages.
    #[must_use]
    pub fn failures(&self) -> &[(String, String)] {
        &self.failures
    }

    /// Returns true if every attempted action succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
