//! Error types for stackrun.
//!
//! The taxonomy separates failures that stop forward progress (validation,
//! provisioning, job failures) from the port-level [`RemoteError`] returned
//! by control-plane adapters.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::StackDiagnostics;

/// The main error type for stackrun operations.
#[derive(Debug, Error)]
pub enum StackrunError {
    /// Input was malformed. No remote call has been made.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A resource was read before it reached the state an operation needs.
    #[error("{resource} is not ready: {requirement}")]
    NotReady {
        /// The resource that was read too early.
        resource: String,
        /// What the operation required of it.
        requirement: String,
    },

    /// Remote state did not converge within the poll budget.
    #[error("Timed out waiting for {operation} on '{resource}' after {polls} polls (last status: {last_status})")]
    Timeout {
        /// The wait that gave up.
        operation: String,
        /// The resource being observed.
        resource: String,
        /// Number of polls performed.
        polls: u32,
        /// The last status string observed.
        last_status: String,
    },

    /// Uploading the job artifact failed.
    #[error("Staging failed for '{path}': {reason}")]
    Staging {
        /// The local artifact path.
        path: String,
        /// Why the upload failed.
        reason: String,
    },

    /// A control-plane or object-store call failed.
    #[error("{operation} failed for '{resource}': {source}")]
    RemoteOperation {
        /// The operation that was attempted (e.g. "delete_object").
        operation: String,
        /// The resource identifier involved.
        resource: String,
        /// The underlying port error.
        #[source]
        source: RemoteError,
    },

    /// The stack reached a failed terminal state while being created.
    #[error("Stack '{stack}' failed to provision (status: {})", .diagnostics.status)]
    ProvisioningFailure {
        /// The stack name.
        stack: String,
        /// Final status and the most recent events.
        diagnostics: StackDiagnostics,
    },

    /// The execution engine terminated before it could accept work.
    #[error("Engine '{engine_id}' entered terminal state {state}")]
    EngineFailure {
        /// The engine identifier.
        engine_id: String,
        /// The terminal engine state.
        state: String,
    },

    /// The submitted job ended in a failed or cancelled state.
    #[error("Job '{job_id}' ended with state {state}{}", reason_suffix(.reason))]
    JobFailure {
        /// The engine-assigned job identifier.
        job_id: String,
        /// The raw terminal state reported by the engine.
        state: String,
        /// The engine-reported reason, if any.
        reason: Option<String>,
    },

    /// Stack deletion reached a failed state.
    #[error("Teardown of stack '{stack}' failed (status: {status})")]
    TeardownFailed {
        /// The stack name.
        stack: String,
        /// The raw status reported by the control plane.
        status: String,
    },

    /// The run was interrupted.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StackrunError {
    /// Creates a not-ready error.
    #[must_use]
    pub fn not_ready(resource: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self::NotReady {
            resource: resource.into(),
            requirement: requirement.into(),
        }
    }

    /// Creates a staging error.
    #[must_use]
    pub fn staging(path: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::Staging {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Wraps a port error with the operation and resource it concerned.
    #[must_use]
    pub fn remote(
        operation: impl Into<String>,
        resource: impl Into<String>,
        source: RemoteError,
    ) -> Self {
        Self::RemoteOperation {
            operation: operation.into(),
            resource: resource.into(),
            source,
        }
    }

    /// Returns the process exit code this failure maps to.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Cancelled(_) => 130,
            _ => 1,
        }
    }

    /// Returns a short machine-friendly name for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotReady { .. } => "not_ready",
            Self::Timeout { .. } => "timeout",
            Self::Staging { .. } => "staging",
            Self::RemoteOperation { .. } => "remote_operation",
            Self::ProvisioningFailure { .. } => "provisioning_failure",
            Self::EngineFailure { .. } => "engine_failure",
            Self::JobFailure { .. } => "job_failure",
            Self::TeardownFailed { .. } => "teardown_failed",
            Self::Cancelled(_) => "cancelled",
            Self::Io(_) => "io",
        }
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
}

/// Error raised when inputs fail validation before any remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Validation failed for {field}: {message}")]
pub struct ValidationError {
    /// The input field that failed.
    pub field: String,
    /// What was wrong with it.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Classification of a port-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The target does not exist.
    NotFound,
    /// The control plane refused the request (permissions, quota, bad input).
    Rejected,
    /// The request never got a definitive answer.
    Transport,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Rejected => write!(f, "rejected"),
            Self::Transport => write!(f, "transport"),
        }
    }
}

/// Error returned by control-plane and object-store ports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// The failure class.
    pub kind: RemoteErrorKind,
    /// The message reported by the remote side.
    pub message: String,
}

impl RemoteError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::NotFound,
            message: message.into(),
        }
    }

    /// Creates a rejected error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Rejected,
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Transport,
            message: message.into(),
        }
    }

    /// Returns true if the remote side reported the target as missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }
}

/// Result alias used across the crate.
pub type Result<T, E = StackrunError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("stack_name", "must start with a letter");
        assert_eq!(
            err.to_string(),
            "Validation failed for stack_name: must start with a letter"
        );
    }

    #[test]
    fn test_exit_codes() {
        let validation: StackrunError = ValidationError::new("template", "empty").into();
        assert_eq!(validation.exit_code(), 2);
        assert_eq!(StackrunError::Cancelled("ctrl-c".into()).exit_code(), 130);

        let job = StackrunError::JobFailure {
            job_id: "s-1".into(),
            state: "FAILED".into(),
            reason: None,
        };
        assert_eq!(job.exit_code(), 1);
    }

    #[test]
    fn test_job_failure_message_includes_reason() {
        let err = StackrunError::JobFailure {
            job_id: "s-1".into(),
            state: "FAILED".into(),
            reason: Some("exit code 1".into()),
        };
        assert_eq!(err.to_string(), "Job 's-1' ended with state FAILED: exit code 1");
    }

    #[test]
    fn test_remote_error_wrapping() {
        let err = StackrunError::remote(
            "delete_object",
            "s3://bucket/key",
            RemoteError::transport("connection reset"),
        );
        assert_eq!(
            err.to_string(),
            "delete_object failed for 's3://bucket/key': transport: connection reset"
        );
        assert_eq!(err.kind(), "remote_operation");
    }
}
