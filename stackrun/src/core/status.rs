//! Stack, engine, and job status enums.
//!
//! Each enum maps the raw strings reported by the control plane onto the
//! small state machine the orchestrator reasons about.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an infrastructure stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    /// The stack does not exist remotely.
    Absent,
    /// Creation, or the rollback of a failed creation, is in progress.
    Creating,
    /// Creation finished and outputs are available.
    Ready,
    /// Creation failed or was rolled back.
    CreateFailed,
    /// Deletion is in progress.
    Deleting,
    /// Deletion failed; the stack is stuck.
    DeleteFailed,
}

impl Default for StackStatus {
    fn default() -> Self {
        Self::Absent
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Creating => write!(f, "creating"),
            Self::Ready => write!(f, "ready"),
            Self::CreateFailed => write!(f, "create_failed"),
            Self::Deleting => write!(f, "deleting"),
            Self::DeleteFailed => write!(f, "delete_failed"),
        }
    }
}

impl StackStatus {
    /// Maps a control-plane stack status string.
    ///
    /// `None` means the control plane reported the stack as missing.
    #[must_use]
    pub fn from_remote(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Absent;
        };

        match raw {
            "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "IMPORT_COMPLETE" => Self::Ready,
            "DELETE_COMPLETE" => Self::Absent,
            "DELETE_IN_PROGRESS" => Self::Deleting,
            "DELETE_FAILED" => Self::DeleteFailed,
            // A rollback still moves; only its final state is a failure.
            s if s.ends_with("_IN_PROGRESS") => Self::Creating,
            s if s.starts_with("ROLLBACK_") || s.ends_with("_FAILED") => Self::CreateFailed,
            s if s.ends_with("_COMPLETE") => Self::Ready,
            _ => Self::Creating,
        }
    }

    /// Returns true if `await_ready` may stop polling on this status.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Creating)
    }
}

/// Readiness of the execution engine (the cluster running steps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    /// Still starting or bootstrapping.
    Starting,
    /// Idle and accepting steps.
    Waiting,
    /// Currently running a step.
    Busy,
    /// Shutting down or gone.
    Terminated,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Waiting => write!(f, "waiting"),
            Self::Busy => write!(f, "busy"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

impl EngineStatus {
    /// Maps a control-plane cluster state string.
    #[must_use]
    pub fn from_remote(raw: &str) -> Self {
        match raw {
            "WAITING" => Self::Waiting,
            "RUNNING" => Self::Busy,
            "TERMINATING" | "TERMINATED" | "TERMINATED_WITH_ERRORS" => Self::Terminated,
            _ => Self::Starting,
        }
    }

    /// Returns true if the engine can accept a step now.
    #[must_use]
    pub fn accepts_work(&self) -> bool {
        matches!(self, Self::Waiting)
    }
}

/// Status of a submitted job (step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted but not yet running.
    Pending,
    /// Running on the engine.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Cancelled or interrupted before finishing.
    Cancelled,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl JobStatus {
    /// Maps a control-plane step state string.
    #[must_use]
    pub fn from_remote(raw: &str) -> Self {
        match raw {
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Succeeded,
            "FAILED" => Self::Failed,
            "CANCELLED" | "INTERRUPTED" => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }

    /// Position in the pending → running → terminal order.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed | Self::Cancelled => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_status_from_remote() {
        assert_eq!(StackStatus::from_remote(None), StackStatus::Absent);
        assert_eq!(StackStatus::from_remote(Some("CREATE_IN_PROGRESS")), StackStatus::Creating);
        assert_eq!(StackStatus::from_remote(Some("CREATE_COMPLETE")), StackStatus::Ready);
        assert_eq!(StackStatus::from_remote(Some("CREATE_FAILED")), StackStatus::CreateFailed);
        assert_eq!(StackStatus::from_remote(Some("ROLLBACK_IN_PROGRESS")), StackStatus::Creating);
        assert_eq!(
            StackStatus::from_remote(Some("UPDATE_ROLLBACK_IN_PROGRESS")),
            StackStatus::Creating
        );
        assert_eq!(StackStatus::from_remote(Some("ROLLBACK_COMPLETE")), StackStatus::CreateFailed);
        assert_eq!(StackStatus::from_remote(Some("ROLLBACK_FAILED")), StackStatus::CreateFailed);
        assert_eq!(StackStatus::from_remote(Some("DELETE_IN_PROGRESS")), StackStatus::Deleting);
        assert_eq!(StackStatus::from_remote(Some("DELETE_COMPLETE")), StackStatus::Absent);
        assert_eq!(StackStatus::from_remote(Some("DELETE_FAILED")), StackStatus::DeleteFailed);
        assert_eq!(
            StackStatus::from_remote(Some("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS")),
            StackStatus::Creating
        );
    }

    #[test]
    fn test_stack_status_settled() {
        assert!(!StackStatus::Creating.is_settled());
        assert!(StackStatus::Ready.is_settled());
        assert!(StackStatus::CreateFailed.is_settled());
        assert!(!StackStatus::from_remote(Some("ROLLBACK_IN_PROGRESS")).is_settled());
    }

    #[test]
    fn test_engine_status_from_remote() {
        assert_eq!(EngineStatus::from_remote("STARTING"), EngineStatus::Starting);
        assert_eq!(EngineStatus::from_remote("BOOTSTRAPPING"), EngineStatus::Starting);
        assert_eq!(EngineStatus::from_remote("WAITING"), EngineStatus::Waiting);
        assert_eq!(EngineStatus::from_remote("TERMINATED_WITH_ERRORS"), EngineStatus::Terminated);
        assert!(EngineStatus::Waiting.accepts_work());
        assert!(!EngineStatus::Busy.accepts_work());
    }

    #[test]
    fn test_job_status_from_remote() {
        assert_eq!(JobStatus::from_remote("PENDING"), JobStatus::Pending);
        assert_eq!(JobStatus::from_remote("CANCEL_PENDING"), JobStatus::Pending);
        assert_eq!(JobStatus::from_remote("RUNNING"), JobStatus::Running);
        assert_eq!(JobStatus::from_remote("COMPLETED"), JobStatus::Succeeded);
        assert_eq!(JobStatus::from_remote("FAILED"), JobStatus::Failed);
        assert_eq!(JobStatus::from_remote("INTERRUPTED"), JobStatus::Cancelled);
    }

    #[test]
    fn test_job_status_is_terminal() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&StackStatus::CreateFailed).unwrap();
        assert_eq!(json, r#""create_failed""#);

        let deserialized: JobStatus = serde_json::from_str(r#""succeeded""#).unwrap();
        assert_eq!(deserialized, JobStatus::Succeeded);
    }
}
