//! Stack creation, observation, and teardown.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cancellation::CancellationToken;
use crate::config::{RunConfig, WaitPolicy};
use crate::core::{StackDiagnostics, StackHandle, StackStatus};
use crate::errors::{Result, StackrunError};
use crate::ports::{CreateStackRequest, StackApi, StackResource};
use crate::template::{validate_launch, StackParameter, TemplateSource};

/// Capability acknowledged so templates may create named IAM resources.
pub const NAMED_IAM_CAPABILITY: &str = "CAPABILITY_NAMED_IAM";

const BUCKET_RESOURCE: &str = "AWS::S3::Bucket";
const ENGINE_RESOURCE: &str = "AWS::EMR::Cluster";

/// Drives a stack through its lifecycle.
pub struct StackController {
    stacks: Arc<dyn StackApi>,
    config: Arc<RunConfig>,
}

impl StackController {
    /// Creates a controller over a stack port.
    #[must_use]
    pub fn new(stacks: Arc<dyn StackApi>, config: Arc<RunConfig>) -> Self {
        Self { stacks, config }
    }

    /// Validates the inputs and requests stack creation.
    ///
    /// Validation failures are returned before any remote call.
    pub async fn launch(
        &self,
        template: &TemplateSource,
        parameters: &[StackParameter],
        name: &str,
    ) -> Result<StackHandle> {
        validate_launch(template, parameters, name)?;

        let request = CreateStackRequest {
            name: name.to_string(),
            template_body: template.body.clone(),
            parameters: parameters.to_vec(),
            capabilities: vec![NAMED_IAM_CAPABILITY.to_string()],
        };
        let stack_id = self
            .stacks
            .create_stack(&request)
            .await
            .map_err(|e| StackrunError::remote("create_stack", name, e))?;

        info!(stack = %name, stack_id = %stack_id, region = %self.config.region, "Stack creation started");
        let mut handle = StackHandle::new(name, &self.config.region);
        handle.observe(Some("CREATE_IN_PROGRESS"));
        Ok(handle)
    }

    /// Polls until the stack is ready, then resolves its outputs.
    pub async fn await_ready(
        &self,
        handle: &mut StackHandle,
        policy: WaitPolicy,
        token: &CancellationToken,
    ) -> Result<()> {
        let max_polls = policy.max_polls();
        let mut polls = 0;
        let description = loop {
            token.check()?;
            let description = self
                .stacks
                .describe_stack(&handle.name)
                .await
                .map_err(|e| StackrunError::remote("describe_stack", &handle.name, e))?;
            polls += 1;
            handle.observe(description.as_ref().map(|d| d.status.as_str()));
            debug!(stack = %handle.name, status = %handle.raw_status, poll = polls, "Polled stack");

            if handle.status.is_settled() {
                break description;
            }
            if polls >= max_polls {
                return Err(StackrunError::Timeout {
                    operation: "stack creation".to_string(),
                    resource: handle.name.clone(),
                    polls,
                    last_status: handle.raw_status.clone(),
                });
            }
            token.sleep(policy.interval()).await?;
        };

        let Some(description) = description.filter(|_| handle.is_ready()) else {
            warn!(stack = %handle.name, status = %handle.raw_status, "Stack failed to provision");
            let diagnostics = self.diagnostics(handle, self.config.max_events).await;
            return Err(StackrunError::ProvisioningFailure {
                stack: handle.name.clone(),
                diagnostics,
            });
        };

        handle.outputs = description.outputs;
        self.resolve_resources(handle).await?;
        info!(
            stack = %handle.name,
            bucket = handle.artifact_bucket.as_deref().unwrap_or("-"),
            engine = handle.engine_id.as_deref().unwrap_or("-"),
            "Stack is ready"
        );
        Ok(())
    }

    async fn resolve_resources(&self, handle: &mut StackHandle) -> Result<()> {
        handle.artifact_bucket = handle.outputs.get(&self.config.bucket_output_key).cloned();
        handle.engine_id = handle.outputs.get(&self.config.engine_output_key).cloned();
        if handle.artifact_bucket.is_some() && handle.engine_id.is_some() {
            return Ok(());
        }

        debug!(stack = %handle.name, "Outputs incomplete, falling back to stack resources");
        let resources = self
            .stacks
            .list_resources(&handle.name)
            .await
            .map_err(|e| StackrunError::remote("list_resources", &handle.name, e))?;
        if handle.artifact_bucket.is_none() {
            handle.artifact_bucket = physical_id_of(&resources, BUCKET_RESOURCE);
        }
        if handle.engine_id.is_none() {
            handle.engine_id = physical_id_of(&resources, ENGINE_RESOURCE);
        }
        Ok(())
    }

    /// Re-reads the stack's current status.
    pub async fn refresh(&self, handle: &mut StackHandle) -> Result<()> {
        let description = self
            .stacks
            .describe_stack(&handle.name)
            .await
            .map_err(|e| StackrunError::remote("describe_stack", &handle.name, e))?;
        handle.observe(description.as_ref().map(|d| d.status.as_str()));
        Ok(())
    }

    /// Returns the stack outputs. Only valid once the stack is ready.
    pub fn outputs<'a>(&self, handle: &'a StackHandle) -> Result<&'a BTreeMap<String, String>> {
        if handle.is_ready() {
            Ok(&handle.outputs)
        } else {
            Err(StackrunError::not_ready(
                format!("stack '{}'", handle.name),
                format!("outputs need status ready, is {}", handle.status),
            ))
        }
    }

    /// Collects the raw status and most recent events of a stack.
    ///
    /// Never fails: an unreadable event feed yields no events.
    pub async fn diagnostics(&self, handle: &StackHandle, max_events: usize) -> StackDiagnostics {
        let events = match self.stacks.list_events(&handle.name).await {
            Ok(events) => events,
            Err(e) => {
                warn!(stack = %handle.name, error = %e, "Could not read stack events");
                Vec::new()
            }
        };
        StackDiagnostics::from_feed(handle.raw_status.clone(), events, max_events)
    }

    /// Deletes the stack and waits for it to disappear.
    ///
    /// An already-absent stack is a no-op.
    pub async fn teardown(&self, handle: &mut StackHandle, policy: WaitPolicy) -> Result<()> {
        self.refresh(handle).await?;
        if handle.status == StackStatus::Absent {
            info!(stack = %handle.name, "Stack already absent");
            return Ok(());
        }

        self.stacks
            .delete_stack(&handle.name)
            .await
            .map_err(|e| StackrunError::remote("delete_stack", &handle.name, e))?;
        handle.status = StackStatus::Deleting;
        info!(stack = %handle.name, "Stack deletion started");

        let max_polls = policy.max_polls();
        let mut polls = 0;
        loop {
            tokio::time::sleep(policy.interval()).await;
            let description = self
                .stacks
                .describe_stack(&handle.name)
                .await
                .map_err(|e| StackrunError::remote("describe_stack", &handle.name, e))?;
            polls += 1;
            handle.observe(description.as_ref().map(|d| d.status.as_str()));
            debug!(stack = %handle.name, status = %handle.raw_status, poll = polls, "Polled stack deletion");

            match handle.status {
                StackStatus::Absent => {
                    handle.outputs.clear();
                    info!(stack = %handle.name, "Stack deleted");
                    return Ok(());
                }
                StackStatus::DeleteFailed => {
                    return Err(StackrunError::TeardownFailed {
                        stack: handle.name.clone(),
                        status: handle.raw_status.clone(),
                    });
                }
                _ if polls >= max_polls => {
                    return Err(StackrunError::Timeout {
                        operation: "stack deletion".to_string(),
                        resource: handle.name.clone(),
                        polls,
                        last_status: handle.raw_status.clone(),
                    });
                }
                _ => {}
            }
        }
    }
}

fn physical_id_of(resources: &[StackResource], resource_type: &str) -> Option<String> {
    resources
        .iter()
        .filter(|r| r.resource_type == resource_type)
        .find_map(|r| r.physical_id.clone())
}

impl std::fmt::Debug for StackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackController")
            .field("region", &self.config.region)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StackEvent;
    use crate::errors::RemoteError;
    use crate::testing::{fast_config, minimal_template, FakeControlPlane, FAKE_BUCKET, FAKE_ENGINE};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn controller(fake: &Arc<FakeControlPlane>) -> StackController {
        StackController::new(fake.clone(), Arc::new(fast_config()))
    }

    fn quick(polls: u32) -> WaitPolicy {
        WaitPolicy::polls(Duration::from_millis(1), polls)
    }

    #[tokio::test]
    async fn test_launch_requests_named_iam() {
        let fake = Arc::new(FakeControlPlane::new());
        let handle = controller(&fake)
            .launch(&minimal_template(), &[], "demo-stack")
            .await
            .unwrap();

        assert_eq!(handle.status, StackStatus::Creating);
        assert_eq!(handle.name, "demo-stack");
        assert_eq!(fake.operations(), vec!["create_stack"]);
    }

    #[tokio::test]
    async fn test_launch_invalid_name_makes_no_remote_call() {
        let fake = Arc::new(FakeControlPlane::new());
        let err = controller(&fake)
            .launch(&minimal_template(), &[], "1-bad_name")
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 2);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_launch_rejected_is_remote_error() {
        let fake = Arc::new(
            FakeControlPlane::new().failing("create_stack", RemoteError::rejected("AlreadyExistsException")),
        );
        let err = controller(&fake)
            .launch(&minimal_template(), &[], "demo-stack")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "remote_operation");
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_await_ready_resolves_outputs() {
        let fake = Arc::new(FakeControlPlane::new().with_stack_statuses(&[
            "CREATE_IN_PROGRESS",
            "CREATE_IN_PROGRESS",
            "CREATE_COMPLETE",
        ]));
        let controller = controller(&fake);
        let mut handle = controller.launch(&minimal_template(), &[], "demo-stack").await.unwrap();

        controller
            .await_ready(&mut handle, quick(10), &CancellationToken::new())
            .await
            .unwrap();

        assert!(handle.is_ready());
        assert_eq!(fake.count("describe_stack"), 3);
        assert_eq!(handle.artifact_bucket.as_deref(), Some(FAKE_BUCKET));
        assert_eq!(handle.engine_id.as_deref(), Some(FAKE_ENGINE));
        assert_eq!(fake.count("list_resources"), 0);
        assert!(controller.outputs(&handle).unwrap().contains_key("ClusterId"));
    }

    #[tokio::test]
    async fn test_await_ready_falls_back_to_resources() {
        let fake = Arc::new(
            FakeControlPlane::new()
                .with_outputs(&[])
                .with_resources(vec![
                    StackResource {
                        logical_id: "Role".into(),
                        resource_type: "AWS::IAM::Role".into(),
                        physical_id: Some("role".into()),
                    },
                    StackResource {
                        logical_id: "Bucket".into(),
                        resource_type: "AWS::S3::Bucket".into(),
                        physical_id: Some("fallback-bucket".into()),
                    },
                    StackResource {
                        logical_id: "Cluster".into(),
                        resource_type: "AWS::EMR::Cluster".into(),
                        physical_id: Some("j-FALLBACK".into()),
                    },
                ]),
        );
        let controller = controller(&fake);
        let mut handle = controller.launch(&minimal_template(), &[], "demo-stack").await.unwrap();

        controller
            .await_ready(&mut handle, quick(3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(handle.artifact_bucket.as_deref(), Some("fallback-bucket"));
        assert_eq!(handle.engine_id.as_deref(), Some("j-FALLBACK"));
    }

    #[tokio::test]
    async fn test_await_ready_times_out_after_budget() {
        let fake = Arc::new(FakeControlPlane::new().with_stack_statuses(&["CREATE_IN_PROGRESS"]));
        let controller = controller(&fake);
        let mut handle = controller.launch(&minimal_template(), &[], "demo-stack").await.unwrap();

        let err = controller
            .await_ready(&mut handle, quick(4), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            StackrunError::Timeout { polls, last_status, .. } => {
                assert_eq!(polls, 4);
                assert_eq!(last_status, "CREATE_IN_PROGRESS");
            }
            other => panic!("expected timeout, got {other}"),
        }
        assert_eq!(fake.count("describe_stack"), 4);
        assert_eq!(fake.count("delete_stack"), 0);
    }

    #[tokio::test]
    async fn test_await_ready_failure_carries_diagnostics() {
        let at = |s: i64| Utc.timestamp_opt(1_700_000_000 + s, 0).unwrap();
        let fake = Arc::new(
            FakeControlPlane::new()
                .with_stack_statuses(&["CREATE_IN_PROGRESS", "ROLLBACK_COMPLETE"])
                .with_events(vec![
                    StackEvent::new(at(1), "Cluster", "CREATE_FAILED").with_reason("quota exceeded"),
                    StackEvent::new(at(2), "demo-stack", "ROLLBACK_COMPLETE"),
                ]),
        );
        let controller = controller(&fake);
        let mut handle = controller.launch(&minimal_template(), &[], "demo-stack").await.unwrap();

        let err = controller
            .await_ready(&mut handle, quick(10), &CancellationToken::new())
            .await
            .unwrap_err();

        let StackrunError::ProvisioningFailure { diagnostics, .. } = err else {
            panic!("expected provisioning failure");
        };
        assert_eq!(diagnostics.status, "ROLLBACK_COMPLETE");
        assert_eq!(diagnostics.events.len(), 2);
        assert_eq!(diagnostics.events[0].logical_resource_id, "demo-stack");
        assert_eq!(handle.status, StackStatus::CreateFailed);
    }

    #[tokio::test]
    async fn test_await_ready_waits_out_rollback() {
        let fake = Arc::new(FakeControlPlane::new().with_stack_statuses(&[
            "CREATE_IN_PROGRESS",
            "ROLLBACK_IN_PROGRESS",
            "ROLLBACK_IN_PROGRESS",
            "ROLLBACK_COMPLETE",
        ]));
        let controller = controller(&fake);
        let mut handle = controller.launch(&minimal_template(), &[], "demo-stack").await.unwrap();

        let err = controller
            .await_ready(&mut handle, quick(10), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, StackrunError::ProvisioningFailure { .. }));
        assert_eq!(fake.count("describe_stack"), 4);
        assert_eq!(handle.raw_status, "ROLLBACK_COMPLETE");
        assert_eq!(handle.status, StackStatus::CreateFailed);
    }

    #[tokio::test]
    async fn test_await_ready_observes_cancellation() {
        let fake = Arc::new(FakeControlPlane::new().with_stack_statuses(&["CREATE_IN_PROGRESS"]));
        let controller = controller(&fake);
        let mut handle = controller.launch(&minimal_template(), &[], "demo-stack").await.unwrap();
        let token = CancellationToken::new();
        token.cancel("interrupted");

        let err = controller.await_ready(&mut handle, quick(10), &token).await.unwrap_err();
        assert_eq!(err.exit_code(), 130);
        assert_eq!(fake.count("describe_stack"), 0);
    }

    #[tokio::test]
    async fn test_outputs_before_ready_is_not_ready() {
        let fake = Arc::new(FakeControlPlane::new());
        let handle = StackHandle::new("demo-stack", "us-east-1");
        let err = controller(&fake).outputs(&handle).unwrap_err();
        assert_eq!(err.kind(), "not_ready");
    }

    #[tokio::test]
    async fn test_teardown_absent_stack_is_noop() {
        let fake = Arc::new(FakeControlPlane::new());
        let mut handle = StackHandle::new("demo-stack", "us-east-1");

        controller(&fake).teardown(&mut handle, quick(3)).await.unwrap();
        assert_eq!(fake.count("delete_stack"), 0);
    }

    #[tokio::test]
    async fn test_teardown_waits_for_absent() {
        let fake = Arc::new(
            FakeControlPlane::new().with_delete_statuses(&[Some("DELETE_IN_PROGRESS"), None]),
        );
        let controller = controller(&fake);
        let mut handle = controller.launch(&minimal_template(), &[], "demo-stack").await.unwrap();

        controller.teardown(&mut handle, quick(5)).await.unwrap();

        assert_eq!(handle.status, StackStatus::Absent);
        assert_eq!(fake.count("delete_stack"), 1);
        assert!(!fake.stack_exists());

        controller.teardown(&mut handle, quick(5)).await.unwrap();
        assert_eq!(fake.count("delete_stack"), 1);
    }

    #[tokio::test]
    async fn test_teardown_delete_failed() {
        let fake = Arc::new(FakeControlPlane::new().with_delete_statuses(&[Some("DELETE_FAILED")]));
        let controller = controller(&fake);
        let mut handle = controller.launch(&minimal_template(), &[], "demo-stack").await.unwrap();

        let err = controller.teardown(&mut handle, quick(5)).await.unwrap_err();
        assert!(matches!(err, StackrunError::TeardownFailed { ref status, .. } if status == "DELETE_FAILED"));
    }
}
