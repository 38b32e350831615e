//! End-to-end runs against the in-memory control plane.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::Arc;

use stackrun::cancellation::CancellationToken;
use stackrun::core::{JobStatus, StackEvent, StackStatus};
use stackrun::errors::{RemoteError, StackrunError};
use stackrun::events::names;
use stackrun::lifecycle::{LifecycleOrchestrator, StackDisposition};
use stackrun::ports::{ControlPlane, StepApi, StepDescription, StepRequest};
use stackrun::testing::{fast_config, FakeControlPlane, ScriptedOperator, TestHarness, FAKE_BUCKET};

fn app_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("wordcount")
        .suffix(".py")
        .tempfile()
        .unwrap();
    file.write_all(b"from pyspark.sql import SparkSession\n").unwrap();
    file
}

fn failed_job_plane() -> FakeControlPlane {
    FakeControlPlane::new()
        .with_job_output(&["part-00000"])
        .with_step_states(vec![
            StepDescription::new("RUNNING"),
            StepDescription::new("FAILED").with_reason("Exception in thread main"),
        ])
}

fn rollback_plane() -> FakeControlPlane {
    let at = |s: i64| Utc.timestamp_opt(1_700_000_000 + s, 0).unwrap();
    FakeControlPlane::new()
        .with_stack_statuses(&[
            "CREATE_IN_PROGRESS",
            "ROLLBACK_IN_PROGRESS",
            "ROLLBACK_IN_PROGRESS",
            "ROLLBACK_COMPLETE",
        ])
        .with_events(vec![
            StackEvent::new(at(0), "test-stack", "CREATE_IN_PROGRESS"),
            StackEvent::new(at(5), "Cluster", "CREATE_FAILED").with_reason("Instance type not supported"),
            StackEvent::new(at(9), "test-stack", "ROLLBACK_COMPLETE"),
        ])
}

#[tokio::test]
async fn successful_run_cleans_up_and_deletes_stack_without_prompt() {
    let harness = TestHarness::new(
        FakeControlPlane::new()
            .with_stack_statuses(&["CREATE_IN_PROGRESS", "CREATE_COMPLETE"])
            .with_engine_states(&["STARTING", "WAITING"])
            .with_job_output(&["part-00000", "_SUCCESS"])
            .with_step_states(vec![
                StepDescription::new("PENDING"),
                StepDescription::new("RUNNING"),
                StepDescription::new("COMPLETED"),
            ]),
    );
    let app = app_file();

    let outcome = harness
        .orchestrator()
        .run(&harness.request(app.path()), &CancellationToken::new())
        .await;

    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.failure.is_none());
    assert_eq!(outcome.disposition, StackDisposition::Deleted);
    assert!(outcome.cleanup.is_clean());
    assert_eq!(outcome.job.as_ref().map(|j| j.status), Some(JobStatus::Succeeded));
    assert!(!outcome.artifact.as_ref().unwrap().exists);
    assert!(outcome.output.as_ref().unwrap().purged);

    assert!(harness.plane.object_uris().is_empty());
    assert!(!harness.plane.stack_exists());
    assert!(harness.operator.prompts().is_empty());
    assert_eq!(harness.plane.count("create_stack"), 1);
    assert_eq!(harness.plane.count("submit_step"), 1);
    assert_eq!(harness.plane.count("delete_object"), 1);
    assert_eq!(harness.plane.count("terminate_engine"), 0);
}

#[tokio::test]
async fn successful_run_orders_lifecycle_events() {
    let harness = TestHarness::new(FakeControlPlane::new().with_job_output(&["part-00000"]));
    let app = app_file();

    harness
        .orchestrator()
        .run(&harness.request(app.path()), &CancellationToken::new())
        .await;

    assert_eq!(
        harness.sink.event_types(),
        vec![
            names::STACK_LAUNCHED,
            names::STACK_READY,
            names::ENGINE_READY,
            names::ARTIFACT_STAGED,
            names::JOB_SUBMITTED,
            names::JOB_FINISHED,
            names::ARTIFACT_UNSTAGED,
            names::OUTPUT_PURGED,
            names::STACK_DELETED,
            names::RUN_FINISHED,
        ]
    );
    let run_ids: Vec<_> = harness.sink.events().iter().map(|e| e.run_id).collect();
    assert!(run_ids.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn remote_calls_respect_ordering() {
    let harness = TestHarness::new(
        FakeControlPlane::new()
            .with_step_states(vec![StepDescription::new("RUNNING"), StepDescription::new("COMPLETED")]),
    );
    let app = app_file();

    harness
        .orchestrator()
        .run(&harness.request(app.path()), &CancellationToken::new())
        .await;

    let ops = harness.plane.operations();
    let first = |op: &str| ops.iter().position(|o| o == op).unwrap();
    let last = |op: &str| ops.iter().rposition(|o| o == op).unwrap();

    assert!(first("describe_stack") < first("put_object"));
    assert!(last("describe_engine") < first("put_object"));
    assert!(first("put_object") < first("submit_step"));
    assert!(last("describe_step") < first("delete_object"));
    assert!(last("describe_step") < first("list_keys"));
    assert!(first("delete_object") < first("delete_stack"));
}

#[tokio::test]
async fn provisioning_failure_prints_diagnostics_and_keeps_stack_when_declined() {
    let harness = TestHarness::new(rollback_plane());
    let app = app_file();

    let outcome = harness
        .orchestrator()
        .run(&harness.request(app.path()), &CancellationToken::new())
        .await;

    assert_eq!(outcome.exit_code, 1);
    assert!(matches!(outcome.failure, Some(StackrunError::ProvisioningFailure { .. })));
    assert_eq!(outcome.disposition, StackDisposition::Retained);
    assert_eq!(outcome.stack.as_ref().map(|s| s.status), Some(StackStatus::CreateFailed));

    assert_eq!(harness.plane.count("put_object"), 0);
    assert_eq!(harness.plane.count("submit_step"), 0);
    assert_eq!(harness.plane.count("delete_stack"), 0);
    assert!(harness.plane.stack_exists());

    assert_eq!(harness.operator.prompts(), vec!["Delete stack 'test-stack'? [y/N]"]);
    assert_eq!(harness.plane.count("describe_stack"), 4);
    assert!(harness.operator.reported("Stack status: ROLLBACK_COMPLETE"));
    assert!(harness.operator.reported("Cluster CREATE_FAILED Instance type not supported"));

    let lines = harness.operator.lines();
    let newest = lines.iter().position(|l| l.contains("test-stack ROLLBACK_COMPLETE")).unwrap();
    let oldest = lines.iter().position(|l| l.contains("test-stack CREATE_IN_PROGRESS")).unwrap();
    assert!(newest < oldest);
    assert_eq!(harness.sink.count(names::STACK_FAILED), 1);
}

#[tokio::test]
async fn provisioning_failure_tears_down_when_confirmed() {
    let harness = TestHarness::new(rollback_plane()).with_operator(ScriptedOperator::answering(&[true]));
    let app = app_file();

    let outcome = harness
        .orchestrator()
        .run(&harness.request(app.path()), &CancellationToken::new())
        .await;

    assert_eq!(outcome.exit_code, 1);
    assert!(outcome.stack_deleted());
    assert_eq!(harness.plane.count("delete_stack"), 1);
    assert!(!harness.plane.stack_exists());
    assert!(harness.sink.position(names::TEARDOWN_OFFERED) < harness.sink.position(names::STACK_DELETED));
}

#[tokio::test]
async fn job_failure_still_purges_everything_and_offers_teardown() {
    let harness = TestHarness::new(failed_job_plane()).with_operator(ScriptedOperator::answering(&[true]));
    let app = app_file();

    let outcome = harness
        .orchestrator()
        .run(&harness.request(app.path()), &CancellationToken::new())
        .await;

    assert_eq!(outcome.exit_code, 1);
    match outcome.failure {
        Some(StackrunError::JobFailure { ref state, ref reason, .. }) => {
            assert_eq!(state, "FAILED");
            assert_eq!(reason.as_deref(), Some("Exception in thread main"));
        }
        ref other => panic!("expected job failure, got {other:?}"),
    }
    assert!(harness.plane.object_uris().is_empty());
    assert_eq!(harness.plane.count("terminate_engine"), 1);
    assert_eq!(harness.operator.prompts().len(), 1);
    assert!(harness.operator.reported("Stack status: CREATE_COMPLETE"));
    assert!(harness.operator.reported("Exception in thread main"));
    assert!(outcome.stack_deleted());
}

#[tokio::test]
async fn job_failure_can_leave_engine_running() {
    let harness = TestHarness::new(failed_job_plane())
        .with_config(fast_config().with_terminate_engine_on_failure(false));
    let app = app_file();

    let outcome = harness
        .orchestrator()
        .run(&harness.request(app.path()), &CancellationToken::new())
        .await;

    assert_eq!(outcome.exit_code, 1);
    assert_eq!(harness.plane.count("terminate_engine"), 0);
    assert_eq!(outcome.disposition, StackDisposition::Retained);
}

#[tokio::test]
async fn validation_failure_makes_no_remote_call() {
    let harness = TestHarness::new(FakeControlPlane::new());
    let app = app_file();
    let request = harness.request(app.path()).with_stack_name("not_a_valid_name");

    let outcome = harness.orchestrator().run(&request, &CancellationToken::new()).await;

    assert_eq!(outcome.exit_code, 2);
    assert_eq!(outcome.disposition, StackDisposition::NeverCreated);
    assert!(harness.plane.calls().is_empty());
    assert!(harness.operator.prompts().is_empty());
    assert!(harness.operator.reported("Error: Validation failed for stack_name"));
}

#[tokio::test]
async fn launch_rejection_skips_teardown() {
    let harness = TestHarness::new(
        FakeControlPlane::new().failing("create_stack", RemoteError::rejected("InsufficientCapabilities")),
    );
    let app = app_file();

    let outcome = harness
        .orchestrator()
        .run(&harness.request(app.path()), &CancellationToken::new())
        .await;

    assert_eq!(outcome.exit_code, 1);
    assert_eq!(outcome.disposition, StackDisposition::NeverCreated);
    assert_eq!(harness.plane.operations(), vec!["create_stack"]);
    assert!(harness.operator.prompts().is_empty());
    assert_eq!(harness.operator.lines().len(), 1);
    assert!(harness.operator.reported("Error: "));
    assert!(harness.operator.reported("InsufficientCapabilities"));
}

#[tokio::test]
async fn missing_artifact_fails_before_submission() {
    let harness = TestHarness::new(FakeControlPlane::new());
    let dir = tempfile::tempdir().unwrap();

    let outcome = harness
        .orchestrator()
        .run(&harness.request(&dir.path().join("missing.py")), &CancellationToken::new())
        .await;

    assert_eq!(outcome.exit_code, 1);
    assert!(matches!(outcome.failure, Some(StackrunError::Staging { .. })));
    assert!(outcome.artifact.is_none());
    assert!(outcome.output.is_none());
    assert_eq!(harness.plane.count("submit_step"), 0);
}

#[tokio::test]
async fn stack_timeout_is_reported_and_offered_for_teardown() {
    let harness = TestHarness::new(FakeControlPlane::new().with_stack_statuses(&["CREATE_IN_PROGRESS"]));
    let app = app_file();

    let outcome = harness
        .orchestrator()
        .run(&harness.request(app.path()), &CancellationToken::new())
        .await;

    assert_eq!(outcome.exit_code, 1);
    assert!(matches!(outcome.failure, Some(StackrunError::Timeout { polls: 20, .. })));
    assert_eq!(harness.operator.prompts().len(), 1);
    assert_eq!(harness.plane.count("delete_stack"), 0);
}

#[tokio::test]
async fn cleanup_failure_does_not_change_exit_code() {
    let harness = TestHarness::new(
        FakeControlPlane::new().failing("delete_object", RemoteError::transport("connection reset")),
    );
    let app = app_file();

    let outcome = harness
        .orchestrator()
        .run(&harness.request(app.path()), &CancellationToken::new())
        .await;

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.cleanup.failures().len(), 1);
    assert_eq!(outcome.cleanup.failures()[0].0, "unstage artifact");
    assert_eq!(
        outcome.cleanup.completed_actions(),
        &["purge output".to_string(), "delete stack".to_string()]
    );
    assert!(outcome.stack_deleted());
    assert_eq!(harness.sink.count(names::CLEANUP_FAILED), 1);
    assert!(harness.operator.reported("Cleanup warning"));
}

#[tokio::test]
async fn teardown_failure_is_a_cleanup_warning() {
    let harness = TestHarness::new(FakeControlPlane::new().with_delete_statuses(&[Some("DELETE_FAILED")]));
    let app = app_file();

    let outcome = harness
        .orchestrator()
        .run(&harness.request(app.path()), &CancellationToken::new())
        .await;

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.disposition, StackDisposition::TeardownFailed);
    assert_eq!(outcome.cleanup.failures()[0].0, "delete stack");
    assert_eq!(
        outcome.cleanup.completed_actions(),
        &["unstage artifact".to_string(), "purge output".to_string()]
    );
    assert!(harness.operator.reported("Teardown warning"));
    let failed = harness
        .sink
        .events()
        .into_iter()
        .find(|e| e.event_type == names::CLEANUP_FAILED)
        .unwrap();
    assert_eq!(failed.field("action"), Some("delete stack"));
}

/// Step port that interrupts the run the first time the job is polled.
struct InterruptingSteps {
    inner: Arc<FakeControlPlane>,
    token: Arc<CancellationToken>,
}

#[async_trait]
impl StepApi for InterruptingSteps {
    async fn describe_engine(&self, engine_id: &str) -> Result<String, RemoteError> {
        self.inner.describe_engine(engine_id).await
    }

    async fn submit_step(&self, engine_id: &str, request: &StepRequest) -> Result<String, RemoteError> {
        self.inner.submit_step(engine_id, request).await
    }

    async fn describe_step(&self, engine_id: &str, step_id: &str) -> Result<StepDescription, RemoteError> {
        self.token.cancel("Interrupted by operator");
        self.inner.describe_step(engine_id, step_id).await
    }

    async fn terminate_engine(&self, engine_id: &str) -> Result<(), RemoteError> {
        self.inner.terminate_engine(engine_id).await
    }
}

#[tokio::test]
async fn interrupt_during_job_wait_still_cleans_up() {
    let harness = TestHarness::new(
        FakeControlPlane::new()
            .with_job_output(&["part-00000"])
            .with_step_states(vec![StepDescription::new("RUNNING")]),
    );
    let token = Arc::new(CancellationToken::new());
    let plane = ControlPlane::new(
        harness.plane.clone(),
        Arc::new(InterruptingSteps {
            inner: harness.plane.clone(),
            token: token.clone(),
        }),
        harness.plane.clone(),
    );
    let orchestrator = LifecycleOrchestrator::new(
        plane,
        harness.config.clone(),
        harness.operator.clone(),
        harness.sink.clone(),
    );
    let app = app_file();

    let outcome = orchestrator.run(&harness.request(app.path()), &token).await;

    assert_eq!(outcome.exit_code, 130);
    assert!(matches!(outcome.failure, Some(StackrunError::Cancelled(ref reason)) if reason == "Interrupted by operator"));
    assert_eq!(harness.plane.count("describe_step"), 1);
    assert!(harness.plane.object_uris().is_empty());
    assert_eq!(harness.operator.prompts().len(), 1);
    assert_eq!(outcome.job.as_ref().map(|j| j.status), Some(JobStatus::Running));
}

#[tokio::test]
async fn interrupt_before_launch_creates_nothing() {
    let harness = TestHarness::new(FakeControlPlane::new());
    let token = CancellationToken::new();
    token.cancel("Interrupted by operator");
    let app = app_file();

    let outcome = harness.orchestrator().run(&harness.request(app.path()), &token).await;

    assert_eq!(outcome.exit_code, 130);
    assert!(harness.plane.calls().is_empty());
}

#[tokio::test]
async fn artifact_lands_in_stack_bucket() {
    let harness = TestHarness::new(FakeControlPlane::new());
    let app = app_file();

    let outcome = harness
        .orchestrator()
        .run(&harness.request(app.path()), &CancellationToken::new())
        .await;

    let artifact = outcome.artifact.unwrap();
    let name = app.path().file_name().unwrap().to_str().unwrap();
    assert_eq!(artifact.location.bucket, FAKE_BUCKET);
    assert_eq!(artifact.location.key, format!("apps/test-stack/{name}"));
    assert_eq!(
        outcome.output.unwrap().location.uri(),
        format!("s3://{FAKE_BUCKET}/outputs/test-stack/wordcount/")
    );
    let step = &harness.plane.submitted_steps()[0];
    assert_eq!(step.name, "wordcount");
    assert_eq!(step.args[1], artifact.location.uri());
}
