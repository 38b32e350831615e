//! Sequencing of a full run with an always-run cleanup phase.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{ArtifactStager, JobSubmitter, StackController};
use crate::cancellation::{CancellationToken, CleanupReport};
use crate::config::RunConfig;
use crate::core::{ArtifactRef, JobRef, ObjectLocation, OutputRef, StackDiagnostics, StackHandle};
use crate::errors::{Result, StackrunError};
use crate::events::{names, EventSink, RunEvent};
use crate::operator::Operator;
use crate::ports::ControlPlane;
use crate::template::{StackParameter, TemplateSource};
use crate::utils::default_stack_name;

/// Everything a single run needs from its caller.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// The stack template.
    pub template: TemplateSource,
    /// Template parameters.
    pub parameters: Vec<StackParameter>,
    /// Name of the stack to create.
    pub stack_name: String,
    /// Name of the submitted step.
    pub job_name: String,
    /// The local job artifact.
    pub app_path: PathBuf,
    /// Arguments forwarded to the job.
    pub app_args: Vec<String>,
}

impl RunRequest {
    /// Creates a request with no parameters or arguments and a
    /// timestamped stack name.
    #[must_use]
    pub fn new(template: TemplateSource, job_name: impl Into<String>, app_path: impl Into<PathBuf>) -> Self {
        Self {
            template,
            parameters: Vec::new(),
            stack_name: default_stack_name(),
            job_name: job_name.into(),
            app_path: app_path.into(),
            app_args: Vec::new(),
        }
    }

    /// Sets the template parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<StackParameter>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the stack name.
    #[must_use]
    pub fn with_stack_name(mut self, name: impl Into<String>) -> Self {
        self.stack_name = name.into();
        self
    }

    /// Sets the arguments forwarded to the job.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.app_args = args;
        self
    }
}

/// What the run decided about its stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackDisposition {
    /// No stack was created.
    NeverCreated,
    /// The stack was deleted.
    Deleted,
    /// The operator kept the stack for inspection.
    Retained,
    /// Deletion was attempted and failed.
    TeardownFailed,
}

/// The result of a run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Identifier attached to every event of the run.
    pub run_id: Uuid,
    /// Process exit code: 0, 1, 2, or 130.
    pub exit_code: i32,
    /// The failure that ended forward progress, if any.
    pub failure: Option<StackrunError>,
    /// The stack, if one was created.
    pub stack: Option<StackHandle>,
    /// The submitted job, if any.
    pub job: Option<JobRef>,
    /// The staged artifact, if any.
    pub artifact: Option<ArtifactRef>,
    /// The designated output prefix, if any.
    pub output: Option<OutputRef>,
    /// What happened during cleanup.
    pub cleanup: CleanupReport,
    /// What happened to the stack.
    pub disposition: StackDisposition,
}

impl RunOutcome {
    /// Returns true if the job succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns true if the stack was deleted.
    #[must_use]
    pub fn stack_deleted(&self) -> bool {
        self.disposition == StackDisposition::Deleted
    }
}

/// Resources the run has created so far.
#[derive(Debug, Default)]
struct RunLedger {
    stack: Option<StackHandle>,
    artifact: Option<ArtifactRef>,
    output: Option<OutputRef>,
    job: Option<JobRef>,
}

/// Runs one job on a freshly provisioned stack and cleans up after it.
pub struct LifecycleOrchestrator {
    config: Arc<RunConfig>,
    stacks: StackController,
    stager: ArtifactStager,
    jobs: JobSubmitter,
    operator: Arc<dyn Operator>,
    sink: Arc<dyn EventSink>,
}

impl LifecycleOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        plane: ControlPlane,
        config: RunConfig,
        operator: Arc<dyn Operator>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            stacks: StackController::new(plane.stacks, config.clone()),
            stager: ArtifactStager::new(plane.objects, config.clone()),
            jobs: JobSubmitter::new(plane.steps, config.clone()),
            config,
            operator,
            sink,
        }
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Executes a run.
    ///
    /// Never returns early: every resource the run created is cleaned up
    /// before the outcome is returned, whatever the main sequence did.
    pub async fn run(&self, request: &RunRequest, token: &CancellationToken) -> RunOutcome {
        let run_id = Uuid::now_v7();
        info!(%run_id, stack = %request.stack_name, job = %request.job_name, "Starting run");

        let mut ledger = RunLedger::default();
        let failure = self.execute(run_id, request, token, &mut ledger).await.err();
        if let Some(failure) = &failure {
            error!(%run_id, kind = failure.kind(), error = %failure, "Run failed");
        }

        let mut cleanup = CleanupReport::new();
        let disposition = self
            .clean_up(run_id, &mut ledger, failure.as_ref(), &mut cleanup)
            .await;

        let exit_code = failure.as_ref().map_or(0, StackrunError::exit_code);
        self.emit(
            RunEvent::new(names::RUN_FINISHED, run_id)
                .with("exit_code", exit_code)
                .with("cleanup_failures", cleanup.failures().len()),
        )
        .await;
        info!(%run_id, exit_code, "Run finished");

        RunOutcome {
            run_id,
            exit_code,
            failure,
            stack: ledger.stack,
            job: ledger.job,
            artifact: ledger.artifact,
            output: ledger.output,
            cleanup,
            disposition,
        }
    }

    async fn execute(
        &self,
        run_id: Uuid,
        request: &RunRequest,
        token: &CancellationToken,
        ledger: &mut RunLedger,
    ) -> Result<()> {
        token.check()?;
        let handle = self
            .stacks
            .launch(&request.template, &request.parameters, &request.stack_name)
            .await?;
        let stack = ledger.stack.insert(handle);
        self.emit(RunEvent::new(names::STACK_LAUNCHED, run_id).with("stack", stack.name.clone()))
            .await;
        self.operator
            .report(&format!("Creating stack '{}'...", stack.name));

        if let Err(e) = self.stacks.await_ready(stack, self.config.stack_wait, token).await {
            if matches!(e, StackrunError::ProvisioningFailure { .. }) {
                self.emit(
                    RunEvent::new(names::STACK_FAILED, run_id)
                        .with("stack", stack.name.clone())
                        .with("status", stack.raw_status.clone()),
                )
                .await;
            }
            return Err(e);
        }
        self.emit(RunEvent::new(names::STACK_READY, run_id).with("stack", stack.name.clone()))
            .await;
        self.operator.report("Stack creation complete.");

        self.jobs
            .await_engine(stack, self.config.engine_wait, token)
            .await?;
        let engine_id = stack.engine_id.clone().unwrap_or_default();
        self.operator.report(&format!("Cluster ID: {engine_id}"));
        self.emit(RunEvent::new(names::ENGINE_READY, run_id).with("engine_id", engine_id))
            .await;

        token.check()?;
        let artifact = self.stager.stage(&request.app_path, stack).await?;
        let artifact = ledger.artifact.insert(artifact);
        self.emit(RunEvent::new(names::ARTIFACT_STAGED, run_id).with("uri", artifact.uri()))
            .await;

        let bucket = artifact.location.bucket.clone();
        let output = ObjectLocation::new(
            bucket,
            format!(
                "{}/{}/{}/",
                self.config.output_prefix, stack.name, request.job_name
            ),
        );
        ledger.output = Some(OutputRef::new(output.clone()));

        token.check()?;
        let job = self
            .jobs
            .submit(stack, &request.job_name, artifact, &output, &request.app_args)
            .await?;
        let job = ledger.job.insert(job);
        self.operator.report(&format!("Submitted step: {}", job.id));
        self.emit(
            RunEvent::new(names::JOB_SUBMITTED, run_id)
                .with("job_id", job.id.clone())
                .with("output", output.uri()),
        )
        .await;

        self.jobs
            .await_terminal(job, self.config.job_wait, token)
            .await?;
        let mut finished = RunEvent::new(names::JOB_FINISHED, run_id)
            .with("job_id", job.id.clone())
            .with("status", job.status.to_string());
        if let Some(reason) = &job.failure_reason {
            finished = finished.with("reason", reason.clone());
        }
        self.emit(finished).await;

        if job.status.is_success() {
            self.operator.report("Step completed successfully.");
            Ok(())
        } else {
            Err(StackrunError::JobFailure {
                job_id: job.id.clone(),
                state: job.raw_status.clone(),
                reason: job.failure_reason.clone(),
            })
        }
    }

    /// Runs every compensating action. Does not observe cancellation.
    async fn clean_up(
        &self,
        run_id: Uuid,
        ledger: &mut RunLedger,
        failure: Option<&StackrunError>,
        report: &mut CleanupReport,
    ) -> StackDisposition {
        if let Some(artifact) = ledger.artifact.as_mut() {
            let result = self.stager.unstage(artifact).await;
            self.settle(run_id, report, "unstage artifact", names::ARTIFACT_UNSTAGED, result)
                .await;
        }
        if let Some(output) = ledger.output.as_mut() {
            let result = self.stager.purge_output(output).await.map(|_| ());
            self.settle(run_id, report, "purge output", names::OUTPUT_PURGED, result)
                .await;
        }

        let Some(stack) = ledger.stack.as_mut() else {
            if let Some(failure) = failure {
                self.operator.report(&format!("Error: {failure}"));
            }
            return StackDisposition::NeverCreated;
        };

        let Some(failure) = failure else {
            return self.tear_down(run_id, stack, report).await;
        };

        if self.config.terminate_engine_on_failure {
            if let Some(engine_id) = stack.engine_id.clone() {
                let result = self.jobs.terminate_engine(&engine_id).await;
                self.settle(run_id, report, "terminate engine", names::ENGINE_TERMINATED, result)
                    .await;
            }
        }

        self.operator.report(&format!("Error: {failure}"));
        let diagnostics = match failure {
            StackrunError::ProvisioningFailure { diagnostics, .. } => diagnostics.clone(),
            _ => self.current_diagnostics(stack).await,
        };
        for line in diagnostics.render() {
            self.operator.report(&line);
        }

        self.emit(RunEvent::new(names::TEARDOWN_OFFERED, run_id).with("stack", stack.name.clone()))
            .await;
        let prompt = format!("Delete stack '{}'? [y/N]", stack.name);
        if self.operator.confirm(&prompt).await {
            self.tear_down(run_id, stack, report).await
        } else {
            info!(stack = %stack.name, "Stack kept for inspection");
            self.operator
                .report(&format!("Stack '{}' left in place.", stack.name));
            StackDisposition::Retained
        }
    }

    async fn current_diagnostics(&self, stack: &mut StackHandle) -> StackDiagnostics {
        match self.stacks.refresh(stack).await {
            Ok(()) => {}
            Err(e) => warn!(stack = %stack.name, error = %e, "Could not refresh stack status"),
        }
        self.stacks.diagnostics(stack, self.config.max_events).await
    }

    async fn tear_down(
        &self,
        run_id: Uuid,
        stack: &mut StackHandle,
        report: &mut CleanupReport,
    ) -> StackDisposition {
        self.operator.report("Deleting stack...");
        let result = self.stacks.teardown(stack, self.config.teardown_wait).await;
        let error = result.as_ref().err().map(ToString::to_string);
        report.record("delete stack", result);

        match error {
            None => {
                self.operator.report("Stack deleted.");
                self.emit(RunEvent::new(names::STACK_DELETED, run_id).with("stack", stack.name.clone()))
                    .await;
                StackDisposition::Deleted
            }
            Some(error) => {
                self.operator.report(&format!("Teardown warning: {error}"));
                self.cleanup_failed(run_id, "delete stack", error).await;
                StackDisposition::TeardownFailed
            }
        }
    }

    async fn settle(
        &self,
        run_id: Uuid,
        report: &mut CleanupReport,
        action: &str,
        event_type: &str,
        result: Result<()>,
    ) {
        let error = result.as_ref().err().map(ToString::to_string);
        report.record(action, result);

        match error {
            None => self.emit(RunEvent::new(event_type, run_id)).await,
            Some(error) => {
                self.operator.report(&format!("Cleanup warning: {error}"));
                self.cleanup_failed(run_id, action, error).await;
            }
        }
    }

    async fn cleanup_failed(&self, run_id: Uuid, action: &str, error: String) {
        self.emit(
            RunEvent::new(names::CLEANUP_FAILED, run_id)
                .with("action", action)
                .with("error", error),
        )
        .await;
    }

    async fn emit(&self, event: RunEvent) {
        self.sink.emit(event).await;
    }
}

impl std::fmt::Debug for LifecycleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
