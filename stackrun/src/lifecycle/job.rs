//! Engine readiness, step submission, and step polling.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cancellation::CancellationToken;
use crate::config::{RunConfig, WaitPolicy};
use crate::core::{ArtifactRef, EngineStatus, JobRef, JobStatus, ObjectLocation, StackHandle};
use crate::errors::{Result, StackrunError};
use crate::ports::{StepApi, StepRequest};

/// Submits the job step and follows it to a terminal state.
pub struct JobSubmitter {
    steps: Arc<dyn StepApi>,
    config: Arc<RunConfig>,
}

impl JobSubmitter {
    /// Creates a submitter over a step port.
    #[must_use]
    pub fn new(steps: Arc<dyn StepApi>, config: Arc<RunConfig>) -> Self {
        Self { steps, config }
    }

    /// Polls the stack's engine until it accepts work.
    pub async fn await_engine(
        &self,
        stack: &StackHandle,
        policy: WaitPolicy,
        token: &CancellationToken,
    ) -> Result<()> {
        let engine_id = engine_of(stack)?;
        let max_polls = policy.max_polls();
        let mut polls = 0;
        loop {
            token.check()?;
            let raw = self
                .steps
                .describe_engine(engine_id)
                .await
                .map_err(|e| StackrunError::remote("describe_engine", engine_id, e))?;
            polls += 1;
            let status = EngineStatus::from_remote(&raw);
            debug!(engine = %engine_id, state = %raw, poll = polls, "Polled engine");

            if status.accepts_work() {
                info!(engine = %engine_id, "Engine is accepting steps");
                return Ok(());
            }
            if status == EngineStatus::Terminated {
                return Err(StackrunError::EngineFailure {
                    engine_id: engine_id.to_string(),
                    state: raw,
                });
            }
            if polls >= max_polls {
                return Err(StackrunError::Timeout {
                    operation: "engine readiness".to_string(),
                    resource: engine_id.to_string(),
                    polls,
                    last_status: raw,
                });
            }
            token.sleep(policy.interval()).await?;
        }
    }

    /// Builds the command line handed to the engine's runner jar.
    ///
    /// The output flag is appended unless the caller already passed it.
    #[must_use]
    pub fn step_args(&self, artifact: &ArtifactRef, output: &ObjectLocation, args: &[String]) -> Vec<String> {
        let launcher = &self.config.launcher;
        let mut step_args = launcher.command.clone();
        step_args.push(artifact.uri());
        step_args.extend(args.iter().cloned());
        if !args.iter().any(|arg| *arg == launcher.output_flag) {
            step_args.push(launcher.output_flag.clone());
            step_args.push(output.uri());
        }
        step_args
    }

    /// Submits one step running the staged artifact.
    pub async fn submit(
        &self,
        stack: &StackHandle,
        job_name: &str,
        artifact: &ArtifactRef,
        output: &ObjectLocation,
        args: &[String],
    ) -> Result<JobRef> {
        let engine_id = engine_of(stack)?;
        let request = StepRequest {
            name: job_name.to_string(),
            jar: self.config.launcher.runner_jar.clone(),
            args: self.step_args(artifact, output, args),
            action_on_failure: self.config.launcher.action_on_failure.clone(),
        };

        let step_id = self
            .steps
            .submit_step(engine_id, &request)
            .await
            .map_err(|e| StackrunError::remote("submit_step", engine_id, e))?;

        info!(job_id = %step_id, engine = %engine_id, job = %job_name, "Submitted step");
        Ok(JobRef {
            id: step_id,
            engine_id: engine_id.to_string(),
            name: job_name.to_string(),
            status: JobStatus::Pending,
            raw_status: "PENDING".to_string(),
            output: output.clone(),
            failure_reason: None,
        })
    }

    /// Polls the step until it reaches a terminal state.
    ///
    /// Terminal states are final and a stale observation never moves the
    /// job backwards. Failed and cancelled jobs are returned as `Ok`; the
    /// caller decides what the outcome means.
    pub async fn await_terminal(
        &self,
        job: &mut JobRef,
        policy: WaitPolicy,
        token: &CancellationToken,
    ) -> Result<()> {
        if job.is_terminal() {
            return Ok(());
        }

        let max_polls = policy.max_polls();
        let mut polls = 0;
        loop {
            token.check()?;
            let description = self
                .steps
                .describe_step(&job.engine_id, &job.id)
                .await
                .map_err(|e| StackrunError::remote("describe_step", &job.id, e))?;
            polls += 1;

            let observed = JobStatus::from_remote(&description.state);
            if observed.rank() >= job.status.rank() {
                if observed != job.status {
                    info!(job_id = %job.id, from = %job.status, to = %observed, "Job status changed");
                }
                job.status = observed;
                job.raw_status = description.state;
            } else {
                debug!(job_id = %job.id, observed = %observed, current = %job.status, "Ignoring stale step state");
            }

            if job.is_terminal() {
                if job.status.is_failure() {
                    job.failure_reason = description.reason;
                    warn!(
                        job_id = %job.id,
                        state = %job.raw_status,
                        reason = job.failure_reason.as_deref().unwrap_or("-"),
                        "Job did not succeed"
                    );
                }
                return Ok(());
            }
            if polls >= max_polls {
                return Err(StackrunError::Timeout {
                    operation: "job completion".to_string(),
                    resource: job.id.clone(),
                    polls,
                    last_status: job.raw_status.clone(),
                });
            }
            token.sleep(policy.interval()).await?;
        }
    }

    /// Asks the engine to shut down.
    pub async fn terminate_engine(&self, engine_id: &str) -> Result<()> {
        self.steps
            .terminate_engine(engine_id)
            .await
            .map_err(|e| StackrunError::remote("terminate_engine", engine_id, e))?;
        info!(engine = %engine_id, "Engine termination requested");
        Ok(())
    }
}

fn engine_of(stack: &StackHandle) -> Result<&str> {
    match stack.engine_id.as_deref() {
        Some(engine_id) if stack.is_ready() => Ok(engine_id),
        _ => Err(StackrunError::not_ready(
            format!("stack '{}'", stack.name),
            "engine id was not resolved",
        )),
    }
}

impl std::fmt::Debug for JobSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSubmitter")
            .field("launcher", &self.config.launcher)
            .finish_non_exhaustive()
    }
}
