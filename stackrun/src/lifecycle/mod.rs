//! The components that drive a run.
//!
//! Leaves first:
//! - [`StackController`] creates, observes, and deletes the stack
//! - [`ArtifactStager`] uploads the job artifact and purges what the run wrote
//! - [`JobSubmitter`] waits for the engine, submits the step, and polls it
//! - [`LifecycleOrchestrator`] sequences them and always cleans up

mod job;
mod orchestrator;
mod stack;
mod stager;

pub use job::JobSubmitter;
pub use orchestrator::{LifecycleOrchestrator, RunOutcome, RunRequest, StackDisposition};
pub use stack::{StackController, NAMED_IAM_CAPABILITY};
pub use stager::{ArtifactStager, DELETE_BATCH_SIZE};
