//! # Stackrun
//!
//! Launch a short-lived cluster stack, run one job on it, and clean up
//! every resource the run created.
//!
//! A run provisions a stack from a template, uploads a job artifact to the
//! stack's artifact bucket, submits a single step to the stack's execution
//! engine, and waits for it to finish. Whatever happens in between, the
//! artifact and the job output are deleted before the run returns, and the
//! stack is either torn down (success) or offered for teardown (failure).
//!
//! - **Ports**: the remote control plane is consumed through the
//!   [`ports::StackApi`], [`ports::StepApi`], and [`ports::ObjectStore`] traits
//! - **Explicit configuration**: wait bounds and naming live in [`config::RunConfig`]
//! - **Cooperative cancellation**: every wait observes a [`cancellation::CancellationToken`]
//! - **Event-driven observability**: lifecycle events go to an [`events::EventSink`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stackrun::prelude::*;
//!
//! let orchestrator = LifecycleOrchestrator::new(
//!     plane,
//!     RunConfig::new("us-east-1"),
//!     Arc::new(UnattendedOperator::declining()),
//!     Arc::new(LoggingEventSink::default()),
//! );
//! let request = RunRequest::new(TemplateSource::from_path("stack.json")?, "wordcount", "job.py");
//! let outcome = orchestrator.run(&request, &CancellationToken::new()).await;
//! std::process::exit(outcome.exit_code);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod operator;
pub mod ports;
pub mod template;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, CleanupReport};
    pub use crate::config::{RunConfig, StepLauncher, WaitPolicy};
    pub use crate::core::{
        ArtifactRef, EngineStatus, JobRef, JobStatus, ObjectLocation, OutputRef,
        StackDiagnostics, StackEvent, StackHandle, StackStatus,
    };
    pub use crate::errors::{RemoteError, RemoteErrorKind, StackrunError, ValidationError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, RunEvent};
    pub use crate::lifecycle::{
        ArtifactStager, JobSubmitter, LifecycleOrchestrator, RunOutcome, RunRequest,
        StackController, StackDisposition,
    };
    pub use crate::operator::{Operator, UnattendedOperator};
    pub use crate::ports::{ControlPlane, ObjectStore, StackApi, StepApi};
    pub use crate::template::{StackParameter, TemplateSource};
    pub use crate::utils::{default_stack_name, iso_timestamp};
}
