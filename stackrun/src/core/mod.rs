//! Core domain model types for stackrun.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stack, engine, and job status enums
//! - Handles for the stack, staged artifact, job, and job output
//! - Stack diagnostic events

mod event;
mod handles;
mod status;

pub use event::{StackDiagnostics, StackEvent};
pub use handles::{ArtifactRef, JobRef, ObjectLocation, OutputRef, StackHandle};
pub use status::{EngineStatus, JobStatus, StackStatus};
