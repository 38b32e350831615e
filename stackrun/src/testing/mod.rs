//! Testing utilities for stackrun.
//!
//! This module provides:
//! - An in-memory control plane with scripted status sequences
//! - A scripted operator for confirmation prompts
//! - Fixtures for building a ready-to-run orchestrator

mod control_plane;
mod fixtures;
mod operator;

pub use control_plane::{Call, FakeControlPlane, FAKE_BUCKET, FAKE_ENGINE, FAKE_STEP};
pub use fixtures::{fast_config, minimal_template, TestHarness, MINIMAL_TEMPLATE};
pub use operator::ScriptedOperator;
