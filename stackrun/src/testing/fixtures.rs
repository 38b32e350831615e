//! Fixtures for orchestrator tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{FakeControlPlane, ScriptedOperator};
use crate::config::{RunConfig, WaitPolicy};
use crate::events::CollectingEventSink;
use crate::lifecycle::{LifecycleOrchestrator, RunRequest};
use crate::ports::ControlPlane;
use crate::template::TemplateSource;

/// A template with one bucket, one cluster, and no parameters.
pub const MINIMAL_TEMPLATE: &str = r#"{
  "Resources": {
    "ArtifactBucket": {"Type": "AWS::S3::Bucket"},
    "Cluster": {"Type": "AWS::EMR::Cluster"}
  },
  "Outputs": {
    "ArtifactBucketName": {"Value": {"Ref": "ArtifactBucket"}},
    "ClusterId": {"Value": {"Ref": "Cluster"}}
  }
}"#;

/// Returns [`MINIMAL_TEMPLATE`] as a template source.
#[must_use]
pub fn minimal_template() -> TemplateSource {
    TemplateSource::inline(MINIMAL_TEMPLATE)
}

/// A configuration that polls every millisecond with a 20-poll budget.
#[must_use]
pub fn fast_config() -> RunConfig {
    let policy = WaitPolicy::polls(Duration::from_millis(1), 20);
    RunConfig::new("us-east-1")
        .with_stack_wait(policy)
        .with_engine_wait(policy)
        .with_job_wait(policy)
        .with_teardown_wait(policy)
}

/// Wires a fake control plane, scripted operator, and collecting sink
/// into an orchestrator.
#[derive(Debug)]
pub struct TestHarness {
    /// The fake control plane.
    pub plane: Arc<FakeControlPlane>,
    /// The scripted operator.
    pub operator: Arc<ScriptedOperator>,
    /// Every event the run emitted.
    pub sink: Arc<CollectingEventSink>,
    /// The run configuration.
    pub config: RunConfig,
}

impl TestHarness {
    /// Creates a harness whose operator declines every prompt.
    #[must_use]
    pub fn new(plane: FakeControlPlane) -> Self {
        Self {
            plane: Arc::new(plane),
            operator: Arc::new(ScriptedOperator::new()),
            sink: Arc::new(CollectingEventSink::new()),
            config: fast_config(),
        }
    }

    /// Replaces the operator.
    #[must_use]
    pub fn with_operator(mut self, operator: ScriptedOperator) -> Self {
        self.operator = Arc::new(operator);
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> LifecycleOrchestrator {
        LifecycleOrchestrator::new(
            ControlPlane::uniform(self.plane.clone()),
            self.config.clone(),
            self.operator.clone(),
            self.sink.clone(),
        )
    }

    /// A request for `test-stack` running the artifact at `app_path`.
    #[must_use]
    pub fn request(&self, app_path: &Path) -> RunRequest {
        RunRequest::new(minimal_template(), "wordcount", app_path).with_stack_name("test-stack")
    }
}
