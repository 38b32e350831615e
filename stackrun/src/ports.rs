//! Control-plane ports - the remote capabilities the orchestrator consumes.
//!
//! Each port covers one remote service. Components receive only the ports
//! they need; adapters for a real cloud live outside this crate, and
//! [`crate::testing::FakeControlPlane`] implements all three in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::{ObjectLocation, StackEvent};
use crate::errors::RemoteError;
use crate::template::StackParameter;

/// Request to create a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStackRequest {
    /// The stack name.
    pub name: String,
    /// The template body, passed through verbatim.
    pub template_body: String,
    /// Template parameters in declaration order.
    pub parameters: Vec<StackParameter>,
    /// Capabilities acknowledged on creation.
    pub capabilities: Vec<String>,
}

/// A stack as reported by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescription {
    /// The raw status string.
    pub status: String,
    /// Output key/value pairs. May be empty before creation completes.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// One physical resource belonging to a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackResource {
    /// The template resource id.
    pub logical_id: String,
    /// The resource type (e.g. `AWS::S3::Bucket`).
    pub resource_type: String,
    /// The provisioned identifier, once known.
    pub physical_id: Option<String>,
}

/// Stack operations.
#[async_trait]
pub trait StackApi: Send + Sync {
    /// Starts stack creation and returns the stack id.
    async fn create_stack(&self, request: &CreateStackRequest) -> Result<String, RemoteError>;

    /// Describes a stack. `Ok(None)` means the stack does not exist.
    async fn describe_stack(&self, name: &str) -> Result<Option<StackDescription>, RemoteError>;

    /// Starts stack deletion.
    async fn delete_stack(&self, name: &str) -> Result<(), RemoteError>;

    /// Lists the stack's event feed, in any order.
    async fn list_events(&self, name: &str) -> Result<Vec<StackEvent>, RemoteError>;

    /// Lists the stack's physical resources.
    async fn list_resources(&self, name: &str) -> Result<Vec<StackResource>, RemoteError>;
}

/// A step to submit to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRequest {
    /// The step name.
    pub name: String,
    /// The jar the engine runs.
    pub jar: String,
    /// The command line handed to the jar.
    pub args: Vec<String>,
    /// What the engine does with itself when the step fails.
    pub action_on_failure: String,
}

/// A step as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescription {
    /// The raw step state.
    pub state: String,
    /// Engine-reported reason or exit diagnostic, if any.
    pub reason: Option<String>,
}

impl StepDescription {
    /// Creates a description without a reason.
    #[must_use]
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            reason: None,
        }
    }

    /// Sets the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Execution-engine operations.
#[async_trait]
pub trait StepApi: Send + Sync {
    /// Returns the engine's raw state string.
    async fn describe_engine(&self, engine_id: &str) -> Result<String, RemoteError>;

    /// Submits a step and returns its id.
    async fn submit_step(&self, engine_id: &str, request: &StepRequest) -> Result<String, RemoteError>;

    /// Describes a submitted step.
    async fn describe_step(&self, engine_id: &str, step_id: &str) -> Result<StepDescription, RemoteError>;

    /// Requests engine shutdown. The stack itself is left in place.
    async fn terminate_engine(&self, engine_id: &str) -> Result<(), RemoteError>;
}

/// Object-store operations.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes one object.
    async fn put_object(
        &self,
        location: &ObjectLocation,
        body: Vec<u8>,
        content_md5: &str,
    ) -> Result<(), RemoteError>;

    /// Deletes one object.
    async fn delete_object(&self, location: &ObjectLocation) -> Result<(), RemoteError>;

    /// Lists every key under a prefix.
    async fn list_keys(&self, prefix: &ObjectLocation) -> Result<Vec<String>, RemoteError>;

    /// Deletes a batch of keys from one bucket.
    async fn delete_keys(&self, bucket: &str, keys: &[String]) -> Result<(), RemoteError>;
}

/// The full set of ports a run needs.
#[derive(Clone)]
pub struct ControlPlane {
    /// Stack operations.
    pub stacks: Arc<dyn StackApi>,
    /// Engine operations.
    pub steps: Arc<dyn StepApi>,
    /// Object-store operations.
    pub objects: Arc<dyn ObjectStore>,
}

impl ControlPlane {
    /// Creates a control plane from its three ports.
    #[must_use]
    pub fn new(
        stacks: Arc<dyn StackApi>,
        steps: Arc<dyn StepApi>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            stacks,
            steps,
            objects,
        }
    }

    /// Creates a control plane where one value implements every port.
    #[must_use]
    pub fn uniform<T>(backend: Arc<T>) -> Self
    where
        T: StackApi + StepApi + ObjectStore + 'static,
    {
        Self {
            stacks: backend.clone(),
            steps: backend.clone(),
            objects: backend,
        }
    }
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane").finish_non_exhaustive()
    }
}
