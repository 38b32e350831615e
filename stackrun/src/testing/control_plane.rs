//! In-memory control plane that records every call.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::core::{ObjectLocation, StackEvent};
use crate::errors::RemoteError;
use crate::ports::{
    CreateStackRequest, ObjectStore, StackApi, StackDescription, StackResource, StepApi,
    StepDescription, StepRequest,
};

/// Bucket name the fake reports in its default outputs.
pub const FAKE_BUCKET: &str = "artifact-bucket";
/// Engine id the fake reports in its default outputs.
pub const FAKE_ENGINE: &str = "j-FAKECLUSTER";
/// Step id the fake assigns to submitted steps.
pub const FAKE_STEP: &str = "s-FAKESTEP";

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// The port operation (e.g. `describe_stack`).
    pub operation: String,
    /// What it targeted (stack name, object URI, step id).
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Missing,
    Creating,
    Deleting,
    Gone,
}

#[derive(Debug)]
struct State {
    phase: Phase,
    create_statuses: VecDeque<String>,
    delete_statuses: VecDeque<Option<String>>,
    outputs: BTreeMap<String, String>,
    events: Vec<StackEvent>,
    resources: Vec<StackResource>,
    engine_states: VecDeque<String>,
    step_states: VecDeque<StepDescription>,
    job_output: Vec<String>,
    objects: BTreeMap<(String, String), Vec<u8>>,
    failures: HashMap<String, RemoteError>,
    submitted: Vec<StepRequest>,
    calls: Vec<Call>,
}

/// A scripted control plane implementing every port.
///
/// Status sequences are consumed one poll at a time; the last entry
/// repeats forever. Every call is recorded so tests can assert on the
/// exact trace of a run.
#[derive(Debug)]
pub struct FakeControlPlane {
    state: Mutex<State>,
}

impl Default for FakeControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

fn next_of<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

impl FakeControlPlane {
    /// Creates a fake whose stack, engine, and step all succeed on first poll.
    #[must_use]
    pub fn new() -> Self {
        let mut outputs = BTreeMap::new();
        outputs.insert("ArtifactBucketName".to_string(), FAKE_BUCKET.to_string());
        outputs.insert("ClusterId".to_string(), FAKE_ENGINE.to_string());

        Self {
            state: Mutex::new(State {
                phase: Phase::Missing,
                create_statuses: VecDeque::from(["CREATE_COMPLETE".to_string()]),
                delete_statuses: VecDeque::from([None]),
                outputs,
                events: Vec::new(),
                resources: Vec::new(),
                engine_states: VecDeque::from(["WAITING".to_string()]),
                step_states: VecDeque::from([StepDescription::new("COMPLETED")]),
                job_output: Vec::new(),
                objects: BTreeMap::new(),
                failures: HashMap::new(),
                submitted: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// Sets the statuses reported while the stack is being created.
    #[must_use]
    pub fn with_stack_statuses(self, statuses: &[&str]) -> Self {
        self.state.lock().create_statuses = statuses.iter().map(ToString::to_string).collect();
        self
    }

    /// Sets the statuses reported after deletion starts. `None` means gone.
    #[must_use]
    pub fn with_delete_statuses(self, statuses: &[Option<&str>]) -> Self {
        self.state.lock().delete_statuses = statuses
            .iter()
            .map(|s| s.map(ToString::to_string))
            .collect();
        self
    }

    /// Replaces the stack outputs.
    #[must_use]
    pub fn with_outputs(self, outputs: &[(&str, &str)]) -> Self {
        self.state.lock().outputs = outputs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self
    }

    /// Sets the stack event feed.
    #[must_use]
    pub fn with_events(self, events: Vec<StackEvent>) -> Self {
        self.state.lock().events = events;
        self
    }

    /// Sets the stack resources.
    #[must_use]
    pub fn with_resources(self, resources: Vec<StackResource>) -> Self {
        self.state.lock().resources = resources;
        self
    }

    /// Sets the engine states reported on successive polls.
    #[must_use]
    pub fn with_engine_states(self, states: &[&str]) -> Self {
        self.state.lock().engine_states = states.iter().map(ToString::to_string).collect();
        self
    }

    /// Sets the step states reported on successive polls.
    #[must_use]
    pub fn with_step_states(self, states: Vec<StepDescription>) -> Self {
        self.state.lock().step_states = states.into();
        self
    }

    /// Objects the job writes under its output prefix when submitted.
    #[must_use]
    pub fn with_job_output(self, names: &[&str]) -> Self {
        self.state.lock().job_output = names.iter().map(ToString::to_string).collect();
        self
    }

    /// Makes every call to `operation` fail with `error`.
    #[must_use]
    pub fn failing(self, operation: &str, error: RemoteError) -> Self {
        self.fail(operation, error);
        self
    }

    /// Makes every subsequent call to `operation` fail with `error`.
    pub fn fail(&self, operation: &str, error: RemoteError) {
        self.state.lock().failures.insert(operation.to_string(), error);
    }

    /// Puts an object directly into the store.
    pub fn insert_object(&self, bucket: &str, key: &str, body: &[u8]) {
        self.state
            .lock()
            .objects
            .insert((bucket.to_string(), key.to_string()), body.to_vec());
    }

    /// Returns every recorded call.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Returns the recorded operation names, in call order.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .map(|c| c.operation.clone())
            .collect()
    }

    /// Returns how many times `operation` was called.
    #[must_use]
    pub fn count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Returns the position of the first call to `operation`.
    #[must_use]
    pub fn position(&self, operation: &str) -> Option<usize> {
        self.state
            .lock()
            .calls
            .iter()
            .position(|c| c.operation == operation)
    }

    /// Returns every stored object URI.
    #[must_use]
    pub fn object_uris(&self) -> Vec<String> {
        self.state
            .lock()
            .objects
            .keys()
            .map(|(bucket, key)| format!("s3://{bucket}/{key}"))
            .collect()
    }

    /// Returns the body of a stored object.
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Returns the steps submitted so far.
    #[must_use]
    pub fn submitted_steps(&self) -> Vec<StepRequest> {
        self.state.lock().submitted.clone()
    }

    /// Returns true while the stack exists remotely.
    #[must_use]
    pub fn stack_exists(&self) -> bool {
        matches!(self.state.lock().phase, Phase::Creating | Phase::Deleting)
    }

    fn enter(&self, operation: &str, target: impl Into<String>) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.calls.push(Call {
            operation: operation.to_string(),
            target: target.into(),
        });
        match state.failures.get(operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

fn output_prefix(request: &StepRequest, flag: &str) -> Option<(String, String)> {
    let position = request.args.iter().position(|a| a == flag)?;
    let uri = request.args.get(position + 1)?;
    let rest = uri.strip_prefix("s3://")?;
    let (bucket, prefix) = rest.split_once('/')?;
    Some((bucket.to_string(), prefix.to_string()))
}

#[async_trait]
impl StackApi for FakeControlPlane {
    async fn create_stack(&self, request: &CreateStackRequest) -> Result<String, RemoteError> {
        self.enter("create_stack", &request.name)?;
        let mut state = self.state.lock();
        if state.phase == Phase::Creating {
            return Err(RemoteError::rejected(format!("Stack [{}] already exists", request.name)));
        }
        state.phase = Phase::Creating;
        Ok(format!("arn:fake:cloudformation:stack/{}", request.name))
    }

    async fn describe_stack(&self, name: &str) -> Result<Option<StackDescription>, RemoteError> {
        self.enter("describe_stack", name)?;
        let mut state = self.state.lock();
        let status = match state.phase {
            Phase::Missing | Phase::Gone => return Ok(None),
            Phase::Creating => next_of(&mut state.create_statuses),
            Phase::Deleting => match next_of(&mut state.delete_statuses).flatten() {
                Some(status) => Some(status),
                None => {
                    state.phase = Phase::Gone;
                    return Ok(None);
                }
            },
        };
        let status = status.unwrap_or_else(|| "CREATE_IN_PROGRESS".to_string());
        let outputs = if status.ends_with("_COMPLETE") && !status.contains("ROLLBACK") {
            state.outputs.clone()
        } else {
            BTreeMap::new()
        };
        Ok(Some(StackDescription { status, outputs }))
    }

    async fn delete_stack(&self, name: &str) -> Result<(), RemoteError> {
        self.enter("delete_stack", name)?;
        let mut state = self.state.lock();
        if state.phase == Phase::Creating {
            state.phase = Phase::Deleting;
        }
        Ok(())
    }

    async fn list_events(&self, name: &str) -> Result<Vec<StackEvent>, RemoteError> {
        self.enter("list_events", name)?;
        Ok(self.state.lock().events.clone())
    }

    async fn list_resources(&self, name: &str) -> Result<Vec<StackResource>, RemoteError> {
        self.enter("list_resources", name)?;
        Ok(self.state.lock().resources.clone())
    }
}

#[async_trait]
impl StepApi for FakeControlPlane {
    async fn describe_engine(&self, engine_id: &str) -> Result<String, RemoteError> {
        self.enter("describe_engine", engine_id)?;
        let mut state = self.state.lock();
        Ok(next_of(&mut state.engine_states).unwrap_or_else(|| "STARTING".to_string()))
    }

    async fn submit_step(&self, engine_id: &str, request: &StepRequest) -> Result<String, RemoteError> {
        self.enter("submit_step", engine_id)?;
        let mut state = self.state.lock();
        if let Some((bucket, prefix)) = output_prefix(request, "--output-s3") {
            let names = state.job_output.clone();
            for name in names {
                state
                    .objects
                    .insert((bucket.clone(), format!("{prefix}{name}")), b"part".to_vec());
            }
        }
        state.submitted.push(request.clone());
        Ok(FAKE_STEP.to_string())
    }

    async fn describe_step(&self, _engine_id: &str, step_id: &str) -> Result<StepDescription, RemoteError> {
        self.enter("describe_step", step_id)?;
        let mut state = self.state.lock();
        Ok(next_of(&mut state.step_states).unwrap_or_else(|| StepDescription::new("PENDING")))
    }

    async fn terminate_engine(&self, engine_id: &str) -> Result<(), RemoteError> {
        self.enter("terminate_engine", engine_id)?;
        self.state.lock().engine_states = VecDeque::from(["TERMINATING".to_string()]);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FakeControlPlane {
    async fn put_object(
        &self,
        location: &ObjectLocation,
        body: Vec<u8>,
        _content_md5: &str,
    ) -> Result<(), RemoteError> {
        self.enter("put_object", location.uri())?;
        self.state
            .lock()
            .objects
            .insert((location.bucket.clone(), location.key.clone()), body);
        Ok(())
    }

    async fn delete_object(&self, location: &ObjectLocation) -> Result<(), RemoteError> {
        self.enter("delete_object", location.uri())?;
        let removed = self
            .state
            .lock()
            .objects
            .remove(&(location.bucket.clone(), location.key.clone()));
        match removed {
            Some(_) => Ok(()),
            None => Err(RemoteError::not_found(format!("NoSuchKey: {}", location.key))),
        }
    }

    async fn list_keys(&self, prefix: &ObjectLocation) -> Result<Vec<String>, RemoteError> {
        self.enter("list_keys", prefix.uri())?;
        Ok(self
            .state
            .lock()
            .objects
            .keys()
            .filter(|(bucket, key)| *bucket == prefix.bucket && key.starts_with(&prefix.key))
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn delete_keys(&self, bucket: &str, keys: &[String]) -> Result<(), RemoteError> {
        self.enter("delete_keys", format!("s3://{bucket} ({} keys)", keys.len()))?;
        let mut state = self.state.lock();
        for key in keys {
            state.objects.remove(&(bucket.to_string(), key.clone()));
        }
        Ok(())
    }
}
