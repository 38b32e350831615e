//! Handles for the remote resources a run creates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::status::{JobStatus, StackStatus};

/// A bucket plus a key or key prefix in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    /// The bucket name.
    pub bucket: String,
    /// The object key, or a prefix ending in `/`.
    pub key: String,
}

impl ObjectLocation {
    /// Creates a new object location.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Renders the location as an `s3://bucket/key` URI.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// The provisioned infrastructure unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackHandle {
    /// The stack name.
    pub name: String,
    /// The region the stack lives in.
    pub region: String,
    /// Current mapped status.
    pub status: StackStatus,
    /// The last raw status string the control plane reported.
    pub raw_status: String,
    /// Stack outputs. Empty until the stack is ready.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// Bucket artifacts and outputs are written to, resolved once ready.
    pub artifact_bucket: Option<String>,
    /// Identifier of the execution engine, resolved once ready.
    pub engine_id: Option<String>,
}

impl StackHandle {
    /// Creates a handle for a stack that does not exist yet.
    #[must_use]
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            status: StackStatus::Absent,
            raw_status: String::new(),
            outputs: BTreeMap::new(),
            artifact_bucket: None,
            engine_id: None,
        }
    }

    /// Returns true once the stack is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == StackStatus::Ready
    }

    /// Records a freshly observed status.
    pub fn observe(&mut self, raw: Option<&str>) {
        self.status = StackStatus::from_remote(raw);
        self.raw_status = raw.unwrap_or("DOES_NOT_EXIST").to_string();
    }
}

/// A job artifact uploaded to the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// The local file that was uploaded.
    pub source: PathBuf,
    /// Where it was uploaded to.
    pub location: ObjectLocation,
    /// Whether the remote object is believed to exist.
    pub exists: bool,
    /// Base64 MD5 of the uploaded bytes.
    pub content_md5: String,
}

impl ArtifactRef {
    /// Returns the artifact's remote URI.
    #[must_use]
    pub fn uri(&self) -> String {
        self.location.uri()
    }
}

/// Data written by the job under an output prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    /// The output prefix.
    pub location: ObjectLocation,
    /// Whether everything under the prefix has been deleted.
    pub purged: bool,
}

impl OutputRef {
    /// Creates an output reference that still needs purging.
    #[must_use]
    pub fn new(location: ObjectLocation) -> Self {
        Self {
            location,
            purged: false,
        }
    }
}

/// A submitted unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    /// Identifier assigned by the engine.
    pub id: String,
    /// The engine the job was submitted to.
    pub engine_id: String,
    /// The job name.
    pub name: String,
    /// Current mapped status.
    pub status: JobStatus,
    /// The last raw state string the engine reported.
    pub raw_status: String,
    /// Where the job writes its output.
    pub output: ObjectLocation,
    /// Engine-reported reason for a failed or cancelled job.
    pub failure_reason: Option<String>,
}

impl JobRef {
    /// Returns true once the job has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
