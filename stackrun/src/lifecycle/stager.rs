//! Artifact staging and output purging.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use md5::{Digest, Md5};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::core::{ArtifactRef, ObjectLocation, OutputRef, StackHandle};
use crate::errors::{Result, StackrunError};
use crate::ports::ObjectStore;

/// Most keys a single batch delete may carry.
pub const DELETE_BATCH_SIZE: usize = 1000;

/// Uploads the job artifact and deletes everything the run wrote.
pub struct ArtifactStager {
    objects: Arc<dyn ObjectStore>,
    config: Arc<RunConfig>,
}

impl ArtifactStager {
    /// Creates a stager over an object store.
    #[must_use]
    pub fn new(objects: Arc<dyn ObjectStore>, config: Arc<RunConfig>) -> Self {
        Self { objects, config }
    }

    /// Uploads `local_path` into the stack's artifact bucket.
    ///
    /// The object lands at `{artifact_prefix}/{stack}/{file_name}`.
    pub async fn stage(&self, local_path: &Path, stack: &StackHandle) -> Result<ArtifactRef> {
        let bucket = match (&stack.artifact_bucket, stack.is_ready()) {
            (Some(bucket), true) => bucket.clone(),
            (_, false) => {
                return Err(StackrunError::not_ready(
                    format!("stack '{}'", stack.name),
                    format!("status must be ready to stage, is {}", stack.status),
                ))
            }
            (None, true) => {
                return Err(StackrunError::not_ready(
                    format!("stack '{}'", stack.name),
                    "artifact bucket was not resolved",
                ))
            }
        };

        let path = local_path.display();
        let file_name = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StackrunError::staging(&path, "path has no file name"))?;

        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| StackrunError::staging(&path, e.to_string()))?;
        if !metadata.is_file() {
            return Err(StackrunError::staging(&path, "not a regular file"));
        }
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| StackrunError::staging(&path, e.to_string()))?;

        let content_md5 = STANDARD.encode(Md5::digest(&body));
        let size = body.len();
        let location = ObjectLocation::new(
            bucket,
            format!("{}/{}/{}", self.config.artifact_prefix, stack.name, file_name),
        );

        self.objects
            .put_object(&location, body, &content_md5)
            .await
            .map_err(|e| StackrunError::staging(&path, format!("upload to {location} failed: {e}")))?;

        info!(artifact = %location, bytes = size, "Staged job artifact");
        Ok(ArtifactRef {
            source: local_path.to_path_buf(),
            location,
            exists: true,
            content_md5,
        })
    }

    /// Deletes a staged artifact. Safe to call more than once.
    pub async fn unstage(&self, artifact: &mut ArtifactRef) -> Result<()> {
        if !artifact.exists {
            debug!(artifact = %artifact.location, "Artifact already removed");
            return Ok(());
        }

        match self.objects.delete_object(&artifact.location).await {
            Ok(()) => {
                info!(artifact = %artifact.location, "Deleted job artifact");
            }
            Err(e) if e.is_not_found() => {
                info!(artifact = %artifact.location, "Job artifact was already gone");
            }
            Err(e) => return Err(StackrunError::remote("delete_object", artifact.uri(), e)),
        }
        artifact.exists = false;
        Ok(())
    }

    /// Deletes every object under the output prefix.
    ///
    /// Returns the number of keys deleted. An empty prefix is a no-op.
    pub async fn purge_output(&self, output: &mut OutputRef) -> Result<usize> {
        if output.purged {
            debug!(output = %output.location, "Output already purged");
            return Ok(0);
        }

        let keys = match self.objects.list_keys(&output.location).await {
            Ok(keys) => keys,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(StackrunError::remote("list_keys", output.location.uri(), e)),
        };

        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            match self.objects.delete_keys(&output.location.bucket, batch).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    return Err(StackrunError::remote("delete_keys", output.location.uri(), e));
                }
            }
        }

        if keys.is_empty() {
            info!(output = %output.location, "No job output to purge");
        } else {
            info!(output = %output.location, keys = keys.len(), "Purged job output");
        }
        output.purged = true;
        Ok(keys.len())
    }
}

impl std::fmt::Debug for ArtifactStager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStager")
            .field("artifact_prefix", &self.config.artifact_prefix)
            .finish_non_exhaustive()
    }
}
