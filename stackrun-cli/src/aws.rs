//! AWS control plane: CloudFormation stacks, EMR steps, and S3 objects.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudformation::types::{Capability, Parameter};
use aws_sdk_emr::types::{ActionOnFailure, HadoopJarStepConfig, StepConfig};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, info};

use stackrun::core::{ObjectLocation, StackEvent};
use stackrun::errors::RemoteError;
use stackrun::ports::{
    CreateStackRequest, ObjectStore, StackApi, StackDescription, StackResource, StepApi,
    StepDescription, StepRequest,
};

const NOT_FOUND_CODES: [&str; 5] = [
    "NoSuchKey",
    "NoSuchBucket",
    "NotFound",
    "ResourceNotFoundException",
    "StackNotFoundException",
];

const THROTTLING_CODES: [&str; 4] = [
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "SlowDown",
];

/// Maps an SDK failure onto the port error classes.
fn classify<E, R>(error: &SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    let message = DisplayErrorContext(error).to_string();
    match error {
        SdkError::ServiceError(service) => {
            let code = service.err().code().unwrap_or_default();
            let detail = service.err().message().unwrap_or_default();
            if NOT_FOUND_CODES.contains(&code) || detail.contains("does not exist") {
                RemoteError::not_found(message)
            } else if THROTTLING_CODES.contains(&code) {
                RemoteError::transport(message)
            } else {
                RemoteError::rejected(message)
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            RemoteError::transport(message)
        }
        _ => RemoteError::rejected(message),
    }
}

fn to_utc(time: &aws_sdk_cloudformation::primitives::DateTime) -> DateTime<Utc> {
    Utc.timestamp_opt(time.secs(), time.subsec_nanos())
        .single()
        .unwrap_or_default()
}

/// Clients for the three services a run touches, sharing one SDK config.
#[derive(Debug, Clone)]
pub struct AwsControlPlane {
    cloudformation: aws_sdk_cloudformation::Client,
    emr: aws_sdk_emr::Client,
    s3: aws_sdk_s3::Client,
    region: String,
}

impl AwsControlPlane {
    /// Loads credentials and region from the environment.
    ///
    /// `region` overrides whatever the environment or profile says.
    pub async fn connect(region: Option<String>) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;
        let region = sdk_config
            .region()
            .map(ToString::to_string)
            .ok_or_else(|| anyhow::anyhow!("no AWS region configured; pass --region or set AWS_REGION"))?;

        info!(region = %region, "AWS clients ready");
        Ok(Self {
            cloudformation: aws_sdk_cloudformation::Client::new(&sdk_config),
            emr: aws_sdk_emr::Client::new(&sdk_config),
            s3: aws_sdk_s3::Client::new(&sdk_config),
            region,
        })
    }

    /// Returns the resolved region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl StackApi for AwsControlPlane {
    async fn create_stack(&self, request: &CreateStackRequest) -> Result<String, RemoteError> {
        let parameters = request
            .parameters
            .iter()
            .map(|p| {
                Parameter::builder()
                    .parameter_key(&p.key)
                    .parameter_value(&p.value)
                    .build()
            })
            .collect::<Vec<_>>();
        let capabilities = request
            .capabilities
            .iter()
            .map(|c| Capability::from(c.as_str()))
            .collect::<Vec<_>>();

        let output = self
            .cloudformation
            .create_stack()
            .stack_name(&request.name)
            .template_body(&request.template_body)
            .set_parameters(Some(parameters))
            .set_capabilities(Some(capabilities))
            .send()
            .await
            .map_err(|e| classify(&e))?;
        Ok(output.stack_id().unwrap_or(request.name.as_str()).to_string())
    }

    async fn describe_stack(&self, name: &str) -> Result<Option<StackDescription>, RemoteError> {
        let output = match self.cloudformation.describe_stacks().stack_name(name).send().await {
            Ok(output) => output,
            Err(e) => {
                let error = classify(&e);
                return if error.is_not_found() { Ok(None) } else { Err(error) };
            }
        };

        let Some(stack) = output.stacks().first() else {
            return Ok(None);
        };
        let status = stack.stack_status().as_str().to_string();
        let outputs: BTreeMap<String, String> = stack
            .outputs()
            .iter()
            .filter_map(|o| {
                Some((o.output_key()?.to_string(), o.output_value()?.to_string()))
            })
            .collect();
        Ok(Some(StackDescription { status, outputs }))
    }

    async fn delete_stack(&self, name: &str) -> Result<(), RemoteError> {
        self.cloudformation
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        Ok(())
    }

    async fn list_events(&self, name: &str) -> Result<Vec<StackEvent>, RemoteError> {
        let output = self
            .cloudformation
            .describe_stack_events()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        Ok(output
            .stack_events()
            .iter()
            .map(|e| {
                let event = StackEvent::new(
                    to_utc(e.timestamp()),
                    e.logical_resource_id().unwrap_or_default(),
                    e.resource_status().map(|s| s.as_str()).unwrap_or_default(),
                );
                match e.resource_status_reason() {
                    Some(reason) => event.with_reason(reason),
                    None => event,
                }
            })
            .collect())
    }

    async fn list_resources(&self, name: &str) -> Result<Vec<StackResource>, RemoteError> {
        let output = self
            .cloudformation
            .list_stack_resources()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        Ok(output
            .stack_resource_summaries()
            .iter()
            .map(|r| StackResource {
                logical_id: r.logical_resource_id().to_string(),
                resource_type: r.resource_type().to_string(),
                physical_id: r.physical_resource_id().map(ToString::to_string),
            })
            .collect())
    }
}

#[async_trait]
impl StepApi for AwsControlPlane {
    async fn describe_engine(&self, engine_id: &str) -> Result<String, RemoteError> {
        let output = self
            .emr
            .describe_cluster()
            .cluster_id(engine_id)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        Ok(output
            .cluster()
            .and_then(|c| c.status())
            .and_then(|s| s.state())
            .map(|s| s.as_str().to_string())
            .unwrap_or_default())
    }

    async fn submit_step(&self, engine_id: &str, request: &StepRequest) -> Result<String, RemoteError> {
        let jar_step = HadoopJarStepConfig::builder()
            .jar(&request.jar)
            .set_args(Some(request.args.clone()))
            .build()
            .map_err(|e| RemoteError::rejected(e.to_string()))?;
        let step = StepConfig::builder()
            .name(&request.name)
            .action_on_failure(ActionOnFailure::from(request.action_on_failure.as_str()))
            .hadoop_jar_step(jar_step)
            .build()
            .map_err(|e| RemoteError::rejected(e.to_string()))?;

        let output = self
            .emr
            .add_job_flow_steps()
            .job_flow_id(engine_id)
            .steps(step)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        output
            .step_ids()
            .first()
            .cloned()
            .ok_or_else(|| RemoteError::rejected("engine returned no step id"))
    }

    async fn describe_step(&self, engine_id: &str, step_id: &str) -> Result<StepDescription, RemoteError> {
        let output = self
            .emr
            .describe_step()
            .cluster_id(engine_id)
            .step_id(step_id)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let status = output.step().and_then(|s| s.status());
        let state = status
            .and_then(|s| s.state())
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        let reason = status
            .and_then(|s| s.failure_details())
            .map(|details| {
                [details.reason(), details.message(), details.log_file()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .filter(|reason| !reason.is_empty());

        let description = StepDescription::new(state);
        Ok(match reason {
            Some(reason) => description.with_reason(reason),
            None => description,
        })
    }

    async fn terminate_engine(&self, engine_id: &str) -> Result<(), RemoteError> {
        self.emr
            .terminate_job_flows()
            .job_flow_ids(engine_id)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for AwsControlPlane {
    async fn put_object(
        &self,
        location: &ObjectLocation,
        body: Vec<u8>,
        content_md5: &str,
    ) -> Result<(), RemoteError> {
        self.s3
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_md5(content_md5)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify(&e))?;
        Ok(())
    }

    async fn delete_object(&self, location: &ObjectLocation) -> Result<(), RemoteError> {
        self.s3
            .delete_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &ObjectLocation) -> Result<Vec<String>, RemoteError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let output = self
                .s3
                .list_objects_v2()
                .bucket(&prefix.bucket)
                .prefix(&prefix.key)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| classify(&e))?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(ToString::to_string)),
            );
            match output.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        debug!(prefix = %prefix, keys = keys.len(), "Listed objects");
        Ok(keys)
    }

    async fn delete_keys(&self, bucket: &str, keys: &[String]) -> Result<(), RemoteError> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RemoteError::rejected(e.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| RemoteError::rejected(e.to_string()))?;

        let output = self
            .s3
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        match output.errors().first() {
            Some(error) => Err(RemoteError::rejected(format!(
                "{} of {} keys not deleted, first: {} {}",
                output.errors().len(),
                keys.len(),
                error.key().unwrap_or("-"),
                error.message().unwrap_or("-"),
            ))),
            None => Ok(()),
        }
    }
}
