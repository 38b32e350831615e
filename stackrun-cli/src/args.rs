//! Command-line arguments.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use stackrun::config::{RunConfig, WaitPolicy};
use stackrun::errors::ValidationError;
use stackrun::lifecycle::RunRequest;
use stackrun::template::{load_parameters, TemplateSource};
use stackrun::utils::default_stack_name;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Launch an EMR stack, run one Spark step on it, and clean up.
#[derive(Debug, Parser)]
#[command(name = "stackrun")]
#[command(about = "Launch an EMR cluster from CloudFormation and submit a Spark step")]
#[command(version)]
pub struct Cli {
    /// Path to the CloudFormation template
    #[arg(long)]
    pub template: PathBuf,

    /// Path to the parameters JSON (a list or an object)
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Stack name (defaults to emr-test-stack-<UTC timestamp>)
    #[arg(long)]
    pub stack_name: Option<String>,

    /// EMR step name
    #[arg(long)]
    pub job_name: String,

    /// AWS region (overrides AWS_REGION/AWS_DEFAULT_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Env file to load (defaults to .env when present)
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Path to the local Spark application
    #[arg(long)]
    pub app_path: PathBuf,

    /// Seconds between status polls
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: u64,

    /// Seconds to wait for the stack to be created
    #[arg(long)]
    pub stack_timeout: Option<u64>,

    /// Seconds to wait for the cluster to accept steps
    #[arg(long)]
    pub cluster_timeout: Option<u64>,

    /// Seconds to wait for the step to finish
    #[arg(long)]
    pub job_timeout: Option<u64>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Arguments for the Spark application (after `--`)
    #[arg(last = true)]
    pub app_args: Vec<String>,
}

impl Cli {
    /// Reads the template and parameters and builds the run request.
    ///
    /// Everything here is local: failures are validation errors.
    pub fn run_request(&self) -> Result<RunRequest, ValidationError> {
        if !self.app_path.is_file() {
            return Err(ValidationError::new(
                "app_path",
                format!("app path not found: {}", self.app_path.display()),
            ));
        }

        let template = TemplateSource::from_path(&self.template)?;
        let parameters = match &self.params {
            Some(path) => load_parameters(path)?,
            None => Vec::new(),
        };
        let stack_name = self.stack_name.clone().unwrap_or_else(default_stack_name);

        Ok(RunRequest::new(template, &self.job_name, &self.app_path)
            .with_parameters(parameters)
            .with_stack_name(stack_name)
            .with_args(self.app_args.clone()))
    }

    /// Overlays the timing flags on the default configuration.
    #[must_use]
    pub fn run_config(&self, region: impl Into<String>) -> RunConfig {
        let interval = Duration::from_secs(self.poll_interval);
        let mut config = RunConfig::new(region).with_poll_interval(interval);
        if let Some(secs) = self.stack_timeout {
            config = config.with_stack_wait(WaitPolicy::new(interval, Duration::from_secs(secs)));
        }
        if let Some(secs) = self.cluster_timeout {
            config = config.with_engine_wait(WaitPolicy::new(interval, Duration::from_secs(secs)));
        }
        if let Some(secs) = self.job_timeout {
            config = config.with_job_wait(WaitPolicy::new(interval, Duration::from_secs(secs)));
        }
        config
    }
}
