//! Run configuration.
//!
//! Everything the components need from the environment (region, wait
//! bounds, output names, key layout) is carried in a [`RunConfig`] that
//! is passed in explicitly, never read from globals.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often to poll and for how long.
///
/// The timeout is enforced as a poll budget of `timeout / interval`
/// (at least one poll), which keeps waits deterministic regardless of
/// how long each remote call takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// Delay between polls in milliseconds.
    pub interval_ms: u64,
    /// Overall bound in milliseconds.
    pub timeout_ms: u64,
}

impl WaitPolicy {
    /// Creates a new wait policy.
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Creates a policy allowing exactly `polls` polls at `interval`.
    #[must_use]
    pub fn polls(interval: Duration, polls: u32) -> Self {
        Self::new(interval, interval.saturating_mul(polls))
    }

    /// Returns the poll interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Returns the overall timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the number of polls the timeout allows.
    #[must_use]
    pub fn max_polls(&self) -> u32 {
        if self.interval_ms == 0 {
            return u32::try_from(self.timeout_ms).unwrap_or(u32::MAX).max(1);
        }
        u32::try_from(self.timeout_ms / self.interval_ms)
            .unwrap_or(u32::MAX)
            .max(1)
    }
}

/// How the job step is launched on the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLauncher {
    /// The jar the engine executes.
    #[serde(default = "default_runner_jar")]
    pub runner_jar: String,
    /// The command prefix placed before the artifact URI.
    #[serde(default = "default_launch_command")]
    pub command: Vec<String>,
    /// The flag that tells the application where to write output.
    #[serde(default = "default_output_flag")]
    pub output_flag: String,
    /// What the engine does when the step fails.
    #[serde(default = "default_action_on_failure")]
    pub action_on_failure: String,
}

fn default_runner_jar() -> String {
    "command-runner.jar".to_string()
}

fn default_launch_command() -> Vec<String> {
    vec!["spark-submit".to_string()]
}

fn default_output_flag() -> String {
    "--output-s3".to_string()
}

fn default_action_on_failure() -> String {
    "CONTINUE".to_string()
}

impl Default for StepLauncher {
    fn default() -> Self {
        Self {
            runner_jar: default_runner_jar(),
            command: default_launch_command(),
            output_flag: default_output_flag(),
            action_on_failure: default_action_on_failure(),
        }
    }
}

/// Configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// The region every component targets.
    pub region: String,
    /// Wait bounds for stack creation.
    #[serde(default = "default_stack_wait")]
    pub stack_wait: WaitPolicy,
    /// Wait bounds for the engine to accept work.
    #[serde(default = "default_engine_wait")]
    pub engine_wait: WaitPolicy,
    /// Wait bounds for the job to finish.
    #[serde(default = "default_job_wait")]
    pub job_wait: WaitPolicy,
    /// Wait bounds for stack deletion.
    #[serde(default = "default_teardown_wait")]
    pub teardown_wait: WaitPolicy,
    /// Stack output naming the artifact bucket.
    #[serde(default = "default_bucket_output")]
    pub bucket_output_key: String,
    /// Stack output naming the execution engine.
    #[serde(default = "default_engine_output")]
    pub engine_output_key: String,
    /// Key prefix for staged artifacts.
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,
    /// Key prefix for job output.
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    /// How many recent stack events to show on failure.
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    /// Step launch settings.
    #[serde(default)]
    pub launcher: StepLauncher,
    /// Shut the engine down before offering teardown of a failed run.
    #[serde(default = "default_terminate_engine_on_failure")]
    pub terminate_engine_on_failure: bool,
}

fn default_stack_wait() -> WaitPolicy {
    WaitPolicy::new(Duration::from_secs(30), Duration::from_secs(60 * 60))
}

fn default_engine_wait() -> WaitPolicy {
    WaitPolicy::new(Duration::from_secs(30), Duration::from_secs(30 * 60))
}

fn default_job_wait() -> WaitPolicy {
    WaitPolicy::new(Duration::from_secs(30), Duration::from_secs(6 * 60 * 60))
}

fn default_teardown_wait() -> WaitPolicy {
    WaitPolicy::new(Duration::from_secs(30), Duration::from_secs(60 * 60))
}

fn default_bucket_output() -> String {
    "ArtifactBucketName".to_string()
}

fn default_engine_output() -> String {
    "ClusterId".to_string()
}

fn default_artifact_prefix() -> String {
    "apps".to_string()
}

fn default_output_prefix() -> String {
    "outputs".to_string()
}

fn default_max_events() -> usize {
    10
}

const fn default_terminate_engine_on_failure() -> bool {
    true
}

impl RunConfig {
    /// Creates a configuration with defaults for the given region.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            stack_wait: default_stack_wait(),
            engine_wait: default_engine_wait(),
            job_wait: default_job_wait(),
            teardown_wait: default_teardown_wait(),
            bucket_output_key: default_bucket_output(),
            engine_output_key: default_engine_output(),
            artifact_prefix: default_artifact_prefix(),
            output_prefix: default_output_prefix(),
            max_events: default_max_events(),
            launcher: StepLauncher::default(),
            terminate_engine_on_failure: default_terminate_engine_on_failure(),
        }
    }

    /// Uses the same poll interval for every wait, keeping each timeout.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        for policy in [
            &mut self.stack_wait,
            &mut self.engine_wait,
            &mut self.job_wait,
            &mut self.teardown_wait,
        ] {
            *policy = WaitPolicy::new(interval, policy.timeout());
        }
        self
    }

    /// Sets the stack creation wait.
    #[must_use]
    pub fn with_stack_wait(mut self, policy: WaitPolicy) -> Self {
        self.stack_wait = policy;
        self
    }

    /// Sets the engine readiness wait.
    #[must_use]
    pub fn with_engine_wait(mut self, policy: WaitPolicy) -> Self {
        self.engine_wait = policy;
        self
    }

    /// Sets the job wait.
    #[must_use]
    pub fn with_job_wait(mut self, policy: WaitPolicy) -> Self {
        self.job_wait = policy;
        self
    }

    /// Sets the teardown wait.
    #[must_use]
    pub fn with_teardown_wait(mut self, policy: WaitPolicy) -> Self {
        self.teardown_wait = policy;
        self
    }

    /// Sets how many recent events to show.
    #[must_use]
    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    /// Sets the step launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: StepLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    /// Sets whether a failed run shuts the engine down before teardown is offered.
    #[must_use]
    pub fn with_terminate_engine_on_failure(mut self, terminate: bool) -> Self {
        self.terminate_engine_on_failure = terminate;
        self
    }
}
