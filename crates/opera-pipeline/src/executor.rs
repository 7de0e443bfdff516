//! Reduction executor seam and the subprocess-backed implementation.

use async_trait::async_trait;
use opera_core::{DispatchError, PipelineSettings, RunParameters, SharedResources};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Result of one executor invocation that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl ExecutionStatus {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the reduction of a single mode.
///
/// Called sequentially and awaited to completion before the next mode starts.
/// `Ok` with a non-zero exit code and `Err` are both mode failures; neither
/// stops the remaining modes.
#[async_trait]
pub trait ReductionExecutor: Send + Sync {
    async fn execute(
        &self,
        params: &RunParameters,
        resources: &SharedResources,
    ) -> Result<ExecutionStatus, DispatchError>;
}

/// Executes an external reduction program once per mode.
///
/// The program receives `executor_args` followed by the flat parameter bundle
/// as positional arguments, runs inside the mode product directory, and sees
/// the shared directories through `OPERA_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExecutor {
    pub program: String,
    pub base_args: Vec<String>,
    pub timeout_secs: u64,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, base_args: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            base_args,
            timeout_secs,
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(
            settings.executor_program.clone(),
            settings.executor_args.clone(),
            settings.timeout_secs,
        )
    }

    /// Full argument vector (without the program) for one mode.
    pub fn arguments(&self, params: &RunParameters) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend(params.to_args());
        args
    }
}

#[async_trait]
impl ReductionExecutor for CommandExecutor {
    async fn execute(
        &self,
        params: &RunParameters,
        resources: &SharedResources,
    ) -> Result<ExecutionStatus, DispatchError> {
        let start = Instant::now();
        let mode = params.mode.slug();
        let args = self.arguments(params);

        debug!(mode = %mode, program = %self.program, args = ?args, "Spawning reduction");

        let child = Command::new(&self.program)
            .args(&args)
            .current_dir(&params.product_dir)
            .env("OPERA_PIPELINE_HOME", &resources.dirs.pipeline_home)
            .env("OPERA_DATA_DIR", &resources.dirs.data_dir)
            .env("OPERA_PRODUCT_DIR", &params.product_dir)
            .env("OPERA_CONFIG_DIR", &resources.config.config_dir)
            .env("OPERA_SCRATCH_DIR", &params.scratch_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DispatchError::ExecutionError {
                mode: mode.clone(),
                reason: format!("failed to spawn {}: {}", self.program, e),
            })?;

        let output = if self.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| DispatchError::Timeout {
                mode: mode.clone(),
                timeout_secs: self.timeout_secs,
            })?
        } else {
            child.wait_with_output().await
        }
        .map_err(|e| DispatchError::ExecutionError {
            mode: mode.clone(),
            reason: e.to_string(),
        })?;

        Ok(ExecutionStatus {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
