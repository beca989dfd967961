//! Process supervision for pipeline stages
//!
//! Spawns one child per stage, feeds its stdin, captures stdout and stderr
//! under a size cap and enforces the stage deadline by killing the child's
//! whole process group.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

pub use crate::supervisor::capture::{Captured, capture};
pub use crate::supervisor::policy::{
    Rlimits, SandboxError, SandboxPolicy, Unconfined, from_config as policy_from_config,
};
use crate::supervisor::group::ProcessGroupGuard;
use crate::types::{ResourceLimits, Stage};

mod capture;
mod group;
pub mod policy;

/// Why a stage's process never started
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpawnError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("{program}: executable not found")]
    NotFound { program: String },

    #[error("failed to start {program}: {message}")]
    Other { program: String, message: String },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// A fully expanded command for one stage
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    pub limits: ResourceLimits,
}

impl CommandSpec {
    /// Split an expanded argument vector into program and arguments
    pub fn from_argv(
        argv: Vec<String>,
        working_dir: impl Into<PathBuf>,
        limits: ResourceLimits,
    ) -> Result<Self, SpawnError> {
        let mut argv = argv.into_iter();
        let program = argv.next().ok_or(SpawnError::EmptyCommand)?;
        Ok(Self {
            program,
            args: argv.collect(),
            working_dir: working_dir.into(),
            env: HashMap::new(),
            limits,
        })
    }

    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// Wall clock budget for one stage, measured from spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDeadline {
    pub stage: Stage,
    pub budget: Duration,
}

impl StageDeadline {
    pub fn new(stage: Stage, budget: Duration) -> Self {
        Self { stage, budget }
    }
}

/// What happened to one spawned process
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Stage the process belonged to
    pub stage: Stage,

    /// Program that was (or could not be) started
    pub program: String,

    /// Process id, if the process started
    pub pid: Option<u32>,

    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,

    /// Exit code; `-signal` when killed by a signal, `None` on timeout or spawn failure
    pub exit_code: Option<i32>,

    /// Signal number if the process was killed by a signal
    pub signal: Option<i32>,

    /// The deadline elapsed and the process group was killed
    pub timed_out: bool,

    /// Set when the process could not be started
    pub spawn_error: Option<SpawnError>,

    /// Wall clock budget the stage ran under
    pub budget: Duration,

    /// Time from spawn until the process was reaped
    pub elapsed: Duration,
}

impl ProcessOutcome {
    fn new(deadline: StageDeadline, program: &str) -> Self {
        Self {
            stage: deadline.stage,
            program: program.to_owned(),
            pid: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            exit_code: None,
            signal: None,
            timed_out: false,
            spawn_error: None,
            budget: deadline.budget,
            elapsed: Duration::ZERO,
        }
    }

    /// An outcome for a process that never started
    pub fn not_spawned(deadline: StageDeadline, program: &str, error: SpawnError) -> Self {
        Self {
            spawn_error: Some(error),
            ..Self::new(deadline, program)
        }
    }

    pub fn spawn_failed(&self) -> bool {
        self.spawn_error.is_some()
    }

    /// Whether the process ran to completion with exit code 0
    pub fn exited_ok(&self) -> bool {
        !self.timed_out && !self.spawn_failed() && self.exit_code == Some(0)
    }

    pub fn truncated(&self) -> bool {
        self.stdout_truncated || self.stderr_truncated
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Spawns and supervises stage processes through a sandbox policy
#[derive(Debug, Clone)]
pub struct Supervisor {
    policy: Arc<dyn SandboxPolicy>,
}

impl Supervisor {
    pub fn new(policy: Arc<dyn SandboxPolicy>) -> Self {
        Self { policy }
    }

    /// A supervisor with the reference behavior (no confinement)
    pub fn unconfined() -> Self {
        Self::new(Arc::new(Unconfined::default()))
    }

    pub fn policy(&self) -> &dyn SandboxPolicy {
        self.policy.as_ref()
    }

    /// Run one process to completion or until the deadline
    ///
    /// `stdin` is written and then closed; `None` connects stdin to null.
    /// Never fails: every problem is reported in the returned outcome.
    #[instrument(
        skip(self, spec, stdin),
        fields(stage = %deadline.stage, program = %spec.program, policy = self.policy.name())
    )]
    pub async fn run(
        &self,
        spec: &CommandSpec,
        stdin: Option<&[u8]>,
        deadline: StageDeadline,
    ) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::new(deadline, &spec.program);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        if let Err(error) = self.policy.apply(&mut command, &spec.limits) {
            warn!(%error, "sandbox policy refused the command");
            outcome.spawn_error = Some(error.into());
            return outcome;
        }
        command.envs(&spec.env);

        let started = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                debug!(%error, "spawn failed");
                outcome.spawn_error = Some(match error.kind() {
                    ErrorKind::NotFound => SpawnError::NotFound {
                        program: spec.program.clone(),
                    },
                    _ => SpawnError::Other {
                        program: spec.program.clone(),
                        message: error.to_string(),
                    },
                });
                return outcome;
            }
        };

        outcome.pid = child.id();
        let mut group = ProcessGroupGuard::new(outcome.pid);
        debug!(pid = ?outcome.pid, "spawned");

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let limit = spec.limits.max_output_bytes();

        let feed = async move {
            if let (Some(mut pipe), Some(data)) = (stdin_pipe, stdin) {
                if let Err(error) = pipe.write_all(data).await {
                    // The child may exit without reading its input
                    debug!(%error, "stdin write ended early");
                }
                drop(pipe);
            }
        };

        let supervised = tokio::time::timeout_at(started + deadline.budget, async {
            let ((), stdout, stderr, status) = tokio::join!(
                feed,
                capture(stdout_pipe, limit),
                capture(stderr_pipe, limit),
                child.wait(),
            );
            (stdout, stderr, status)
        })
        .await;

        match supervised {
            Ok((stdout, stderr, status)) => {
                group.disarm();
                outcome.stdout = stdout.bytes;
                outcome.stdout_truncated = stdout.truncated;
                outcome.stderr = stderr.bytes;
                outcome.stderr_truncated = stderr.truncated;

                match status {
                    Ok(status) => {
                        outcome.signal = status.signal();
                        outcome.exit_code = status
                            .code()
                            .or_else(|| outcome.signal.map(|signal| -signal));
                    }
                    Err(error) => warn!(%error, "failed to wait for child"),
                }
            }
            Err(_) => {
                outcome.timed_out = true;
                if !group.kill() {
                    if let Err(error) = child.start_kill() {
                        debug!(%error, "child already gone");
                    }
                }
                if let Err(error) = child.wait().await {
                    warn!(%error, "failed to reap timed out child");
                }
            }
        }

        outcome.elapsed = started.elapsed();
        debug!(
            exit_code = ?outcome.exit_code,
            signal = ?outcome.signal,
            timed_out = outcome.timed_out,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "stage process finished"
        );

        outcome
    }
}
