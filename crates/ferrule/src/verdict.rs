//! Classification of stage outcomes into caller-facing results

use std::fmt;
use std::time::Duration;

use crate::config::{Language, Toolchain};
use crate::supervisor::{ProcessOutcome, SpawnError};
use crate::types::{ExecutionResult, Stage};

/// How an execution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No language with the requested id is configured
    UnsupportedLanguage { language: String },

    /// The compiler exited with a non-zero code
    CompilationFailure { exit_code: i32, stderr: String },

    /// A stage ran past its wall clock budget and was killed
    Timeout { stage: Stage, limit: Duration },

    /// The program a stage launches does not exist on the host
    ToolchainMissing { program: String, toolchain: Toolchain },

    /// A stage could not be started for another reason
    SpawnFailure { program: String, reason: String },

    /// The program ran and exited non-zero
    RuntimeFailure {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// The program ran and exited with code 0
    Completed { stdout: String, stderr: String },
}

impl Verdict {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Verdict::UnsupportedLanguage { .. } => "unsupported_language",
            Verdict::CompilationFailure { .. } => "compilation_failure",
            Verdict::Timeout { .. } => "timeout",
            Verdict::ToolchainMissing { .. } => "toolchain_missing",
            Verdict::SpawnFailure { .. } => "spawn_failure",
            Verdict::RuntimeFailure { .. } => "runtime_failure",
            Verdict::Completed { .. } => "completed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Completed { .. })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Classify the outcomes of the stages that ran
///
/// `compile` is `None` for interpreted languages; `run` is `None` when the
/// pipeline stopped after the compile stage. Checks apply in order: compiler
/// exit code, timeout, spawn failure, then the run stage's exit code.
pub fn classify(
    language: &Language,
    compile: Option<&ProcessOutcome>,
    run: Option<&ProcessOutcome>,
) -> Verdict {
    if let Some(compile) = compile
        && let Some(exit_code) = compile.exit_code
        && exit_code != 0
    {
        return Verdict::CompilationFailure {
            exit_code,
            stderr: compile.stderr_lossy(),
        };
    }

    let stages = || compile.into_iter().chain(run);

    if let Some(outcome) = stages().find(|outcome| outcome.timed_out) {
        return Verdict::Timeout {
            stage: outcome.stage,
            limit: outcome.budget,
        };
    }

    if let Some(outcome) = stages().find(|outcome| outcome.spawn_failed()) {
        return spawn_verdict(language, outcome);
    }

    let Some(run) = run else {
        return Verdict::SpawnFailure {
            program: language.run.command.first().cloned().unwrap_or_default(),
            reason: "run stage did not start".to_owned(),
        };
    };

    let stdout = run.stdout_lossy();
    let stderr = run.stderr_lossy();
    match run.exit_code {
        Some(0) => Verdict::Completed { stdout, stderr },
        exit_code => Verdict::RuntimeFailure {
            exit_code: exit_code.unwrap_or(-1),
            stdout,
            stderr,
        },
    }
}

fn spawn_verdict(language: &Language, outcome: &ProcessOutcome) -> Verdict {
    match &outcome.spawn_error {
        Some(SpawnError::NotFound { program }) => Verdict::ToolchainMissing {
            program: program.clone(),
            toolchain: language.toolchain(outcome.stage, program),
        },
        Some(SpawnError::Other { program, message }) => Verdict::SpawnFailure {
            program: program.clone(),
            reason: message.clone(),
        },
        Some(error) => Verdict::SpawnFailure {
            program: outcome.program.clone(),
            reason: error.to_string(),
        },
        None => Verdict::SpawnFailure {
            program: outcome.program.clone(),
            reason: "unknown spawn failure".to_owned(),
        },
    }
}

/// Format a stage budget the way it appears in timeout messages (`5`, `0.5`)
fn format_seconds(limit: Duration) -> String {
    format!("{}", limit.as_secs_f64())
}

impl From<Verdict> for ExecutionResult {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::UnsupportedLanguage { language } => {
                ExecutionResult::failure(format!("Unsupported language: {language}"), -1)
            }
            Verdict::CompilationFailure { exit_code, stderr } => {
                ExecutionResult::failure(format!("Compilation error:\n{stderr}"), exit_code)
            }
            Verdict::Timeout { limit, .. } => ExecutionResult::failure(
                format!("Execution timed out after {} seconds", format_seconds(limit)),
                -1,
            ),
            Verdict::ToolchainMissing { toolchain, .. } => {
                ExecutionResult::failure(toolchain.missing_message(), -1)
            }
            Verdict::SpawnFailure { program, reason } => {
                ExecutionResult::failure(format!("Failed to start {program}: {reason}"), -1)
            }
            Verdict::RuntimeFailure {
                exit_code,
                stdout,
                stderr,
            } => ExecutionResult {
                success: false,
                output: stdout,
                error: stderr,
                exit_code,
                truncated: false,
            },
            Verdict::Completed { stdout, stderr } => ExecutionResult {
                success: true,
                output: stdout,
                error: stderr,
                exit_code: 0,
                truncated: false,
            },
        }
    }
}
