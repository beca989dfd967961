use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wall clock budget for a single stage when nothing else is configured
pub const DEFAULT_WALL_TIME_LIMIT: f64 = 5.0;

/// Largest accepted wall clock budget for a single stage, in seconds
pub const MAX_WALL_TIME_LIMIT: f64 = 24.0 * 60.0 * 60.0;

/// Per-stream capture cap in kilobytes when nothing else is configured
pub const DEFAULT_MAX_OUTPUT: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall clock time limit per stage in seconds
    #[serde(default)]
    pub wall_time_limit: Option<f64>,

    /// CPU time limit in seconds (applied by the `rlimits` sandbox policy)
    #[serde(default)]
    pub time_limit: Option<f64>,

    /// Address space limit in kilobytes (applied by the `rlimits` sandbox policy)
    #[serde(default)]
    pub memory_limit: Option<u64>,

    /// Maximum number of processes/threads (applied by the `rlimits` sandbox policy)
    #[serde(default)]
    pub max_processes: Option<u32>,

    /// Maximum open files (applied by the `rlimits` sandbox policy)
    #[serde(default)]
    pub max_open_files: Option<u32>,

    /// Maximum captured size of stdout and of stderr, in kilobytes
    #[serde(default)]
    pub max_output: Option<u64>,
}

impl ResourceLimits {
    /// 1 megabyte in kilobytes
    pub const MB: u64 = 1024;

    /// Create new resource limits with the built-in defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits with every field unset, useful as an override base
    pub fn unset() -> Self {
        Self {
            wall_time_limit: None,
            time_limit: None,
            memory_limit: None,
            max_processes: None,
            max_open_files: None,
            max_output: None,
        }
    }

    /// Set the wall clock time limit in seconds
    pub fn with_wall_time_limit(mut self, seconds: f64) -> Self {
        self.wall_time_limit = Some(seconds);
        self
    }

    /// Set the CPU time limit in seconds
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    /// Set the memory limit in kilobytes
    pub fn with_memory_limit(mut self, kb: u64) -> Self {
        self.memory_limit = Some(kb);
        self
    }

    /// Set the maximum number of processes
    pub fn with_max_processes(mut self, count: u32) -> Self {
        self.max_processes = Some(count);
        self
    }

    /// Set the maximum captured output size in kilobytes
    pub fn with_max_output(mut self, kb: u64) -> Self {
        self.max_output = Some(kb);
        self
    }

    /// Apply overrides from another ResourceLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            wall_time_limit: overrides.wall_time_limit.or(self.wall_time_limit),
            time_limit: overrides.time_limit.or(self.time_limit),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
            max_processes: overrides.max_processes.or(self.max_processes),
            max_open_files: overrides.max_open_files.or(self.max_open_files),
            max_output: overrides.max_output.or(self.max_output),
        }
    }

    /// Wall clock seconds for one stage, falling back to the default budget
    pub fn wall_time_seconds(&self) -> f64 {
        self.wall_time_limit.unwrap_or(DEFAULT_WALL_TIME_LIMIT)
    }

    /// Wall clock budget for one stage
    ///
    /// Values above [`MAX_WALL_TIME_LIMIT`] are clamped; values that are not
    /// a positive number of seconds fall back to the default budget.
    pub fn wall_time(&self) -> Duration {
        let seconds = self.wall_time_seconds();
        if seconds.is_nan() || seconds <= 0.0 {
            return Duration::from_secs_f64(DEFAULT_WALL_TIME_LIMIT);
        }
        Duration::from_secs_f64(seconds.min(MAX_WALL_TIME_LIMIT))
    }

    /// Per-stream capture cap in bytes, `None` for unbounded capture
    pub fn max_output_bytes(&self) -> Option<usize> {
        self.max_output
            .map(|kb| usize::try_from(kb.saturating_mul(1024)).unwrap_or(usize::MAX))
    }
}

/// Whether `seconds` is an acceptable stage wall clock budget
pub fn is_valid_wall_time(seconds: f64) -> bool {
    seconds > 0.0
        && seconds <= MAX_WALL_TIME_LIMIT
        && Duration::try_from_secs_f64(seconds).is_ok()
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            wall_time_limit: Some(DEFAULT_WALL_TIME_LIMIT),
            time_limit: None,
            memory_limit: None,
            max_processes: None,
            max_open_files: None,
            max_output: Some(DEFAULT_MAX_OUTPUT),
        }
    }
}

/// A request to compile (when needed) and run one source submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Language identifier, matched case-insensitively
    pub language: String,

    /// Source text; may be empty
    pub code: String,

    /// Data written to the program's standard input; `null` reads as empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub input: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            input: String::new(),
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }
}

/// Result returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// True iff the run stage exited with code 0
    pub success: bool,

    /// Standard output of the run stage
    pub output: String,

    /// Standard error of the run stage, or a classified error message
    pub error: String,

    /// Exit code of the last stage, -1 when no exit code exists
    pub exit_code: i32,

    /// Whether stdout or stderr hit the capture cap
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl ExecutionResult {
    /// A failed result carrying only an error message
    pub fn failure(error: impl Into<String>, exit_code: i32) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
            exit_code,
            truncated: false,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }
}

/// One spawned process within an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Compile,
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Compile => f.write_str("compile"),
            Stage::Run => f.write_str("run"),
        }
    }
}
