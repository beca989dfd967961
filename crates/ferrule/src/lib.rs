//! A library for compiling and running untrusted code snippets.
//!
//! Ferrule takes a source snippet, an optional stdin payload and a language
//! id, compiles the snippet when the language needs it, runs it under a hard
//! wall clock deadline and reports captured output and exit status.
//!
//! # Features
//!
//! - **Data-driven languages**: compile and run pipelines are TOML entries, not code.
//! - **Scoped workspaces**: every execution gets a fresh directory that is removed on every exit path.
//! - **Deadlines**: each stage runs in its own process group, killed as a whole on timeout.
//! - **Bounded capture**: stdout and stderr are capped and flagged when truncated.
//! - **Sandbox hook**: a [`SandboxPolicy`] confines every spawned stage.
//!
//! # Example
//!
//! ```no_run
//! use ferrule::{ExecutionRequest, Runner};
//!
//! # async fn demo() -> Result<(), ferrule::ServiceError> {
//! let runner = Runner::with_defaults();
//! let request = ExecutionRequest::new("python", "print(input())").with_input("hi\n");
//! let result = runner.execute(&request).await?;
//! assert_eq!(result.output, "hi\n");
//! # Ok(())
//! # }
//! ```

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language};
pub use runner::{ExecutionReport, Runner, ServiceError};
pub use supervisor::{
    CommandSpec, ProcessOutcome, SandboxPolicy, SpawnError, StageDeadline, Supervisor,
};
pub use types::{
    ExecutionRequest, ExecutionResult, MAX_WALL_TIME_LIMIT, ResourceLimits, Stage,
    is_valid_wall_time,
};
pub use verdict::{Verdict, classify};
pub use workspace::{Workspace, WorkspaceError, WorkspaceManager};

pub mod config;
pub mod runner;
pub mod supervisor;
pub mod types;
pub mod verdict;
pub mod workspace;
