//! Execution orchestration
//!
//! Drives one request through workspace acquisition, the optional compile
//! stage, the run stage and classification, and always tears the workspace
//! down afterwards.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use crate::runner::compile::compile;
pub use crate::runner::execute::execute;

mod compile;
mod execute;

use crate::{
    config::{Config, Language},
    supervisor::{ProcessOutcome, Supervisor, policy_from_config},
    types::{ExecutionRequest, ExecutionResult},
    verdict::{Verdict, classify},
    workspace::{Workspace, WorkspaceError, WorkspaceManager},
};

/// Failures that prevent an execution from producing a result at all
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to acquire workspace: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("failed to write source file '{name}': {source}")]
    WriteSource {
        name: String,
        #[source]
        source: WorkspaceError,
    },
}

/// Everything observed while executing one request
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub verdict: Verdict,

    /// Compile stage outcome, `None` when the language is interpreted or unknown
    pub compile: Option<ProcessOutcome>,

    /// Run stage outcome, `None` when the pipeline stopped before running
    pub run: Option<ProcessOutcome>,

    /// Workspace the execution used (already removed)
    pub workspace: Option<PathBuf>,
}

impl ExecutionReport {
    fn unsupported(language: &str) -> Self {
        Self {
            verdict: Verdict::UnsupportedLanguage {
                language: language.to_owned(),
            },
            compile: None,
            run: None,
            workspace: None,
        }
    }

    /// Whether any stage's output hit the capture cap
    pub fn truncated(&self) -> bool {
        self.compile
            .iter()
            .chain(&self.run)
            .any(ProcessOutcome::truncated)
    }

    /// Convert into the caller-facing result
    pub fn into_result(self) -> ExecutionResult {
        let truncated = self.truncated();
        let mut result = ExecutionResult::from(self.verdict);
        result.truncated = truncated;
        result
    }
}

/// High-level runner for code execution
///
/// Cheap to clone; clones share the configuration, the workspace pool and
/// the sandbox policy.
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<Config>,
    workspaces: WorkspaceManager,
    supervisor: Supervisor,
}

impl Runner {
    /// Create a runner using the sandbox policy selected in the configuration
    pub fn new(config: Config) -> Self {
        let supervisor = Supervisor::new(policy_from_config(&config.sandbox));
        Self::with_supervisor(config, supervisor)
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Create a runner with a custom supervisor (and therefore sandbox policy)
    pub fn with_supervisor(config: Config, supervisor: Supervisor) -> Self {
        let policy = supervisor.policy();
        if policy.confines() {
            info!(policy = policy.name(), "sandbox policy active");
        } else {
            warn!(
                policy = policy.name(),
                "submissions run unconfined on the host; configure an isolating sandbox policy before accepting untrusted code"
            );
        }

        let workspaces = WorkspaceManager::new(config.scratch_root(), config.max_concurrent);
        Self {
            config: Arc::new(config),
            workspaces,
            supervisor,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the workspace manager
    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Execute a request and return the caller-facing result
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ServiceError> {
        self.execute_report(request)
            .await
            .map(ExecutionReport::into_result)
    }

    /// Execute a request and return the full report
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] only when no workspace could be prepared. Every
    /// problem with the submission itself is classified into the report.
    #[instrument(skip(self, request), fields(language = %request.language, code_len = request.code.len()))]
    pub async fn execute_report(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionReport, ServiceError> {
        let Ok(language) = self.config.get_language(&request.language) else {
            debug!("unsupported language");
            return Ok(ExecutionReport::unsupported(&request.language));
        };

        let workspace = self.workspaces.acquire().await?;
        let report = self.run_pipeline(language, &workspace, request).await;
        self.workspaces.release(workspace).await;

        if let Ok(report) = &report {
            debug!(verdict = %report.verdict, "execution finished");
        }
        report
    }

    async fn run_pipeline(
        &self,
        language: &Language,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> Result<ExecutionReport, ServiceError> {
        let source_name = language.source_name(&request.code);
        workspace
            .write_file(&source_name, request.code.as_bytes())
            .await
            .map_err(|source| ServiceError::WriteSource {
                name: source_name.clone(),
                source,
            })?;

        let placeholders = language.placeholders(workspace.path(), &source_name);

        let compile = match &language.compile {
            Some(stage) => Some(compile(&self.supervisor, &self.config, stage, &placeholders).await),
            None => None,
        };

        let compiled = compile.as_ref().is_none_or(ProcessOutcome::exited_ok);
        let run = if compiled {
            Some(
                execute(
                    &self.supervisor,
                    &self.config,
                    &language.run,
                    &placeholders,
                    request.input.as_bytes(),
                )
                .await,
            )
        } else {
            None
        };

        let verdict = classify(language, compile.as_ref(), run.as_ref());
        Ok(ExecutionReport {
            verdict,
            compile,
            run,
            workspace: Some(workspace.path().to_path_buf()),
        })
    }
}
