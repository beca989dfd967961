//! Compilation stage
//!
//! Runs the language's compiler inside the workspace with a null stdin.

use tracing::{debug, instrument};

use crate::config::{CompileConfig, Config, Language, Placeholders};
use crate::supervisor::{CommandSpec, ProcessOutcome, StageDeadline, Supervisor};
use crate::types::Stage;

/// Run the compile stage for a source already written into the workspace
#[instrument(skip_all, fields(workdir = %placeholders.workdir.display()))]
pub async fn compile(
    supervisor: &Supervisor,
    config: &Config,
    compile: &CompileConfig,
    placeholders: &Placeholders,
) -> ProcessOutcome {
    let limits = config.effective_limits(compile.limits.as_ref());
    let deadline = StageDeadline::new(Stage::Compile, limits.wall_time());

    let argv = Language::expand_command(&compile.command, placeholders);
    debug!(?argv, "compiling");

    let spec = match CommandSpec::from_argv(argv, &placeholders.workdir, limits) {
        Ok(spec) => spec.envs(&compile.env),
        Err(error) => return ProcessOutcome::not_spawned(deadline, "", error),
    };

    let outcome = supervisor.run(&spec, None, deadline).await;

    debug!(
        success = outcome.exited_ok(),
        exit_code = ?outcome.exit_code,
        timed_out = outcome.timed_out,
        "compilation complete"
    );

    outcome
}
