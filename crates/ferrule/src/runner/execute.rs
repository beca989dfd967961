//! Run stage
//!
//! Runs the compiled artifact or the interpreter with the caller's stdin.

use tracing::{debug, instrument};

use crate::config::{Config, Language, Placeholders, RunConfig};
use crate::supervisor::{CommandSpec, ProcessOutcome, StageDeadline, Supervisor};
use crate::types::Stage;

/// Run the program for a workspace prepared by the earlier stages
#[instrument(skip_all, fields(workdir = %placeholders.workdir.display(), input_len = input.len()))]
pub async fn execute(
    supervisor: &Supervisor,
    config: &Config,
    run: &RunConfig,
    placeholders: &Placeholders,
    input: &[u8],
) -> ProcessOutcome {
    let limits = config.effective_limits(run.limits.as_ref());
    let deadline = StageDeadline::new(Stage::Run, limits.wall_time());

    let argv = Language::expand_command(&run.command, placeholders);
    debug!(?argv, "executing program");

    let spec = match CommandSpec::from_argv(argv, &placeholders.workdir, limits) {
        Ok(spec) => spec.envs(&run.env),
        Err(error) => return ProcessOutcome::not_spawned(deadline, "", error),
    };

    let outcome = supervisor.run(&spec, Some(input), deadline).await;

    debug!(
        exit_code = ?outcome.exit_code,
        signal = ?outcome.signal,
        timed_out = outcome.timed_out,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "execution complete"
    );

    outcome
}
