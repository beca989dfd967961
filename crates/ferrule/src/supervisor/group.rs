//! Process group termination

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Kills a child's process group unless disarmed
///
/// Every stage is spawned as the leader of its own process group, so the
/// group id equals the child's pid. Dropping an armed guard sends `SIGKILL`
/// to the group, which covers a supervising task that is cancelled before
/// the child was reaped.
#[derive(Debug)]
pub(crate) struct ProcessGroupGuard {
    pgid: Option<Pid>,
}

impl ProcessGroupGuard {
    pub(crate) fn new(pid: Option<u32>) -> Self {
        let pgid = pid.and_then(|pid| i32::try_from(pid).ok()).map(Pid::from_raw);
        Self { pgid }
    }

    /// Send `SIGKILL` to every process in the group
    ///
    /// Returns false when the signal could not be delivered to anything.
    pub(crate) fn kill(&mut self) -> bool {
        let Some(pgid) = self.pgid.take() else {
            return false;
        };

        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) => {
                debug!(%pgid, "killed process group");
                true
            }
            Err(Errno::ESRCH) => false,
            Err(error) => {
                warn!(%pgid, %error, "failed to kill process group");
                false
            }
        }
    }

    /// Leave the group alone on drop
    pub(crate) fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if self.pgid.is_some() {
            self.kill();
        }
    }
}
