//! Sandbox policies applied to every spawned stage
//!
//! A policy gets the fully built command right before spawn and may confine
//! it further. The reference behavior is [`Unconfined`]: the submission runs
//! on the host with nothing but the wall clock deadline. Deployments facing
//! untrusted input should use [`Rlimits`] at least, and an outer jail
//! (namespaces, seccomp, a dedicated user) configured through the language
//! commands.

use std::fmt;
use std::sync::Arc;

use nix::sys::resource::{Resource, setrlimit};
use thiserror::Error;
use tokio::process::Command;

use crate::config::{SandboxConfig, SandboxKind};
use crate::types::ResourceLimits;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxError {
    #[error("sandbox policy '{policy}' rejected the command: {message}")]
    Rejected {
        policy: &'static str,
        message: String,
    },
}

/// Confinement hook invoked for every stage before spawn
pub trait SandboxPolicy: fmt::Debug + Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether the policy restricts the child beyond the wall clock deadline
    fn confines(&self) -> bool;

    /// Adjust the command before it is spawned
    fn apply(&self, command: &mut Command, limits: &ResourceLimits) -> Result<(), SandboxError>;
}

/// Build the policy selected in the configuration
pub fn from_config(config: &SandboxConfig) -> Arc<dyn SandboxPolicy> {
    let env_path = config.clear_env.then(|| config.path.clone());
    match config.policy {
        SandboxKind::Unconfined => Arc::new(Unconfined { env_path }),
        SandboxKind::Rlimits => Arc::new(Rlimits { env_path }),
    }
}

/// Run children directly on the host
#[derive(Debug, Clone, Default)]
pub struct Unconfined {
    /// When set, the environment is cleared and only this PATH is passed
    pub env_path: Option<String>,
}

impl SandboxPolicy for Unconfined {
    fn name(&self) -> &'static str {
        "unconfined"
    }

    fn confines(&self) -> bool {
        false
    }

    fn apply(&self, command: &mut Command, _limits: &ResourceLimits) -> Result<(), SandboxError> {
        scrub_env(command, self.env_path.as_deref());
        Ok(())
    }
}

/// Apply kernel resource limits in the child before exec
#[derive(Debug, Clone, Default)]
pub struct Rlimits {
    /// When set, the environment is cleared and only this PATH is passed
    pub env_path: Option<String>,
}

impl Rlimits {
    /// The `setrlimit` calls performed for the given limits
    pub fn resource_limits(limits: &ResourceLimits) -> Vec<(Resource, u64)> {
        let mut resources = Vec::new();
        if let Some(seconds) = limits.time_limit {
            resources.push((Resource::RLIMIT_CPU, seconds.ceil().max(1.0) as u64));
        }
        if let Some(kb) = limits.memory_limit {
            resources.push((Resource::RLIMIT_AS, kb.saturating_mul(1024)));
        }
        if let Some(count) = limits.max_processes {
            resources.push((Resource::RLIMIT_NPROC, u64::from(count)));
        }
        if let Some(count) = limits.max_open_files {
            resources.push((Resource::RLIMIT_NOFILE, u64::from(count)));
        }
        resources
    }
}

impl SandboxPolicy for Rlimits {
    fn name(&self) -> &'static str {
        "rlimits"
    }

    fn confines(&self) -> bool {
        true
    }

    fn apply(&self, command: &mut Command, limits: &ResourceLimits) -> Result<(), SandboxError> {
        scrub_env(command, self.env_path.as_deref());

        let resources = Self::resource_limits(limits);
        if resources.is_empty() {
            return Ok(());
        }

        // SAFETY: the closure only calls setrlimit(2), which is async-signal-safe,
        // and allocates nothing between fork and exec.
        unsafe {
            command.pre_exec(move || {
                for &(resource, value) in &resources {
                    let value = value as nix::libc::rlim_t;
                    setrlimit(resource, value, value).map_err(std::io::Error::from)?;
                }
                Ok(())
            });
        }
        Ok(())
    }
}

fn scrub_env(command: &mut Command, path: Option<&str>) {
    if let Some(path) = path {
        command.env_clear().env("PATH", path);
    }
}
