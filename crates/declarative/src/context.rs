//! Run context and provider traits
//!
//! These traits allow the declarative crate to be used without
//! depending on a specific transport, runtime, or UI.

use crate::types::CommandOutput;
use anyhow::Result;
use std::fmt;
use std::time::Instant;

/// Provider for command dispatch on the machine being converged
///
/// Implement this trait to let steps run commands on a (possibly remote)
/// host. The implementation owns connection details and must honor its
/// own deadline and cancellation.
pub trait RemoteExecutor: Send + Sync {
    /// Run a shell command on the target
    fn run(&self, command: &str) -> Result<CommandOutput>;

    /// Run a command and return just success/failure
    fn run_status(&self, command: &str) -> Result<bool> {
        Ok(self.run(command)?.success)
    }

    /// Run a command and capture stdout
    fn run_capture(&self, command: &str) -> Result<String> {
        let output = self.run(command)?;
        if !output.success {
            anyhow::bail!("Command failed: {}", output.stderr_str().trim());
        }
        Ok(output.stdout_str())
    }
}

/// Source of an external cancellation request
pub trait CancelSignal: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

/// Never cancelled
pub struct NeverCancel;

impl CancelSignal for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Why a run stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Context passed to step check/plan/apply operations
#[derive(Clone, Copy, Default)]
pub struct RunContext<'a> {
    /// Whether this is a dry run (no actual changes)
    pub dry_run: bool,
    /// Whether to output verbose information
    pub verbose: bool,
    /// Host being converged, if running as part of a fleet
    pub host: Option<&'a str>,
    /// Point in time after which no further step may start
    pub deadline: Option<Instant>,
    /// Command dispatch on the target
    pub remote: Option<&'a dyn RemoteExecutor>,
    /// External cancellation
    pub cancel: Option<&'a dyn CancelSignal>,
}

impl<'a> RunContext<'a> {
    /// Create a new run context
    pub fn new(dry_run: bool, verbose: bool) -> Self {
        Self {
            dry_run,
            verbose,
            ..Default::default()
        }
    }

    pub fn with_host(mut self, host: &'a str) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_remote(mut self, remote: &'a dyn RemoteExecutor) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_cancel(mut self, cancel: &'a dyn CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Get the remote executor, or error if not available
    pub fn require_remote(&self) -> Result<&'a dyn RemoteExecutor> {
        self.remote
            .ok_or_else(|| anyhow::anyhow!("Command dispatch required but not available"))
    }

    /// Whether the run has been cancelled or has run out of time
    pub fn interruption(&self) -> Option<Interruption> {
        if self.cancel.is_some_and(|c| c.is_cancelled()) {
            return Some(Interruption::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(Interruption::DeadlineExceeded);
        }
        None
    }
}

impl fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("dry_run", &self.dry_run)
            .field("verbose", &self.verbose)
            .field("host", &self.host)
            .field("deadline", &self.deadline)
            .field("remote", &self.remote.is_some())
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

/// Context passed to step explain
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplainContext<'a> {
    pub verbose: bool,
    pub host: Option<&'a str>,
}

impl<'a> ExplainContext<'a> {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            host: None,
        }
    }

    pub fn with_host(mut self, host: &'a str) -> Self {
        self.host = Some(host);
        self
    }
}
