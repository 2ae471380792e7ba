//! Host transport
//!
//! The fleet executor reaches hosts only through the [`Transport`] trait:
//! a connectivity check and a command dispatch primitive. Every call is
//! blocking and bounded by a [`Session`], which carries the host's
//! deadline and cancellation token; implementations kill the outstanding
//! command as soon as either fires.

mod local;
mod process;
mod ssh;

pub use local::LocalTransport;
pub use ssh::SshTransport;

use crate::inventory::Host;
use declarative::{CancelSignal, CommandOutput, RemoteExecutor};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised while talking to a host
#[derive(Debug, Error)]
pub enum TransportError {
    /// The host could not be reached
    #[error("{host}: unreachable: {message}")]
    Unreachable { host: String, message: String },

    /// The session deadline passed before the call finished
    #[error("{host}: timed out")]
    TimedOut { host: String },

    /// The session was cancelled before the call finished
    #[error("{host}: cancelled")]
    Cancelled { host: String },

    /// The host answered but the command did not succeed
    #[error("{host}: '{command}' failed (exit {}): {stderr}", .code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    CommandFailed {
        host: String,
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The local process could not be spawned or waited on
    #[error("{host}: failed to run {program}: {source}")]
    Io {
        host: String,
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Deadline and cancellation for every call made on behalf of one host
#[derive(Debug, Clone)]
pub struct Session {
    deadline: Instant,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(deadline: Instant, cancel: CancellationToken) -> Self {
        Self { deadline, cancel }
    }

    /// A session expiring `timeout` from now
    pub fn with_timeout(timeout: Duration, cancel: CancellationToken) -> Self {
        Self::new(Instant::now() + timeout, cancel)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Fail fast if the session is already cancelled or expired
    pub fn ensure_live(&self, host: &str) -> Result<(), TransportError> {
        if self.is_cancelled() {
            return Err(TransportError::Cancelled {
                host: host.to_string(),
            });
        }
        if self.remaining().is_zero() {
            return Err(TransportError::TimedOut {
                host: host.to_string(),
            });
        }
        Ok(())
    }
}

/// Connectivity check and command dispatch for hosts
pub trait Transport: Send + Sync {
    /// Verify the host is reachable
    fn ping(&self, session: &Session, host: &Host) -> Result<(), TransportError>;

    /// Run a shell command on the host
    ///
    /// A command that runs but exits non-zero is not an error: the exit
    /// status is reported on the returned output.
    fn exec(
        &self,
        session: &Session,
        host: &Host,
        command: &str,
    ) -> Result<CommandOutput, TransportError>;
}

/// One host reached through a transport, as seen by steps
///
/// Bridges the transport into the capabilities steps consume from their
/// run context: command dispatch and cancellation.
pub struct HostSession<'a> {
    transport: &'a dyn Transport,
    host: &'a Host,
    session: &'a Session,
}

impl<'a> HostSession<'a> {
    pub fn new(transport: &'a dyn Transport, host: &'a Host, session: &'a Session) -> Self {
        Self {
            transport,
            host,
            session,
        }
    }

    pub fn host(&self) -> &Host {
        self.host
    }

    pub fn session(&self) -> &Session {
        self.session
    }
}

impl RemoteExecutor for HostSession<'_> {
    fn run(&self, command: &str) -> anyhow::Result<CommandOutput> {
        log::trace!("{}: exec {command}", self.host.id);
        Ok(self.transport.exec(self.session, self.host, command)?)
    }
}

impl CancelSignal for HostSession<'_> {
    fn is_cancelled(&self) -> bool {
        self.session.is_cancelled()
    }
}
