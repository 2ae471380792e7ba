//! Transport for the machine we are running on

use super::{Session, Transport, TransportError, process};
use crate::inventory::Host;
use declarative::CommandOutput;
use std::process::Command;

/// Runs every command locally with `sh -c`, whatever host it is for
///
/// Used for single-machine convergence, where the "fleet" is this
/// workstation.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    shell: String,
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

impl Transport for LocalTransport {
    fn ping(&self, session: &Session, host: &Host) -> Result<(), TransportError> {
        session.ensure_live(host.id.as_str())
    }

    fn exec(
        &self,
        session: &Session,
        host: &Host,
        command: &str,
    ) -> Result<CommandOutput, TransportError> {
        let mut child = Command::new(&self.shell);
        child.arg("-c").arg(command);
        process::run(host.id.as_str(), child, session)
    }
}
