//! Transport over the system `ssh` client

use super::{Session, Transport, TransportError, process};
use crate::inventory::Host;
use declarative::CommandOutput;
use std::process::Command;

/// Exit status `ssh` reserves for its own failures
const SSH_ERROR_CODE: i32 = 255;

/// Reaches hosts by shelling out to `ssh`
///
/// Runs non-interactively (`BatchMode=yes`): hosts must accept key-based
/// authentication. Connection settings come from each host's
/// [`crate::SshConfig`]; anything else can be set in `~/.ssh/config` or
/// with [`Self::with_option`].
#[derive(Debug, Clone)]
pub struct SshTransport {
    program: String,
    options: Vec<String>,
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SshTransport {
    pub fn new() -> Self {
        Self {
            program: "ssh".to_string(),
            options: Vec::new(),
        }
    }

    /// Use a different client binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Pass an extra `-o key=value` option
    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options.push(format!("{key}={value}"));
        self
    }

    fn command(&self, session: &Session, host: &Host, remote: &str) -> Command {
        let ssh = &host.ssh;
        // Never wait longer to connect than the session allows
        let connect = ssh.timeout.min(session.remaining()).as_secs().max(1);

        let mut command = Command::new(&self.program);
        command
            .args(["-o", "BatchMode=yes"])
            .arg("-o")
            .arg(format!("ConnectTimeout={connect}"))
            .arg("-p")
            .arg(ssh.port.to_string());
        if let Some(key) = &ssh.ssh_key {
            command.arg("-i").arg(key);
        }
        if let Some(jump) = &ssh.proxy_jump {
            command.arg("-J").arg(jump);
        }
        for option in &self.options {
            command.arg("-o").arg(option);
        }
        command.arg(ssh.destination()).arg(remote);
        command
    }

    fn run(&self, session: &Session, host: &Host, remote: &str) -> Result<CommandOutput, TransportError> {
        let output = process::run(host.id.as_str(), self.command(session, host, remote), session)?;
        if output.code == Some(SSH_ERROR_CODE) {
            return Err(TransportError::Unreachable {
                host: host.id.to_string(),
                message: first_line(&output.stderr_str()),
            });
        }
        Ok(output)
    }
}

impl Transport for SshTransport {
    fn ping(&self, session: &Session, host: &Host) -> Result<(), TransportError> {
        let output = self.run(session, host, "true")?;
        if !output.success {
            return Err(TransportError::CommandFailed {
                host: host.id.to_string(),
                command: "true".to_string(),
                code: output.code,
                stderr: first_line(&output.stderr_str()),
            });
        }
        log::debug!("{}: reachable at {}", host.id, host.ssh.destination());
        Ok(())
    }

    fn exec(
        &self,
        session: &Session,
        host: &Host,
        command: &str,
    ) -> Result<CommandOutput, TransportError> {
        self.run(session, host, command)
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("ssh exited with status 255")
        .to_string()
}
