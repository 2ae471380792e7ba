//! Child processes bounded by a session

use super::{Session, TransportError};
use declarative::CommandOutput;
use std::io::{ErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for the pipes to close once the child has exited
///
/// Anything the child wrote before exiting is already buffered, so this
/// only matters when a background process inherited the pipes.
const OUTPUT_SETTLE: Duration = Duration::from_millis(250);

/// Run a command to completion, killing it if the session ends first
///
/// Output is drained on background threads so a chatty child never blocks
/// on a full pipe. When the child is killed its output is discarded. A
/// process left running in the background may hold the pipes open; its
/// drain threads are detached and the output read so far is returned.
pub(super) fn run(
    host: &str,
    mut command: Command,
    session: &Session,
) -> Result<CommandOutput, TransportError> {
    session.ensure_live(host)?;

    let program = command.get_program().to_string_lossy().to_string();
    let io_error = |source| TransportError::Io {
        host: host.to_string(),
        program: program.clone(),
        source,
    };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(io_error)?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        if let Some(status) = child.try_wait().map_err(io_error)? {
            break status;
        }
        if session.is_cancelled() {
            kill(&mut child, host);
            return Err(TransportError::Cancelled {
                host: host.to_string(),
            });
        }
        let remaining = session.remaining();
        if remaining.is_zero() {
            kill(&mut child, host);
            return Err(TransportError::TimedOut {
                host: host.to_string(),
            });
        }
        thread::sleep(POLL_INTERVAL.min(remaining));
    };

    let settle = Instant::now() + OUTPUT_SETTLE;
    Ok(CommandOutput {
        stdout: collect(stdout, settle, host),
        stderr: collect(stderr, settle, host),
        success: status.success(),
        code: status.code(),
    })
}

/// Output read from one pipe, plus a signal sent when the pipe closes
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    closed: Receiver<()>,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Drain> {
    pipe.map(|mut pipe| {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (tx, closed) = mpsc::channel();
        let sink = Arc::clone(&buf);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                }
            }
            let _ = tx.send(());
        });
        Drain { buf, closed }
    })
}

/// Take what a pipe produced, waiting no later than `settle` for it to close
fn collect(drain: Option<Drain>, settle: Instant, host: &str) -> Vec<u8> {
    let Some(drain) = drain else {
        return Vec::new();
    };
    let wait = settle.saturating_duration_since(Instant::now());
    if drain.closed.recv_timeout(wait).is_err() {
        log::debug!("{host}: output still open after exit, a background process holds it");
    }
    std::mem::take(&mut *drain.buf.lock().unwrap_or_else(PoisonError::into_inner))
}

fn kill(child: &mut Child, host: &str) {
    if let Err(e) = child.kill() {
        log::debug!("{host}: failed to kill child {}: {e}", child.id());
    }
    // Reap to avoid leaving a zombie behind
    let _ = child.wait();
}
