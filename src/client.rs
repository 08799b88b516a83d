//! Tunnel client process handling.
//!
//! `TunnelClient` wraps the external ssh process backing one tunnel entry. It
//! spawns the client, answers non-blocking liveness queries, and performs the
//! graceful-then-forced stop sequence. Exit notification is best-effort: a
//! spawned task drains the client's stderr and reports `Event::ClientExited`
//! when the stream ends; the supervisor's watchdog poll is the authoritative
//! fallback.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::events::Event;
use crate::supervisor::EntryId;

/// How long a graceful-termination request may take before force-killing.
pub const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_millis(1000);

/// Failure to launch the tunnel client.
///
/// Spawning reports exec failure synchronously, so a successful return from
/// [`TunnelClient::start`] means the OS confirmed the process image started.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("`{command}` not found in PATH")]
    NotFound { command: String },
    #[error("could not start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Handle to the (at most one) ssh process backing a tunnel entry.
#[derive(Debug)]
pub struct TunnelClient {
    command: String,
    entry_id: EntryId,
    event_tx: mpsc::Sender<Event>,
    child: Option<Child>,
    generation: u64,
}

impl TunnelClient {
    /// Creates an unbound handle. No process exists until [`start`](Self::start).
    pub fn new(command: String, entry_id: EntryId, event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            command,
            entry_id,
            event_tx,
            child: None,
            generation: 0,
        }
    }

    /// Identifies the current process lifetime; bumped on every start so
    /// notifications from an earlier lifetime can be recognized as stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|child| child.id())
    }

    /// Launches the client with the given arguments.
    pub fn start(&mut self, args: &[String]) -> Result<(), StartError> {
        let mut command = Command::new(&self.command);
        command.args(args);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        command.kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
            command.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = command.spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                StartError::NotFound {
                    command: self.command.clone(),
                }
            } else {
                StartError::Spawn {
                    command: self.command.clone(),
                    source,
                }
            }
        })?;

        self.generation += 1;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(watch_stderr(
                self.entry_id,
                self.generation,
                stderr,
                self.event_tx.clone(),
            ));
        }
        self.child = Some(child);
        Ok(())
    }

    /// Non-blocking liveness query; reaps the child if it has exited.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(_)) | Err(_) => {
                    self.child = None;
                    false
                }
            },
            None => false,
        }
    }

    /// Sends a graceful-termination request without waiting.
    pub fn request_stop(&self) {
        if let Some(pid) = self.pid() {
            send_terminate(pid);
        }
    }

    /// Sends an unconditional kill without waiting.
    pub fn force_stop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }

    /// Waits up to `timeout` for the process to exit. Returns true once the
    /// process is confirmed not running (including when none was running).
    pub async fn wait_exit(&mut self, timeout: Duration) -> bool {
        let Some(child) = self.child.as_mut() else {
            return true;
        };
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(_) => {
                self.child = None;
                true
            }
            Err(_) => false,
        }
    }

    /// Runs the full stop sequence: graceful request, bounded wait, then a
    /// forced kill and reap. Completes with the process not running.
    pub async fn stop(&mut self) {
        if self.child.is_none() {
            return;
        }
        self.request_stop();
        if self.wait_exit(GRACEFUL_STOP_TIMEOUT).await {
            return;
        }
        self.force_stop();
        // SIGKILL cannot be ignored; the reap completes promptly.
        if let Some(mut child) = self.child.take() {
            let _ = child.wait().await;
        }
    }
}

/// Forwards the client's stderr to the log and reports exit on end-of-stream.
async fn watch_stderr<R>(id: EntryId, generation: u64, stderr: R, tx: mpsc::Sender<Event>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log::debug!("tunnel {id}: {line}");
    }
    let _ = tx.send(Event::ClientExited { id, generation }).await;
}

#[cfg(unix)]
fn send_terminate(pid: u32) {
    unsafe {
        let pid = pid as i32;
        let _ = libc::kill(-pid, libc::SIGTERM);
        let _ = libc::kill(pid, libc::SIGTERM);
    }
}

#[cfg(windows)]
fn send_terminate(pid: u32) {
    use windows_sys::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};
    // Windows has no SIGTERM; CTRL_BREAK is the closest console signal.
    unsafe {
        let _ = GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid);
    }
}

#[cfg(all(not(unix), not(windows)))]
fn send_terminate(_pid: u32) {}
