//! Owns one forked child attached to a PTY; non-blocking byte I/O and window-size control.
//!
//! Reads are delivered by a dedicated blocking task (`portable_pty`'s reader handle is a
//! synchronous `Read`) that forwards chunks into the owning session actor's mailbox as
//! `SessionMessage::PtyOutput`/`PtyExit`. `PtyProcess` itself only ever performs synchronous,
//! non-blocking writes and the resize ioctl, matching the "PTY reads are not awaited; PTY writes
//! are synchronous non-blocking" suspension-point contract.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::Settings;
use crate::error::PtyError;
use crate::session::SessionMessage;

const READ_CHUNK: usize = 65536;

struct Inner {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    pid: Option<u32>,
    closed: bool,
    mailbox: mpsc::Sender<SessionMessage>,
}

/// Clonable handle to a running PTY child. Cheap to clone; all clones share the same
/// underlying process and fds via `Arc<Mutex<_>>`.
#[derive(Clone)]
pub struct PtyProcess {
    inner: Arc<Mutex<Inner>>,
}

impl PtyProcess {
    /// Fork a child attached to a new PTY and start forwarding its output into `mailbox` as
    /// messages addressed to `session_id`. `cols`/`rows` of zero fall back to the configured
    /// defaults. `cmd`, if non-empty, overrides `settings.cmd`, which in turn overrides the
    /// login shell.
    pub fn spawn(
        cols: u16,
        rows: u16,
        cmd: &str,
        settings: &Settings,
        session_id: String,
        mailbox: mpsc::Sender<SessionMessage>,
    ) -> Result<Self, PtyError> {
        let cols = if cols == 0 { settings.default_cols } else { cols };
        let rows = if rows == 0 { settings.default_rows } else { rows };

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::OpenFailed(e.into()))?;

        let effective = if !cmd.is_empty() {
            cmd.to_string()
        } else {
            settings.cmd.clone()
        };

        let (mut builder, program) = if !effective.is_empty() {
            let mut parts = effective.split_whitespace();
            let program = parts.next().ok_or(PtyError::NoShell)?.to_string();
            let mut b = CommandBuilder::new(&program);
            b.args(parts);
            (b, program)
        } else {
            let shell = detect_shell(settings)?;
            let mut b = CommandBuilder::new(&shell);
            b.arg("-il");
            (b, shell)
        };

        builder.env("TERM", &settings.term);
        builder.env("COLORTERM", "truecolor");
        builder.env("BUTTERFLY", "1");
        builder.env("SHELL", &program);

        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| PtyError::SpawnFailed(e.into()))?;
        drop(pair.slave);

        let pid = child.process_id();
        info!(session_id = %session_id, pid = ?pid, cols, rows, "spawned pty child");

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::OpenFailed(e.into()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::OpenFailed(e.into()))?;

        let inner = Arc::new(Mutex::new(Inner {
            master: pair.master,
            writer,
            child,
            pid,
            closed: false,
            mailbox: mailbox.clone(),
        }));

        spawn_reader_task(reader, inner.clone(), session_id, mailbox);

        Ok(Self { inner })
    }

    /// Write bytes to the PTY master. Silently ignored once closed; a write error is treated as
    /// child exit.
    pub fn write(&self, data: &[u8]) {
        let mut guard = self.inner.lock().expect("pty mutex poisoned");
        if guard.closed {
            return;
        }
        if let Err(e) = guard.writer.write_all(data) {
            warn!(error = %e, "pty write failed, treating as exit");
            drop(guard);
            self.cleanup();
            return;
        }
        let _ = guard.writer.flush();
    }

    /// Set the PTY window size. A real ioctl, not a stub: `stty size` inside the child reflects
    /// the change and the child receives `SIGWINCH`.
    pub fn resize(&self, cols: u16, rows: u16) {
        let guard = self.inner.lock().expect("pty mutex poisoned");
        if guard.closed {
            return;
        }
        if let Err(e) = guard.master.resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        }) {
            warn!(error = %e, "pty resize failed");
        } else {
            debug!(cols, rows, "pty resized");
        }
    }

    /// Idempotent forced cleanup. Returns true if this call performed the transition (i.e. the
    /// PTY was not already closed). Notifies the session mailbox with `PtyExit` on that
    /// transition, the same as the reader task's own EOF-driven exit path, so a write failure
    /// (not just EOF) still results in attached clients seeing the exit frame.
    pub fn close(&self) -> bool {
        self.cleanup()
    }

    pub fn alive(&self) -> bool {
        !self.inner.lock().expect("pty mutex poisoned").closed
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.lock().expect("pty mutex poisoned").pid
    }

    fn cleanup(&self) -> bool {
        let mut guard = self.inner.lock().expect("pty mutex poisoned");
        if guard.closed {
            return false;
        }
        guard.closed = true;

        if let Some(pid) = guard.pid {
            send_signal(pid, nix::sys::signal::Signal::SIGHUP);
            send_signal(pid, nix::sys::signal::Signal::SIGCONT);
        }
        match guard.child.try_wait() {
            Ok(Some(_)) | Ok(None) => {}
            Err(e) => warn!(error = %e, "waitpid failed during pty cleanup"),
        }
        // Non-blocking: this can run on an async task (e.g. a failed write), where
        // `blocking_send` would panic. Best-effort; a full mailbox or dead receiver just means
        // the session actor is already gone or backed up beyond saving.
        let _ = guard.mailbox.try_send(SessionMessage::PtyExit);
        trace!(pid = ?guard.pid, "pty cleanup complete");
        true
    }
}

fn detect_shell(settings: &Settings) -> Result<String, PtyError> {
    if std::path::Path::new(&settings.shell).exists() {
        return Ok(settings.shell.clone());
    }
    for candidate in ["/bin/bash", "/bin/sh"] {
        if std::path::Path::new(candidate).exists() {
            return Ok(candidate.to_string());
        }
    }
    Err(PtyError::NoShell)
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::unistd::Pid;
    if let Err(e) = nix::sys::signal::kill(Pid::from_raw(pid as i32), signal) {
        trace!(pid, %signal, error = %e, "signal delivery failed (child likely already gone)");
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _signal: nix::sys::signal::Signal) {}

/// Blocking read loop, run on a dedicated OS thread via `spawn_blocking` since
/// `portable_pty`'s reader is synchronous. Forwards chunks to the session actor's mailbox;
/// an `Ok(0)` or read error is treated as child exit.
fn spawn_reader_task(
    mut reader: Box<dyn Read + Send>,
    inner: Arc<Mutex<Inner>>,
    session_id: String,
    mailbox: mpsc::Sender<SessionMessage>,
) {
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!(session_id = %session_id, "pty eof");
                    break;
                }
                Ok(n) => {
                    let chunk = buf[..n].to_vec();
                    if mailbox
                        .blocking_send(SessionMessage::PtyOutput(chunk))
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    debug!(session_id = %session_id, error = %e, "pty read error, treating as exit");
                    break;
                }
            }
        }
        let was_open = {
            let mut guard = inner.lock().expect("pty mutex poisoned");
            let was_open = !guard.closed;
            guard.closed = true;
            if let Some(pid) = guard.pid {
                send_signal(pid, nix::sys::signal::Signal::SIGHUP);
                send_signal(pid, nix::sys::signal::Signal::SIGCONT);
            }
            let _ = guard.child.try_wait();
            was_open
        };
        if was_open {
            let _ = mailbox.blocking_send(SessionMessage::PtyExit);
        }
    });
}
