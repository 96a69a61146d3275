//! A child process whose standard streams are a pseudo-terminal.
//!
//! The parent keeps only the master side. Output is drained on a background
//! thread so a chatty child (zellij redraws constantly) never blocks on a
//! full pty buffer.

use std::io::Read;
use std::time::{Duration, Instant};

use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tracing::debug;

use crate::error::ZellijError;

const TERMINATE_POLL: Duration = Duration::from_millis(50);

/// Environment that marks a process as running inside zellij. A headless
/// client must not inherit it, or zellij treats the attach as nested.
const ZELLIJ_ENV: &[&str] = &["ZELLIJ", "ZELLIJ_SESSION_NAME", "ZELLIJ_PANE_ID"];

pub struct AttachedProcess {
    child: Box<dyn Child + Send + Sync>,
    // Held so the master fd stays open for the child's lifetime.
    _master: Box<dyn MasterPty + Send>,
    pid: Option<u32>,
}

impl AttachedProcess {
    /// Spawn `program args..` on a fresh pty of the given size.
    pub fn spawn(program: &str, args: &[&str], rows: u16, cols: u16) -> Result<Self, ZellijError> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ZellijError::AttachmentFailed(format!("openpty: {e}")))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        cmd.env("TERM", "xterm-256color");
        for key in ZELLIJ_ENV {
            cmd.env_remove(key);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ZellijError::AttachmentFailed(format!("spawn {program}: {e}")))?;
        // The child holds its own copy; ours would keep the pty open after it exits.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ZellijError::AttachmentFailed(format!("pty reader: {e}")))?;
        spawn_drain(reader);

        let pid = child.process_id();
        debug!(?pid, program, "pty child spawned");
        Ok(Self {
            child,
            _master: pair.master,
            pid,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Alive means not yet reaped and still accepting signal 0.
    pub fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(_)) | Err(_) => false,
            Ok(None) => self.pid.is_some_and(signal_alive),
        }
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL. Always reaps.
    pub fn terminate(&mut self, grace: Duration) {
        if !self.is_alive() {
            return;
        }
        if let Some(pid) = self.pid {
            // SAFETY: pid is our unreaped child (checked by is_alive above).
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if matches!(self.child.try_wait(), Ok(Some(_))) {
                return;
            }
            std::thread::sleep(TERMINATE_POLL);
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for AttachedProcess {
    fn drop(&mut self) {
        self.terminate(Duration::ZERO);
    }
}

fn signal_alive(pid: u32) -> bool {
    // SAFETY: signal 0 performs permission and existence checks only.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

fn spawn_drain(mut reader: Box<dyn Read + Send>) {
    std::thread::spawn(move || {
        let _ = std::io::copy(&mut reader, &mut std::io::sink());
    });
}
