//! ZellijCommandRunner trait and ZellijExecutor (sync subprocess wrapper).

use std::process::{Command, Output, Stdio};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use zjmux_core::SessionTarget;

use crate::error::ZellijError;

pub const DEFAULT_CLI_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for executing zellij commands. Enables mock injection for testing.
///
/// `args` never include the session flag; implementations add it for
/// [`SessionTarget::Named`].
pub trait ZellijCommandRunner: Send + Sync {
    fn run(&self, target: &SessionTarget, args: &[&str]) -> Result<String, ZellijError>;
}

impl<T: ZellijCommandRunner + ?Sized> ZellijCommandRunner for &T {
    fn run(&self, target: &SessionTarget, args: &[&str]) -> Result<String, ZellijError> {
        (**self).run(target, args)
    }
}

impl<T: ZellijCommandRunner + ?Sized> ZellijCommandRunner for Arc<T> {
    fn run(&self, target: &SessionTarget, args: &[&str]) -> Result<String, ZellijError> {
        (**self).run(target, args)
    }
}

/// Real zellij executor using `std::process::Command` and a fixed timeout.
pub struct ZellijExecutor {
    zellij_bin: String,
    timeout: Duration,
}

impl ZellijExecutor {
    pub fn new(zellij_bin: impl Into<String>) -> Self {
        Self {
            zellij_bin: zellij_bin.into(),
            timeout: DEFAULT_CLI_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn zellij_bin(&self) -> &str {
        &self.zellij_bin
    }

    fn command(&self, target: &SessionTarget, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.zellij_bin);
        if let Some(name) = target.name() {
            cmd.args(["--session", name]);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Default for ZellijExecutor {
    fn default() -> Self {
        Self::new("zellij")
    }
}

impl ZellijCommandRunner for ZellijExecutor {
    fn run(&self, target: &SessionTarget, args: &[&str]) -> Result<String, ZellijError> {
        let label = args.first().copied().unwrap_or("").to_string();
        let child = self.command(target, args).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ZellijError::NotFound(self.zellij_bin.clone())
            } else {
                ZellijError::Io(e)
            }
        })?;
        let output = wait_with_timeout(child, self.timeout, &label)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ZellijError::CommandFailed(format!(
                "{label}: exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Wait for `child` up to `timeout`; on expiry the child is SIGKILLed.
fn wait_with_timeout(
    child: std::process::Child,
    timeout: Duration,
    label: &str,
) -> Result<Output, ZellijError> {
    let pid = child.id();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(child.wait_with_output());
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result.map_err(ZellijError::Io),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            // SAFETY: pid belongs to our own unreaped child; the waiter thread
            // still owns the Child, so the pid cannot have been recycled.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGKILL);
            }
            Err(ZellijError::Timeout {
                command: label.to_string(),
                after: timeout,
            })
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ZellijError::CommandFailed(format!(
            "{label}: waiter thread exited without a result"
        ))),
    }
}
