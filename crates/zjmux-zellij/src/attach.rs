//! Headless zellij clients for sessions the caller is not attached to.
//!
//! `dump-screen` and the pane-bridge daemon only work from an attached
//! client. For a foreign session the manager fabricates one: `zellij attach
//! <session>` on a pseudo-terminal nobody looks at.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use zjmux_core::SessionTarget;

use crate::error::ZellijError;
use crate::executor::ZellijCommandRunner;
use crate::pty::AttachedProcess;
use crate::session::list_sessions;

pub const DEFAULT_ATTACH_SETTLE: Duration = Duration::from_millis(1500);
pub const DEFAULT_ATTACH_GRACE: Duration = Duration::from_secs(2);

/// A running attach client.
pub trait AttachedClient: Send {
    fn pid(&self) -> Option<u32>;
    fn is_alive(&mut self) -> bool;
    fn terminate(&mut self, grace: Duration);
}

impl AttachedClient for AttachedProcess {
    fn pid(&self) -> Option<u32> {
        AttachedProcess::pid(self)
    }

    fn is_alive(&mut self) -> bool {
        AttachedProcess::is_alive(self)
    }

    fn terminate(&mut self, grace: Duration) {
        AttachedProcess::terminate(self, grace);
    }
}

/// Starts attach clients. Injectable so tests can count forks.
pub trait AttachSpawner: Send + Sync {
    fn spawn(&self, session: &str) -> Result<Box<dyn AttachedClient>, ZellijError>;
}

impl<T: AttachSpawner + ?Sized> AttachSpawner for Box<T> {
    fn spawn(&self, session: &str) -> Result<Box<dyn AttachedClient>, ZellijError> {
        (**self).spawn(session)
    }
}

pub struct PtyAttachSpawner {
    zellij_bin: String,
    rows: u16,
    cols: u16,
}

impl PtyAttachSpawner {
    pub fn new(zellij_bin: impl Into<String>) -> Self {
        Self {
            zellij_bin: zellij_bin.into(),
            rows: 50,
            cols: 200,
        }
    }

    #[must_use]
    pub fn with_size(mut self, rows: u16, cols: u16) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }
}

impl AttachSpawner for PtyAttachSpawner {
    fn spawn(&self, session: &str) -> Result<Box<dyn AttachedClient>, ZellijError> {
        let proc =
            AttachedProcess::spawn(&self.zellij_bin, &["attach", session], self.rows, self.cols)?;
        Ok(Box::new(proc))
    }
}

pub struct SessionAttachment {
    pub session: String,
    pub created_at: DateTime<Utc>,
    client: Box<dyn AttachedClient>,
}

impl SessionAttachment {
    pub fn pid(&self) -> Option<u32> {
        self.client.pid()
    }
}

/// How [`SessionAttachmentManager::try_ensure_ready`] satisfied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The caller's own session; nothing to do.
    Current,
    /// A tracked attachment was still alive.
    Reused,
    /// A new attach client was started.
    Attached,
}

impl Readiness {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Reused => "reused",
            Self::Attached => "attached",
        }
    }
}

/// Tracks headless attachments by session name. Shared by reference: the
/// map lock is held only to look up, insert or remove, and a per-session
/// gate keeps two attaches to the same session from both forking.
pub struct SessionAttachmentManager<R, S> {
    runner: R,
    spawner: S,
    settle: Duration,
    grace: Duration,
    attachments: Mutex<HashMap<String, SessionAttachment>>,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<R: ZellijCommandRunner, S: AttachSpawner> SessionAttachmentManager<R, S> {
    pub fn new(runner: R, spawner: S) -> Self {
        Self {
            runner,
            spawner,
            settle: DEFAULT_ATTACH_SETTLE,
            grace: DEFAULT_ATTACH_GRACE,
            attachments: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_timing(mut self, settle: Duration, grace: Duration) -> Self {
        self.settle = settle;
        self.grace = grace;
        self
    }

    /// Make `target` usable by an attached-client-only operation.
    pub fn ensure_ready(&self, target: &SessionTarget) -> bool {
        match self.try_ensure_ready(target) {
            Ok(_) => true,
            Err(e) => {
                warn!(%target, error = %e, "session attachment not ready");
                false
            }
        }
    }

    pub fn try_ensure_ready(&self, target: &SessionTarget) -> Result<Readiness, ZellijError> {
        let SessionTarget::Named(session) = target else {
            return Ok(Readiness::Current);
        };
        let gate = self.gate(session);
        let _turn = gate.lock().unwrap_or_else(PoisonError::into_inner);

        let dead = {
            let mut map = self.map();
            match map.get_mut(session).map(|a| a.client.is_alive()) {
                Some(true) => {
                    debug!(%session, "reusing attachment");
                    return Ok(Readiness::Reused);
                }
                Some(false) => map.remove(session),
                None => None,
            }
        };
        if let Some(mut dead) = dead {
            info!(%session, "tracked attachment died, re-attaching");
            dead.client.terminate(Duration::ZERO);
        }

        let exists = list_sessions(&self.runner)?
            .iter()
            .any(|s| s.name == *session && !s.exited);
        if !exists {
            return Err(ZellijError::SessionNotFound(session.clone()));
        }

        let mut client = self.spawner.spawn(session)?;
        std::thread::sleep(self.settle);
        if !client.is_alive() {
            client.terminate(Duration::ZERO);
            return Err(ZellijError::AttachmentFailed(format!(
                "zellij attach {session} exited during startup"
            )));
        }

        info!(%session, pid = ?client.pid(), "headless attachment created");
        self.map().insert(
            session.clone(),
            SessionAttachment {
                session: session.clone(),
                created_at: Utc::now(),
                client,
            },
        );
        Ok(Readiness::Attached)
    }

    /// Terminate the attachment for `session`. Returns false if none was tracked.
    pub fn detach(&self, session: &str) -> bool {
        let removed = self.map().remove(session);
        match removed {
            Some(mut a) => {
                a.client.terminate(self.grace);
                info!(%session, "headless attachment detached");
                true
            }
            None => false,
        }
    }

    pub fn cleanup_all(&self) {
        let drained: Vec<SessionAttachment> = self.map().drain().map(|(_, a)| a).collect();
        for mut a in drained {
            a.client.terminate(self.grace);
            info!(session = %a.session, "headless attachment detached");
        }
    }

    pub fn pid(&self, session: &str) -> Option<u32> {
        self.map().get(session).and_then(SessionAttachment::pid)
    }

    pub fn created_at(&self, session: &str) -> Option<DateTime<Utc>> {
        self.map().get(session).map(|a| a.created_at)
    }

    pub fn sessions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.map().keys().cloned().collect();
        names.sort();
        names
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, SessionAttachment>> {
        self.attachments.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self, session: &str) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(session.to_string()).or_default())
    }
}

impl<R, S> Drop for SessionAttachmentManager<R, S> {
    fn drop(&mut self) {
        let map = self.attachments.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, mut a) in map.drain() {
            a.client.terminate(Duration::ZERO);
        }
    }
}
