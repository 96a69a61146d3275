//! Process-lifetime context shared by every operation.
//!
//! One instance lives for the life of the process and is passed around as
//! `Arc<Services>`. The registry, layout cache and attempt tracker are plain
//! `std::sync::Mutex`es: they are only ever held for a lookup or an insert,
//! never across an await. The attachment manager locks internally on the
//! same terms.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;
use zjmux_core::{LayoutCache, PaneRegistry, SessionTarget};
use zjmux_zellij::{
    AttachSpawner, ControlPlane, PtyAttachSpawner, Readiness, SessionAttachmentManager,
    ZellijCommandRunner, ZellijError, ZellijExecutor,
};

use crate::arbiter::SessionLocks;
use crate::bridge_launch::DaemonAttempts;
use crate::config::RuntimeConfig;

pub type Runner = Arc<dyn ZellijCommandRunner>;
pub type Attachments = SessionAttachmentManager<Runner, Box<dyn AttachSpawner>>;

/// Where an instance comes from: the real zellij, or a test double.
pub struct Backends {
    /// `zellij action` / `list-sessions` calls (CLI timeout).
    pub cli: Runner,
    /// `zellij pipe` calls (pipe timeout).
    pub pipe: Runner,
    pub spawner: Box<dyn AttachSpawner>,
}

impl Backends {
    pub fn zellij(config: &RuntimeConfig) -> Self {
        Self {
            cli: Arc::new(ZellijExecutor::new(&config.zellij_bin).with_timeout(config.cli_timeout())),
            pipe: Arc::new(
                ZellijExecutor::new(&config.zellij_bin).with_timeout(config.pipe_timeout()),
            ),
            spawner: Box::new(PtyAttachSpawner::new(&config.zellij_bin)),
        }
    }
}

/// Who is calling: `$ZELLIJ_SESSION_NAME` and `$ZELLIJ_PANE_ID`.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub session: Option<String>,
    pub pane_id: Option<u32>,
}

impl Caller {
    pub fn from_env() -> Self {
        Self {
            session: std::env::var("ZELLIJ_SESSION_NAME")
                .ok()
                .filter(|s| !s.is_empty()),
            pane_id: std::env::var("ZELLIJ_PANE_ID")
                .ok()
                .and_then(|s| s.trim().parse().ok()),
        }
    }
}

pub struct Services {
    pub config: RuntimeConfig,
    pub caller: Caller,
    pub runner: Runner,
    pub control: ControlPlane<Runner>,
    pub focus_locks: SessionLocks,
    /// Held while a bridge daemon is being started for a session.
    pub daemon_starts: SessionLocks,
    registry: Mutex<PaneRegistry>,
    cache: Mutex<LayoutCache>,
    attachments: Arc<Attachments>,
    daemon_attempts: Mutex<DaemonAttempts>,
}

impl Services {
    pub fn new(config: RuntimeConfig, caller: Caller, backends: Backends) -> Self {
        let attachments = SessionAttachmentManager::new(Arc::clone(&backends.cli), backends.spawner)
            .with_timing(config.attach_settle(), config.attach_grace());
        Self {
            control: ControlPlane::new(backends.pipe, &config.plugin_path),
            runner: backends.cli,
            cache: Mutex::new(LayoutCache::new(config.layout_ttl())),
            registry: Mutex::new(PaneRegistry::new()),
            focus_locks: SessionLocks::default(),
            daemon_starts: SessionLocks::default(),
            attachments: Arc::new(attachments),
            daemon_attempts: Mutex::new(DaemonAttempts::default()),
            caller,
            config,
        }
    }

    pub fn from_env(config: RuntimeConfig) -> Self {
        let backends = Backends::zellij(&config);
        Self::new(config, Caller::from_env(), backends)
    }

    pub fn target(&self, requested: Option<&str>) -> SessionTarget {
        SessionTarget::resolve(requested, self.caller.session.as_deref())
    }

    /// Cache and focus-lock key for `target`.
    pub fn key(&self, target: &SessionTarget) -> String {
        target.key(self.caller.session.as_deref())
    }

    /// The real session name, if one is known.
    pub fn session_name(&self, target: &SessionTarget) -> Option<String> {
        match target {
            SessionTarget::Named(name) => Some(name.clone()),
            SessionTarget::Current => self.caller.session.clone(),
        }
    }

    pub fn socket_path(&self, target: &SessionTarget) -> Option<PathBuf> {
        self.session_name(target)
            .map(|name| self.config.socket_path(&name))
    }

    pub fn registry(&self) -> MutexGuard<'_, PaneRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cache(&self) -> MutexGuard<'_, LayoutCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn daemon_attempts(&self) -> MutexGuard<'_, DaemonAttempts> {
        self.daemon_attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Make sure a client is attached to `target` (no-op for the current session).
    pub async fn ensure_attached(&self, target: &SessionTarget) -> Result<Readiness, ZellijError> {
        if target.is_current() {
            return Ok(Readiness::Current);
        }
        let attachments = Arc::clone(&self.attachments);
        let target = target.clone();
        blocking(move || attachments.try_ensure_ready(&target)).await
    }

    pub async fn detach(&self, session: &str) -> bool {
        let attachments = Arc::clone(&self.attachments);
        let session = session.to_string();
        blocking(move || Ok(attachments.detach(&session)))
            .await
            .unwrap_or(false)
    }

    pub fn attached_pid(&self, session: &str) -> Option<u32> {
        self.attachments.pid(session)
    }

    pub fn attached_at(&self, session: &str) -> Option<DateTime<Utc>> {
        self.attachments.created_at(session)
    }

    pub async fn cleanup_attachments(&self) {
        let attachments = Arc::clone(&self.attachments);
        let _ = blocking(move || {
            debug!(sessions = ?attachments.sessions(), "cleaning up attachments");
            attachments.cleanup_all();
            Ok(())
        })
        .await;
    }
}

/// Run a synchronous zellij call on the blocking pool.
pub async fn blocking<T, F>(f: F) -> Result<T, ZellijError>
where
    F: FnOnce() -> Result<T, ZellijError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ZellijError::CommandFailed(format!("blocking task failed: {e}")))?
}

/// Sleep that tolerates a zero duration.
pub async fn settle(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}
