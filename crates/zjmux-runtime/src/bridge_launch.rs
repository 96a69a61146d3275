//! Lazy start of the bridge daemon for a session.
//!
//! The daemon is launched as a floating pane running `zjmux bridge`, then
//! hidden. Starts for one session run one at a time; a caller that waited
//! for another's start pings again before spawning its own. A failed start
//! suppresses further attempts for the retry cooldown so every read does not
//! pay the spawn timeout again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use zjmux_core::marker::{launch_args, shell_quote};
use zjmux_core::{SessionTarget, resolve_control_pane};
use zjmux_zellij::Action;

use crate::bridge_client::{BridgeError, ping};
use crate::config::RuntimeConfig;
use crate::layout_source;
use crate::services::{Services, blocking};

pub const BRIDGE_PANE_NAME: &str = "zjmux-bridge";

const MAX_PING_WAIT: Duration = Duration::from_secs(1);

/// Last failed start per session key.
#[derive(Debug, Default)]
pub struct DaemonAttempts {
    failed_at: HashMap<String, Instant>,
}

impl DaemonAttempts {
    pub fn may_attempt(&self, key: &str, now: Instant, cooldown: Duration) -> bool {
        self.failed_at
            .get(key)
            .is_none_or(|at| now.saturating_duration_since(*at) >= cooldown)
    }

    pub fn record_failure(&mut self, key: &str, now: Instant) {
        self.failed_at.insert(key.to_string(), now);
    }

    pub fn clear(&mut self, key: &str) {
        self.failed_at.remove(key);
    }
}

/// Shell command the bridge pane runs. Config the daemon needs is passed as
/// flags: the pane inherits the zellij server's environment, not ours.
pub fn bridge_command(exe: &Path, config: &RuntimeConfig, socket: &Path) -> String {
    format!(
        "exec {} --zellij-bin {} --plugin-path {} bridge --socket {}",
        shell_quote(&exe.to_string_lossy()),
        shell_quote(&config.zellij_bin),
        shell_quote(&config.plugin_path.to_string_lossy()),
        shell_quote(&socket.to_string_lossy()),
    )
}

/// Socket of a running daemon for `target`, starting one if needed.
pub async fn ensure_daemon(services: &Arc<Services>, target: &SessionTarget) -> Result<PathBuf, BridgeError> {
    let socket = services
        .socket_path(target)
        .ok_or_else(|| BridgeError::Unavailable("current session has no name".into()))?;
    let ping_wait = services.config.daemon_timeout().min(MAX_PING_WAIT);
    if ping(&socket, ping_wait).await {
        return Ok(socket);
    }
    if !services.control.is_available() {
        return Err(BridgeError::Unavailable(format!(
            "pane-bridge plugin not found at {}",
            services.control.plugin_path().display()
        )));
    }

    let key = services.key(target);
    let lock = services.daemon_starts.for_key(&key);
    let _starting = lock.lock().await;
    if ping(&socket, ping_wait).await {
        debug!(%key, "daemon started by a concurrent caller");
        return Ok(socket);
    }

    let cooldown = services.config.daemon_retry_cooldown();
    if !services.daemon_attempts().may_attempt(&key, Instant::now(), cooldown) {
        return Err(BridgeError::Unavailable(format!(
            "daemon start for {key} failed recently"
        )));
    }

    match start_daemon(services, target, &socket, ping_wait).await {
        Ok(()) => {
            services.daemon_attempts().clear(&key);
            Ok(socket)
        }
        Err(e) => {
            warn!(%key, error = %e, "bridge daemon start failed");
            services.daemon_attempts().record_failure(&key, Instant::now());
            Err(e)
        }
    }
}

async fn start_daemon(
    services: &Arc<Services>,
    target: &SessionTarget,
    socket: &Path,
    ping_wait: Duration,
) -> Result<(), BridgeError> {
    services
        .ensure_attached(target)
        .await
        .map_err(|e| BridgeError::Unavailable(e.to_string()))?;

    let exe = std::env::current_exe()?;
    let command = bridge_command(&exe, &services.config, socket);
    let action = Action::NewPane {
        name: Some(BRIDGE_PANE_NAME.to_string()),
        cwd: None,
        floating: true,
        command: launch_args(Some(&command), BRIDGE_PANE_NAME),
    };
    layout_source::run(services, target, action)
        .await
        .map_err(|e| BridgeError::Unavailable(format!("spawning bridge pane: {e}")))?;
    info!(%target, socket = %socket.display(), "bridge pane spawned");

    let interval = services.config.daemon_spawn_interval();
    let mut up = false;
    for attempt in 0..services.config.daemon_spawn_retries {
        tokio::time::sleep(interval).await;
        if ping(socket, ping_wait).await {
            debug!(attempt, "bridge daemon answered");
            up = true;
            break;
        }
    }
    if !up {
        return Err(BridgeError::Unavailable(format!(
            "no daemon on {} after {} pings",
            socket.display(),
            services.config.daemon_spawn_retries
        )));
    }

    hide_bridge_pane(services, target).await;
    Ok(())
}

async fn hide_bridge_pane(services: &Arc<Services>, target: &SessionTarget) {
    let s = Arc::clone(services);
    let t = target.clone();
    let hidden = blocking(move || {
        let panes = s.control.list_panes(&t)?;
        match resolve_control_pane(BRIDGE_PANE_NAME, None, &panes) {
            Some(pane) => s.control.hide(&t, pane.id).map(|()| Some(pane.id)),
            None => Ok(None),
        }
    })
    .await;
    match hidden {
        Ok(Some(id)) => debug!(pane_id = id, "bridge pane hidden"),
        Ok(None) => warn!("bridge pane not visible to the control plane; left shown"),
        Err(e) => warn!(error = %e, "failed to hide bridge pane"),
    }
}
