//! PaneBridgeDaemon: a long-lived helper inside one session that can read
//! any pane by numeric id.
//!
//! It runs in a hidden floating pane, so it is an attached client and
//! `dump-screen` works for it. A read borrows focus: remember the focused
//! pane, focus the target through the plugin, dump, and focus the original
//! again. Reads and focus requests share one lock, so a focus request never
//! lands inside a read's borrow-and-restore.
//!
//! Unix socket, connection-per-request, newline-delimited JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tracing::{debug, info, warn};
use zjmux_core::{DaemonRequest, DaemonResponse, SessionTarget, apply_tail, strip_ansi};
use zjmux_zellij::{ControlPlane, ZellijError, dump_screen};

use crate::services::{Runner, Services, blocking, settle};

/// Longest request line accepted; anything longer is answered with an error.
const MAX_REQUEST_BYTES: u64 = 64 * 1024;

pub struct BridgeDaemon {
    services: Arc<Services>,
    session: String,
    focus: AsyncMutex<()>,
    stop: Notify,
}

impl BridgeDaemon {
    pub fn new(services: Arc<Services>, session: impl Into<String>) -> Self {
        Self {
            services,
            session: session.into(),
            focus: AsyncMutex::new(()),
            stop: Notify::new(),
        }
    }

    pub async fn handle(&self, req: DaemonRequest) -> DaemonResponse {
        debug!(cmd = req.command(), "bridge request");
        match req {
            DaemonRequest::Read {
                pane_id,
                full,
                tail,
            } => self.read(pane_id, full, tail).await,
            DaemonRequest::Write { pane_id, chars } => {
                match self.control(move |cp, t| cp.write(t, pane_id, &chars)).await {
                    Ok(()) => DaemonResponse {
                        pane_id: Some(pane_id),
                        ..DaemonResponse::ok()
                    },
                    Err(e) => DaemonResponse::error(e.to_string()),
                }
            }
            DaemonRequest::Focus { pane_id } => {
                let _guard = self.focus.lock().await;
                match self.control(move |cp, t| cp.focus(t, pane_id)).await {
                    Ok(()) => DaemonResponse {
                        pane_id: Some(pane_id),
                        ..DaemonResponse::ok()
                    },
                    Err(e) => DaemonResponse::error(e.to_string()),
                }
            }
            DaemonRequest::List => match self.control(|cp, t| cp.list_panes(t)).await {
                Ok(panes) => match serde_json::to_value(&panes) {
                    Ok(value) => DaemonResponse::data(value),
                    Err(e) => DaemonResponse::error(e.to_string()),
                },
                Err(e) => DaemonResponse::error(e.to_string()),
            },
            DaemonRequest::Status => DaemonResponse::data(json!({
                "session": self.session,
                "pid": std::process::id(),
            })),
            DaemonRequest::Stop => DaemonResponse::data(json!({ "message": "stopping" })),
        }
    }

    async fn read(&self, pane_id: u32, full: bool, tail: Option<usize>) -> DaemonResponse {
        let _guard = self.focus.lock().await;

        let original = match self.control(|cp, t| cp.list_panes(t)).await {
            Ok(panes) => panes
                .iter()
                .find(|p| p.is_focused && !p.is_plugin)
                .map(|p| p.id),
            Err(e) => {
                warn!(error = %e, "cannot see focused pane; focus will not be restored");
                None
            }
        };

        if let Err(e) = self.control(move |cp, t| cp.focus(t, pane_id)).await {
            return DaemonResponse::error(format!("focus pane {pane_id}: {e}"));
        }
        settle(self.services.config.focus_settle()).await;

        let runner: Runner = Arc::clone(&self.services.runner);
        let screen = blocking(move || dump_screen(&runner, &SessionTarget::Current, full)).await;

        if let Some(orig) = original.filter(|id| *id != pane_id) {
            if let Err(e) = self.control(move |cp, t| cp.focus(t, orig)).await {
                warn!(pane_id = orig, error = %e, "failed to restore focus");
            }
        }

        match screen {
            Ok(raw) => {
                let clean = strip_ansi(&raw);
                let content = apply_tail(clean, tail);
                DaemonResponse::content(pane_id, content)
            }
            Err(e) => DaemonResponse::error(format!("dump-screen: {e}")),
        }
    }

    async fn control<T, F>(&self, f: F) -> Result<T, ZellijError>
    where
        F: FnOnce(&ControlPlane<Runner>, &SessionTarget) -> Result<T, ZellijError> + Send + 'static,
        T: Send + 'static,
    {
        let services = Arc::clone(&self.services);
        blocking(move || f(&services.control, &SessionTarget::Current)).await
    }
}

// ─── Socket ──────────────────────────────────────────────────────────

/// Bind `socket_path`, replacing a stale socket and refusing a live one.
pub async fn bind_socket(socket_path: &Path) -> anyhow::Result<UnixListener> {
    let socket_dir = socket_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    if socket_path.exists() {
        if UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            info!("removed stale socket at {}", socket_path.display());
        } else {
            anyhow::bail!("bridge daemon already running at {}", socket_path.display());
        }
    }

    let listener = UnixListener::bind(socket_path)?;
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(listener)
}

pub async fn serve(daemon: Arc<BridgeDaemon>, listener: UnixListener) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let daemon = Arc::clone(&daemon);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, daemon).await {
                debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(stream: UnixStream, daemon: Arc<BridgeDaemon>) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    // A client gets as long to send its request as it waits for the reply.
    let deadline = daemon.services.config.daemon_timeout();
    let mut reader = BufReader::new(reader.take(MAX_REQUEST_BYTES));
    let mut line = String::new();

    let parsed = match tokio::time::timeout(deadline, reader.read_line(&mut line)).await {
        Err(_) => Err(format!("no request within {}ms", deadline.as_millis())),
        Ok(read) => {
            let n = read?;
            if n as u64 >= MAX_REQUEST_BYTES && !line.ends_with('\n') {
                Err(format!("request exceeds {MAX_REQUEST_BYTES} bytes"))
            } else {
                DaemonRequest::from_json(&line).map_err(|e| e.to_string())
            }
        }
    };

    let (response, stop) = match parsed {
        Ok(req) => {
            let stop = matches!(req, DaemonRequest::Stop);
            (daemon.handle(req).await, stop)
        }
        Err(e) => {
            debug!(error = %e, "rejected bridge request");
            (DaemonResponse::error(e), false)
        }
    };
    writer.write_all(response.to_line().as_bytes()).await?;
    writer.shutdown().await?;

    // Only after the reply is out.
    if stop {
        daemon.stop.notify_one();
    }
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r?;
            info!("received ctrl-c, shutting down");
        }
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }
    Ok(())
}

/// Serve until `stop`, a signal, or an accept failure; then remove the socket.
pub async fn run_daemon(
    daemon: Arc<BridgeDaemon>,
    listener: UnixListener,
    socket_path: &Path,
) -> anyhow::Result<()> {
    let result = tokio::select! {
        r = shutdown_signal() => r,
        () = daemon.stop.notified() => {
            info!("stop requested");
            Ok(())
        }
        r = serve(Arc::clone(&daemon), listener) => r,
    };
    if let Err(e) = std::fs::remove_file(socket_path) {
        debug!("socket cleanup: {e}");
    }
    info!(session = %daemon.session, "bridge daemon stopped");
    result
}

/// `zjmux bridge`: run in the caller's own session.
pub async fn run_bridge(services: Arc<Services>, socket: Option<PathBuf>) -> anyhow::Result<()> {
    let session = services
        .caller
        .session
        .clone()
        .ok_or_else(|| anyhow::anyhow!("not inside a zellij session (ZELLIJ_SESSION_NAME is unset)"))?;
    let socket_path = socket.unwrap_or_else(|| services.config.socket_path(&session));

    let listener = bind_socket(&socket_path).await?;
    info!(%session, socket = %socket_path.display(), "bridge daemon listening");
    let daemon = Arc::new(BridgeDaemon::new(services, session));
    run_daemon(daemon, listener, &socket_path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge_client::request;
    use crate::test_support::{MockZellij, plugin_file, services_with};
    use std::time::Duration;

    const PANES: &str = r#"{"success":true,"data":[{"id":3,"title":"zsh","is_focused":true},{"id":7,"title":"build"}]}"#;

    fn daemon(mock: &MockZellij, plugin: &Path) -> BridgeDaemon {
        BridgeDaemon::new(services_with(mock, Some(plugin)), "work")
    }

    fn last_payload(call: &crate::test_support::Call) -> serde_json::Value {
        serde_json::from_str(call.args.last().expect("payload")).expect("json")
    }

    #[tokio::test]
    async fn read_borrows_focus_and_tails() {
        let plugin = plugin_file();
        let mock = MockZellij::new()
            .with_pipe("list", PANES)
            .with_screen("\x1b[1mx\x1b[0m\ny\na\nb\nc\nd\ne\n\n\n");
        let d = daemon(&mock, plugin.path());

        let resp = d
            .handle(DaemonRequest::Read {
                pane_id: 7,
                full: false,
                tail: Some(5),
            })
            .await;
        assert_eq!(
            resp.to_line(),
            "{\"success\":true,\"content\":\"a\\nb\\nc\\nd\\ne\",\"pane_id\":7}\n"
        );

        assert_eq!(mock.verbs(), vec!["pipe:list", "pipe:focus", "dump-screen", "pipe:focus"]);
        let calls = mock.calls();
        assert_eq!(last_payload(&calls[1])["pane_id"], 7);
        assert_eq!(last_payload(&calls[3])["pane_id"], 3);
    }

    #[tokio::test]
    async fn read_of_focused_pane_does_not_refocus() {
        let plugin = plugin_file();
        let mock = MockZellij::new().with_pipe("list", PANES).with_screen("only\n");
        let d = daemon(&mock, plugin.path());
        let resp = d
            .handle(DaemonRequest::Read {
                pane_id: 3,
                full: true,
                tail: None,
            })
            .await;
        assert_eq!(resp.content.as_deref(), Some("only\n"));
        assert_eq!(mock.count("pipe:focus"), 1);
        assert_eq!(mock.calls()[2].args.last().map(String::as_str), Some("--full"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn focus_waits_for_read_to_restore() {
        let plugin = plugin_file();
        let mock = MockZellij::new()
            .with_pipe("list", PANES)
            .with_screen("x\n")
            .with_delay("dump-screen", Duration::from_millis(300));
        let d = Arc::new(daemon(&mock, plugin.path()));

        let reader = {
            let d = Arc::clone(&d);
            tokio::spawn(async move {
                d.handle(DaemonRequest::Read {
                    pane_id: 7,
                    full: false,
                    tail: None,
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let focused = d.handle(DaemonRequest::Focus { pane_id: 9 }).await;
        assert!(focused.success);
        assert!(reader.await.expect("join").success);

        let focus_ids: Vec<_> = mock
            .calls()
            .iter()
            .filter(|c| c.verb() == "pipe:focus")
            .map(|c| last_payload(c)["pane_id"].clone())
            .collect();
        assert_eq!(focus_ids, vec![7, 3, 9]);
    }

    #[tokio::test]
    async fn zero_tail_returns_whole_screen() {
        let plugin = plugin_file();
        let mock = MockZellij::new().with_pipe("list", PANES).with_screen("one\ntwo\n");
        let d = daemon(&mock, plugin.path());
        let resp = d
            .handle(DaemonRequest::Read {
                pane_id: 7,
                full: false,
                tail: Some(0),
            })
            .await;
        assert_eq!(resp.content.as_deref(), Some("one\ntwo\n"));
    }

    #[tokio::test]
    async fn dump_failure_still_restores_focus() {
        let plugin = plugin_file();
        let mock = MockZellij::new().with_pipe("list", PANES).failing("dump-screen");
        let d = daemon(&mock, plugin.path());
        let resp = d
            .handle(DaemonRequest::Read {
                pane_id: 7,
                full: false,
                tail: None,
            })
            .await;
        assert!(!resp.success);
        assert_eq!(mock.count("pipe:focus"), 2);
    }

    #[tokio::test]
    async fn status_reports_session_and_pid() {
        let plugin = plugin_file();
        let d = daemon(&MockZellij::new(), plugin.path());
        let resp = d.handle(DaemonRequest::Status).await;
        let data = resp.data.expect("data");
        assert_eq!(data["session"], "work");
        assert_eq!(data["pid"], std::process::id());
    }

    #[tokio::test]
    async fn stale_socket_is_replaced_live_one_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run").join("bridge-work.sock");
        drop(bind_socket(&path).await.expect("first bind"));
        assert!(path.exists());

        let live = bind_socket(&path).await.expect("stale replaced");
        let err = bind_socket(&path).await.expect_err("live");
        assert!(err.to_string().contains("already running"));
        drop(live);
    }

    #[tokio::test]
    async fn serves_over_socket_until_stopped() {
        let plugin = plugin_file();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge-work.sock");
        let listener = bind_socket(&path).await.expect("bind");
        let d = Arc::new(daemon(&MockZellij::new(), plugin.path()));

        let run_path = path.clone();
        let running = tokio::spawn(async move { run_daemon(d, listener, &run_path).await });

        let timeout = Duration::from_secs(2);
        let resp = request(&path, &DaemonRequest::Status, timeout).await.expect("status");
        assert!(resp.success);

        let mut raw = UnixStream::connect(&path).await.expect("connect");
        raw.write_all(b"{\"cmd\":\"bogus\"}\n").await.expect("write");
        let mut reply = String::new();
        BufReader::new(&mut raw).read_line(&mut reply).await.expect("read");
        assert_eq!(reply, "{\"success\":false,\"error\":\"Unknown command: bogus\"}\n");

        let resp = request(&path, &DaemonRequest::Stop, timeout).await.expect("stop");
        assert!(resp.success);
        tokio::time::timeout(timeout, running)
            .await
            .expect("daemon stopped")
            .expect("join")
            .expect("clean exit");
        assert!(!path.exists());
    }

    async fn listening(mock: &MockZellij, plugin: &Path, dir: &Path, timeout_ms: u64) -> PathBuf {
        let mut cfg = crate::test_support::test_config(Some(plugin));
        cfg.daemon_timeout_ms = timeout_ms;
        let services = crate::test_support::services_with_config(mock, cfg, crate::test_support::caller());
        let path = dir.join("bridge-work.sock");
        let listener = bind_socket(&path).await.expect("bind");
        let d = Arc::new(BridgeDaemon::new(services, "work"));
        tokio::spawn(serve(d, listener));
        path
    }

    #[tokio::test]
    async fn silent_client_is_answered_and_dropped() {
        let plugin = plugin_file();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = listening(&MockZellij::new(), plugin.path(), dir.path(), 100).await;

        let mut raw = UnixStream::connect(&path).await.expect("connect");
        raw.write_all(b"{\"cmd\":").await.expect("partial write");
        let mut reply = String::new();
        tokio::time::timeout(Duration::from_secs(2), raw.read_to_string(&mut reply))
            .await
            .expect("closed before the client gave up")
            .expect("read");
        let v: serde_json::Value = serde_json::from_str(&reply).expect("json");
        assert_eq!(v["success"], false);
        assert!(v["error"].as_str().expect("error").contains("no request within 100ms"));
    }

    #[tokio::test]
    async fn oversized_request_is_rejected() {
        let plugin = plugin_file();
        let dir = tempfile::tempdir().expect("tempdir");
        let mock = MockZellij::new();
        let path = listening(&mock, plugin.path(), dir.path(), 2_000).await;

        let mut raw = UnixStream::connect(&path).await.expect("connect");
        let junk = vec![b'x'; MAX_REQUEST_BYTES as usize + 10];
        // The daemon stops reading at the cap, so the tail of this write may fail.
        let _ = raw.write_all(&junk).await;
        let mut reply = String::new();
        BufReader::new(&mut raw).read_line(&mut reply).await.expect("read");
        assert!(reply.contains("request exceeds"), "{reply}");
        assert!(mock.calls().is_empty());
    }
}
