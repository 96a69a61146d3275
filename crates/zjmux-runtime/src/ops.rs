//! Caller-facing operations.
//!
//! Every operation answers a JSON object with `success`, plus `error` (and
//! `candidates` for unknown names) on failure. Operations that can address
//! a pane by numeric id try the control plane first and fall back to focus
//! arbitration; the fallback is logged, never surfaced.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use zjmux_core::marker::launch_args;
use zjmux_core::{
    DaemonRequest, LocateError, PaneRegistration, SessionTarget, Strategy, apply_tail, locate,
    strip_ansi, tail_lines,
};
use zjmux_zellij::{Action, list_sessions};

use crate::arbiter::{ArbiterError, with_pane_focus};
use crate::bridge_client::{BridgeError, request};
use crate::bridge_launch::ensure_daemon;
use crate::layout_source;
use crate::locate::{control_pane, text_locate};
use crate::services::{Services, blocking};

const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_WAIT_INTERVAL_MS: u64 = 500;
const MIN_WAIT_INTERVAL: Duration = Duration::from_millis(10);
const WAIT_CONTEXT_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpRequest {
    CreatePane {
        name: String,
        command: Option<String>,
        cwd: Option<String>,
        #[serde(default)]
        floating: bool,
        session: Option<String>,
    },
    ClosePane {
        name: String,
        #[serde(default)]
        force: bool,
        session: Option<String>,
    },
    ReadPane {
        name: String,
        #[serde(default)]
        full: bool,
        tail: Option<usize>,
        session: Option<String>,
    },
    WriteToPane {
        name: String,
        chars: String,
        session: Option<String>,
    },
    RunInPane {
        name: String,
        command: String,
        session: Option<String>,
    },
    WaitForOutput {
        name: String,
        pattern: String,
        timeout_ms: Option<u64>,
        interval_ms: Option<u64>,
        session: Option<String>,
    },
    LocatePane {
        name: String,
        session: Option<String>,
    },
    ListPanes {
        session: Option<String>,
    },
    ListSessions {},
    AttachSession {
        session: String,
    },
    DetachSession {
        session: String,
    },
    DaemonStatus {
        session: Option<String>,
    },
    StopDaemon {
        session: Option<String>,
    },
}

pub async fn dispatch(services: &Arc<Services>, req: OpRequest) -> Value {
    debug!(?req, "operation");
    let result = match req {
        OpRequest::CreatePane {
            name,
            command,
            cwd,
            floating,
            session,
        } => {
            create_pane(
                services,
                &name,
                command.as_deref(),
                cwd.as_deref(),
                floating,
                session.as_deref(),
            )
            .await
        }
        OpRequest::ClosePane {
            name,
            force,
            session,
        } => close_pane(services, &name, force, session.as_deref()).await,
        OpRequest::ReadPane {
            name,
            full,
            tail,
            session,
        } => read_pane(services, &name, full, tail, session.as_deref()).await,
        OpRequest::WriteToPane {
            name,
            chars,
            session,
        } => write_to_pane(services, &name, &chars, session.as_deref()).await,
        OpRequest::RunInPane {
            name,
            command,
            session,
        } => run_in_pane(services, &name, &command, session.as_deref()).await,
        OpRequest::WaitForOutput {
            name,
            pattern,
            timeout_ms,
            interval_ms,
            session,
        } => {
            wait_for_output(
                services,
                &name,
                &pattern,
                timeout_ms,
                interval_ms,
                session.as_deref(),
            )
            .await
        }
        OpRequest::LocatePane { name, session } => {
            locate_pane(services, &name, session.as_deref()).await
        }
        OpRequest::ListPanes { session } => list_panes(services, session.as_deref()).await,
        OpRequest::ListSessions {} => list_all_sessions(services).await,
        OpRequest::AttachSession { session } => attach_session(services, &session).await,
        OpRequest::DetachSession { session } => detach_session(services, &session).await,
        OpRequest::DaemonStatus { session } => daemon_status(services, session.as_deref()).await,
        OpRequest::StopDaemon { session } => stop_daemon(services, session.as_deref()).await,
    };
    match result {
        Ok(body) => success(body),
        Err(e) => failure(&e),
    }
}

fn success(body: Value) -> Value {
    let mut out = Map::new();
    out.insert("success".to_string(), Value::Bool(true));
    if let Value::Object(fields) = body {
        out.extend(fields);
    }
    Value::Object(out)
}

fn failure(err: &anyhow::Error) -> Value {
    let mut out = json!({ "success": false, "error": format!("{err:#}") });
    if let Some(candidates) = candidates_of(err) {
        out["candidates"] = json!(candidates);
    }
    out
}

fn candidates_of(err: &anyhow::Error) -> Option<&[String]> {
    let not_found = err.downcast_ref::<LocateError>().or_else(|| {
        match err.downcast_ref::<ArbiterError>() {
            Some(ArbiterError::PaneNotFound(e)) => Some(e),
            _ => None,
        }
    })?;
    let LocateError::NotFound { candidates, .. } = not_found;
    Some(candidates.as_slice())
}

// ─── Pane lifecycle ──────────────────────────────────────────────────

pub async fn create_pane(
    services: &Arc<Services>,
    name: &str,
    command: Option<&str>,
    cwd: Option<&str>,
    floating: bool,
    session: Option<&str>,
) -> anyhow::Result<Value> {
    anyhow::ensure!(!name.trim().is_empty(), "pane name must not be empty");
    let target = services.target(session);
    services.ensure_attached(&target).await?;

    let action = Action::NewPane {
        name: Some(name.to_string()),
        cwd: cwd.map(str::to_string),
        floating,
        command: launch_args(command, name),
    };
    {
        // new-pane moves focus; keep it out of any arbitration in flight
        let lock = services.focus_locks.for_key(&services.key(&target));
        let _guard = lock.lock().await;
        layout_source::run(services, &target, action)
            .await
            .context("new-pane")?;
    }

    let mut reg = PaneRegistration {
        session: services.session_name(&target),
        command: command.map(str::to_string),
        cwd: cwd.map(str::to_string),
        floating,
        ..PaneRegistration::new(name)
    };
    match layout_source::snapshot(services, &target).await {
        Ok(layout) => match locate(name, None, &layout.panes()) {
            Ok(found) => reg = reg.placed_at(&found.pane),
            Err(e) => warn!(name, error = %e, "new pane not in layout yet"),
        },
        Err(e) => warn!(name, error = %e, "cannot read layout after new-pane"),
    }
    let placed = (reg.tab_name.clone(), reg.pane_index);
    let handle = services.registry().register(reg, Utc::now());
    let pane_id = control_pane(services, &target, name).await.map(|p| p.id);

    Ok(json!({
        "name": name,
        "handle": handle,
        "tab": placed.0,
        "pane_index": placed.1,
        "floating": floating,
        "pane_id": pane_id,
    }))
}

pub async fn close_pane(
    services: &Arc<Services>,
    name: &str,
    force: bool,
    session: Option<&str>,
) -> anyhow::Result<Value> {
    let target = services.target(session);
    services.ensure_attached(&target).await?;
    let own_session = target.is_current() && services.caller.pane_id.is_some();

    if let Some(pane) = control_pane(services, &target, name).await {
        if !force && own_session && services.caller.pane_id == Some(pane.id) {
            anyhow::bail!("refusing to close the caller's own pane ({}) without force", pane.id);
        }
        let s = Arc::clone(services);
        let t = target.clone();
        let id = pane.id;
        blocking(move || s.control.close(&t, id, force)).await?;
        services.cache().invalidate(&services.key(&target));
        services.registry().remove(name);
        return Ok(json!({ "name": name, "pane_id": id, "via": "control_plane" }));
    }

    if !force && own_session {
        // Without ids the caller's pane is the one holding focus.
        let layout = layout_source::snapshot(services, &target).await?;
        let found = text_locate(services, &target, &layout, name)?;
        if found.pane.focused {
            anyhow::bail!("refusing to close the focused pane '{name}' (likely the caller's own) without force");
        }
    }

    let outcome = with_pane_focus(services, &target, name, |pane| async move {
        pane.run(Action::ClosePane).await?;
        Ok::<_, anyhow::Error>(())
    })
    .await?;
    outcome.result.map_err(anyhow::Error::msg)?;
    services.registry().remove(name);
    Ok(json!({
        "name": name,
        "via": "arbiter",
        "strategy": outcome.located.strategy,
    }))
}

// ─── Reading and writing ─────────────────────────────────────────────

pub async fn read_pane(
    services: &Arc<Services>,
    name: &str,
    full: bool,
    tail: Option<usize>,
    session: Option<&str>,
) -> anyhow::Result<Value> {
    let target = services.target(session);
    services.ensure_attached(&target).await?;

    if let Some(pane) = control_pane(services, &target, name).await {
        match read_via_daemon(services, &target, pane.id, full, tail).await {
            Ok(content) => {
                return Ok(json!({
                    "name": name,
                    "pane_id": pane.id,
                    "content": content,
                    "via": "daemon",
                }));
            }
            Err(e) => warn!(name, error = %e, "daemon read failed, focusing instead"),
        }
    }

    let outcome = with_pane_focus(services, &target, name, move |pane| async move {
        Ok::<_, anyhow::Error>(pane.dump_screen(full).await?)
    })
    .await?;
    let raw = outcome.result.map_err(anyhow::Error::msg)?;
    let clean = strip_ansi(&raw);
    let content = apply_tail(clean, tail);
    Ok(json!({
        "name": name,
        "content": content,
        "via": "arbiter",
        "strategy": outcome.located.strategy,
    }))
}

async fn read_via_daemon(
    services: &Arc<Services>,
    target: &SessionTarget,
    pane_id: u32,
    full: bool,
    tail: Option<usize>,
) -> Result<String, BridgeError> {
    let socket = ensure_daemon(services, target).await?;
    let req = DaemonRequest::Read {
        pane_id,
        full,
        tail,
    };
    let resp = request(&socket, &req, services.config.daemon_timeout()).await?;
    if resp.success {
        Ok(resp.content.unwrap_or_default())
    } else {
        Err(BridgeError::Daemon(resp.error.unwrap_or_default()))
    }
}

pub async fn write_to_pane(
    services: &Arc<Services>,
    name: &str,
    chars: &str,
    session: Option<&str>,
) -> anyhow::Result<Value> {
    let target = services.target(session);
    services.ensure_attached(&target).await?;

    if let Some(pane) = control_pane(services, &target, name).await {
        let s = Arc::clone(services);
        let t = target.clone();
        let id = pane.id;
        let text = chars.to_string();
        match blocking(move || s.control.write(&t, id, &text)).await {
            Ok(()) => {
                return Ok(json!({
                    "name": name,
                    "pane_id": id,
                    "written": chars.len(),
                    "via": "control_plane",
                }));
            }
            Err(e) => warn!(name, error = %e, "control plane write failed, focusing instead"),
        }
    }

    let text = chars.to_string();
    let outcome = with_pane_focus(services, &target, name, move |pane| async move {
        pane.run(Action::WriteChars(text)).await?;
        Ok::<_, anyhow::Error>(())
    })
    .await?;
    outcome.result.map_err(anyhow::Error::msg)?;
    Ok(json!({
        "name": name,
        "written": chars.len(),
        "via": "arbiter",
        "strategy": outcome.located.strategy,
    }))
}

pub async fn run_in_pane(
    services: &Arc<Services>,
    name: &str,
    command: &str,
    session: Option<&str>,
) -> anyhow::Result<Value> {
    let line = if command.ends_with('\n') {
        command.to_string()
    } else {
        format!("{command}\n")
    };
    write_to_pane(services, name, &line, session).await
}

/// Poll `read_pane` until `pattern` shows up or the timeout passes.
pub async fn wait_for_output(
    services: &Arc<Services>,
    name: &str,
    pattern: &str,
    timeout_ms: Option<u64>,
    interval_ms: Option<u64>,
    session: Option<&str>,
) -> anyhow::Result<Value> {
    anyhow::ensure!(!pattern.is_empty(), "pattern must not be empty");
    let timeout = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS));
    let interval = Duration::from_millis(interval_ms.unwrap_or(DEFAULT_WAIT_INTERVAL_MS))
        .max(MIN_WAIT_INTERVAL);
    let started = Instant::now();

    loop {
        let read = read_pane(services, name, false, None, session).await?;
        let content = read["content"].as_str().unwrap_or_default();
        if content.contains(pattern) {
            return Ok(json!({
                "name": name,
                "matched": true,
                "elapsed_ms": millis(started.elapsed()),
                "content": tail_lines(content, WAIT_CONTEXT_LINES),
            }));
        }
        if started.elapsed() + interval > timeout {
            anyhow::bail!(
                "timed out after {}ms waiting for {pattern:?} in '{name}'",
                millis(timeout)
            );
        }
        tokio::time::sleep(interval).await;
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ─── Lookup ──────────────────────────────────────────────────────────

pub async fn locate_pane(
    services: &Arc<Services>,
    name: &str,
    session: Option<&str>,
) -> anyhow::Result<Value> {
    let target = services.target(session);
    services.ensure_attached(&target).await?;

    if let Some(pane) = control_pane(services, &target, name).await {
        return Ok(json!({
            "name": name,
            "strategy": Strategy::ControlPlane,
            "pane_id": pane.id,
            "title": pane.title,
            "tab_index": pane.tab_index,
            "floating": pane.is_floating,
            "focused": pane.is_focused,
        }));
    }
    let layout = layout_source::snapshot(services, &target)
        .await
        .context("dump-layout")?;
    let found = text_locate(services, &target, &layout, name)?;
    Ok(json!({
        "name": name,
        "strategy": found.strategy,
        "pane": found.pane,
    }))
}

pub async fn list_panes(services: &Arc<Services>, session: Option<&str>) -> anyhow::Result<Value> {
    let target = services.target(session);
    services.ensure_attached(&target).await?;
    let layout = layout_source::snapshot(services, &target)
        .await
        .context("dump-layout")?;
    let session_name = services.session_name(&target);
    let registered: Vec<_> = services
        .registry()
        .list()
        .into_iter()
        .filter(|r| r.session == session_name)
        .cloned()
        .collect();
    Ok(json!({ "tabs": layout.tabs, "registered": registered }))
}

// ─── Sessions and daemon ─────────────────────────────────────────────

pub async fn list_all_sessions(services: &Arc<Services>) -> anyhow::Result<Value> {
    let runner = Arc::clone(&services.runner);
    let sessions = blocking(move || list_sessions(&runner)).await?;
    Ok(json!({ "sessions": sessions }))
}

pub async fn attach_session(services: &Arc<Services>, session: &str) -> anyhow::Result<Value> {
    let target = services.target(Some(session));
    let readiness = services.ensure_attached(&target).await?;
    Ok(json!({
        "session": session,
        "readiness": readiness.as_str(),
        "pid": services.attached_pid(session),
        "attached_at": services.attached_at(session),
    }))
}

pub async fn detach_session(services: &Arc<Services>, session: &str) -> anyhow::Result<Value> {
    let detached = services.detach(session).await;
    Ok(json!({ "session": session, "detached": detached }))
}

pub async fn daemon_status(services: &Arc<Services>, session: Option<&str>) -> anyhow::Result<Value> {
    let target = services.target(session);
    let socket = services
        .socket_path(&target)
        .context("current session has no name")?;
    match request(&socket, &DaemonRequest::Status, services.config.daemon_timeout()).await {
        Ok(resp) if resp.success => Ok(json!({
            "running": true,
            "socket": socket,
            "daemon": resp.data,
        })),
        Ok(resp) => Err(BridgeError::Daemon(resp.error.unwrap_or_default()).into()),
        Err(BridgeError::Unavailable(_)) => Ok(json!({ "running": false, "socket": socket })),
        Err(e) => Err(e.into()),
    }
}

pub async fn stop_daemon(services: &Arc<Services>, session: Option<&str>) -> anyhow::Result<Value> {
    let target = services.target(session);
    let socket = services
        .socket_path(&target)
        .context("current session has no name")?;
    match request(&socket, &DaemonRequest::Stop, services.config.daemon_timeout()).await {
        Ok(_) => Ok(json!({ "stopped": true, "socket": socket })),
        Err(BridgeError::Unavailable(_)) => Ok(json!({ "stopped": false, "socket": socket })),
        Err(e) => Err(e.into()),
    }
}
