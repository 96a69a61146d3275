//! Recording zellij double for runtime tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use zjmux_core::SessionTarget;
use zjmux_zellij::{AttachSpawner, AttachedClient, ZellijCommandRunner, ZellijError};

use crate::config::RuntimeConfig;
use crate::services::{Backends, Caller, Services};

pub const CALLER_SESSION: &str = "work";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub session: Option<String>,
    pub args: Vec<String>,
}

impl Call {
    /// `dump-layout` for actions, `pipe:<cmd>` for plugin pipes, else the subcommand.
    pub fn verb(&self) -> String {
        match self.args.first().map(String::as_str) {
            Some("action") => self.args.get(1).cloned().unwrap_or_default(),
            Some("pipe") => format!("pipe:{}", self.args.get(4).map_or("", String::as_str)),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

#[derive(Default)]
struct State {
    layouts: HashMap<String, String>,
    screen: String,
    sessions: String,
    pipe: HashMap<String, String>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Vec<Call>,
}

/// Serves canned dumps, writes screen files for `dump-screen <path>`, and
/// records every call. Also stands in for the attach spawner.
#[derive(Clone, Default)]
pub struct MockZellij {
    state: Arc<Mutex<State>>,
    forks: Arc<AtomicUsize>,
}

impl MockZellij {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout served to every session without its own.
    pub fn with_layout(self, dump: &str) -> Self {
        self.set_layout("", dump);
        self
    }

    pub fn with_session_layout(self, session: &str, dump: &str) -> Self {
        self.set_layout(session, dump);
        self
    }

    pub fn with_screen(self, screen: &str) -> Self {
        self.lock().screen = screen.to_string();
        self
    }

    pub fn with_sessions(self, listing: &str) -> Self {
        self.lock().sessions = listing.to_string();
        self
    }

    /// Stdout for `pipe ... -n <cmd>`. Unset commands answer `{"success":true}`.
    pub fn with_pipe(self, cmd: &str, stdout: &str) -> Self {
        self.lock().pipe.insert(cmd.to_string(), stdout.to_string());
        self
    }

    pub fn failing(self, verb: &str) -> Self {
        self.lock().failing.insert(verb.to_string());
        self
    }

    /// Block for `delay` on every call to `verb`, after it is recorded.
    pub fn with_delay(self, verb: &str, delay: Duration) -> Self {
        self.lock().delays.insert(verb.to_string(), delay);
        self
    }

    pub fn set_layout(&self, session: &str, dump: &str) {
        self.lock().layouts.insert(session.to_string(), dump.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn verbs(&self) -> Vec<String> {
        self.lock().calls.iter().map(Call::verb).collect()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.verbs().iter().filter(|v| *v == verb).count()
    }

    pub fn forks(&self) -> usize {
        self.forks.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("mock state")
    }
}

impl ZellijCommandRunner for MockZellij {
    fn run(&self, target: &SessionTarget, args: &[&str]) -> Result<String, ZellijError> {
        let call = Call {
            session: target.name().map(str::to_string),
            args: args.iter().map(|s| s.to_string()).collect(),
        };
        let verb = call.verb();
        let delay = {
            let mut state = self.lock();
            state.calls.push(call);
            state.delays.get(&verb).copied()
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let state = self.lock();

        if state.failing.contains(&verb) {
            return Err(ZellijError::CommandFailed(format!("{verb}: exit code 1: mock failure")));
        }
        match verb.as_str() {
            "dump-layout" => {
                let key = target.name().unwrap_or("");
                Ok(state
                    .layouts
                    .get(key)
                    .or_else(|| state.layouts.get(""))
                    .cloned()
                    .unwrap_or_default())
            }
            "dump-screen" => {
                std::fs::write(args[2], &state.screen)?;
                Ok(String::new())
            }
            "list-sessions" => Ok(state.sessions.clone()),
            v if v.starts_with("pipe:") => Ok(state
                .pipe
                .get(&v["pipe:".len()..])
                .cloned()
                .unwrap_or_else(|| r#"{"success":true}"#.to_string())),
            _ => Ok(String::new()),
        }
    }
}

struct FakeClient;

impl AttachedClient for FakeClient {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }
    fn is_alive(&mut self) -> bool {
        true
    }
    fn terminate(&mut self, _grace: Duration) {}
}

impl AttachSpawner for MockZellij {
    fn spawn(&self, _session: &str) -> Result<Box<dyn AttachedClient>, ZellijError> {
        self.forks.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeClient))
    }
}

/// Fast timings, no real plugin unless `plugin` is given.
pub fn test_config(plugin: Option<&Path>) -> RuntimeConfig {
    let mut cfg = RuntimeConfig::with_env(|_| None);
    cfg.plugin_path = plugin.map_or_else(
        || "/nonexistent/zjmux-test/zellij-pane-bridge.wasm".into(),
        Path::to_path_buf,
    );
    cfg.focus_settle_ms = 0;
    cfg.attach_settle_ms = 0;
    cfg.attach_grace_ms = 0;
    cfg.daemon_spawn_retries = 3;
    cfg.daemon_spawn_interval_ms = 10;
    cfg.daemon_timeout_ms = 2_000;
    cfg
}

pub fn services_with(mock: &MockZellij, plugin: Option<&Path>) -> Arc<Services> {
    services_with_config(mock, test_config(plugin), caller())
}

pub fn services_with_config(mock: &MockZellij, config: RuntimeConfig, caller: Caller) -> Arc<Services> {
    let backends = Backends {
        cli: Arc::new(mock.clone()),
        pipe: Arc::new(mock.clone()),
        spawner: Box::new(mock.clone()),
    };
    Arc::new(Services::new(config, caller, backends))
}

pub fn caller() -> Caller {
    Caller {
        session: Some(CALLER_SESSION.to_string()),
        pane_id: None,
    }
}

/// A touch-only plugin file so the control plane counts as available.
pub fn plugin_file() -> tempfile::NamedTempFile {
    tempfile::Builder::new()
        .suffix(".wasm")
        .tempfile()
        .expect("plugin tempfile")
}

// ─── Layout fixtures ────────────────────────────────────────────────

/// Two tabs; `logs` is unfocused. In `build` the marked watcher is focused.
pub const TWO_TABS: &str = r#"layout {
    tab name="build" focus=true {
        pane size=1 borderless=true {
            plugin location="zellij:tab-bar"
        }
        pane command="bash" name="Renamed Title" focus=true {
            args "-c" "cargo watch" "name=watcher"
        }
        pane command="htop"
        pane
    }
    tab name="logs" {
        pane command="tail" {
            args "-f" "/var/log/syslog"
        }
        pane command="sh" {
            args "-c" "make test" "name=tests"
        }
    }
}
"#;
