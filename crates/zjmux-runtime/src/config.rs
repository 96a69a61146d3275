//! Runtime configuration: TOML file, then env/flag overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "zjmux/config.toml";
const PLUGIN_FILE: &str = ".local/share/zjmux/plugins/zellij-pane-bridge.wasm";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub zellij_bin: String,
    pub plugin_path: PathBuf,
    pub cli_timeout_ms: u64,
    pub pipe_timeout_ms: u64,
    pub daemon_timeout_ms: u64,
    pub layout_ttl_ms: u64,
    pub focus_settle_ms: u64,
    pub daemon_spawn_retries: u32,
    pub daemon_spawn_interval_ms: u64,
    pub daemon_retry_cooldown_ms: u64,
    pub attach_settle_ms: u64,
    pub attach_grace_ms: u64,
    pub socket_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::with_env(|key| std::env::var(key).ok())
    }
}

/// Values given on the command line (or their `env` fallbacks via clap).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub zellij_bin: Option<String>,
    pub plugin_path: Option<PathBuf>,
    pub daemon_timeout_ms: Option<u64>,
    pub socket_dir: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Defaults with path-valued keys derived from `lookup`.
    pub fn with_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let home = lookup("HOME").filter(|h| !h.is_empty());
        let plugin_path = match &home {
            Some(home) => Path::new(home).join(PLUGIN_FILE),
            None => PathBuf::from("/").join(PLUGIN_FILE),
        };
        Self {
            zellij_bin: "zellij".to_string(),
            plugin_path,
            cli_timeout_ms: 10_000,
            pipe_timeout_ms: 7_000,
            daemon_timeout_ms: 10_000,
            layout_ttl_ms: 500,
            focus_settle_ms: 100,
            daemon_spawn_retries: 20,
            daemon_spawn_interval_ms: 250,
            daemon_retry_cooldown_ms: 30_000,
            attach_settle_ms: 1_500,
            attach_grace_ms: 2_000,
            socket_dir: default_socket_dir(
                lookup("XDG_RUNTIME_DIR").as_deref(),
                lookup("USER").as_deref(),
            ),
        }
    }

    /// Load from `explicit` (must exist) or the first default location that does.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(|key| std::env::var(key).ok()).filter(|p| p.is_file()),
        };
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_toml(&text).with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    #[must_use]
    pub fn with_overrides(mut self, o: &Overrides) -> Self {
        if let Some(bin) = &o.zellij_bin {
            self.zellij_bin = bin.clone();
        }
        if let Some(path) = &o.plugin_path {
            self.plugin_path = path.clone();
        }
        if let Some(ms) = o.daemon_timeout_ms {
            self.daemon_timeout_ms = ms;
        }
        if let Some(dir) = &o.socket_dir {
            self.socket_dir = dir.clone();
        }
        self
    }

    /// Daemon socket for `session`.
    pub fn socket_path(&self, session: &str) -> PathBuf {
        self.socket_dir
            .join(format!("bridge-{}.sock", sanitize_session(session)))
    }

    pub fn cli_timeout(&self) -> Duration {
        Duration::from_millis(self.cli_timeout_ms)
    }

    pub fn pipe_timeout(&self) -> Duration {
        Duration::from_millis(self.pipe_timeout_ms)
    }

    pub fn daemon_timeout(&self) -> Duration {
        Duration::from_millis(self.daemon_timeout_ms)
    }

    pub fn layout_ttl(&self) -> Duration {
        Duration::from_millis(self.layout_ttl_ms)
    }

    pub fn focus_settle(&self) -> Duration {
        Duration::from_millis(self.focus_settle_ms)
    }

    pub fn daemon_spawn_interval(&self) -> Duration {
        Duration::from_millis(self.daemon_spawn_interval_ms)
    }

    pub fn daemon_retry_cooldown(&self) -> Duration {
        Duration::from_millis(self.daemon_retry_cooldown_ms)
    }

    pub fn attach_settle(&self) -> Duration {
        Duration::from_millis(self.attach_settle_ms)
    }

    pub fn attach_grace(&self) -> Duration {
        Duration::from_millis(self.attach_grace_ms)
    }
}

/// `$XDG_RUNTIME_DIR/zjmux`, else `/tmp/zjmux-$USER`.
pub fn default_socket_dir(xdg_runtime_dir: Option<&str>, user: Option<&str>) -> PathBuf {
    match xdg_runtime_dir.filter(|d| !d.is_empty()) {
        Some(dir) => Path::new(dir).join("zjmux"),
        None => PathBuf::from(format!("/tmp/zjmux-{}", user.unwrap_or("unknown"))),
    }
}

pub fn default_config_path(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(xdg) = lookup("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Some(Path::new(&xdg).join(CONFIG_FILE));
    }
    lookup("HOME")
        .filter(|h| !h.is_empty())
        .map(|home| Path::new(&home).join(".config").join(CONFIG_FILE))
}

/// Keep `[A-Za-z0-9._-]`, replace everything else with `_`.
pub fn sanitize_session(session: &str) -> String {
    session
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
