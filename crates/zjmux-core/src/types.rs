use serde::{Deserialize, Serialize};
use std::fmt;

/// Key used for the caller's own session when `$ZELLIJ_SESSION_NAME` is unset.
pub const CURRENT_SESSION_KEY: &str = "current";

// ─── Session targeting ───────────────────────────────────────────────

/// Which zellij session an operation is aimed at.
///
/// `Current` means "whatever session this process runs in" and adds no
/// `--session` flag to multiplexer invocations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SessionTarget {
    #[default]
    Current,
    Named(String),
}

impl SessionTarget {
    /// Build a target from an optional requested session name.
    ///
    /// Blank names and the caller's own session (`current_name`) fold into
    /// `Current`, so both spellings share one cache entry and one focus lock.
    pub fn resolve(requested: Option<&str>, current_name: Option<&str>) -> Self {
        match requested.map(str::trim).filter(|s| !s.is_empty()) {
            None => Self::Current,
            Some(name) if Some(name) == current_name => Self::Current,
            Some(name) => Self::Named(name.to_string()),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Current => None,
            Self::Named(name) => Some(name),
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, Self::Current)
    }

    /// Per-session key for layout cache entries and focus locks.
    pub fn key(&self, current_name: Option<&str>) -> String {
        match self {
            Self::Current => current_name.unwrap_or(CURRENT_SESSION_KEY).to_string(),
            Self::Named(name) => name.clone(),
        }
    }
}

impl fmt::Display for SessionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => f.write_str("<current>"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

// ─── Control-plane pane summary ──────────────────────────────────────

/// One pane as reported by the pane-bridge plugin's `list`/`query` commands.
///
/// `id` is zellij's terminal pane id: stable for the pane's lifetime, unlike
/// the ordinal position in a layout dump.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPane {
    pub id: u32,
    pub is_plugin: bool,
    pub title: String,
    pub is_focused: bool,
    pub is_floating: bool,
    pub is_fullscreen: bool,
    pub is_suppressed: bool,
    pub tab_index: usize,
    pub command: Option<String>,
    pub exit_status: Option<i32>,
    pub exited: bool,
    pub rows: usize,
    pub cols: usize,
}

impl ControlPane {
    /// Title if set, else the launched command.
    pub fn label(&self) -> &str {
        if !self.title.is_empty() {
            &self.title
        } else {
            self.command.as_deref().unwrap_or("")
        }
    }
}
